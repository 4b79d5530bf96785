#![cfg(feature = "database")]

use chrono::{NaiveDate, Utc};
use sqlx::PgPool;

use rota_core::LogicalDay;
use rota_core::store::{BanStore, BlobStore, CounterStore, PostgresStores};
use rota_model::RequesterId;

fn day(d: u32) -> LogicalDay {
    LogicalDay(NaiveDate::from_ymd_opt(2024, 5, d).unwrap())
}

#[sqlx::test(migrator = "rota_core::MIGRATOR")]
async fn blobs_upsert_in_place(pool: PgPool) {
    let stores = PostgresStores::new(pool);
    assert_eq!(stores.load_blob("directory").await.unwrap(), None);

    stores.save_blob("directory", b"{\"owners\":[]}").await.unwrap();
    stores.save_blob("directory", b"{\"revision\":2}").await.unwrap();

    let stored = stores.load_blob("directory").await.unwrap().unwrap();
    assert_eq!(stored, b"{\"revision\":2}".to_vec());
}

#[sqlx::test(migrator = "rota_core::MIGRATOR")]
async fn counters_increment_atomically_per_day(pool: PgPool) {
    let stores = PostgresStores::new(pool);

    assert_eq!(stores.increment("number:100", day(1)).await.unwrap(), 1);
    assert_eq!(stores.increment("number:100", day(1)).await.unwrap(), 2);
    assert_eq!(stores.increment("number:100", day(2)).await.unwrap(), 1);
    assert_eq!(stores.get("number:101", day(1)).await.unwrap(), 0);

    let many = stores
        .get_many(&["number:100".into(), "number:101".into()], day(1))
        .await
        .unwrap();
    assert_eq!(many.get("number:100"), Some(&2));
    assert_eq!(many.len(), 1);

    assert_eq!(stores.purge_before(day(2)).await.unwrap(), 1);
    assert_eq!(stores.get("number:100", day(2)).await.unwrap(), 1);
}

#[sqlx::test(migrator = "rota_core::MIGRATOR")]
async fn permanent_bans_are_a_set(pool: PgPool) {
    let stores = PostgresStores::new(pool);
    let who = RequesterId(99);

    assert!(stores.add(who, Utc::now()).await.unwrap());
    assert!(!stores.add(who, Utc::now()).await.unwrap());
    assert!(stores.contains(who).await.unwrap());
    assert_eq!(stores.list().await.unwrap().len(), 1);

    assert!(stores.remove(who).await.unwrap());
    assert!(!stores.contains(who).await.unwrap());
}
