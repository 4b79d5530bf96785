mod support;

use chrono::{Duration, TimeZone, Utc};

use rota_core::{AllocationOutcome, DirectoryEdit, EngineConfig};
use rota_model::ResourceKind;

use support::*;

#[tokio::test]
async fn owners_are_served_in_cyclic_order() {
    let h = harness(owners_with_aliases(&["a", "b", "c"]), relaxed_config()).await;

    let served = next_owners(&h.engine, ResourceKind::Alias, 7).await;
    assert_eq!(served, ["a", "b", "c", "a", "b", "c", "a"]);

    let status = h.engine.status().await;
    assert_eq!(status.pools[0].rounds, 2);
    assert_eq!(status.pools[0].due_owner.as_deref(), Some("b"));
}

#[tokio::test]
async fn priority_owner_is_served_twice_then_rotation_resumes() {
    let h = harness(owners_with_aliases(&["a", "b", "c"]), relaxed_config()).await;
    h.engine.set_priority("@B", 2, false).await.unwrap();

    let served = next_owners(&h.engine, ResourceKind::Alias, 6).await;
    assert_eq!(served, ["a", "b", "b", "c", "a", "b"]);
    assert!(h.engine.status().await.priority.is_empty());
}

#[tokio::test]
async fn stop_after_disables_the_owner_once_priority_is_spent() {
    let h = harness(owners_with_aliases(&["a", "b", "c"]), relaxed_config()).await;
    h.engine
        .edit_directory(DirectoryEdit::SetForwardTarget {
            name: "b".into(),
            target: Some(777),
        })
        .await
        .unwrap();
    h.engine.set_priority("b", 1, true).await.unwrap();

    let served = next_owners(&h.engine, ResourceKind::Alias, 5).await;
    assert_eq!(served, ["a", "b", "c", "a", "c"]);

    let directory = h.engine.directory().await;
    assert!(directory.owner("b").unwrap().disabled);
    assert_eq!(h.notifier.containing("Priority for b is finished"), 1);
}

#[tokio::test]
async fn priority_requires_a_known_owner() {
    let h = harness(owners_with_aliases(&["a"]), relaxed_config()).await;
    let err = h.engine.set_priority("zed", 1, false).await.unwrap_err();
    assert!(err.is_not_found());
    assert!(h.engine.set_priority("a", 0, false).await.is_err());
}

#[tokio::test]
async fn exhausted_numbers_are_skipped_for_the_day() {
    let mut config = relaxed_config();
    config.quota.daily_limit_per_number = 1;
    let h = harness(
        owners_with_numbers(&[("a", &["100", "101"]), ("b", &["200"]), ("c", &["300"])]),
        config,
    )
    .await;

    // a, b, c each serve once; b's only number is now used up.
    let served = next_owners(&h.engine, ResourceKind::Number, 3).await;
    assert_eq!(served, ["a", "b", "c"]);

    let outcome = h.engine.allocate(request(9, ResourceKind::Number)).await;
    assert_eq!(outcome.issued().unwrap().value, "101");

    // Cursor now sits on b; b is skipped and c's number is gone too.
    let outcome = h.engine.allocate(request(9, ResourceKind::Number)).await;
    assert_eq!(outcome, AllocationOutcome::PoolExhausted);
}

#[tokio::test]
async fn number_quota_resets_on_the_next_logical_day() {
    let mut config = relaxed_config();
    config.quota.daily_limit_per_number = 1;
    let start = Utc.with_ymd_and_hms(2024, 5, 10, 3, 29, 0).unwrap();
    let h = harness_at(owners_with_numbers(&[("a", &["100"])]), config, start).await;

    assert!(h.engine.allocate(request(1, ResourceKind::Number)).await.issued().is_some());
    assert_eq!(
        h.engine.allocate(request(2, ResourceKind::Number)).await,
        AllocationOutcome::PoolExhausted
    );

    h.clock.advance(Duration::minutes(2));
    assert!(h.engine.allocate(request(3, ResourceKind::Number)).await.issued().is_some());
}

#[tokio::test]
async fn alias_pool_ignores_number_quota() {
    let mut config = EngineConfig::default();
    config.quota.daily_limit_per_number = 0;
    let h = harness(owners_with_aliases(&["a"]), config).await;

    for requester in 0..3 {
        assert!(
            h.engine
                .allocate(request(requester, ResourceKind::Alias))
                .await
                .issued()
                .is_some()
        );
    }
}

#[tokio::test]
async fn empty_pool_reports_exhaustion() {
    let h = harness(owners_with_aliases(&[]), relaxed_config()).await;
    assert_eq!(
        h.engine.allocate(request(1, ResourceKind::Number)).await,
        AllocationOutcome::PoolExhausted
    );
}

#[tokio::test]
async fn rotation_survives_a_restart() {
    let h = harness(owners_with_aliases(&["a", "b", "c"]), relaxed_config()).await;
    next_owners(&h.engine, ResourceKind::Alias, 2).await;

    let reloaded = rota_core::AllocationEngine::load(
        h.stores.clone(),
        h.notifier.clone(),
        h.clock.clone(),
        relaxed_config(),
    )
    .await
    .unwrap();

    let served = next_owners(&reloaded, ResourceKind::Alias, 2).await;
    assert_eq!(served, ["c", "a"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_requests_never_share_a_slot() {
    let mut config = relaxed_config();
    config.quota.daily_limit_per_number = 1;
    let h = harness(
        owners_with_numbers(&[
            ("a", &["100", "101", "102", "103"]),
            ("b", &["200", "201", "202", "203"]),
            ("c", &["300", "301", "302", "303"]),
        ]),
        config,
    )
    .await;

    let tasks: Vec<_> = (0..12)
        .map(|requester| {
            let engine = h.engine.clone();
            tokio::spawn(async move {
                engine.allocate(request(requester, ResourceKind::Number)).await
            })
        })
        .collect();
    let outcomes: Vec<AllocationOutcome> = futures::future::join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let mut values: Vec<String> = outcomes
        .iter()
        .map(|outcome| outcome.issued().unwrap().value.clone())
        .collect();
    values.sort();
    values.dedup();
    assert_eq!(values.len(), 12, "every value is issued exactly once");

    for owner in ["a", "b", "c"] {
        let served = outcomes.iter().filter(|o| owner_of(o) == owner).count();
        assert_eq!(served, 4, "owner {owner} keeps its share");
    }

    assert_eq!(
        h.engine.allocate(request(99, ResourceKind::Number)).await,
        AllocationOutcome::PoolExhausted
    );
}
