mod support;

use std::sync::Arc;
use std::time::Duration as StdDuration;

use rota_core::feed::{PollingDirectoryFeed, spawn_directory_watcher};
use rota_core::store::DIRECTORY_KEY;
use rota_core::{Directory, DirectoryEdit, EngineError};
use rota_model::{OwnerGroup, ResourceKind};

use support::*;

#[tokio::test]
async fn removing_an_earlier_owner_keeps_the_due_owner() {
    let h = harness(owners_with_aliases(&["a", "b", "c"]), relaxed_config()).await;
    assert_eq!(next_owners(&h.engine, ResourceKind::Alias, 1).await, ["a"]);

    h.engine
        .edit_directory(DirectoryEdit::RemoveOwner { name: "a".into() })
        .await
        .unwrap();

    assert_eq!(next_owners(&h.engine, ResourceKind::Alias, 3).await, ["b", "c", "b"]);
}

#[tokio::test]
async fn removing_the_due_owner_moves_to_its_successor() {
    let h = harness(owners_with_aliases(&["a", "b", "c"]), relaxed_config()).await;
    next_owners(&h.engine, ResourceKind::Alias, 1).await;

    h.engine
        .edit_directory(DirectoryEdit::RemoveOwner { name: "B".into() })
        .await
        .unwrap();

    assert_eq!(next_owners(&h.engine, ResourceKind::Alias, 2).await, ["c", "a"]);
}

#[tokio::test]
async fn disabling_an_entry_keeps_the_owner_in_rotation() {
    let directory = Directory::new(vec![
        OwnerGroup::new("a").with_numbers(["100", "101"]),
        OwnerGroup::new("b").with_numbers(["200"]),
    ]);
    let h = harness(directory, relaxed_config()).await;

    h.engine
        .edit_directory(DirectoryEdit::SetEntryDisabled {
            owner: "a".into(),
            kind: ResourceKind::Number,
            value: "100".into(),
            disabled: true,
        })
        .await
        .unwrap();

    let first = h.engine.allocate(request(1, ResourceKind::Number)).await;
    assert_eq!(first.issued().unwrap().value, "101");
}

#[tokio::test]
async fn removed_owners_lose_their_priority() {
    let h = harness(owners_with_aliases(&["a", "b"]), relaxed_config()).await;
    h.engine.set_priority("b", 3, false).await.unwrap();
    h.engine
        .edit_directory(DirectoryEdit::RemoveOwner { name: "b".into() })
        .await
        .unwrap();
    assert!(h.engine.status().await.priority.is_empty());

    // A disabled owner keeps its entry for when it comes back.
    h.engine.set_priority("a", 2, false).await.unwrap();
    h.engine
        .edit_directory(DirectoryEdit::SetOwnerDisabled {
            name: "a".into(),
            disabled: true,
        })
        .await
        .unwrap();
    assert_eq!(h.engine.status().await.priority.len(), 1);
}

#[tokio::test]
async fn rejected_edits_leave_the_rotation_alone() {
    let h = harness(owners_with_aliases(&["a", "b"]), relaxed_config()).await;
    next_owners(&h.engine, ResourceKind::Alias, 1).await;

    let err = h
        .engine
        .edit_directory(DirectoryEdit::AddEntry {
            owner: "a".into(),
            kind: ResourceKind::Alias,
            value: "@B-ALIAS".into(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::AlreadyExists { .. }));
    assert_eq!(h.engine.status().await.directory_revision, 0);
    assert_eq!(next_owners(&h.engine, ResourceKind::Alias, 1).await, ["b"]);
}

#[tokio::test]
async fn external_directory_writes_are_picked_up() {
    let h = harness(owners_with_aliases(&["a", "b", "c"]), relaxed_config()).await;
    next_owners(&h.engine, ResourceKind::Alias, 1).await;

    let mut external = h.engine.directory().await;
    external
        .apply(&DirectoryEdit::RemoveOwner { name: "a".into() })
        .unwrap();
    h.stores
        .blobs
        .save_blob(DIRECTORY_KEY, &external.encode().unwrap())
        .await
        .unwrap();

    assert!(h.engine.reload_directory().await.unwrap());
    assert!(!h.engine.reload_directory().await.unwrap());
    assert_eq!(next_owners(&h.engine, ResourceKind::Alias, 2).await, ["b", "c"]);
}

#[tokio::test]
async fn reload_never_adopts_an_older_directory() {
    let h = harness(owners_with_aliases(&["a", "b", "c"]), relaxed_config()).await;
    let before = h.engine.directory().await;

    h.engine
        .edit_directory(DirectoryEdit::RemoveOwner { name: "b".into() })
        .await
        .unwrap();
    h.engine
        .edit_directory(DirectoryEdit::RemoveOwner { name: "c".into() })
        .await
        .unwrap();

    // A stale snapshot lands in the store after both edits.
    h.stores
        .blobs
        .save_blob(DIRECTORY_KEY, &before.encode().unwrap())
        .await
        .unwrap();

    assert!(!h.engine.reload_directory().await.unwrap());
    let status = h.engine.status().await;
    assert_eq!(status.directory_revision, 2);
    assert_eq!(next_owners(&h.engine, ResourceKind::Alias, 2).await, ["a", "a"]);
}

#[tokio::test(start_paused = true)]
async fn polling_watcher_reloads_the_engine() {
    let h = harness(owners_with_aliases(&["a", "b"]), relaxed_config()).await;
    let feed = Arc::new(PollingDirectoryFeed::new(
        h.stores.blobs.clone(),
        StdDuration::from_secs(10),
    ));
    let watcher = spawn_directory_watcher(h.engine.clone(), feed);

    // Let the watcher subscribe before the external write.
    tokio::time::sleep(StdDuration::from_secs(1)).await;

    let mut external = h.engine.directory().await;
    external
        .apply(&DirectoryEdit::AddOwner {
            name: "c".into(),
            forward_target: None,
        })
        .unwrap();
    external
        .apply(&DirectoryEdit::AddEntry {
            owner: "c".into(),
            kind: ResourceKind::Alias,
            value: "c-alias".into(),
        })
        .unwrap();
    h.stores
        .blobs
        .save_blob(DIRECTORY_KEY, &external.encode().unwrap())
        .await
        .unwrap();

    tokio::time::sleep(StdDuration::from_secs(30)).await;
    assert_eq!(h.engine.status().await.directory_revision, 2);
    assert_eq!(h.engine.status().await.pools[0].owners, ["a", "b", "c"]);

    watcher.abort();
}

#[tokio::test]
async fn lookup_names_the_contributing_owner() {
    let directory = Directory::new(vec![
        OwnerGroup::new("@Anna").with_aliases(["anna_x"]).with_numbers(["+1 555 0100"]),
        OwnerGroup::new("boris").with_numbers(["200"]),
    ]);
    let h = harness(directory, relaxed_config()).await;
    h.engine
        .edit_directory(DirectoryEdit::SetOwnerDisabled {
            name: "boris".into(),
            disabled: true,
        })
        .await
        .unwrap();

    let alias = h.engine.lookup_owner("@ANNA_X").await.unwrap();
    assert_eq!(alias.owner, "anna");
    assert_eq!(alias.kind, ResourceKind::Alias);

    let number = h.engine.lookup_owner("15550100").await.unwrap();
    assert_eq!(number.owner, "anna");
    assert_eq!(number.value, "+1 555 0100");

    let disabled = h.engine.lookup_owner("200").await.unwrap();
    assert_eq!(disabled.owner, "boris");
    assert!(disabled.owner_disabled);

    assert!(h.engine.lookup_owner("nobody").await.is_none());
}
