// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
mod common;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use ocstore_kernel::{ArtifactKind, NodeIndex};
use ocstore_node::repo::MSG_DATA;
use ocstore_persistence::{Database, RetrievedQuery};

use common::{init_tracing, repo_config, GatedStore, Network, TestNode};

fn at(ts: &str) -> DateTime<Utc> {
    ts.parse().unwrap()
}

async fn save(node: &TestNode, data: &[u8], kind: ArtifactKind, ts: &str) {
    node.repo.save_artifact(data.to_vec(), kind, at(ts), false).await.unwrap();
}

#[tokio::test]
async fn test_walk_resumes_from_checkpoint() {
    init_tracing();
    let net = Network::new(2);
    let writer = net.node(1).await;
    let reader = net.node(2).await;

    save(&writer, b"first", ArtifactKind::Envelope, "2024-03-02T10:15:30.123Z").await;
    assert!(writer.repo.publish_cycle().await.unwrap());

    let report = reader.repo.discover_cycle().await.unwrap();
    assert_eq!(report.inserted, 1);
    assert!(report.failed.is_empty());

    let cp = reader.db.find_checkpoint(NodeIndex(1), MSG_DATA.name).unwrap().checkpoint;
    assert_eq!(cp.last_scanned_leaf, "/2024/03/02/10/15");
    assert_eq!(cp.last_envelope.as_deref(), Some("msg-30123000"));
    assert_eq!(cp.last_receipt, None);

    // Same millisecond bucket in the old leaf, plus a new leaf.
    save(&writer, b"second", ArtifactKind::Envelope, "2024-03-02T10:15:30.123Z").await;
    save(&writer, b"third", ArtifactKind::Envelope, "2024-03-02T10:16:05.000Z").await;
    save(&writer, b"fourth", ArtifactKind::Envelope, "2024-03-02T10:16:59.999Z").await;
    assert!(writer.repo.publish_cycle().await.unwrap());

    let report = reader.repo.discover_cycle().await.unwrap();
    assert_eq!(report.inserted, 3);

    let cp = reader.db.find_checkpoint(NodeIndex(1), MSG_DATA.name).unwrap().checkpoint;
    assert_eq!(cp.last_scanned_leaf, "/2024/03/02/10/16");
    assert_eq!(cp.last_envelope.as_deref(), Some("msg-59999000"));

    let harvested = reader.db.find_retrieved(&RetrievedQuery::default());
    let payloads: Vec<&[u8]> = harvested.iter().map(|d| d.data.as_slice()).collect();
    assert_eq!(payloads.len(), 4);
    assert!(payloads.contains(&&b"second"[..]));

    let second = harvested.iter().find(|d| d.data == b"second").unwrap();
    assert_eq!(second.saved_at, at("2024-03-02T10:15:30.123Z"));
    assert_eq!(second.saved_counter, 1);
    assert_eq!(second.peer, NodeIndex(1));

    assert_eq!(reader.notifier.count(), 2);
}

#[tokio::test]
async fn test_rewalk_of_unchanged_tree_finds_nothing() {
    let net = Network::new(1);
    let writer = net.node(1).await;
    let reader = net.node(2).await;

    save(&writer, b"a", ArtifactKind::Envelope, "2024-03-02T10:15:30.123Z").await;
    save(&writer, b"b", ArtifactKind::Receipt, "2024-03-02T11:00:00.000Z").await;
    let root = writer.repo.current_root();

    assert_eq!(reader.repo.harvest_tree(NodeIndex(1), &root, Utc::now()).await.unwrap(), 2);
    let cp_before = reader.db.find_checkpoint(NodeIndex(1), MSG_DATA.name).unwrap();

    assert_eq!(reader.repo.harvest_tree(NodeIndex(1), &root, Utc::now()).await.unwrap(), 0);
    let cp_after = reader.db.find_checkpoint(NodeIndex(1), MSG_DATA.name).unwrap();

    assert_eq!(cp_before, cp_after);
    assert_eq!(cp_after.checkpoint.last_scanned_leaf, "/2024/03/02/11/00");
    assert_eq!(reader.notifier.count(), 1);
}

#[tokio::test]
async fn test_same_leaf_keeps_cursor_of_kind_without_new_files() {
    let net = Network::new(1);
    let writer = net.node(1).await;
    let reader = net.node(2).await;

    save(&writer, b"e", ArtifactKind::Envelope, "2024-03-02T10:15:01.000Z").await;
    save(&writer, b"r", ArtifactKind::Receipt, "2024-03-02T10:15:02.000Z").await;
    reader
        .repo
        .harvest_tree(NodeIndex(1), &writer.repo.current_root(), Utc::now())
        .await
        .unwrap();

    save(&writer, b"r2", ArtifactKind::Receipt, "2024-03-02T10:15:03.000Z").await;
    let found = reader
        .repo
        .harvest_tree(NodeIndex(1), &writer.repo.current_root(), Utc::now())
        .await
        .unwrap();
    assert_eq!(found, 1);

    let cp = reader.db.find_checkpoint(NodeIndex(1), MSG_DATA.name).unwrap().checkpoint;
    assert_eq!(cp.last_scanned_leaf, "/2024/03/02/10/15");
    assert_eq!(cp.last_envelope.as_deref(), Some("msg-01000000"));
    assert_eq!(cp.last_receipt.as_deref(), Some("rcpt-03000000"));
}

#[tokio::test]
async fn test_empty_tree_is_not_an_error() {
    let net = Network::new(1);
    let writer = net.node(1).await;
    let reader = net.node(2).await;

    let found = reader
        .repo
        .harvest_tree(NodeIndex(1), &writer.repo.current_root(), Utc::now())
        .await
        .unwrap();
    assert_eq!(found, 0);
    assert!(reader.db.find_checkpoint(NodeIndex(1), MSG_DATA.name).is_none());
    assert_eq!(reader.notifier.count(), 0);
}

#[tokio::test]
async fn test_duplicate_only_harvest_does_not_notify() {
    let net = Network::new(1);
    let writer = net.node(1).await;
    save(&writer, b"x", ArtifactKind::Envelope, "2024-03-02T10:15:30.123Z").await;
    let root = writer.repo.current_root();

    let first = net.node(2).await;
    first.repo.harvest_tree(NodeIndex(1), &root, Utc::now()).await.unwrap();
    assert_eq!(first.notifier.count(), 1);

    // Same artifacts already stored, but no checkpoint: the walk stages duplicates only.
    let db = Arc::new(Database::in_memory());
    db.insert_retrieved_many(first.db.find_retrieved(&RetrievedQuery::default()))
        .unwrap();
    let second = net.node_with(2, db, repo_config()).await;

    let found = second.repo.harvest_tree(NodeIndex(1), &root, Utc::now()).await.unwrap();
    assert_eq!(found, 0);
    assert_eq!(second.notifier.count(), 0);
    assert!(second.db.find_checkpoint(NodeIndex(1), MSG_DATA.name).is_some());
}

#[tokio::test]
async fn test_harvest_now_collects_own_write() {
    let net = Network::new(1);
    let node = net.node(1).await;

    let saved = node
        .repo
        .save_artifact(b"mine".to_vec(), ArtifactKind::Envelope, Utc::now(), true)
        .await
        .unwrap();
    node.repo.wait_idle().await;

    let doc = node.db.find_retrieved_by_address(&saved.address).unwrap();
    assert_eq!(doc.peer, NodeIndex(1));
    assert_eq!(node.notifier.count(), 1);

    let view = node.repo.get_artifact_by_address(&saved.address, false).unwrap();
    assert!(view.retrieved_at.is_some());
}

#[tokio::test]
async fn test_lookup_falls_back_to_saved_only_when_asked() {
    let net = Network::new(1);
    let node = net.node(1).await;

    let saved = node
        .repo
        .save_artifact(b"pending".to_vec(), ArtifactKind::Receipt, Utc::now(), false)
        .await
        .unwrap();

    assert!(node.repo.get_artifact_by_address(&saved.address, false).is_none());
    let view = node.repo.get_artifact_by_address(&saved.address, true).unwrap();
    assert_eq!(view.data, b"pending".to_vec());
    assert_eq!(view.retrieved_at, None);
}

#[tokio::test]
async fn test_listing_pages_with_has_more() {
    let net = Network::new(1);
    let writer = net.node(1).await;
    let reader = net.node(2).await;

    for minute in 10..15 {
        save(&writer, &[minute as u8], ArtifactKind::Envelope, &format!("2024-03-02T10:{}:00.000Z", minute)).await;
    }
    reader
        .repo
        .harvest_tree(NodeIndex(1), &writer.repo.current_root(), Utc::now())
        .await
        .unwrap();

    let page = reader.repo.list_harvested_artifacts(None, Some(2), 0);
    assert_eq!(page.items.len(), 2);
    assert!(page.has_more);
    assert_eq!(page.items[0].data, vec![10]);

    let page = reader.repo.list_harvested_artifacts(None, Some(2), 4);
    assert_eq!(page.items.len(), 1);
    assert!(!page.has_more);
    assert_eq!(page.items[0].data, vec![14]);

    let page = reader.repo.list_harvested_artifacts(Some(Utc::now()), None, 0);
    assert!(page.items.is_empty());
}

#[tokio::test]
async fn test_unknown_root_is_harvested_as_empty_tree() {
    let net = Network::new(1);
    let writer = net.node(1).await;
    let reader = net.node(2).await;
    save(&writer, b"ok", ArtifactKind::Envelope, "2024-03-02T10:15:30.123Z").await;
    writer.repo.publish_cycle().await.unwrap();

    // A root address that resolves to nothing is treated as an empty tree.
    net.names.set(
        NodeIndex(3),
        ocstore_node::directory::RootRecord {
            address: ocstore_kernel::ContentAddress::new("b3missing"),
            last_updated: Utc::now(),
        },
    );

    let report = reader.repo.discover_cycle().await.unwrap();
    assert_eq!(report.trees, 2);
    assert_eq!(report.inserted, 1);
    assert!(report.failed.is_empty());
    assert!(reader.db.app_state().last_roots_retrieval.is_some());
}

#[tokio::test]
async fn test_checkpoint_and_harvest_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let net = Network::new(1);
    let writer = net.node(1).await;
    save(&writer, b"kept", ArtifactKind::Envelope, "2024-03-02T10:15:30.123Z").await;
    let root = writer.repo.current_root();

    {
        let db = Arc::new(Database::open(dir.path()).unwrap());
        let reader = net.node_with(2, db, repo_config()).await;
        assert_eq!(reader.repo.harvest_tree(NodeIndex(1), &root, Utc::now()).await.unwrap(), 1);
        reader.db.compact().unwrap();
        reader.db.set_last_roots_retrieval(Utc::now()).unwrap();
    }

    let db = Arc::new(Database::open(dir.path()).unwrap());
    assert_eq!(db.retrieved_count(), 1);
    assert!(db.app_state().last_roots_retrieval.is_some());

    let reader = net.node_with(2, db, repo_config()).await;
    assert_eq!(reader.repo.harvest_tree(NodeIndex(1), &root, Utc::now()).await.unwrap(), 0);
    assert_eq!(reader.notifier.count(), 0);
}

#[tokio::test]
async fn test_harvest_now_requests_fold_into_one_rerun() {
    let net = Network::new(1);
    let store = GatedStore::new(net.dag.clone(), false, true);
    let (repo, db, notifier) = net.repo_over(1, store.clone()).await;

    repo.save_artifact(b"one".to_vec(), ArtifactKind::Envelope, at("2024-03-02T10:15:30.123Z"), true)
        .await
        .unwrap();
    // First round is now held fetching the first artifact.
    while store.cats() == 0 {
        tokio::task::yield_now().await;
    }

    for (data, ts) in [(&b"two"[..], "2024-03-02T10:15:31.000Z"), (&b"three"[..], "2024-03-02T10:15:32.000Z")] {
        repo.save_artifact(data.to_vec(), ArtifactKind::Envelope, at(ts), true)
            .await
            .unwrap();
    }
    assert_eq!(store.tree_scans(), 1);

    store.release_cats();
    repo.wait_idle().await;

    assert_eq!(store.tree_scans(), 2);
    assert_eq!(db.retrieved_count(), 3);
    assert_eq!(notifier.count(), 2);
}
