// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use ocstore_kernel::{ArtifactKind, NodeIndex};
use ocstore_node::app::{AppStatus, Application};
use ocstore_node::automation::{AutomationController, AutomationState, AutomationTimers, LifecycleObserver};

use common::{init_tracing, GatedStore, Network, TestNode};

fn timers() -> AutomationTimers {
    AutomationTimers {
        publish_interval: Duration::from_secs(1),
        discover_interval: Duration::from_secs(5),
        discover_start_delay: Duration::from_secs(2),
    }
}

/// Lets the paused clock run until the node's current root is the one the name service holds.
async fn until_published(net: &Network, node: &TestNode) {
    for _ in 0..50 {
        let published = net.names.root_of(node.index).map(|r| r.address);
        if published.as_ref() == Some(&node.repo.current_root()) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
    panic!("root {} never published", node.repo.current_root());
}

#[tokio::test(start_paused = true)]
async fn test_automation_lifecycle() {
    init_tracing();
    let net = Network::new(2);
    let node = net.node(1).await;
    let app = Arc::new(Application::new());
    let observer: Arc<dyn LifecycleObserver> = app.clone();
    let automation = AutomationController::new(node.repo.clone(), timers(), Some(observer));

    assert_eq!(automation.state(), AutomationState::Off);
    automation.turn_on().await;
    assert_eq!(automation.state(), AutomationState::Running);
    assert!(app.is_automation_on());
    assert_eq!(app.status(), AppStatus::Starting);
    app.api_started();
    assert!(app.can_process());

    // Turning on again changes nothing.
    automation.turn_on().await;
    assert_eq!(automation.state(), AutomationState::Running);

    // The empty starting root goes out with the first cycle.
    until_published(&net, &node).await;

    node.repo
        .save_artifact(b"one".to_vec(), ArtifactKind::Envelope, Utc::now(), false)
        .await
        .unwrap();
    until_published(&net, &node).await;

    // Saved right before turning off; only the final publish can carry it.
    let last = node
        .repo
        .save_artifact(b"two".to_vec(), ArtifactKind::Receipt, Utc::now(), false)
        .await
        .unwrap();

    automation.turn_off().await;
    assert_eq!(automation.state(), AutomationState::Off);
    assert!(!app.is_automation_on());

    let published = net.names.root_of(NodeIndex(1)).unwrap();
    assert_eq!(published.address, last.root);
    assert_eq!(node.repo.last_published_root(), Some(last.root.clone()));

    // The final discover harvested the node's own tree.
    assert_eq!(node.db.retrieved_count(), 2);

    automation.turn_off().await;
    assert_eq!(automation.state(), AutomationState::Off);
}

#[tokio::test(start_paused = true)]
async fn test_running_automation_harvests_peer() {
    let net = Network::new(1);
    let writer = net.node(1).await;
    let reader = net.node(2).await;

    writer
        .repo
        .save_artifact(b"peer data".to_vec(), ArtifactKind::Envelope, Utc::now(), false)
        .await
        .unwrap();
    writer.repo.publish_cycle().await.unwrap();

    let automation = AutomationController::new(reader.repo.clone(), timers(), None);
    automation.turn_on().await;

    for _ in 0..50 {
        if reader.db.retrieved_count() > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
    assert_eq!(reader.db.retrieved_count(), 1);
    assert_eq!(reader.notifier.count(), 1);

    automation.turn_off().await;
    assert_eq!(automation.state(), AutomationState::Off);
}

#[tokio::test(start_paused = true)]
async fn test_turn_off_waits_for_running_publish() {
    init_tracing();
    let net = Network::new(1);
    let store = GatedStore::new(net.dag.clone(), true, false);
    let (repo, db, _) = net.repo_over(1, store.clone()).await;
    let automation = Arc::new(AutomationController::new(repo.clone(), timers(), None));

    automation.turn_on().await;
    while store.pins() == 0 {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let drain = {
        let automation = automation.clone();
        tokio::spawn(async move { automation.turn_off().await })
    };
    let mut state = automation.subscribe();
    state.wait_for(|s| *s == AutomationState::Draining).await.unwrap();

    // Far past several publish intervals; the held publish is the only one.
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(automation.state(), AutomationState::Draining);
    assert_eq!(store.pins(), 1);
    assert!(net.names.root_of(NodeIndex(1)).is_none());

    // Queued behind the held publish; the final publish must carry it.
    let save = {
        let repo = repo.clone();
        tokio::spawn(async move {
            repo.save_artifact(b"late".to_vec(), ArtifactKind::Envelope, Utc::now(), false)
                .await
                .unwrap()
        })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(!save.is_finished());

    store.release_pins();
    drain.await.unwrap();
    let saved = save.await.unwrap();

    assert_eq!(automation.state(), AutomationState::Off);
    assert_eq!(store.pins(), 2);
    assert_eq!(net.names.root_of(NodeIndex(1)).unwrap().address, saved.root);
    assert_eq!(repo.last_published_root(), Some(saved.root));
    assert_eq!(db.retrieved_count(), 1);
}
