// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use tokio::sync::broadcast;

/// Events pushed to live clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepoEvent {
    NewArtifacts,
}

/// Fire-and-forget sink told when harvesting stored new artifacts.
pub trait NotificationSink: Send + Sync {
    fn notify_new_artifacts(&self);
}

pub struct BroadcastNotifier {
    tx: broadcast::Sender<RepoEvent>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RepoEvent> {
        self.tx.subscribe()
    }
}

impl NotificationSink for BroadcastNotifier {
    fn notify_new_artifacts(&self) {
        // No subscribers is not an error.
        let receivers = self.tx.send(RepoEvent::NewArtifacts).unwrap_or(0);
        tracing::debug!("Notified {} subscribers of new artifacts", receivers);
    }
}
