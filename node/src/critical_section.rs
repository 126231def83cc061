// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use std::future::Future;

use tokio::sync::Mutex;

/// Serializes asynchronous operations in arrival order.
///
/// At most one operation runs at a time; the others wait in FIFO order and are released one by
/// one as the running operation completes, whatever its outcome. An operation must never submit
/// to the section it is running in: that deadlocks the queue.
pub struct CriticalSection {
    name: &'static str,
    queue: Mutex<()>,
}

impl CriticalSection {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            queue: Mutex::new(()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub async fn execute<F, Fut, T>(&self, op: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _turn = self.queue.lock().await;
        tracing::trace!("Entered critical section {}", self.name);
        op().await
    }
}
