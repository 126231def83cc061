// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Run-state flags for periodic and on-demand jobs.

use tokio::sync::watch;

/// Marks a job as running. Entering while it runs is refused rather than queued.
pub struct InFlight {
    busy: watch::Sender<bool>,
}

pub struct InFlightGuard<'a> {
    busy: &'a watch::Sender<bool>,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.busy.send_replace(false);
    }
}

impl Default for InFlight {
    fn default() -> Self {
        Self::new()
    }
}

impl InFlight {
    pub fn new() -> Self {
        let (busy, _) = watch::channel(false);
        Self { busy }
    }

    pub fn try_enter(&self) -> Option<InFlightGuard<'_>> {
        let entered = self.busy.send_if_modified(|busy| {
            if *busy {
                false
            } else {
                *busy = true;
                true
            }
        });
        entered.then_some(InFlightGuard { busy: &self.busy })
    }

    pub fn is_busy(&self) -> bool {
        *self.busy.borrow()
    }

    pub async fn wait_idle(&self) {
        let mut rx = self.busy.subscribe();
        // The sender lives in self, so the channel cannot close while we wait.
        let _ = rx.wait_for(|busy| !*busy).await;
    }
}

#[derive(Clone, Copy, Default, Debug)]
struct RunState {
    running: bool,
    pending: bool,
}

/// Coalesces requests for a job: a request arriving while the job runs sets a single pending
/// flag, and the running job goes around once more instead of queueing.
pub struct Coalescer {
    state: watch::Sender<RunState>,
}

impl Default for Coalescer {
    fn default() -> Self {
        Self::new()
    }
}

impl Coalescer {
    pub fn new() -> Self {
        let (state, _) = watch::channel(RunState::default());
        Self { state }
    }

    /// Returns true when the caller must start the job.
    pub fn request(&self) -> bool {
        let mut start = false;
        self.state.send_modify(|s| {
            if s.running {
                s.pending = true;
            } else {
                s.running = true;
                start = true;
            }
        });
        start
    }

    /// Called by the job after each round; returns true when another round was requested.
    pub fn finish_round(&self) -> bool {
        let mut again = false;
        self.state.send_modify(|s| {
            if s.pending {
                s.pending = false;
                again = true;
            } else {
                s.running = false;
            }
        });
        again
    }

    pub fn is_running(&self) -> bool {
        self.state.borrow().running
    }

    pub async fn wait_idle(&self) {
        let mut rx = self.state.subscribe();
        let _ = rx.wait_for(|s| !s.running).await;
    }
}
