// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Automation lifecycle: the publish and discover timers of a [`ContentRepo`].
//!
//! `Off -> Starting -> Running -> Draining -> Off`. Turning off disarms both timers first, waits
//! for whatever cycle is running, then runs a final publish and a final discover before reporting
//! completion.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::RepoConfig;
use crate::repo::ContentRepo;
use crate::telemetry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutomationState {
    Off,
    Starting,
    Running,
    Draining,
}

/// Process-level owner told when automation comes up and when it has fully drained.
pub trait LifecycleObserver: Send + Sync {
    fn automation_on(&self);
    fn automation_off(&self);
}

#[derive(Debug, Clone, Copy)]
pub struct AutomationTimers {
    pub publish_interval: Duration,
    pub discover_interval: Duration,
    pub discover_start_delay: Duration,
}

impl AutomationTimers {
    pub fn from_config(cfg: &RepoConfig) -> Self {
        Self {
            publish_interval: cfg.publish_interval(),
            discover_interval: cfg.discover_interval(),
            discover_start_delay: cfg.discover_start_delay(),
        }
    }
}

struct Armed {
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

pub struct AutomationController {
    repo: Arc<ContentRepo>,
    timers: AutomationTimers,
    observer: Option<Arc<dyn LifecycleObserver>>,
    state: watch::Sender<AutomationState>,
    armed: Mutex<Option<Armed>>,
}

async fn run_publish(repo: &ContentRepo) {
    if let Err(e) = repo.publish_cycle().await {
        tracing::error!("Publish cycle failed: {}", e);
        metrics::counter!(telemetry::CYCLES_FAILED, 1, "cycle" => "publish");
    }
}

async fn run_discover(repo: &ContentRepo) {
    match repo.discover_cycle().await {
        Ok(report) if !report.failed.is_empty() => {
            tracing::error!("Discover cycle left {} trees unharvested", report.failed.len());
            metrics::counter!(telemetry::CYCLES_FAILED, 1, "cycle" => "discover");
        }
        Ok(_) => {}
        Err(e) => {
            tracing::error!("Discover cycle failed: {}", e);
            metrics::counter!(telemetry::CYCLES_FAILED, 1, "cycle" => "discover");
        }
    }
}

impl AutomationController {
    pub fn new(repo: Arc<ContentRepo>, timers: AutomationTimers, observer: Option<Arc<dyn LifecycleObserver>>) -> Self {
        let (state, _) = watch::channel(AutomationState::Off);
        Self {
            repo,
            timers,
            observer,
            state,
            armed: Mutex::new(None),
        }
    }

    pub fn state(&self) -> AutomationState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<AutomationState> {
        self.state.subscribe()
    }

    fn transition(&self, from: AutomationState, to: AutomationState) -> bool {
        let moved = self.state.send_if_modified(|s| {
            if *s == from {
                *s = to;
                true
            } else {
                false
            }
        });
        if moved {
            tracing::info!("Automation {:?} -> {:?}", from, to);
        }
        moved
    }

    /// Runs a publish and a discover cycle straight away and arms both timers.
    pub async fn turn_on(&self) {
        let mut armed = self.armed.lock().await;
        if !self.transition(AutomationState::Off, AutomationState::Starting) {
            tracing::warn!("Automation already {:?}", self.state());
            return;
        }

        let cancel = CancellationToken::new();
        let publish = {
            let repo = self.repo.clone();
            let cancel = cancel.clone();
            let period = self.timers.publish_interval;
            tokio::spawn(async move {
                run_publish(&repo).await;
                let mut ticker = interval_at(Instant::now() + period, period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        _ = ticker.tick() => run_publish(&repo).await,
                    }
                }
            })
        };
        let discover = {
            let repo = self.repo.clone();
            let cancel = cancel.clone();
            let delay = self.timers.discover_start_delay;
            let period = self.timers.discover_interval;
            tokio::spawn(async move {
                run_discover(&repo).await;
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = sleep(delay) => {}
                }
                let mut ticker = interval_at(Instant::now(), period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        _ = ticker.tick() => run_discover(&repo).await,
                    }
                }
            })
        };

        *armed = Some(Armed {
            cancel,
            tasks: vec![publish, discover],
        });
        self.transition(AutomationState::Starting, AutomationState::Running);

        if let Some(observer) = &self.observer {
            observer.automation_on();
        }
    }

    /// Disarms the timers, drains running work and flushes the last root change.
    pub async fn turn_off(&self) {
        let mut armed = self.armed.lock().await;
        if !self.transition(AutomationState::Running, AutomationState::Draining) {
            tracing::warn!("Automation not running ({:?})", self.state());
            return;
        }

        if let Some(Armed { cancel, tasks }) = armed.take() {
            cancel.cancel();
            for task in tasks {
                if let Err(e) = task.await {
                    tracing::error!("Automation timer task ended abnormally: {}", e);
                }
            }
        }
        self.repo.wait_idle().await;

        run_publish(&self.repo).await;
        run_discover(&self.repo).await;

        self.transition(AutomationState::Draining, AutomationState::Off);
        if let Some(observer) = &self.observer {
            observer.automation_off();
        }
    }
}
