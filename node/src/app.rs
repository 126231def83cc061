// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
#[cfg(unix)]
use tokio::signal::unix::{signal, Signal, SignalKind};
use tokio::sync::watch;

use crate::automation::LifecycleObserver;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppStatus {
    Starting,
    Ready,
    Stopping,
}

#[derive(Debug, Clone, Copy)]
struct Flags {
    status: AppStatus,
    automation_on: bool,
    api_running: bool,
}

impl Flags {
    fn settle(&mut self) {
        if self.status == AppStatus::Starting && self.automation_on && self.api_running {
            self.status = AppStatus::Ready;
        }
    }
}

/// Process lifecycle: ready once repository automation and the API are both up.
pub struct Application {
    flags: watch::Sender<Flags>,
}

impl Default for Application {
    fn default() -> Self {
        Self::new()
    }
}

impl Application {
    pub fn new() -> Self {
        let (flags, _) = watch::channel(Flags {
            status: AppStatus::Starting,
            automation_on: false,
            api_running: false,
        });
        Self { flags }
    }

    pub fn status(&self) -> AppStatus {
        self.flags.borrow().status
    }

    /// Whether requests may be served.
    pub fn can_process(&self) -> bool {
        self.status() == AppStatus::Ready
    }

    pub fn is_automation_on(&self) -> bool {
        self.flags.borrow().automation_on
    }

    pub fn api_started(&self) {
        self.flags.send_modify(|f| {
            f.api_running = true;
            f.settle();
        });
    }

    pub fn begin_shutdown(&self) {
        self.flags.send_modify(|f| {
            f.status = AppStatus::Stopping;
            f.api_running = false;
        });
        tracing::info!("Application stopping");
    }
}

impl LifecycleObserver for Application {
    fn automation_on(&self) {
        self.flags.send_modify(|f| {
            f.automation_on = true;
            f.settle();
        });
        if self.can_process() {
            tracing::info!("Application ready");
        }
    }

    fn automation_off(&self) {
        self.flags.send_modify(|f| f.automation_on = false);
        tracing::info!("Repository automation off");
    }
}

/// Shutdown request from the process supervisor: SIGINT (Ctrl+C) or SIGTERM.
pub struct ShutdownSignal {
    #[cfg(unix)]
    interrupt: Signal,
    #[cfg(unix)]
    terminate: Signal,
}

impl ShutdownSignal {
    /// Installs the handlers. Signals arriving after this call are not lost.
    #[cfg(unix)]
    pub fn install() -> std::io::Result<Self> {
        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    #[cfg(not(unix))]
    pub fn install() -> std::io::Result<Self> {
        Ok(Self {})
    }

    #[cfg(unix)]
    pub async fn recv(mut self) {
        tokio::select! {
            _ = self.interrupt.recv() => tracing::info!("SIGINT received, shutting down"),
            _ = self.terminate.recv() => tracing::info!("SIGTERM received, shutting down"),
        }
    }

    #[cfg(not(unix))]
    pub async fn recv(self) {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Ctrl+C received, shutting down"),
            Err(e) => {
                tracing::error!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
        }
    }
}
