// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use ocstore_kernel::NodeIndex;
use ocstore_node::app::{Application, ShutdownSignal};
use ocstore_node::automation::{AutomationController, AutomationTimers, LifecycleObserver};
use ocstore_node::config::NodeConfig;
use ocstore_node::content::IpfsHttpClient;
use ocstore_node::directory::discovery::source_from_config;
use ocstore_node::directory::{DirectoryClient, HttpTransportFactory};
use ocstore_node::notify::BroadcastNotifier;
use ocstore_node::repo::ContentRepo;
use ocstore_node::server::{build_router, AppState};
use ocstore_persistence::Database;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    ocstore_node::telemetry::init_telemetry();

    let cfg = NodeConfig::load()?;
    tracing::info!("Initializing ocstore node with config: {:?}", cfg);

    let db = Arc::new(match &cfg.data_dir {
        Some(dir) => Database::open(dir).with_context(|| format!("opening database in {:?}", dir))?,
        None => {
            tracing::warn!("No data dir configured; persistence is in memory only");
            Database::in_memory()
        }
    });

    let store = Arc::new(IpfsHttpClient::new(
        &cfg.content_store.api_url,
        Duration::from_millis(cfg.content_store.request_timeout_ms),
    )?);
    let factory = Arc::new(HttpTransportFactory::new(
        Duration::from_millis(cfg.directory.connect_timeout_ms),
        Duration::from_millis(cfg.directory.request_timeout_ms),
    )?);
    let directory = Arc::new(DirectoryClient::new(
        NodeIndex(cfg.node_index),
        source_from_config(&cfg.directory)?,
        factory,
    ));
    let notifier = Arc::new(BroadcastNotifier::new(64));

    let repo = ContentRepo::new(
        NodeIndex(cfg.node_index),
        &cfg.repo,
        store,
        directory,
        db.clone(),
        notifier,
    )
    .await?;

    let app = Arc::new(Application::new());
    let observer: Arc<dyn LifecycleObserver> = app.clone();
    let automation = AutomationController::new(repo.clone(), AutomationTimers::from_config(&cfg.repo), Some(observer));
    automation.turn_on().await;

    let router = build_router(
        AppState {
            repo: repo.clone(),
            app: app.clone(),
            max_list_items: cfg.max_list_items,
        },
        cfg.auth_token.clone(),
    );

    let listener = TcpListener::bind(cfg.bind_addr)
        .await
        .with_context(|| format!("binding {}", cfg.bind_addr))?;
    tracing::info!("Listening on {}", cfg.bind_addr);
    app.api_started();

    let shutdown = ShutdownSignal::install().context("installing signal handlers")?;
    let grace = Duration::from_millis(cfg.shutdown_grace_ms);
    let stopping = app.clone();
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            shutdown.recv().await;
            stopping.begin_shutdown();
            tokio::time::sleep(grace).await;
        })
        .await?;

    automation.turn_off().await;
    if let Err(e) = db.compact() {
        tracing::error!("Final compaction failed: {}", e);
    }
    tracing::info!("Shutdown complete");
    Ok(())
}
