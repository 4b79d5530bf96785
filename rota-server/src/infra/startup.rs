use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::PgPool;
use tracing::{info, warn};

use rota_core::{
    AllocationEngine, EngineStores, Notifier, SystemClock,
    feed::{
        DirectoryChangeFeed, PollingDirectoryFeed, PostgresDirectoryFeed,
        spawn_directory_watcher,
    },
    store::PostgresStores,
};

use crate::infra::{
    app_state::AppState,
    config::{Config, DirectoryFeedMode},
    jobs::{JobHandles, spawn_jobs},
};
use crate::transport::{LogNotifier, WebhookNotifier};

/// Everything `main` needs to serve and to run background work.
#[derive(Debug)]
pub struct Runtime {
    pub state: AppState,
    pub pool: Option<PgPool>,
}

/// Wire stores, transport and engine from a loaded configuration.
pub async fn build_runtime(config: Config) -> Result<Runtime> {
    let (stores, pool) = match config.database.url.as_deref() {
        Some(url) => {
            let postgres = PostgresStores::connect(url)
                .await
                .context("failed to connect to the database")?;
            let pool = postgres.pool().clone();
            info!("using PostgreSQL stores");
            (EngineStores::postgres(postgres), Some(pool))
        }
        None => {
            warn!("using in-memory stores; state will not survive a restart");
            (EngineStores::in_memory(), None)
        }
    };

    let notifier: Arc<dyn Notifier> = match config.transport.webhook_url.as_deref() {
        Some(url) => {
            info!(url = %url, "delivering notifications via webhook");
            Arc::new(
                WebhookNotifier::new(url, config.transport.timeout)
                    .context("failed to build webhook client")?,
            )
        }
        None => Arc::new(LogNotifier),
    };

    let engine = AllocationEngine::load(
        stores,
        notifier.clone(),
        Arc::new(SystemClock),
        config.engine.clone(),
    )
    .await
    .context("failed to load engine state")?;

    Ok(Runtime {
        state: AppState::new(engine, notifier, config),
        pool,
    })
}

/// Start the periodic triggers and, when configured, the directory
/// watcher.
pub fn spawn_background(runtime: &Runtime) -> JobHandles {
    let engine = runtime.state.engine();
    let config = runtime.state.config();
    let mut jobs = spawn_jobs(engine, &config.jobs);

    let feed: Option<Arc<dyn DirectoryChangeFeed>> = match config.directory_feed.mode {
        DirectoryFeedMode::Listen => match &runtime.pool {
            Some(pool) => Some(Arc::new(PostgresDirectoryFeed::new(pool.clone()))),
            None => {
                warn!("directory feed `listen` requires a database; not watching");
                None
            }
        },
        DirectoryFeedMode::Poll => Some(Arc::new(PollingDirectoryFeed::new(
            engine.stores().blobs.clone(),
            config.directory_feed.poll_interval,
        ))),
        DirectoryFeedMode::Off => None,
    };

    if let Some(feed) = feed {
        jobs.handles.push(spawn_directory_watcher(engine.clone(), feed));
    }

    jobs
}
