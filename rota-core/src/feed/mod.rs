//! Directory change feeds.
//!
//! Other processes may rewrite the stored directory. A feed turns those
//! writes into signals; the watcher funnels every signal into
//! [`AllocationEngine::reload_directory`], which takes the engine lock like
//! any other writer.

use std::fmt::Debug;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::engine::AllocationEngine;
use crate::error::Result;

pub mod polling;
#[cfg(feature = "database")]
pub mod postgres;

pub use polling::PollingDirectoryFeed;
#[cfg(feature = "database")]
pub use postgres::PostgresDirectoryFeed;

/// A hint that the stored directory may have changed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirectoryChange {
    /// Revision observed by the feed, when it knows one.
    pub revision: Option<u64>,
}

pub type DirectoryChangeStream = Pin<Box<dyn Stream<Item = DirectoryChange> + Send>>;

#[async_trait]
pub trait DirectoryChangeFeed: Send + Sync + Debug {
    async fn subscribe(&self) -> Result<DirectoryChangeStream>;
}

/// Reload the engine's directory on every signal from `feed` until the
/// stream ends.
pub fn spawn_directory_watcher(
    engine: AllocationEngine,
    feed: Arc<dyn DirectoryChangeFeed>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut stream = match feed.subscribe().await {
            Ok(stream) => stream,
            Err(err) => {
                error!(error = %err, "failed to subscribe to directory changes");
                return;
            }
        };
        info!("directory watcher started");

        while let Some(change) = stream.next().await {
            match engine.reload_directory().await {
                Ok(true) => debug!(revision = ?change.revision, "directory change applied"),
                Ok(false) => debug!(revision = ?change.revision, "directory unchanged"),
                Err(err) => error!(error = %err, "directory reload failed"),
            }
        }
        info!("directory change stream closed; watcher stopping");
    })
}
