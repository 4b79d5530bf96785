use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::postgres::PgListener;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, trace};

use super::{DirectoryChange, DirectoryChangeFeed, DirectoryChangeStream};
use crate::error::{EngineError, Result};

/// Channel raised by the `rota_blobs` trigger whenever the directory blob
/// is written.
pub const DIRECTORY_CHANNEL: &str = "rota_directory_changed";

const DEFAULT_CHANNEL_CAPACITY: usize = 16;
const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Push feed over PostgreSQL `LISTEN`.
#[derive(Clone)]
pub struct PostgresDirectoryFeed {
    pool: PgPool,
    retry_delay: Duration,
}

impl fmt::Debug for PostgresDirectoryFeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresDirectoryFeed")
            .field("pool_size", &self.pool.size())
            .field("channel", &DIRECTORY_CHANNEL)
            .field("retry_delay", &self.retry_delay)
            .finish()
    }
}

impl PostgresDirectoryFeed {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

#[async_trait]
impl DirectoryChangeFeed for PostgresDirectoryFeed {
    async fn subscribe(&self) -> Result<DirectoryChangeStream> {
        let mut listener = PgListener::connect_with(&self.pool).await.map_err(|err| {
            EngineError::Persistence(format!("failed to open directory listener: {err}"))
        })?;
        listener.listen(DIRECTORY_CHANNEL).await.map_err(|err| {
            EngineError::Persistence(format!("failed to LISTEN {DIRECTORY_CHANNEL}: {err}"))
        })?;
        debug!(channel = DIRECTORY_CHANNEL, "listening for directory changes");

        let (tx, rx) = mpsc::channel(DEFAULT_CHANNEL_CAPACITY);
        let retry_delay = self.retry_delay;

        tokio::spawn(async move {
            loop {
                if tx.is_closed() {
                    trace!("directory change stream dropped; stopping listener");
                    break;
                }

                // PgListener reconnects on the next recv after a dropped
                // connection; notifications sent while down are lost.
                match listener.recv().await {
                    Ok(notification) => {
                        trace!(payload = notification.payload(), "directory notification");
                        if tx.send(DirectoryChange { revision: None }).await.is_err() {
                            return;
                        }
                    }
                    Err(err) => {
                        error!(error = %err, "directory listener failed");
                        sleep(retry_delay).await;
                    }
                }
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}
