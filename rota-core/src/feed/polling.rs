use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{trace, warn};

use super::{DirectoryChange, DirectoryChangeFeed, DirectoryChangeStream};
use crate::directory::Directory;
use crate::error::Result;
use crate::store::{BlobStore, DIRECTORY_KEY};

const DEFAULT_CHANNEL_CAPACITY: usize = 16;

/// Periodically reloads the directory blob and signals when its revision
/// moves. Works against any [`BlobStore`].
#[derive(Debug, Clone)]
pub struct PollingDirectoryFeed {
    blobs: Arc<dyn BlobStore>,
    interval: Duration,
}

impl PollingDirectoryFeed {
    pub fn new(blobs: Arc<dyn BlobStore>, interval: Duration) -> Self {
        Self { blobs, interval }
    }
}

async fn stored_revision(blobs: &dyn BlobStore) -> Result<Option<u64>> {
    let Some(bytes) = blobs.load_blob(DIRECTORY_KEY).await? else {
        return Ok(None);
    };
    Ok(Some(Directory::decode(&bytes)?.revision))
}

#[async_trait]
impl DirectoryChangeFeed for PollingDirectoryFeed {
    async fn subscribe(&self) -> Result<DirectoryChangeStream> {
        let initial = stored_revision(self.blobs.as_ref()).await?;
        let (tx, rx) = mpsc::channel(DEFAULT_CHANNEL_CAPACITY);
        let blobs = self.blobs.clone();
        let interval = self.interval;

        tokio::spawn(async move {
            let mut last_seen = initial;
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // First tick completes immediately; the initial read already ran.
            ticker.tick().await;

            loop {
                ticker.tick().await;
                if tx.is_closed() {
                    trace!("directory poll stream dropped; stopping");
                    break;
                }

                match stored_revision(blobs.as_ref()).await {
                    Ok(revision) if revision != last_seen => {
                        last_seen = revision;
                        if tx.send(DirectoryChange { revision }).await.is_err() {
                            return;
                        }
                    }
                    Ok(_) => {}
                    Err(err) => {
                        warn!(error = %err, "directory poll failed");
                    }
                }
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryBlobStore;
    use futures::StreamExt;
    use rota_model::OwnerGroup;

    #[tokio::test(start_paused = true)]
    async fn emits_when_the_revision_moves() {
        let blobs: Arc<dyn BlobStore> = Arc::new(InMemoryBlobStore::new());
        let mut directory = Directory::new(vec![OwnerGroup::new("a")]);
        blobs
            .save_blob(DIRECTORY_KEY, &directory.encode().unwrap())
            .await
            .unwrap();

        let feed = PollingDirectoryFeed::new(blobs.clone(), Duration::from_secs(5));
        let mut stream = feed.subscribe().await.unwrap();

        directory.revision = 3;
        blobs
            .save_blob(DIRECTORY_KEY, &directory.encode().unwrap())
            .await
            .unwrap();

        let change = stream.next().await.unwrap();
        assert_eq!(change.revision, Some(3));
    }
}
