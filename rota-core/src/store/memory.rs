//! Process-local stores. State is lost on restart; used when no database is
//! configured and throughout the tests.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use rota_model::RequesterId;

use super::{BanStore, BlobStore, CounterStore, PermanentBan};
use crate::error::Result;
use crate::logical_day::LogicalDay;

#[derive(Debug, Default)]
pub struct InMemoryBlobStore {
    blobs: DashMap<String, Vec<u8>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn load_blob(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.blobs.get(key).map(|entry| entry.value().clone()))
    }

    async fn save_blob(&self, key: &str, bytes: &[u8]) -> Result<()> {
        self.blobs.insert(key.to_string(), bytes.to_vec());
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryCounterStore {
    counters: DashMap<(LogicalDay, String), u32>,
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn increment(&self, key: &str, day: LogicalDay) -> Result<u32> {
        let mut count = self.counters.entry((day, key.to_string())).or_insert(0);
        *count = count.saturating_add(1);
        Ok(*count)
    }

    async fn get(&self, key: &str, day: LogicalDay) -> Result<u32> {
        Ok(self
            .counters
            .get(&(day, key.to_string()))
            .map(|count| *count)
            .unwrap_or(0))
    }

    async fn get_many(
        &self,
        keys: &[String],
        day: LogicalDay,
    ) -> Result<HashMap<String, u32>> {
        Ok(keys
            .iter()
            .filter_map(|key| {
                self.counters
                    .get(&(day, key.clone()))
                    .map(|count| (key.clone(), *count))
            })
            .collect())
    }

    async fn purge_before(&self, day: LogicalDay) -> Result<u64> {
        let before = self.counters.len();
        self.counters.retain(|(counter_day, _), _| *counter_day >= day);
        Ok((before - self.counters.len()) as u64)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryBanStore {
    bans: DashMap<RequesterId, DateTime<Utc>>,
}

impl InMemoryBanStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BanStore for InMemoryBanStore {
    async fn add(&self, requester: RequesterId, at: DateTime<Utc>) -> Result<bool> {
        if self.bans.contains_key(&requester) {
            return Ok(false);
        }
        self.bans.insert(requester, at);
        Ok(true)
    }

    async fn remove(&self, requester: RequesterId) -> Result<bool> {
        Ok(self.bans.remove(&requester).is_some())
    }

    async fn contains(&self, requester: RequesterId) -> Result<bool> {
        Ok(self.bans.contains_key(&requester))
    }

    async fn list(&self) -> Result<Vec<PermanentBan>> {
        let mut bans: Vec<PermanentBan> = self
            .bans
            .iter()
            .map(|entry| PermanentBan {
                requester: *entry.key(),
                banned_at: *entry.value(),
            })
            .collect();
        bans.sort_by_key(|ban| ban.requester);
        Ok(bans)
    }
}
