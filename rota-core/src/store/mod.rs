//! Persistence ports.
//!
//! The engine persists two blobs (directory and engine state), a set of
//! per-logical-day counters, and the permanent ban set. Each concern is a
//! small trait so the in-memory and PostgreSQL backends can be swapped
//! without touching engine code.

use std::collections::HashMap;
use std::fmt::Debug;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use rota_model::RequesterId;

use crate::error::Result;
use crate::logical_day::LogicalDay;

pub mod memory;
#[cfg(feature = "database")]
pub mod postgres;

pub use memory::{InMemoryBanStore, InMemoryBlobStore, InMemoryCounterStore};
#[cfg(feature = "database")]
pub use postgres::{MIGRATOR, PostgresStores};

/// Blob key of the directory aggregate.
pub const DIRECTORY_KEY: &str = "directory";
/// Blob key of the engine-state aggregate.
pub const ENGINE_STATE_KEY: &str = "engine_state";

/// Durable key/value storage for whole aggregates.
#[async_trait]
pub trait BlobStore: Send + Sync + Debug {
    async fn load_blob(&self, key: &str) -> Result<Option<Vec<u8>>>;

    async fn save_blob(&self, key: &str, bytes: &[u8]) -> Result<()>;
}

/// Counters scoped to a logical day.
#[async_trait]
pub trait CounterStore: Send + Sync + Debug {
    /// Atomically increment-or-insert, returning the new count.
    async fn increment(&self, key: &str, day: LogicalDay) -> Result<u32>;

    async fn get(&self, key: &str, day: LogicalDay) -> Result<u32>;

    /// Counts for several keys in one round trip. Missing keys are absent
    /// from the returned map.
    async fn get_many(
        &self,
        keys: &[String],
        day: LogicalDay,
    ) -> Result<HashMap<String, u32>>;

    /// Drop every counter belonging to a day before `day`.
    async fn purge_before(&self, day: LogicalDay) -> Result<u64>;
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PermanentBan {
    pub requester: RequesterId,
    pub banned_at: DateTime<Utc>,
}

/// Durable set of permanently banned requesters.
#[async_trait]
pub trait BanStore: Send + Sync + Debug {
    /// Returns `false` when the requester was already banned.
    async fn add(&self, requester: RequesterId, at: DateTime<Utc>) -> Result<bool>;

    /// Returns `false` when the requester was not banned.
    async fn remove(&self, requester: RequesterId) -> Result<bool>;

    async fn contains(&self, requester: RequesterId) -> Result<bool>;

    async fn list(&self) -> Result<Vec<PermanentBan>>;
}
