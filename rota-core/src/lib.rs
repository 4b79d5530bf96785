//! Allocation engine for owner-contributed aliases and numbers.
//!
//! Owners contribute inventory to two pools that are served round-robin.
//! Three overlays shape the rotation: priority preemption for selected
//! owners, daily quotas on numbers, and a ban ladder for requesters who
//! leave number obligations unmet. The directory can be edited while
//! allocations are running; rebuilds keep the rotation where it was.
#![allow(missing_docs)]

/// Time source used for grace periods, bans, and logical days
pub mod clock;

/// Engine configuration with serde defaults
pub mod config;

/// Owners, entries, and directory edits
pub mod directory;

/// The lock-guarded engine and its public operations
pub mod engine;

/// Error types
pub mod error;

/// Pending obligations and the ban ladder
pub mod escalation;

/// Directory change feeds and the reload watcher
pub mod feed;

/// Business-day attribution for daily counters
pub mod logical_day;

/// Outbound notification port
pub mod notify;

pub mod pool;
pub mod priority;
pub mod quota;
pub mod rebuild;
pub mod rotation;
pub mod state;

/// Persistence ports and backends
pub mod store;

#[cfg(feature = "database")]
pub use store::MIGRATOR;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::EngineConfig;
pub use directory::{Directory, DirectoryEdit};
pub use engine::{
    AllocationEngine, AllocationOutcome, AllocationRequest, EngineStatus,
    EngineStores, IssuedAllocation, OwnerLookup, RefusalReason,
};
pub use error::{EngineError, Result};
pub use logical_day::LogicalDay;
pub use notify::{Notification, NotificationKind, Notifier};
pub use quota::RequesterActivity;
