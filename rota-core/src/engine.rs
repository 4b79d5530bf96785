//! The allocation engine: one lock around the directory, the pools and the
//! engine state.
//!
//! Every public operation takes the lock for its whole critical section,
//! persists what it changed while still holding it, and only delivers
//! notifications after releasing it. Persistence failures are logged and
//! the in-memory state stays authoritative.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use rota_model::{
    DeliveryContext, IssuedItemId, RequesterId, ResourceKind, normalize_number,
};

use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::directory::{Directory, DirectoryEdit};
use crate::error::{EngineError, Result};
use crate::escalation::{ClearedObligation, IssuedItem};
use crate::logical_day::LogicalDay;
use crate::notify::{Notification, NotificationKind, Notifier, dispatch};
use crate::pool::{Pools, build_pools};
use crate::priority::{PriorityConsumption, PriorityEntry};
use crate::quota::{QuotaGuard, RequesterActivity, RequesterAllowance};
use crate::rebuild::{RebuildReport, rebuild_preserving_rotation};
use crate::rotation::select_next;
use crate::state::EngineState;
use crate::store::{
    BanStore, BlobStore, CounterStore, DIRECTORY_KEY, ENGINE_STATE_KEY,
    InMemoryBanStore, InMemoryBlobStore, InMemoryCounterStore, PermanentBan,
};

/// The persistence ports an engine runs against.
#[derive(Clone, Debug)]
pub struct EngineStores {
    pub blobs: Arc<dyn BlobStore>,
    pub counters: Arc<dyn CounterStore>,
    pub bans: Arc<dyn BanStore>,
}

impl EngineStores {
    pub fn in_memory() -> Self {
        Self {
            blobs: Arc::new(InMemoryBlobStore::new()),
            counters: Arc::new(InMemoryCounterStore::new()),
            bans: Arc::new(InMemoryBanStore::new()),
        }
    }

    #[cfg(feature = "database")]
    pub fn postgres(stores: crate::store::PostgresStores) -> Self {
        let shared = Arc::new(stores);
        Self {
            blobs: shared.clone(),
            counters: shared.clone(),
            bans: shared,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AllocationRequest {
    pub requester: RequesterId,
    pub kind: ResourceKind,
    pub context: DeliveryContext,
}

impl AllocationRequest {
    pub fn new(requester: RequesterId, kind: ResourceKind, context: DeliveryContext) -> Self {
        Self {
            requester,
            kind,
            context,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct IssuedAllocation {
    pub id: IssuedItemId,
    pub kind: ResourceKind,
    pub value: String,
    pub owner: String,
    /// Where the owner wants to hear about issuances, if anywhere.
    pub forward_target: Option<i64>,
    pub issued_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RefusalReason {
    PermanentlyBanned,
    TemporarilyBanned { until: DateTime<Utc> },
    DailyAllotmentReached { used: u32, limit: u32 },
    WindowLimitReached { used: u32, limit: u32 },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AllocationOutcome {
    Issued(IssuedAllocation),
    /// Nothing eligible after a full scan.
    PoolExhausted,
    Refused(RefusalReason),
}

impl AllocationOutcome {
    pub fn issued(&self) -> Option<&IssuedAllocation> {
        match self {
            AllocationOutcome::Issued(issued) => Some(issued),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub reminded: usize,
    pub escalated: usize,
    pub permanently_banned: Vec<RequesterId>,
    pub notifications_delivered: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DailyResetReport {
    pub logical_day: Option<LogicalDay>,
    pub offenses_cleared: usize,
    pub counters_purged: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PoolStatus {
    pub kind: ResourceKind,
    pub owners: Vec<String>,
    pub values: usize,
    pub owner_cursor: usize,
    pub due_owner: Option<String>,
    pub rounds: u64,
    pub pending: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EngineStatus {
    pub logical_day: LogicalDay,
    pub directory_revision: u64,
    pub pools: Vec<PoolStatus>,
    pub priority: Vec<PriorityEntry>,
    pub active_temp_bans: usize,
    pub window_epoch: u64,
}

/// The owner a value belongs to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OwnerLookup {
    pub owner: String,
    pub kind: ResourceKind,
    /// The value as stored in the directory.
    pub value: String,
    pub owner_disabled: bool,
    pub entry_disabled: bool,
}

struct EngineInner {
    directory: Directory,
    pools: Pools,
    state: EngineState,
}

impl EngineInner {
    fn rebuild(&mut self) -> RebuildReport {
        let (pools, report) = rebuild_preserving_rotation(
            &self.directory,
            &self.pools,
            &mut self.state.alias_rotation,
            &mut self.state.number_rotation,
        );
        self.pools = pools;

        let directory = &self.directory;
        let purged = self
            .state
            .priority
            .retain_owners(|owner| directory.owner(owner).is_some());
        if purged > 0 {
            debug!(purged, "priority entries dropped for removed owners");
        }
        report
    }
}

#[derive(Clone)]
pub struct AllocationEngine {
    inner: Arc<Mutex<EngineInner>>,
    stores: EngineStores,
    quota: QuotaGuard,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    config: Arc<EngineConfig>,
}

impl fmt::Debug for AllocationEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("AllocationEngine");
        debug.field("notifier", &self.notifier).field("clock", &self.clock);

        match self.inner.try_lock() {
            Ok(inner) => {
                debug
                    .field("directory_revision", &inner.directory.revision)
                    .field("owner_count", &inner.directory.owners.len())
                    .field("alias_owners", &inner.pools.alias.len())
                    .field("number_owners", &inner.pools.number.len());
            }
            Err(_) => {
                debug.field("state", &"<locked>");
            }
        }

        debug.finish()
    }
}

impl AllocationEngine {
    /// Load both aggregates (initializing absent ones), build the pools and
    /// heal cursors against them.
    pub async fn load(
        stores: EngineStores,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Result<Self> {
        let directory = match stores.blobs.load_blob(DIRECTORY_KEY).await? {
            Some(bytes) => Directory::decode(&bytes)?,
            None => {
                info!("no stored directory; starting empty");
                Directory::default()
            }
        };
        let mut state = match stores.blobs.load_blob(ENGINE_STATE_KEY).await? {
            Some(bytes) => EngineState::decode(&bytes)?,
            None => EngineState::default(),
        };

        let pools = build_pools(&directory);
        state.heal(&pools);
        state
            .priority
            .retain_owners(|owner| directory.owner(owner).is_some());

        info!(
            owners = directory.owners.len(),
            alias_owners = pools.alias.len(),
            number_owners = pools.number.len(),
            revision = directory.revision,
            "allocation engine loaded"
        );

        let quota = QuotaGuard::new(stores.counters.clone(), config.quota.clone());
        Ok(Self {
            inner: Arc::new(Mutex::new(EngineInner {
                directory,
                pools,
                state,
            })),
            stores,
            quota,
            notifier,
            clock,
            config: Arc::new(config),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn stores(&self) -> &EngineStores {
        &self.stores
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn logical_day(&self) -> LogicalDay {
        LogicalDay::at(self.clock.now(), &self.config.logical_day)
    }

    /// Snapshot of the directory for read-only callers.
    pub async fn directory(&self) -> Directory {
        self.inner.lock().await.directory.clone()
    }

    pub async fn allocate(&self, request: AllocationRequest) -> AllocationOutcome {
        let AllocationRequest {
            requester,
            kind,
            context,
        } = request;

        match self.stores.bans.contains(requester).await {
            Ok(true) => {
                debug!(requester = %requester, "refused: permanently banned");
                return AllocationOutcome::Refused(RefusalReason::PermanentlyBanned);
            }
            Ok(false) => {}
            Err(err) => {
                warn!(requester = %requester, error = %err, "ban lookup failed; continuing");
            }
        }

        let mut notifications = Vec::new();
        let outcome = {
            let mut guard = self.inner.lock().await;
            let inner = &mut *guard;
            let now = self.clock.now();
            let day = LogicalDay::at(now, &self.config.logical_day);

            if let Some(ban) = inner.state.escalation.active_temp_ban(requester, now) {
                debug!(requester = %requester, until = %ban.expires_at, "refused: temporarily banned");
                return AllocationOutcome::Refused(RefusalReason::TemporarilyBanned {
                    until: ban.expires_at,
                });
            }

            let mut exhausted = HashSet::new();
            if kind == ResourceKind::Number {
                match self
                    .quota
                    .requester_allowance(requester, day, inner.state.window_epoch)
                    .await
                {
                    Ok(RequesterAllowance::Allowed) => {}
                    Ok(RequesterAllowance::DailyAllotmentReached { used, limit }) => {
                        debug!(requester = %requester, used, limit, "refused: daily allotment reached");
                        return AllocationOutcome::Refused(
                            RefusalReason::DailyAllotmentReached { used, limit },
                        );
                    }
                    Ok(RequesterAllowance::WindowLimitReached { used, limit }) => {
                        debug!(requester = %requester, used, limit, "refused: window limit reached");
                        return AllocationOutcome::Refused(
                            RefusalReason::WindowLimitReached { used, limit },
                        );
                    }
                    Err(err) => {
                        warn!(requester = %requester, error = %err, "requester quota lookup failed; allowing");
                    }
                }

                let pool = inner.pools.get(kind);
                let values = pool
                    .blocks
                    .iter()
                    .flat_map(|block| block.values.iter().map(String::as_str));
                match self.quota.exhausted_values(values, day).await {
                    Ok(values) => exhausted = values,
                    Err(err) => {
                        warn!(error = %err, "number quota prefetch failed; treating all as available");
                    }
                }
            }

            let pool = inner.pools.get(kind);
            let (rotation, priority) = inner.state.selection_parts(kind);
            let selection = select_next(pool, rotation, priority, |_, value| {
                kind == ResourceKind::Number && exhausted.contains(&normalize_number(value))
            });

            let Some(selection) = selection else {
                info!(kind = ?kind, requester = %requester, "pool exhausted");
                return AllocationOutcome::PoolExhausted;
            };

            match kind {
                ResourceKind::Number => {
                    if let Err(err) = self.quota.record_usage(&selection.value, day).await {
                        warn!(error = %err, "failed to record number usage");
                    }
                    if let Err(err) = self
                        .quota
                        .record_requester_number(requester, day, inner.state.window_epoch)
                        .await
                    {
                        warn!(requester = %requester, error = %err, "failed to record requester usage");
                    }
                }
                ResourceKind::Alias => {
                    if let Err(err) = self.quota.record_requester_alias(requester, day).await {
                        warn!(requester = %requester, error = %err, "failed to record alias activity");
                    }
                }
            }

            let forward_target = inner
                .directory
                .owner(&selection.owner)
                .and_then(|owner| owner.forward_target);
            let item = IssuedItem::new(
                requester,
                kind,
                selection.value.clone(),
                selection.owner.clone(),
                now,
                context,
            );
            let issued = IssuedAllocation {
                id: item.id,
                kind,
                value: selection.value.clone(),
                owner: selection.owner.clone(),
                forward_target,
                issued_at: now,
            };
            inner.state.escalation.record_issue(item);

            info!(
                kind = ?kind,
                requester = %requester,
                owner = %selection.owner,
                priority = ?selection.priority,
                "value issued"
            );

            if let PriorityConsumption::Exhausted { stop_after } = selection.priority {
                if let Some(target) = forward_target {
                    notifications.push(Notification::new(
                        DeliveryContext::new(target),
                        None,
                        NotificationKind::PriorityFinished,
                        format!("Priority for {} is finished.", selection.owner),
                    ));
                }
                if stop_after {
                    self.stop_owner(inner, &selection.owner).await;
                }
            }

            self.save_state(&inner.state).await;
            AllocationOutcome::Issued(issued)
        };

        dispatch(self.notifier.as_ref(), notifications).await;
        outcome
    }

    /// Disable an owner whose priority ran out with `stop_after` set.
    async fn stop_owner(&self, inner: &mut EngineInner, owner: &str) {
        let edit = DirectoryEdit::SetOwnerDisabled {
            name: owner.to_string(),
            disabled: true,
        };
        match inner.directory.apply(&edit) {
            Ok(()) => {
                inner.rebuild();
                info!(owner = %owner, "owner disabled after priority finished");
                self.save_directory(&inner.directory).await;
            }
            Err(err) => {
                warn!(owner = %owner, error = %err, "failed to disable owner after priority");
            }
        }
    }

    /// Mark a pending value as fulfilled.
    pub async fn clear_obligation(
        &self,
        requester: RequesterId,
        kind: ResourceKind,
        value: &str,
    ) -> Result<ClearedObligation> {
        let cleared = {
            let mut inner = self.inner.lock().await;
            let cleared = inner
                .state
                .escalation
                .clear(requester, kind, value)
                .ok_or_else(|| EngineError::NotFound {
                    what: "pending item",
                    name: value.to_string(),
                })?;
            self.save_state(&inner.state).await;
            cleared
        };

        info!(
            requester = %requester,
            kind = ?kind,
            lifted_ban = cleared.lifted_ban,
            "obligation cleared"
        );
        if cleared.lifted_ban {
            let notification = Notification::new(
                cleared.item.context.clone(),
                Some(requester),
                NotificationKind::BanLifted,
                format!("{} is done. Your ban is lifted.", cleared.item.value),
            );
            dispatch(self.notifier.as_ref(), vec![notification]).await;
        }
        Ok(cleared)
    }

    /// Apply a directory edit and rebuild the pools around it.
    pub async fn edit_directory(&self, edit: DirectoryEdit) -> Result<RebuildReport> {
        let mut inner = self.inner.lock().await;
        inner.directory.apply(&edit)?;
        let report = inner.rebuild();
        info!(owner = %edit.owner_name(), revision = inner.directory.revision, "directory edited");
        self.save_directory(&inner.directory).await;
        self.save_state(&inner.state).await;
        Ok(report)
    }

    /// Re-read the directory written by another process and rebuild if it
    /// is newer than the one in memory. Returns whether anything changed.
    ///
    /// The read happens under the engine lock, so a notification for an
    /// edit this engine made itself can never roll memory back.
    pub async fn reload_directory(&self) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        let Some(bytes) = self.stores.blobs.load_blob(DIRECTORY_KEY).await? else {
            return Ok(false);
        };
        let stored = Directory::decode(&bytes)?;
        if stored.revision <= inner.directory.revision {
            if stored.revision < inner.directory.revision {
                debug!(
                    stored = stored.revision,
                    current = inner.directory.revision,
                    "ignoring older stored directory"
                );
            }
            return Ok(false);
        }
        inner.directory = stored;
        let report = inner.rebuild();
        info!(
            revision = inner.directory.revision,
            alias_owners = report.alias_owners,
            number_owners = report.number_owners,
            "directory reloaded"
        );
        self.save_state(&inner.state).await;
        Ok(true)
    }

    pub async fn set_priority(&self, owner: &str, remaining: u32, stop_after: bool) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let key = inner
            .directory
            .owner(owner)
            .map(|group| group.key())
            .ok_or_else(|| EngineError::owner_not_found(owner))?;
        inner.state.priority.set(&key, remaining, stop_after)?;
        info!(owner = %key, remaining, stop_after, "priority set");
        self.save_state(&inner.state).await;
        Ok(())
    }

    pub async fn remove_priority(&self, owner: &str) -> Result<PriorityEntry> {
        let mut inner = self.inner.lock().await;
        let entry = inner
            .state
            .priority
            .remove(owner)
            .ok_or_else(|| EngineError::NotFound {
                what: "priority",
                name: owner.to_string(),
            })?;
        info!(owner = %entry.owner, "priority removed");
        self.save_state(&inner.state).await;
        Ok(entry)
    }

    /// Periodic pass: reminders, then escalation of overdue numbers.
    pub async fn sweep_overdue(&self) -> SweepReport {
        let (outcome, report) = {
            let mut inner = self.inner.lock().await;
            let now = self.clock.now();
            let outcome = inner.state.escalation.sweep(now, &self.config.escalation);

            for requester in &outcome.permanent {
                if let Err(err) = self.stores.bans.add(*requester, now).await {
                    warn!(requester = %requester, error = %err, "failed to persist permanent ban");
                }
            }
            if outcome.changed() {
                self.save_state(&inner.state).await;
            }

            let report = SweepReport {
                reminded: outcome.reminded,
                escalated: outcome.escalated,
                permanently_banned: outcome.permanent.clone(),
                notifications_delivered: 0,
            };
            (outcome, report)
        };

        let delivered = dispatch(self.notifier.as_ref(), outcome.notifications).await;
        SweepReport {
            notifications_delivered: delivered,
            ..report
        }
    }

    /// Hourly pass: forget pending items past the retention window.
    pub async fn purge_stale_pending(&self) -> usize {
        let mut inner = self.inner.lock().await;
        let now = self.clock.now();
        let purged = inner
            .state
            .escalation
            .purge_stale(now, self.config.pending.stale_after());
        if purged > 0 {
            info!(purged, "stale pending items purged");
            self.save_state(&inner.state).await;
        }
        purged
    }

    /// Once per logical day: clear offense counts and drop old counters.
    /// Temporary bans are left to expire on their own.
    pub async fn daily_reset(&self) -> DailyResetReport {
        let mut inner = self.inner.lock().await;
        let day = LogicalDay::at(self.clock.now(), &self.config.logical_day);
        let offenses_cleared = inner.state.escalation.reset_offenses();
        let counters_purged = match self.stores.counters.purge_before(day).await {
            Ok(purged) => purged,
            Err(err) => {
                warn!(error = %err, "failed to purge old counters");
                0
            }
        };
        self.save_state(&inner.state).await;
        info!(day = %day, offenses_cleared, counters_purged, "daily reset complete");

        DailyResetReport {
            logical_day: Some(day),
            offenses_cleared,
            counters_purged,
        }
    }

    /// Open a new short window for requester throttling.
    pub async fn reset_window_counters(&self) -> u64 {
        let mut inner = self.inner.lock().await;
        inner.state.window_epoch = inner.state.window_epoch.wrapping_add(1);
        let epoch = inner.state.window_epoch;
        debug!(epoch, "short window reset");
        self.save_state(&inner.state).await;
        epoch
    }

    /// Returns `false` when the requester was already banned.
    pub async fn ban_permanently(&self, requester: RequesterId) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        let added = self.stores.bans.add(requester, self.clock.now()).await?;
        if inner.state.escalation.forget_temp_ban(requester) {
            self.save_state(&inner.state).await;
        }
        info!(requester = %requester, added, "permanent ban applied");
        Ok(added)
    }

    pub async fn lift_permanent_ban(&self, requester: RequesterId) -> Result<bool> {
        let _inner = self.inner.lock().await;
        let removed = self.stores.bans.remove(requester).await?;
        info!(requester = %requester, removed, "permanent ban lifted");
        Ok(removed)
    }

    pub async fn is_permanently_banned(&self, requester: RequesterId) -> Result<bool> {
        self.stores.bans.contains(requester).await
    }

    /// Who contributed `value`. Aliases are checked before numbers; disabled
    /// owners and entries are still found.
    pub async fn lookup_owner(&self, value: &str) -> Option<OwnerLookup> {
        let inner = self.inner.lock().await;
        [ResourceKind::Alias, ResourceKind::Number]
            .into_iter()
            .find_map(|kind| {
                let owner = inner.directory.owner_of(kind, value)?;
                let entry = owner.find_entry(kind, value)?;
                Some(OwnerLookup {
                    owner: owner.key(),
                    kind,
                    value: entry.value.clone(),
                    owner_disabled: owner.disabled,
                    entry_disabled: entry.disabled,
                })
            })
    }

    /// Today's alias and number counts for `requester`.
    pub async fn requester_activity(&self, requester: RequesterId) -> Result<RequesterActivity> {
        let window_epoch = self.inner.lock().await.state.window_epoch;
        self.quota
            .requester_activity(requester, self.logical_day(), window_epoch)
            .await
    }

    pub async fn permanent_bans(&self) -> Result<Vec<PermanentBan>> {
        self.stores.bans.list().await
    }

    pub async fn status(&self) -> EngineStatus {
        let inner = self.inner.lock().await;
        let now = self.clock.now();

        let pools = [ResourceKind::Alias, ResourceKind::Number]
            .into_iter()
            .map(|kind| {
                let pool = inner.pools.get(kind);
                let rotation = inner.state.rotation(kind);
                PoolStatus {
                    kind,
                    owners: pool.owner_order(),
                    values: pool.value_count(),
                    owner_cursor: rotation.owner_cursor,
                    due_owner: rotation.current_owner(pool).map(str::to_string),
                    rounds: rotation.rounds,
                    pending: inner.state.escalation.pending_count(kind),
                }
            })
            .collect();

        EngineStatus {
            logical_day: LogicalDay::at(now, &self.config.logical_day),
            directory_revision: inner.directory.revision,
            pools,
            priority: inner.state.priority.entries().cloned().collect(),
            active_temp_bans: inner.state.escalation.active_temp_ban_count(now),
            window_epoch: inner.state.window_epoch,
        }
    }

    async fn save_state(&self, state: &EngineState) {
        let result = match state.encode() {
            Ok(bytes) => self.stores.blobs.save_blob(ENGINE_STATE_KEY, &bytes).await,
            Err(err) => Err(err),
        };
        if let Err(err) = result {
            warn!(error = %err, "failed to persist engine state; in-memory state remains authoritative");
        }
    }

    async fn save_directory(&self, directory: &Directory) {
        let result = match directory.encode() {
            Ok(bytes) => self.stores.blobs.save_blob(DIRECTORY_KEY, &bytes).await,
            Err(err) => Err(err),
        };
        if let Err(err) = result {
            warn!(error = %err, "failed to persist directory; in-memory state remains authoritative");
        }
    }
}
