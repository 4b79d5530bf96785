//! Daily caps on number consumption.
//!
//! Two layers: each number value may only be handed out a fixed number of
//! times per logical day, and each requester gets a daily allotment of
//! numbers (lifted by alias activity) plus a short-window cap.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::trace;

use rota_model::{RequesterId, normalize_number};

use crate::config::QuotaConfig;
use crate::error::Result;
use crate::logical_day::LogicalDay;
use crate::store::CounterStore;

/// Identifies one daily counter.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum CounterKey {
    /// Times a number value was issued.
    NumberUsage(String),
    /// Numbers issued to a requester.
    RequesterNumbers(RequesterId),
    /// Aliases issued to a requester.
    RequesterAliases(RequesterId),
    /// Numbers issued to a requester inside one short window.
    RequesterWindow { requester: RequesterId, epoch: u64 },
}

impl CounterKey {
    pub fn number_usage(raw: &str) -> Self {
        CounterKey::NumberUsage(normalize_number(raw))
    }

    pub fn to_store_key(&self) -> String {
        match self {
            Self::NumberUsage(value) => format!("number:{value}"),
            Self::RequesterNumbers(id) => format!("requester:{id}:numbers"),
            Self::RequesterAliases(id) => format!("requester:{id}:aliases"),
            Self::RequesterWindow { requester, epoch } => {
                format!("requester:{requester}:window:{epoch}")
            }
        }
    }
}

/// Whether a requester may take another number right now.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequesterAllowance {
    Allowed,
    DailyAllotmentReached { used: u32, limit: u32 },
    WindowLimitReached { used: u32, limit: u32 },
}

impl RequesterAllowance {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RequesterAllowance::Allowed)
    }
}

/// A requester's usage within one logical day.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct RequesterActivity {
    pub requester: RequesterId,
    pub logical_day: LogicalDay,
    pub aliases: u32,
    pub numbers: u32,
    /// Numbers taken inside the current short window.
    pub window_numbers: u32,
}

#[derive(Clone)]
pub struct QuotaGuard {
    counters: Arc<dyn CounterStore>,
    config: QuotaConfig,
}

impl fmt::Debug for QuotaGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuotaGuard")
            .field("daily_limit_per_number", &self.config.daily_limit_per_number)
            .field(
                "numbers_per_requester_per_day",
                &self.config.numbers_per_requester_per_day,
            )
            .finish()
    }
}

impl QuotaGuard {
    pub fn new(counters: Arc<dyn CounterStore>, config: QuotaConfig) -> Self {
        Self { counters, config }
    }

    pub fn config(&self) -> &QuotaConfig {
        &self.config
    }

    pub fn counters(&self) -> &Arc<dyn CounterStore> {
        &self.counters
    }

    pub async fn quota_reached(&self, value: &str, day: LogicalDay) -> Result<bool> {
        let key = CounterKey::number_usage(value).to_store_key();
        let used = self.counters.get(&key, day).await?;
        Ok(used >= self.config.daily_limit_per_number)
    }

    /// Count one issuance of `value`. Only call after the value was handed
    /// out.
    pub async fn record_usage(&self, value: &str, day: LogicalDay) -> Result<u32> {
        let key = CounterKey::number_usage(value).to_store_key();
        self.counters.increment(&key, day).await
    }

    /// Normalized values among `values` that reached the daily limit, read
    /// in one batch.
    pub async fn exhausted_values<'a, I>(
        &self,
        values: I,
        day: LogicalDay,
    ) -> Result<HashSet<String>>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let normalized: Vec<String> = values.into_iter().map(normalize_number).collect();
        let keys: Vec<String> = normalized
            .iter()
            .map(|value| CounterKey::NumberUsage(value.clone()).to_store_key())
            .collect();
        let counts = self.counters.get_many(&keys, day).await?;

        let exhausted: HashSet<String> = normalized
            .into_iter()
            .zip(keys)
            .filter(|(_, key)| {
                counts.get(key).copied().unwrap_or(0) >= self.config.daily_limit_per_number
            })
            .map(|(value, _)| value)
            .collect();
        trace!(exhausted = exhausted.len(), day = %day, "prefetched number quota");
        Ok(exhausted)
    }

    pub fn is_whitelisted(&self, requester: RequesterId) -> bool {
        self.config.whitelist.contains(&requester)
    }

    pub async fn requester_allowance(
        &self,
        requester: RequesterId,
        day: LogicalDay,
        window_epoch: u64,
    ) -> Result<RequesterAllowance> {
        if self.is_whitelisted(requester) {
            return Ok(RequesterAllowance::Allowed);
        }

        if let Some(limit) = self.config.window_limit_per_requester {
            let key = CounterKey::RequesterWindow {
                requester,
                epoch: window_epoch,
            };
            let used = self.counters.get(&key.to_store_key(), day).await?;
            if used >= limit {
                return Ok(RequesterAllowance::WindowLimitReached { used, limit });
            }
        }

        let limit = self.config.numbers_per_requester_per_day;
        let used = self
            .counters
            .get(&CounterKey::RequesterNumbers(requester).to_store_key(), day)
            .await?;
        if used < limit {
            return Ok(RequesterAllowance::Allowed);
        }

        let aliases = self
            .counters
            .get(&CounterKey::RequesterAliases(requester).to_store_key(), day)
            .await?;
        if aliases > self.config.alias_bonus_threshold {
            trace!(requester = %requester, aliases, "numbers unlocked by alias activity");
            return Ok(RequesterAllowance::Allowed);
        }

        Ok(RequesterAllowance::DailyAllotmentReached { used, limit })
    }

    /// Alias and number counts for `requester` on `day`, read in one batch.
    pub async fn requester_activity(
        &self,
        requester: RequesterId,
        day: LogicalDay,
        window_epoch: u64,
    ) -> Result<RequesterActivity> {
        let keys = [
            CounterKey::RequesterAliases(requester),
            CounterKey::RequesterNumbers(requester),
            CounterKey::RequesterWindow {
                requester,
                epoch: window_epoch,
            },
        ]
        .map(|key| key.to_store_key());
        let counts = self.counters.get_many(&keys, day).await?;
        let count = |key: &String| counts.get(key).copied().unwrap_or(0);

        Ok(RequesterActivity {
            requester,
            logical_day: day,
            aliases: count(&keys[0]),
            numbers: count(&keys[1]),
            window_numbers: count(&keys[2]),
        })
    }

    pub async fn record_requester_number(
        &self,
        requester: RequesterId,
        day: LogicalDay,
        window_epoch: u64,
    ) -> Result<()> {
        self.counters
            .increment(&CounterKey::RequesterNumbers(requester).to_store_key(), day)
            .await?;
        let window = CounterKey::RequesterWindow {
            requester,
            epoch: window_epoch,
        };
        self.counters.increment(&window.to_store_key(), day).await?;
        Ok(())
    }

    pub async fn record_requester_alias(
        &self,
        requester: RequesterId,
        day: LogicalDay,
    ) -> Result<u32> {
        self.counters
            .increment(&CounterKey::RequesterAliases(requester).to_store_key(), day)
            .await
    }
}
