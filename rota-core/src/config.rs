use std::collections::BTreeSet;

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use rota_model::RequesterId;

/// Global knobs that tune engine behaviour.
///
/// All fields carry defaults so deployments only need to spell out the
/// values they want to change.
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EngineConfig {
    /// Daily caps on the number pool and on requesters.
    pub quota: QuotaConfig,
    /// Grace periods and ban ladder for unmet number obligations.
    pub escalation: EscalationConfig,
    /// Where the business day starts.
    pub logical_day: LogicalDayConfig,
    /// Retention for pending issued items.
    pub pending: PendingConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotaConfig {
    /// How many times a single number may be handed out per logical day.
    pub daily_limit_per_number: u32,
    /// Numbers a requester may take per logical day before alias activity is required.
    pub numbers_per_requester_per_day: u32,
    /// Alias requests in the same logical day that unlock numbers past the allotment.
    pub alias_bonus_threshold: u32,
    /// Numbers a requester may take inside one short window. `None` disables the window.
    pub window_limit_per_requester: Option<u32>,
    /// Length of the short window; the reset trigger runs on this cadence.
    pub window_minutes: u64,
    /// Requesters exempt from requester-level throttling.
    pub whitelist: BTreeSet<RequesterId>,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            daily_limit_per_number: 10,
            numbers_per_requester_per_day: 5,
            alias_bonus_threshold: 10,
            window_limit_per_requester: Some(3),
            window_minutes: 45,
            whitelist: BTreeSet::new(),
        }
    }
}

/// Longest span any minute or hour setting may describe: ten years.
pub const MAX_SPAN_MINUTES: i64 = 10 * 366 * 24 * 60;

/// Largest UTC offset a fixed offset can carry.
pub const MAX_UTC_OFFSET_MINUTES: i32 = 24 * 60 - 1;

fn span_minutes(minutes: i64) -> chrono::Duration {
    chrono::Duration::minutes(minutes.clamp(0, MAX_SPAN_MINUTES))
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EscalationConfig {
    /// Age after which an unfulfilled number obligation counts as an offense.
    pub grace_minutes: i64,
    /// Age after which a single reminder is sent for any pending item.
    pub reminder_minutes: i64,
    pub first_ban_minutes: i64,
    pub second_ban_minutes: i64,
    /// Offense count at which the ban becomes permanent.
    pub permanent_after: u32,
}

impl EscalationConfig {
    pub fn grace(&self) -> chrono::Duration {
        span_minutes(self.grace_minutes)
    }

    pub fn reminder_after(&self) -> chrono::Duration {
        span_minutes(self.reminder_minutes)
    }

    pub fn first_ban(&self) -> chrono::Duration {
        span_minutes(self.first_ban_minutes)
    }

    pub fn second_ban(&self) -> chrono::Duration {
        span_minutes(self.second_ban_minutes)
    }

    /// Names of span settings outside `0..=MAX_SPAN_MINUTES`.
    pub fn out_of_range(&self) -> Vec<&'static str> {
        [
            ("grace_minutes", self.grace_minutes),
            ("reminder_minutes", self.reminder_minutes),
            ("first_ban_minutes", self.first_ban_minutes),
            ("second_ban_minutes", self.second_ban_minutes),
        ]
        .into_iter()
        .filter(|(_, minutes)| !(0..=MAX_SPAN_MINUTES).contains(minutes))
        .map(|(name, _)| name)
        .collect()
    }
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            grace_minutes: 30,
            reminder_minutes: 15,
            first_ban_minutes: 30,
            second_ban_minutes: 120,
            permanent_after: 3,
        }
    }
}

/// Logical-day boundary. A day runs from `day_starts_at` local time to the
/// same time on the next calendar day.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LogicalDayConfig {
    /// Fixed offset of local time from UTC, in minutes.
    pub utc_offset_minutes: i32,
    #[serde(with = "hhmm")]
    pub day_starts_at: NaiveTime,
}

impl Default for LogicalDayConfig {
    fn default() -> Self {
        Self {
            utc_offset_minutes: 0,
            day_starts_at: NaiveTime::from_hms_opt(3, 30, 0)
                .unwrap_or(NaiveTime::MIN),
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PendingConfig {
    /// Pending items older than this are dropped by the hourly purge.
    pub stale_after_hours: i64,
}

impl PendingConfig {
    pub fn stale_after(&self) -> chrono::Duration {
        span_minutes(self.stale_after_hours.saturating_mul(60))
    }
}

impl Default for PendingConfig {
    fn default() -> Self {
        Self {
            stale_after_hours: 24,
        }
    }
}

/// `HH:MM` (or `HH:MM:SS`) wall-clock times.
pub mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn parse(raw: &str) -> Option<NaiveTime> {
        let raw = raw.trim();
        NaiveTime::parse_from_str(raw, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
            .ok()
    }

    pub fn serialize<S>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&time.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| {
            D::Error::custom(format!("expected HH:MM time, got {raw:?}"))
        })
    }
}
