//! Business-day attribution.
//!
//! Daily counters key on the logical day rather than the calendar date so a
//! day is never split at an arbitrary UTC boundary.

use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDate, Offset, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::config::LogicalDayConfig;

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct LogicalDay(pub NaiveDate);

impl LogicalDay {
    /// The logical day `at` belongs to: the local date of `at` shifted back
    /// by the configured day start.
    pub fn at(at: DateTime<Utc>, config: &LogicalDayConfig) -> Self {
        let offset = FixedOffset::east_opt(config.utc_offset_minutes.saturating_mul(60))
            .unwrap_or_else(|| Utc.fix());
        let local = at.with_timezone(&offset);
        let since_midnight = chrono::Duration::seconds(i64::from(
            config.day_starts_at.num_seconds_from_midnight(),
        ));
        LogicalDay((local - since_midnight).date_naive())
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }

    pub fn key(&self) -> String {
        self.0.format("%Y-%m-%d").to_string()
    }
}

impl fmt::Display for LogicalDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}
