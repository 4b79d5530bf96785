use rota_core::config::{
    EscalationConfig, MAX_SPAN_MINUTES, MAX_UTC_OFFSET_MINUTES, PendingConfig,
};

use super::models::{
    Config, DirectoryFeedConfig, DirectoryFeedMode, JobsConfig,
};

#[derive(Debug, Clone)]
pub struct ConfigWarning {
    pub message: String,
    pub hint: Option<String>,
}

#[derive(Debug, Default, Clone)]
pub struct ConfigWarnings {
    pub items: Vec<ConfigWarning>,
}

impl ConfigWarnings {
    pub fn push<S: Into<String>>(&mut self, message: S) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: None,
        });
    }

    pub fn push_with_hint<S: Into<String>, H: Into<String>>(
        &mut self,
        message: S,
        hint: H,
    ) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: Some(hint.into()),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn extend(&mut self, other: ConfigWarnings) {
        self.items.extend(other.items);
    }
}

/// Soft checks on a composed configuration. Anything found here is
/// survivable, so it is reported rather than rejected.
pub fn review(config: &mut Config) -> ConfigWarnings {
    let mut warnings = ConfigWarnings::default();

    if config.database.url.is_none() {
        warnings.push_with_hint(
            "No database configured; state lives in memory and is lost on restart",
            "Set ROTA_DATABASE_URL or [database].url",
        );
        if config.directory_feed.mode == DirectoryFeedMode::Listen {
            config.directory_feed.mode = DirectoryFeedMode::Off;
            warnings.push(
                "Directory feed `listen` needs a database; directory watching disabled",
            );
        }
    }

    if config.transport.webhook_url.is_none() {
        warnings.push_with_hint(
            "No webhook configured; notifications are only logged",
            "Set ROTA_WEBHOOK_URL or [transport].webhook_url",
        );
    }

    if config.auth.api_token.is_none() {
        warnings.push_with_hint(
            "No API token configured; admin routes and /command are refused",
            "Set ROTA_API_TOKEN or [auth].api_token",
        );
    }

    if config.commands.admins.is_empty() {
        warnings.push("No admins configured; admin chat commands are disabled");
    }

    let quota = &config.engine.quota;
    if quota.window_limit_per_requester.is_some() && quota.window_minutes == 0 {
        warnings.push(
            "quota.window_minutes is 0; the short window never resets",
        );
    }

    let escalation = &mut config.engine.escalation;
    let defaults = EscalationConfig::default();
    for field in escalation.out_of_range() {
        match field {
            "grace_minutes" => escalation.grace_minutes = defaults.grace_minutes,
            "reminder_minutes" => escalation.reminder_minutes = defaults.reminder_minutes,
            "first_ban_minutes" => escalation.first_ban_minutes = defaults.first_ban_minutes,
            _ => escalation.second_ban_minutes = defaults.second_ban_minutes,
        }
        warnings.push(format!(
            "escalation.{field} must be between 0 and {MAX_SPAN_MINUTES}; using the default"
        ));
    }

    let pending = &mut config.engine.pending;
    if !(0..=MAX_SPAN_MINUTES / 60).contains(&pending.stale_after_hours) {
        pending.stale_after_hours = PendingConfig::default().stale_after_hours;
        warnings.push(format!(
            "pending.stale_after_hours must be between 0 and {}; using the default",
            MAX_SPAN_MINUTES / 60
        ));
    }

    let logical_day = &mut config.engine.logical_day;
    if logical_day.utc_offset_minutes.unsigned_abs() > MAX_UTC_OFFSET_MINUTES.unsigned_abs() {
        logical_day.utc_offset_minutes = 0;
        warnings.push(format!(
            "logical_day.utc_offset_minutes must be within ±{MAX_UTC_OFFSET_MINUTES}; using UTC"
        ));
    }

    let window_minutes = config.engine.quota.window_minutes;
    if !i64::try_from(window_minutes).is_ok_and(|m| m <= MAX_SPAN_MINUTES) {
        config.engine.quota.window_minutes = MAX_SPAN_MINUTES as u64;
        warnings.push(format!(
            "quota.window_minutes is larger than {MAX_SPAN_MINUTES}; clamped"
        ));
    }

    if config.jobs.sweep_interval.is_zero() {
        config.jobs.sweep_interval = JobsConfig::default().sweep_interval;
        warnings.push("jobs.sweep_interval_secs must be positive; using the default");
    }
    if config.jobs.purge_interval.is_zero() {
        config.jobs.purge_interval = JobsConfig::default().purge_interval;
        warnings.push("jobs.purge_interval_secs must be positive; using the default");
    }

    if config.directory_feed.poll_interval.is_zero() {
        config.directory_feed.poll_interval =
            DirectoryFeedConfig::default().poll_interval;
        warnings.push("directory_feed.poll_interval_secs must be positive; using the default");
    }

    warnings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_range_spans_fall_back_to_defaults() {
        let mut config = Config::default();
        config.engine.escalation.grace_minutes = i64::MAX;
        config.engine.escalation.second_ban_minutes = -1;
        config.engine.pending.stale_after_hours = i64::MAX;
        config.engine.logical_day.utc_offset_minutes = i32::MAX;

        let warnings = review(&mut config);

        assert_eq!(config.engine.escalation.grace_minutes, 30);
        assert_eq!(config.engine.escalation.second_ban_minutes, 120);
        assert_eq!(config.engine.pending.stale_after_hours, 24);
        assert_eq!(config.engine.logical_day.utc_offset_minutes, 0);
        assert!(
            warnings
                .items
                .iter()
                .any(|w| w.message.contains("escalation.grace_minutes"))
        );
    }

    #[test]
    fn defaults_pass_range_checks() {
        let mut config = Config::default();
        let warnings = review(&mut config);
        assert!(
            !warnings
                .items
                .iter()
                .any(|w| w.message.contains("between") || w.message.contains("within"))
        );
    }
}
