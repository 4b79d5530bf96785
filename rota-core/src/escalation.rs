//! Obligations attached to issued values and the ban ladder for leaving
//! them unmet.
//!
//! Every issued value becomes a pending [`IssuedItem`]. The periodic sweep
//! reminds once, then for numbers counts an offense per overdue item. The
//! offense count picks the sanction: a short ban, a longer ban, then a
//! permanent one. Each item escalates at most once (`punished`).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use rota_model::{DeliveryContext, IssuedItemId, RequesterId, ResourceKind};

use crate::config::EscalationConfig;
use crate::notify::{Notification, NotificationKind};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedItem {
    pub id: IssuedItemId,
    pub requester: RequesterId,
    pub kind: ResourceKind,
    pub value: String,
    pub owner: String,
    pub issued_at: DateTime<Utc>,
    pub context: DeliveryContext,
    #[serde(default)]
    pub reminded: bool,
    #[serde(default)]
    pub punished: bool,
}

impl IssuedItem {
    pub fn new(
        requester: RequesterId,
        kind: ResourceKind,
        value: impl Into<String>,
        owner: impl Into<String>,
        issued_at: DateTime<Utc>,
        context: DeliveryContext,
    ) -> Self {
        Self {
            id: IssuedItemId::new(),
            requester,
            kind,
            value: value.into(),
            owner: owner.into(),
            issued_at,
            context,
            reminded: false,
            punished: false,
        }
    }

    pub fn matches(&self, kind: ResourceKind, raw: &str) -> bool {
        self.kind == kind && kind.normalize(&self.value) == kind.normalize(raw)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TempBan {
    pub expires_at: DateTime<Utc>,
    /// Pending item whose escalation produced this ban.
    pub cause: Option<IssuedItemId>,
}

impl TempBan {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Sanction {
    Temporary { until: DateTime<Utc> },
    Permanent,
}

/// Sanction for the `offenses`-th offense.
pub fn sanction_for(
    offenses: u32,
    config: &EscalationConfig,
    now: DateTime<Utc>,
) -> Sanction {
    if offenses >= config.permanent_after.max(1) {
        Sanction::Permanent
    } else if offenses <= 1 {
        Sanction::Temporary {
            until: now + config.first_ban(),
        }
    } else {
        Sanction::Temporary {
            until: now + config.second_ban(),
        }
    }
}

/// What a sweep did.
#[derive(Debug, Default)]
pub struct SweepOutcome {
    pub notifications: Vec<Notification>,
    /// Requesters who just crossed into a permanent ban.
    pub permanent: Vec<RequesterId>,
    pub reminded: usize,
    pub escalated: usize,
    /// Overdue items of requesters already at the permanent rung. They are
    /// marked punished without another sanction.
    pub absorbed: usize,
}

impl SweepOutcome {
    pub fn changed(&self) -> bool {
        self.reminded > 0 || self.escalated > 0 || self.absorbed > 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClearedObligation {
    pub item: IssuedItem,
    pub lifted_ban: bool,
}

/// Pending items, offense counts and temporary bans.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EscalationState {
    pub pending: BTreeMap<RequesterId, Vec<IssuedItem>>,
    pub offenses: BTreeMap<RequesterId, u32>,
    pub temp_bans: BTreeMap<RequesterId, TempBan>,
}

impl EscalationState {
    pub fn record_issue(&mut self, item: IssuedItem) {
        self.pending.entry(item.requester).or_default().push(item);
    }

    pub fn pending_for(
        &self,
        requester: RequesterId,
        kind: ResourceKind,
    ) -> impl Iterator<Item = &IssuedItem> {
        self.pending
            .get(&requester)
            .into_iter()
            .flatten()
            .filter(move |item| item.kind == kind)
    }

    pub fn pending_count(&self, kind: ResourceKind) -> usize {
        self.pending
            .values()
            .flatten()
            .filter(|item| item.kind == kind)
            .count()
    }

    pub fn offense_count(&self, requester: RequesterId) -> u32 {
        self.offenses.get(&requester).copied().unwrap_or(0)
    }

    pub fn active_temp_ban(
        &self,
        requester: RequesterId,
        now: DateTime<Utc>,
    ) -> Option<&TempBan> {
        self.temp_bans
            .get(&requester)
            .filter(|ban| ban.is_active(now))
    }

    pub fn active_temp_ban_count(&self, now: DateTime<Utc>) -> usize {
        self.temp_bans
            .values()
            .filter(|ban| ban.is_active(now))
            .count()
    }

    /// Remove one pending value and lift the temporary ban it caused.
    pub fn clear(
        &mut self,
        requester: RequesterId,
        kind: ResourceKind,
        value: &str,
    ) -> Option<ClearedObligation> {
        let items = self.pending.get_mut(&requester)?;
        let position = items.iter().position(|item| item.matches(kind, value))?;
        let item = items.remove(position);
        if items.is_empty() {
            self.pending.remove(&requester);
        }

        let lifted_ban = match self.temp_bans.get(&requester) {
            Some(ban) if ban.cause == Some(item.id) => {
                self.temp_bans.remove(&requester);
                true
            }
            _ => false,
        };
        Some(ClearedObligation { item, lifted_ban })
    }

    /// Remind, then escalate overdue number obligations.
    pub fn sweep(&mut self, now: DateTime<Utc>, config: &EscalationConfig) -> SweepOutcome {
        let mut outcome = SweepOutcome::default();
        self.temp_bans.retain(|_, ban| ban.is_active(now));

        let reminder_after = config.reminder_after();
        let grace = config.grace();

        for items in self.pending.values_mut() {
            for item in items.iter_mut() {
                if !item.reminded && now - item.issued_at >= reminder_after {
                    item.reminded = true;
                    outcome.reminded += 1;
                    outcome.notifications.push(Notification::new(
                        item.context.clone(),
                        Some(item.requester),
                        NotificationKind::Reminder,
                        format!(
                            "Reminder: {} {} is still pending. Please mark it done.",
                            item.kind, item.value
                        ),
                    ));
                }
            }
        }

        let overdue: Vec<(RequesterId, IssuedItemId, DeliveryContext, String)> = self
            .pending
            .values_mut()
            .flatten()
            .filter(|item| {
                item.kind == ResourceKind::Number
                    && !item.punished
                    && now - item.issued_at >= grace
            })
            .map(|item| {
                item.punished = true;
                (item.requester, item.id, item.context.clone(), item.value.clone())
            })
            .collect();

        let permanent_after = config.permanent_after.max(1);
        for (requester, item_id, context, value) in overdue {
            if self.offense_count(requester) >= permanent_after {
                debug!(requester = %requester, value = %value, "already permanently banned");
                outcome.absorbed += 1;
                continue;
            }
            let offenses = self.offenses.entry(requester).or_insert(0);
            *offenses = offenses.saturating_add(1);
            let offenses = *offenses;
            outcome.escalated += 1;

            match sanction_for(offenses, config, now) {
                Sanction::Temporary { until } => {
                    self.temp_bans.insert(
                        requester,
                        TempBan {
                            expires_at: until,
                            cause: Some(item_id),
                        },
                    );
                    let minutes = (until - now).num_minutes();
                    info!(requester = %requester, offenses, minutes, "temporary ban issued");
                    outcome.notifications.push(Notification::new(
                        context,
                        Some(requester),
                        NotificationKind::TemporaryBan,
                        format!(
                            "Number {value} was not completed in time. You are banned for {minutes} minutes."
                        ),
                    ));
                }
                Sanction::Permanent => {
                    self.temp_bans.remove(&requester);
                    info!(requester = %requester, offenses, "permanent ban issued");
                    outcome.permanent.push(requester);
                    outcome.notifications.push(Notification::new(
                        context,
                        Some(requester),
                        NotificationKind::PermanentBan,
                        format!(
                            "Number {value} was not completed in time. You are banned permanently."
                        ),
                    ));
                }
            }
        }

        if outcome.changed() {
            debug!(
                reminded = outcome.reminded,
                escalated = outcome.escalated,
                "overdue sweep finished"
            );
        }
        outcome
    }

    /// Drop pending items older than `max_age`. Returns how many went.
    pub fn purge_stale(&mut self, now: DateTime<Utc>, max_age: chrono::Duration) -> usize {
        let mut purged = 0;
        self.pending.retain(|_, items| {
            let before = items.len();
            items.retain(|item| now - item.issued_at < max_age);
            purged += before - items.len();
            !items.is_empty()
        });
        purged
    }

    /// Forget offense counts. Temporary bans run out on their own.
    pub fn reset_offenses(&mut self) -> usize {
        let cleared = self.offenses.len();
        self.offenses.clear();
        cleared
    }

    /// Drop the requester's temporary ban; a permanent one supersedes it.
    pub fn forget_temp_ban(&mut self, requester: RequesterId) -> bool {
        self.temp_bans.remove(&requester).is_some()
    }
}
