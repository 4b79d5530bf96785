//! Outbound messages.
//!
//! Notifications are assembled under the engine lock and delivered after it
//! is released. Delivery is best effort: failures are logged and never roll
//! back engine state.

use std::fmt::Debug;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, warn};

use rota_model::{DeliveryContext, RequesterId};

use crate::error::Result;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync + Debug {
    async fn deliver(&self, context: &DeliveryContext, message: &str) -> Result<()>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Reminder,
    TemporaryBan,
    PermanentBan,
    BanLifted,
    PriorityFinished,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub context: DeliveryContext,
    pub requester: Option<RequesterId>,
    pub kind: NotificationKind,
    pub text: String,
}

impl Notification {
    pub fn new(
        context: DeliveryContext,
        requester: Option<RequesterId>,
        kind: NotificationKind,
        text: impl Into<String>,
    ) -> Self {
        Self {
            context,
            requester,
            kind,
            text: text.into(),
        }
    }
}

/// Deliver every notification in order, swallowing failures.
///
/// Returns how many were delivered.
pub async fn dispatch(notifier: &dyn Notifier, notifications: Vec<Notification>) -> usize {
    let mut delivered = 0;
    for notification in notifications {
        match notifier
            .deliver(&notification.context, &notification.text)
            .await
        {
            Ok(()) => {
                delivered += 1;
                debug!(
                    kind = ?notification.kind,
                    chat_id = notification.context.chat_id,
                    "notification delivered"
                );
            }
            Err(err) => {
                warn!(
                    kind = ?notification.kind,
                    chat_id = notification.context.chat_id,
                    error = %err,
                    "notification delivery failed"
                );
            }
        }
    }
    delivered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use mockall::predicate::always;

    #[tokio::test]
    async fn failed_deliveries_do_not_stop_the_batch() {
        let mut notifier = MockNotifier::new();
        let mut calls = 0;
        notifier
            .expect_deliver()
            .with(always(), always())
            .times(2)
            .returning(move |_, _| {
                calls += 1;
                if calls == 1 {
                    Err(EngineError::Internal("transport down".into()))
                } else {
                    Ok(())
                }
            });

        let batch = vec![
            Notification::new(
                DeliveryContext::new(1),
                None,
                NotificationKind::Reminder,
                "first",
            ),
            Notification::new(
                DeliveryContext::new(2),
                None,
                NotificationKind::Reminder,
                "second",
            ),
        ];

        assert_eq!(dispatch(&notifier, batch).await, 1);
    }
}
