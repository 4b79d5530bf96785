//! Outbound delivery for engine notifications.
//!
//! Both adapters are best effort. The engine already logs and swallows
//! delivery failures; these only need to report them.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info};

use rota_core::{EngineError, Notifier, Result};
use rota_model::DeliveryContext;

/// Writes notifications to the log and nowhere else.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn deliver(&self, context: &DeliveryContext, message: &str) -> Result<()> {
        info!(
            chat_id = context.chat_id,
            message_id = ?context.message_id,
            text = %message,
            "notification"
        );
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    chat_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    message_id: Option<i64>,
    text: &'a str,
}

/// POSTs `{chat_id, message_id, text}` to a chat bridge.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn deliver(&self, context: &DeliveryContext, message: &str) -> Result<()> {
        let payload = WebhookPayload {
            chat_id: context.chat_id,
            message_id: context.message_id,
            text: message,
        };

        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|err| EngineError::Internal(format!("webhook request failed: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(EngineError::Internal(format!(
                "webhook rejected notification with status {status}"
            )));
        }

        debug!(chat_id = context.chat_id, "notification delivered");
        Ok(())
    }
}
