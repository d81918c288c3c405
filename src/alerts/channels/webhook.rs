use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::instrument;

use crate::alerts::{AlertEvent, ChannelError, NotificationChannel};
use crate::config::Webhook;

use super::check_status;

pub fn build_payload(event: &AlertEvent) -> Value {
    json!({
        "message": event.message,
        "alert_type": event.alert_type,
        "severity": event.severity,
        "context": event.context,
        "timestamp": event.timestamp.to_rfc3339()
    })
}

/// Generic JSON webhook
pub struct WebhookChannel {
    client: Client,
    config: Webhook,
}

impl WebhookChannel {
    pub fn new(client: Client, config: Webhook) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    fn name(&self) -> &str {
        "webhook"
    }

    #[instrument(skip(self, event))]
    async fn send(&self, event: &AlertEvent) -> Result<(), ChannelError> {
        let response = self
            .client
            .post(&self.config.url)
            .json(&build_payload(event))
            .send()
            .await?;
        check_status(response).await
    }
}
