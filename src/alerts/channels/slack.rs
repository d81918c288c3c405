use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::instrument;

use crate::alerts::{AlertEvent, ChannelError, NotificationChannel, Severity};
use crate::config::Slack;

use super::check_status;

fn severity_color(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical => "danger",
        Severity::Warning => "warning",
        Severity::Info => "good",
    }
}

/// Incoming-webhook payload with one attachment colored by severity
pub fn build_payload(config: &Slack, event: &AlertEvent) -> Value {
    let mut fields = vec![
        json!({"title": "Severity", "value": event.severity.to_string(), "short": true}),
        json!({"title": "Alert Type", "value": event.alert_type, "short": true}),
    ];
    for (key, value) in &event.context {
        let value = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        fields.push(json!({"title": key, "value": value, "short": true}));
    }

    let mut payload = json!({
        "text": format!("*{}*", event.title()),
        "attachments": [{
            "color": severity_color(event.severity),
            "text": event.message,
            "fields": fields,
            "ts": event.timestamp.timestamp(),
        }],
    });

    if let Some(channel) = &config.channel {
        payload["channel"] = json!(channel);
    }
    if let Some(username) = &config.username {
        payload["username"] = json!(username);
    }
    payload
}

pub struct SlackChannel {
    client: Client,
    config: Slack,
}

impl SlackChannel {
    pub fn new(client: Client, config: Slack) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl NotificationChannel for SlackChannel {
    fn name(&self) -> &str {
        "slack"
    }

    #[instrument(skip(self, event))]
    async fn send(&self, event: &AlertEvent) -> Result<(), ChannelError> {
        let payload = build_payload(&self.config, event);
        let response = self.client.post(&self.config.url).json(&payload).send().await?;
        check_status(response).await
    }
}
