use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tracing::instrument;

use crate::alerts::{AlertEvent, ChannelError, NotificationChannel};
use crate::config::Email;

use super::check_status;

/// Body accepted by the mail relay
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MailRequest<'a> {
    pub from: &'a str,
    pub to: &'a [String],
    pub subject: String,
    pub text: String,
}

pub fn build_mail<'a>(config: &'a Email, event: &AlertEvent) -> MailRequest<'a> {
    let mut text = format!(
        "{}\n\nSeverity: {}\nAlert: {}\nTime: {}\n",
        event.message,
        event.severity,
        event.alert_type,
        event.timestamp.to_rfc3339()
    );
    for (key, value) in &event.context {
        match value {
            Value::String(s) => text.push_str(&format!("{key}: {s}\n")),
            other => text.push_str(&format!("{key}: {other}\n")),
        }
    }

    MailRequest {
        from: &config.from,
        to: &config.to,
        subject: format!("[{}] {}", event.severity.as_str().to_uppercase(), event.title()),
        text,
    }
}

/// Email handed to an HTTP mail relay
pub struct EmailChannel {
    client: Client,
    config: Email,
}

impl EmailChannel {
    pub fn new(client: Client, config: Email) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl NotificationChannel for EmailChannel {
    fn name(&self) -> &str {
        "email"
    }

    #[instrument(skip(self, event), fields(recipients = self.config.to.len()))]
    async fn send(&self, event: &AlertEvent) -> Result<(), ChannelError> {
        let mut request = self
            .client
            .post(&self.config.relay_url)
            .json(&build_mail(&self.config, event));
        if let Some(api_key) = &self.config.api_key {
            request = request.bearer_auth(api_key);
        }

        check_status(request.send().await?).await
    }
}
