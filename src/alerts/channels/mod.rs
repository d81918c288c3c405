//! Built-in notification channels
//!
//! All of them are plain HTTP POSTs of JSON through a shared `reqwest` client.

pub mod discord;
pub mod email;
pub mod slack;
pub mod webhook;

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Response};

pub use discord::DiscordChannel;
pub use email::EmailChannel;
pub use slack::SlackChannel;
pub use webhook::WebhookChannel;

use super::{ChannelError, NotificationChannel, Severity};
use crate::config::{ChannelConfig, ChannelKind};

const CHANNEL_TIMEOUT: Duration = Duration::from_secs(10);

pub fn http_client() -> Result<Client, ChannelError> {
    Client::builder()
        .timeout(CHANNEL_TIMEOUT)
        .build()
        .map_err(ChannelError::from)
}

/// Turn a non-success response into [`ChannelError::Status`].
pub(crate) async fn check_status(response: Response) -> Result<(), ChannelError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }

    let body = response.text().await.unwrap_or_default();
    Err(ChannelError::Status {
        status: status.as_u16(),
        body: crate::util::truncate(&body, 200),
    })
}

/// Channels of the configuration that are enabled, with their minimum severity.
pub fn from_config(
    client: &Client,
    configs: &[ChannelConfig],
) -> Vec<(Arc<dyn NotificationChannel>, Option<Severity>)> {
    configs
        .iter()
        .filter(|config| config.enabled)
        .map(|config| {
            let channel: Arc<dyn NotificationChannel> = match &config.kind {
                ChannelKind::Discord(discord) => {
                    Arc::new(DiscordChannel::new(client.clone(), discord.clone()))
                }
                ChannelKind::Slack(slack) => {
                    Arc::new(SlackChannel::new(client.clone(), slack.clone()))
                }
                ChannelKind::Webhook(webhook) => {
                    Arc::new(WebhookChannel::new(client.clone(), webhook.clone()))
                }
                ChannelKind::Email(email) => {
                    Arc::new(EmailChannel::new(client.clone(), email.clone()))
                }
            };
            (channel, config.min_severity)
        })
        .collect()
}
