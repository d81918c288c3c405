use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{error, instrument};

use crate::alerts::{AlertEvent, ChannelError, NotificationChannel, Severity};
use crate::config::Discord;

use super::check_status;

#[derive(Debug, Clone, Serialize)]
pub struct Message {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub embeds: Vec<Embed>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Embed {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<EmbedFooter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub inline: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbedFooter {
    pub text: String,
}

#[derive(Default)]
pub struct MessageBuilder {
    content: Option<String>,
    embeds: Vec<Embed>,
}

impl MessageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn content(mut self, content: impl ToString) -> Self {
        self.content = Some(content.to_string());
        self
    }

    pub fn add_embed(mut self, embed: Embed) -> Self {
        self.embeds.push(embed);
        self
    }

    pub fn build(self) -> Message {
        Message {
            content: self.content,
            embeds: self.embeds,
        }
    }
}

pub fn severity_color(severity: Severity) -> u32 {
    match severity {
        Severity::Critical => 15158332, // Red
        Severity::Warning => 15105570,  // Orange
        Severity::Info => 5793266,      // Light blue
    }
}

fn severity_emoji(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical => "🔴",
        Severity::Warning => "⚠️",
        Severity::Info => "ℹ️",
    }
}

fn progress_bar(current: f64, limit: f64) -> String {
    let ratio = if limit > 0.0 { current / limit } else { 1.0 };
    let percentage = ratio * 100.0;
    let filled = ((ratio * 10.0).max(0.0) as usize).min(10);
    let bar = "█".repeat(filled) + &"░".repeat(10 - filled);

    let status_emoji = if percentage >= 100.0 {
        "🔴"
    } else if percentage >= 80.0 {
        "🟠"
    } else if percentage >= 60.0 {
        "🟡"
    } else {
        "🟢"
    };

    format!("{status_emoji} `{bar}` {percentage:.1}% of limit")
}

/// Embed for an alert, colored by severity. Threshold alerts get their value,
/// limit and a progress bar as fields.
pub fn build_alert_embed(event: &AlertEvent) -> Embed {
    let mut fields = vec![EmbedField {
        name: "Severity".to_string(),
        value: event.severity.to_string(),
        inline: true,
    }];

    let value = event.context.get("value").and_then(|v| v.as_f64());
    let threshold = event.context.get("threshold").and_then(|v| v.as_f64());
    let unit = event
        .context
        .get("unit")
        .and_then(|v| v.as_str())
        .unwrap_or_default();

    if let (Some(value), Some(threshold)) = (value, threshold) {
        fields.push(EmbedField {
            name: "📈 Current".to_string(),
            value: format!("{value:.1}{unit}"),
            inline: true,
        });
        fields.push(EmbedField {
            name: "⚠️ Limit".to_string(),
            value: format!("{threshold:.1}{unit}"),
            inline: true,
        });
        fields.push(EmbedField {
            name: "📊 Status".to_string(),
            value: progress_bar(value, threshold),
            inline: false,
        });
    }

    Embed {
        title: Some(format!("{} {}", severity_emoji(event.severity), event.title())),
        description: Some(event.message.clone()),
        color: Some(severity_color(event.severity)),
        fields,
        footer: Some(EmbedFooter {
            text: format!("Alert: {}", event.alert_type),
        }),
        timestamp: Some(event.timestamp.to_rfc3339()),
    }
}

pub struct DiscordChannel {
    client: Client,
    config: Discord,
}

impl DiscordChannel {
    pub fn new(client: Client, config: Discord) -> Self {
        Self { client, config }
    }

    pub fn build_message(&self, event: &AlertEvent) -> Message {
        let mut builder = MessageBuilder::new().add_embed(build_alert_embed(event));
        if let Some(user_id) = &self.config.user_id {
            builder = builder.content(format!(
                "{} `{}` <@{user_id}>",
                severity_emoji(event.severity),
                event.alert_type
            ));
        }
        builder.build()
    }
}

#[async_trait]
impl NotificationChannel for DiscordChannel {
    fn name(&self) -> &str {
        "discord"
    }

    #[instrument(skip(self, event))]
    async fn send(&self, event: &AlertEvent) -> Result<(), ChannelError> {
        let message = self.build_message(event);
        let response = self.client.post(&self.config.url).json(&message).send().await?;
        check_status(response).await.inspect_err(|e| {
            error!("Discord API error response: {e}");
        })
    }
}
