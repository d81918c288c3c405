//! Fan-out of one alert to every configured notification channel

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, error, info, instrument};

use super::{AlertEvent, Severity};

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// The request never got an answer
    #[error("request failed: {0}")]
    Transport(String),

    /// The endpoint answered with a non-success status
    #[error("endpoint responded with {status}: {body}")]
    Status { status: u16, body: String },
}

impl From<reqwest::Error> for ChannelError {
    fn from(err: reqwest::Error) -> Self {
        ChannelError::Transport(err.to_string())
    }
}

/// A place alerts are delivered to
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, event: &AlertEvent) -> Result<(), ChannelError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelOutcome {
    Ok,
    Error(String),
}

impl ChannelOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, ChannelOutcome::Ok)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelResult {
    pub channel: String,
    pub outcome: ChannelOutcome,
}

/// Per-channel results of one dispatch, in channel order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub results: Vec<ChannelResult>,
}

impl DispatchReport {
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn delivered(&self) -> usize {
        self.results.iter().filter(|r| r.outcome.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.delivered()
    }

    /// At least one channel was tried and none succeeded
    pub fn all_failed(&self) -> bool {
        !self.results.is_empty() && self.delivered() == 0
    }

    pub fn outcome(&self, channel: &str) -> Option<&ChannelOutcome> {
        self.results
            .iter()
            .find(|r| r.channel == channel)
            .map(|r| &r.outcome)
    }
}

struct Registered {
    channel: Arc<dyn NotificationChannel>,
    min_severity: Option<Severity>,
}

impl Registered {
    fn accepts(&self, severity: Severity) -> bool {
        self.min_severity.is_none_or(|min| severity >= min)
    }
}

/// Sends alerts to all channels concurrently. A failing channel is logged and
/// never holds up the others. There are no retries.
#[derive(Clone, Default)]
pub struct AlertDispatcher {
    channels: Arc<Vec<Registered>>,
}

impl AlertDispatcher {
    pub fn new(
        channels: impl IntoIterator<Item = (Arc<dyn NotificationChannel>, Option<Severity>)>,
    ) -> Self {
        let channels = channels
            .into_iter()
            .map(|(channel, min_severity)| Registered {
                channel,
                min_severity,
            })
            .collect();
        Self {
            channels: Arc::new(channels),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn channel_names(&self) -> Vec<&str> {
        self.channels.iter().map(|r| r.channel.name()).collect()
    }

    pub fn has_channel(&self, name: &str) -> bool {
        self.channels.iter().any(|r| r.channel.name() == name)
    }

    /// Send to every channel whose minimum severity the event meets.
    #[instrument(skip(self, event), fields(alert_type = %event.alert_type, severity = %event.severity))]
    pub async fn dispatch(&self, event: &AlertEvent) -> DispatchReport {
        let targets = self
            .channels
            .iter()
            .filter(|r| {
                let accepted = r.accepts(event.severity);
                if !accepted {
                    debug!("skipping {} below its minimum severity", r.channel.name());
                }
                accepted
            })
            .map(|r| r.channel.as_ref());
        Self::send_all(targets, event).await
    }

    /// Send to the named channel only, regardless of its minimum severity.
    #[instrument(skip(self, event), fields(alert_type = %event.alert_type))]
    pub async fn dispatch_to(&self, event: &AlertEvent, channel: &str) -> DispatchReport {
        let targets = self
            .channels
            .iter()
            .filter(|r| r.channel.name() == channel)
            .map(|r| r.channel.as_ref());
        Self::send_all(targets, event).await
    }

    async fn send_all<'a>(
        targets: impl Iterator<Item = &'a dyn NotificationChannel>,
        event: &AlertEvent,
    ) -> DispatchReport {
        let sends = targets.map(|channel| async move {
            let outcome = match channel.send(event).await {
                Ok(()) => {
                    info!("delivered {} via {}", event.alert_type, channel.name());
                    ChannelOutcome::Ok
                }
                Err(e) => {
                    error!("failed to deliver {} via {}: {e}", event.alert_type, channel.name());
                    ChannelOutcome::Error(e.to_string())
                }
            };
            ChannelResult {
                channel: channel.name().to_string(),
                outcome,
            }
        });

        DispatchReport {
            results: join_all(sends).await,
        }
    }
}
