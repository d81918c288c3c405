//! At-most-once alerting per alert type and time window

use std::sync::Arc;

use tracing::{debug, instrument, warn};

use super::{AlertEvent, AlertWindow};
use crate::store::KeyedStore;

/// Result of claiming an alert's window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DedupDecision {
    pub key: String,
    /// Another caller already claimed this window
    pub suppressed: bool,
    /// This call holds the claim and may release it
    pub claimed: bool,
}

/// Claims `(alert type, window)` in the shared store before anything is sent.
///
/// The claim is a single `set_if_absent`, so of any number of concurrent
/// candidates for the same window exactly one goes through. When the store
/// cannot be reached the alert is let through.
#[derive(Clone)]
pub struct AlertDeduplicator {
    store: Arc<dyn KeyedStore>,
    window: AlertWindow,
}

impl AlertDeduplicator {
    pub fn new(store: Arc<dyn KeyedStore>, window: AlertWindow) -> Self {
        Self { store, window }
    }

    pub fn window(&self) -> AlertWindow {
        self.window
    }

    #[instrument(skip(self, event), fields(alert_type = %event.alert_type))]
    pub async fn claim(&self, event: &AlertEvent) -> DedupDecision {
        let key = self.window.alert_key(&event.alert_type, event.timestamp);
        let value = event.timestamp.to_rfc3339();

        match self.store.set_if_absent(&key, &value, self.window.ttl()).await {
            Ok(true) => {
                debug!("claimed {key}");
                DedupDecision {
                    key,
                    suppressed: false,
                    claimed: true,
                }
            }
            Ok(false) => {
                debug!("{key} already claimed, suppressing");
                DedupDecision {
                    key,
                    suppressed: true,
                    claimed: false,
                }
            }
            Err(e) => {
                warn!("dedup store failed for {key}, alerting anyway: {e}");
                DedupDecision {
                    key,
                    suppressed: false,
                    claimed: false,
                }
            }
        }
    }

    /// Drop a claim so a later evaluation in the same window may retry.
    #[instrument(skip(self, decision), fields(key = %decision.key))]
    pub async fn release(&self, decision: &DedupDecision) {
        if !decision.claimed {
            return;
        }

        if let Err(e) = self.store.delete(&decision.key).await {
            warn!("failed to release {}: {e}", decision.key);
        } else {
            debug!("released {}", decision.key);
        }
    }
}
