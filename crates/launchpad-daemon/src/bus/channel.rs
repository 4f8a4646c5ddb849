//! Per-project broadcast channels.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, broadcast};
use tracing::{debug, info};

use launchpad_core::config::BusConfig;

use super::types::{BusStats, LogChunk, Subscription, SubscriptionId};

/// Fan-out of captured output to any number of subscribers per project id.
///
/// The bus does not know which projects exist; any string id is accepted.
/// A channel lives only while it has receivers.
#[derive(Clone)]
pub struct LogBus {
    channels: Arc<RwLock<HashMap<String, broadcast::Sender<LogChunk>>>>,
    capacity: usize,
}

impl Default for LogBus {
    fn default() -> Self {
        Self::new(&BusConfig::default())
    }
}

impl LogBus {
    pub fn new(config: &BusConfig) -> Self {
        Self {
            channels: Arc::new(RwLock::new(HashMap::new())),
            capacity: config.channel_capacity.max(1),
        }
    }

    /// Deliver `chunk` to every current subscriber of `project_id`.
    ///
    /// Returns how many subscribers the chunk was queued for.
    pub async fn publish(&self, project_id: &str, chunk: LogChunk) -> usize {
        let channels = self.channels.read().await;
        let Some(tx) = channels.get(project_id) else {
            return 0;
        };

        if let Ok(count) = tx.send(chunk) {
            count
        } else {
            drop(channels);
            self.prune(project_id).await;
            0
        }
    }

    /// Start receiving chunks published to `project_id` from now on.
    #[allow(clippy::significant_drop_tightening)]
    pub async fn subscribe(&self, project_id: &str) -> Subscription {
        let mut channels = self.channels.write().await;
        let tx = channels
            .entry(project_id.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0);
        let rx = tx.subscribe();

        let id = SubscriptionId::new();
        info!(project_id, subscription_id = %id, "Subscriber joined");

        Subscription {
            id,
            project_id: project_id.to_string(),
            rx,
        }
    }

    /// Stop a subscription. Chunks published afterwards are not delivered to it.
    pub async fn unsubscribe(&self, subscription: Subscription) {
        let Subscription { id, project_id, rx } = subscription;
        drop(rx);
        self.prune(&project_id).await;
        info!(project_id, subscription_id = %id, "Subscriber left");
    }

    /// Number of live subscribers for `project_id`.
    pub async fn subscriber_count(&self, project_id: &str) -> usize {
        self.channels
            .read()
            .await
            .get(project_id)
            .map_or(0, broadcast::Sender::receiver_count)
    }

    /// Get bus statistics.
    pub async fn stats(&self) -> BusStats {
        let channels = self.channels.read().await;
        let live = channels.values().map(broadcast::Sender::receiver_count);
        BusStats {
            channel_count: live.clone().filter(|&n| n > 0).count(),
            subscriber_count: live.sum(),
        }
    }

    async fn prune(&self, project_id: &str) {
        let mut channels = self.channels.write().await;
        if channels
            .get(project_id)
            .is_some_and(|tx| tx.receiver_count() == 0)
        {
            channels.remove(project_id);
            debug!(project_id, "Removed idle log channel");
        }
    }
}
