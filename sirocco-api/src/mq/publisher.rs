//! Trigger-event publisher.

use std::sync::Arc;

use async_trait::async_trait;
use sirocco_bus::ChannelPool;
use sirocco_engine::ports::{PublishError, TriggerEventSink};
use sirocco_engine::TriggerEvent;

use super::event::TRIGGER_EVENT_KEY;

/// Publishes fired-trigger events through the shared channel pool.
///
/// The pooled channel is held only for the duration of one publish and is
/// returned on drop.
pub struct BusTriggerEventSink {
    pool: Arc<ChannelPool>,
}

impl BusTriggerEventSink {
    /// Creates a sink over `pool`.
    #[must_use]
    pub fn new(pool: Arc<ChannelPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TriggerEventSink for BusTriggerEventSink {
    async fn publish(&self, event: TriggerEvent) -> Result<(), PublishError> {
        let channel = self.pool.acquire().await.map_err(PublishError::new)?;
        channel
            .publish(TRIGGER_EVENT_KEY, &event)
            .await
            .map_err(PublishError::new)
    }
}
