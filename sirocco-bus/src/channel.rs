//! Multiplexed channel wrapper.

use std::time::{SystemTime, UNIX_EPOCH};

use lapin::options::{
    BasicCancelOptions, BasicConsumeOptions, BasicPublishOptions, BasicQosOptions,
};
use lapin::types::FieldTable;
use lapin::BasicProperties;
use serde::Serialize;
use tracing::debug;

use crate::error::BusError;

/// Prefix of every routing key published by this service family.
pub const ROUTING_PREFIX: &str = "marvin";

/// The broker's built-in topic exchange.
pub const TOPIC_EXCHANGE: &str = "amq.topic";

/// Persistent delivery mode per the AMQP basic class.
const DELIVERY_MODE_PERSISTENT: u8 = 2;

/// A multiplexed channel bound to one connection's server tag.
pub struct Channel {
    inner: lapin::Channel,
    server_tag: String,
}

impl Channel {
    pub(crate) fn new(inner: lapin::Channel, server_tag: String) -> Self {
        Self { inner, server_tag }
    }

    /// Returns true once the channel has received a close notification.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        !self.inner.status().connected()
    }

    /// Publishes a JSON payload to the topic exchange.
    ///
    /// The effective routing key is
    /// `"marvin." + <server_tag> + "." + <key>`; delivery is persistent and
    /// stamped with the wall clock.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Serialize`] before touching the wire if the
    /// payload cannot be encoded, or the underlying AMQP error otherwise.
    pub async fn publish<T: Serialize>(&self, key: &str, payload: &T) -> Result<(), BusError> {
        let body = serde_json::to_vec(payload).map_err(|source| BusError::Serialize {
            key: key.to_string(),
            source,
        })?;

        let routing_key = routed_key(&self.server_tag, key);
        let properties = BasicProperties::default()
            .with_content_type("application/json".into())
            .with_delivery_mode(DELIVERY_MODE_PERSISTENT)
            .with_timestamp(unix_now());

        let _confirm = self
            .inner
            .basic_publish(
                TOPIC_EXCHANGE,
                &routing_key,
                BasicPublishOptions::default(),
                &body,
                properties,
            )
            .await?;

        debug!(exchange = TOPIC_EXCHANGE, key = %routing_key, bytes = body.len(), "Published message");
        Ok(())
    }

    /// Caps unacknowledged deliveries on this channel (per-consumer, not global).
    ///
    /// # Errors
    ///
    /// Returns the underlying AMQP error.
    pub async fn set_prefetch(&self, count: u16) -> Result<(), BusError> {
        self.inner
            .basic_qos(count, BasicQosOptions { global: false })
            .await?;
        Ok(())
    }

    /// Starts a manual-ack consume session on `queue`.
    ///
    /// # Errors
    ///
    /// Returns the underlying AMQP error.
    pub async fn consume(&self, queue: &str, tag: &str) -> Result<lapin::Consumer, BusError> {
        let consumer = self
            .inner
            .basic_consume(
                queue,
                tag,
                BasicConsumeOptions {
                    no_local: false,
                    no_ack: false,
                    exclusive: false,
                    nowait: false,
                },
                FieldTable::default(),
            )
            .await?;
        Ok(consumer)
    }

    /// Cancels a consumer registered on this channel.
    ///
    /// # Errors
    ///
    /// Returns the underlying AMQP error.
    pub async fn cancel(&self, tag: &str) -> Result<(), BusError> {
        self.inner
            .basic_cancel(tag, BasicCancelOptions::default())
            .await?;
        Ok(())
    }
}

/// Builds the effective routing key for a logical key.
fn routed_key(server_tag: &str, key: &str) -> String {
    format!("{ROUTING_PREFIX}.{server_tag}.{key}")
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routed_key() {
        assert_eq!(
            routed_key("PROD-1", "portfolio.trigger_events"),
            "marvin.PROD-1.portfolio.trigger_events"
        );
    }

    #[test]
    fn test_unix_now_is_positive() {
        assert!(unix_now() > 0);
    }
}
