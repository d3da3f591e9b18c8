//! Transport error surface.

use thiserror::Error;

/// Errors surfaced by the message-bus transport.
#[derive(Debug, Error)]
pub enum BusError {
    /// The broker connection is down; retry after it reconnects.
    #[error("message bus connection is closed")]
    ConnectionClosed,

    /// The channel pool has been closed for good.
    #[error("channel pool is closed")]
    PoolClosed,

    /// The payload could not be serialized; nothing touched the wire.
    #[error("failed to serialize payload for routing key {key}: {source}")]
    Serialize {
        /// Logical routing key of the failed publish.
        key: String,
        /// Serializer diagnostic.
        #[source]
        source: serde_json::Error,
    },

    /// Protocol-level failure reported by the AMQP client.
    #[error(transparent)]
    Amqp(#[from] lapin::Error),
}
