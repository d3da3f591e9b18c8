//! # Sirocco Bus
//!
//! Message-bus transport for the Sirocco portfolio service.
//!
//! This crate provides:
//! - [`BusConnection`] - a long-lived broker session that reconnects itself
//!   with a fixed back-off when the TCP session drops
//! - [`Channel`] - a multiplexed channel wrapper with topic publishing
//! - [`ChannelPool`] - a bounded pool of channels whose `acquire` never
//!   hands out a channel already known to be closed
//!
//! Publishers acquire a pooled channel, publish, and release by dropping the
//! handle. Consumers hold a pooled channel for the lifetime of one consume
//! session and re-acquire after channel loss.

#![warn(missing_docs)]

mod channel;
mod connection;
mod error;
mod pool;

pub use channel::{Channel, ROUTING_PREFIX, TOPIC_EXCHANGE};
pub use connection::BusConnection;
pub use error::BusError;
pub use pool::{ChannelPool, PooledChannel, DEFAULT_POOL_SIZE};
