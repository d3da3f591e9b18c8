//! Account lifecycle events.

use serde::{Deserialize, Serialize};

/// Queue carrying account lifecycle events.
pub const EVENT_QUEUE: &str = "portfolio.events";

/// Logical routing key of outgoing fired-trigger events.
pub const TRIGGER_EVENT_KEY: &str = "portfolio.trigger_events";

/// The account lifecycle events the consumer understands. Unknown names
/// fail envelope decoding and are rejected without requeue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountEvent {
    /// An account was created; a portfolio should start.
    #[serde(rename = "ACCOUNT_CREATED")]
    AccountCreated,

    /// An account was deleted; its portfolio should be destroyed.
    #[serde(rename = "ACCOUNT_DELETED")]
    AccountDeleted,
}

/// Incoming delivery envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountEventEnvelope {
    /// The lifecycle event.
    pub event: AccountEvent,
    /// Affected account name.
    pub account_name: String,
}
