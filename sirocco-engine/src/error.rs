//! Engine error surface.
//!
//! Two families: domain errors are deterministic, caller-visible business
//! conditions (mapped to HTTP 400 and rejected without requeue on the bus);
//! everything else is transient and retried or logged depending on the call
//! site.

use sirocco_gateway::GatewayError;
use thiserror::Error;

use crate::ports::{CacheError, StoreError};

/// Errors produced by the portfolio manager and runtime.
#[derive(Debug, Error)]
pub enum PortfolioError {
    /// No account row exists under the requested name.
    #[error("account not found: {0}")]
    AccountNotFound(String),

    /// No live portfolio is registered under the requested name.
    #[error("portfolio not found: {0}")]
    NotFound(String),

    /// A portfolio is already registered under the requested name.
    #[error("portfolio already exists: {0}")]
    AlreadyExists(String),

    /// The exchange deterministically rejected the account's credentials.
    #[error("gateway rejected account {account}: {source}")]
    Gateway {
        /// Account name.
        account: String,
        /// Adapter rejection.
        #[source]
        source: GatewayError,
    },

    /// Transient adapter failure.
    #[error("exchange adapter failure for account {account}: {source}")]
    Adapter {
        /// Account name.
        account: String,
        /// Adapter failure.
        #[source]
        source: GatewayError,
    },

    /// Relational store failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Snapshot cache failure.
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// A trigger row or trigger state is unusable.
    #[error("invalid trigger: {0}")]
    InvalidTrigger(String),
}

impl PortfolioError {
    /// Returns true for the closed set of deterministic business conditions.
    ///
    /// Domain errors are surfaced unchanged to HTTP (400) and rejected
    /// without requeue by the bus consumer; replaying them cannot help.
    #[must_use]
    pub const fn is_domain(&self) -> bool {
        matches!(
            self,
            Self::AccountNotFound(_)
                | Self::NotFound(_)
                | Self::AlreadyExists(_)
                | Self::Gateway { .. }
        )
    }
}
