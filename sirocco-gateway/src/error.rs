//! Adapter error surface.

use thiserror::Error;

/// Errors surfaced by exchange adapters.
///
/// `InvalidApiKey` and `MarketClosed` are deterministic rejections of an
/// account's credentials or market state; everything else is transient.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// The exchange rejected the supplied API credentials.
    #[error("invalid API key")]
    InvalidApiKey,

    /// The market is closed and the account cannot be opened.
    #[error("market is closed")]
    MarketClosed,

    /// Any transport or exchange-side failure.
    #[error("exchange transport error: {0}")]
    Transport(String),
}

impl GatewayError {
    /// Returns true for deterministic credential/market rejections.
    #[must_use]
    pub const fn is_rejection(&self) -> bool {
        matches!(self, Self::InvalidApiKey | Self::MarketClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_classification() {
        assert!(GatewayError::InvalidApiKey.is_rejection());
        assert!(GatewayError::MarketClosed.is_rejection());
        assert!(!GatewayError::Transport("timeout".to_string()).is_rejection());
    }
}
