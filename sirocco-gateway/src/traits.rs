//! Adapter capability contracts.

use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::mpsc;

use crate::error::GatewayError;
use crate::types::{Auth, BalanceSet, Symbol};

/// A connected exchange adapter.
///
/// One instance per exchange deployment (e.g. `Binance.PROD`). The symbol
/// catalog and instrument lookups are served from the adapter's in-memory
/// state and are therefore synchronous; opening an account performs network
/// I/O.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Adapter name as referenced by account rows, e.g. `Binance.PROD`.
    fn name(&self) -> &str;

    /// Opens an authenticated account handle.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidApiKey`] or
    /// [`GatewayError::MarketClosed`] on deterministic rejection, or
    /// [`GatewayError::Transport`] on transient failure.
    async fn account(&self, auth: Auth) -> Result<Arc<dyn ExchangeAccount>, GatewayError>;

    /// Looks an instrument up by its concatenated symbol text, e.g. `ETHUSDT`.
    fn instrument(&self, symbol: &str) -> Option<Arc<dyn Instrument>>;

    /// Returns the full symbol catalog, in the adapter's own order.
    fn all_symbols(&self) -> Vec<Symbol>;
}

/// A priced instrument.
pub trait Instrument: Send + Sync {
    /// Current `(bid, ask)` quote.
    fn price(&self) -> (Decimal, Decimal);
}

/// An authenticated account on an exchange.
///
/// The handle is shared between the portfolio worker (balance stream) and
/// the HTTP read path; the worker releases it when the portfolio closes.
#[async_trait]
pub trait ExchangeAccount: Send + Sync {
    /// Fetches the current balance snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError`] on adapter failure.
    async fn balances(&self) -> Result<BalanceSet, GatewayError>;

    /// Registers a push channel for balance updates.
    ///
    /// The adapter owns the producing side and drops it when it shuts down,
    /// which closes the channel for the consumer.
    fn notify_balance(&self, updates: mpsc::Sender<BalanceSet>);

    /// Releases the handle and any adapter-side resources.
    fn release(&self);
}
