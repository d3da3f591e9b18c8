//! In-memory adapter for tests.
//!
//! Serves a fixed instrument book and symbol catalog, and lets tests drive
//! the balance stream by hand.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use tokio::sync::mpsc;

use crate::error::GatewayError;
use crate::traits::{ExchangeAccount, Gateway, Instrument};
use crate::types::{Auth, BalanceSet, Symbol};

/// A quoted instrument with a fixed price.
pub struct MockInstrument {
    bid: Decimal,
    ask: Decimal,
}

impl Instrument for MockInstrument {
    fn price(&self) -> (Decimal, Decimal) {
        (self.bid, self.ask)
    }
}

/// Scripted exchange account.
pub struct MockAccount {
    balances: Mutex<BalanceSet>,
    subscribers: Mutex<Vec<mpsc::Sender<BalanceSet>>>,
    released: AtomicBool,
}

impl MockAccount {
    /// Creates an account holding `balances`.
    #[must_use]
    pub fn new(balances: BalanceSet) -> Arc<Self> {
        Arc::new(Self {
            balances: Mutex::new(balances),
            subscribers: Mutex::new(Vec::new()),
            released: AtomicBool::new(false),
        })
    }

    /// Replaces the balance snapshot and pushes it to every subscriber.
    pub async fn push_update(&self, balances: BalanceSet) {
        *self.balances.lock() = balances.clone();
        let subscribers = self.subscribers.lock().clone();
        for tx in subscribers {
            let _ = tx.send(balances.clone()).await;
        }
    }

    /// Drops all subscriber channels, simulating adapter shutdown.
    pub fn close_stream(&self) {
        self.subscribers.lock().clear();
    }

    /// Returns true once the portfolio worker released the handle.
    #[must_use]
    pub fn released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExchangeAccount for MockAccount {
    async fn balances(&self) -> Result<BalanceSet, GatewayError> {
        Ok(self.balances.lock().clone())
    }

    fn notify_balance(&self, updates: mpsc::Sender<BalanceSet>) {
        self.subscribers.lock().push(updates);
    }

    fn release(&self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

/// Scripted gateway.
pub struct MockGateway {
    name: String,
    instruments: HashMap<String, Arc<MockInstrument>>,
    symbols: Vec<Symbol>,
    account: Arc<MockAccount>,
    account_error: Option<GatewayError>,
}

impl MockGateway {
    /// Creates a gateway with an empty book and an empty account.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instruments: HashMap::new(),
            symbols: Vec::new(),
            account: MockAccount::new(BalanceSet::new()),
            account_error: None,
        }
    }

    /// Adds an instrument to the book and its pair to the catalog.
    #[must_use]
    pub fn with_instrument(
        mut self,
        base: &str,
        quote: &str,
        bid: Decimal,
        ask: Decimal,
    ) -> Self {
        let symbol = Symbol::new(base, quote);
        self.instruments
            .insert(symbol.text(), Arc::new(MockInstrument { bid, ask }));
        self.symbols.push(symbol);
        self
    }

    /// Sets the account handle returned by [`Gateway::account`].
    #[must_use]
    pub fn with_account(mut self, account: Arc<MockAccount>) -> Self {
        self.account = account;
        self
    }

    /// Makes [`Gateway::account`] fail with `error`.
    #[must_use]
    pub fn with_account_error(mut self, error: GatewayError) -> Self {
        self.account_error = Some(error);
        self
    }
}

#[async_trait]
impl Gateway for MockGateway {
    fn name(&self) -> &str {
        &self.name
    }

    async fn account(&self, _auth: Auth) -> Result<Arc<dyn ExchangeAccount>, GatewayError> {
        match &self.account_error {
            Some(error) => Err(error.clone()),
            None => Ok(self.account.clone()),
        }
    }

    fn instrument(&self, symbol: &str) -> Option<Arc<dyn Instrument>> {
        self.instruments
            .get(symbol)
            .cloned()
            .map(|i| i as Arc<dyn Instrument>)
    }

    fn all_symbols(&self) -> Vec<Symbol> {
        self.symbols.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Balance, CurrencyCode};
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_instrument_lookup() {
        let gateway = MockGateway::new("Test").with_instrument("ETH", "USDT", dec!(199), dec!(200));

        let instrument = gateway.instrument("ETHUSDT").unwrap();
        assert_eq!(instrument.price(), (dec!(199), dec!(200)));
        assert!(gateway.instrument("DOGEUSDT").is_none());
        assert_eq!(gateway.all_symbols(), vec![Symbol::new("ETH", "USDT")]);
    }

    #[tokio::test]
    async fn test_account_stream() {
        let account = MockAccount::new(BalanceSet::new());
        let (tx, mut rx) = mpsc::channel(4);
        account.notify_balance(tx);

        let mut update = BalanceSet::new();
        update.insert(CurrencyCode::new("BTC"), Balance::new(dec!(1)));
        account.push_update(update.clone()).await;

        assert_eq!(rx.recv().await.unwrap(), update);

        account.close_stream();
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_account_error() {
        let gateway = MockGateway::new("Test").with_account_error(GatewayError::InvalidApiKey);
        let result = gateway.account(Auth::new("k", "s")).await;
        assert!(matches!(result, Err(GatewayError::InvalidApiKey)));
    }
}
