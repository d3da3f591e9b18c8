//! Shared adapter-facing types.

use std::collections::HashMap;
use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// An exchange-side currency code, e.g. `BTC` or `DOGE`.
///
/// Codes are free-form on the adapter side; only the small set of reference
/// currencies is enumerated (in the engine). Wraps a `String` so it can key
/// balance and price maps cheaply.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CurrencyCode(String);

impl CurrencyCode {
    /// Creates a code from any string-like value.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the code as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CurrencyCode {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for CurrencyCode {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A tradable pair in an adapter's symbol catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    /// Base currency.
    pub base: CurrencyCode,
    /// Quote currency.
    pub quote: CurrencyCode,
}

impl Symbol {
    /// Creates a symbol from base and quote codes.
    #[must_use]
    pub fn new(base: impl Into<CurrencyCode>, quote: impl Into<CurrencyCode>) -> Self {
        Self {
            base: base.into(),
            quote: quote.into(),
        }
    }

    /// Concatenated text form used to look instruments up, e.g. `ETHUSDT`.
    #[must_use]
    pub fn text(&self) -> String {
        format!("{}{}", self.base, self.quote)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.base, self.quote)
    }
}

/// A single currency balance on an exchange account.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    /// Funds available for withdrawal or trading.
    pub available: Decimal,
}

impl Balance {
    /// Creates a balance with the given available amount.
    #[must_use]
    pub const fn new(available: Decimal) -> Self {
        Self { available }
    }
}

/// A full balance snapshot, as delivered by adapters.
pub type BalanceSet = HashMap<CurrencyCode, Balance>;

/// Exchange API credentials.
#[derive(Clone)]
pub struct Auth {
    /// API key.
    pub key: String,
    /// API secret.
    pub secret: String,
    /// Extra passphrase required by some exchanges.
    pub passphrase: Option<String>,
}

impl Auth {
    /// Creates credentials from key and secret.
    #[must_use]
    pub fn new(key: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            secret: secret.into(),
            passphrase: None,
        }
    }

    /// Sets the passphrase.
    #[must_use]
    pub fn with_passphrase(mut self, passphrase: impl Into<String>) -> Self {
        self.passphrase = Some(passphrase.into());
        self
    }
}

// Secrets stay out of logs.
impl fmt::Debug for Auth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Auth")
            .field("key", &self.key)
            .field("secret", &"<redacted>")
            .field("passphrase", &self.passphrase.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_symbol_text() {
        let symbol = Symbol::new("ETH", "USDT");
        assert_eq!(symbol.text(), "ETHUSDT");
        assert_eq!(format!("{symbol}"), "ETHUSDT");
    }

    #[test]
    fn test_currency_code_serde_transparent() {
        let code = CurrencyCode::new("DOGE");
        let json = serde_json::to_string(&code).unwrap();
        assert_eq!(json, "\"DOGE\"");
    }

    #[test]
    fn test_auth_debug_redacts_secrets() {
        let auth = Auth::new("key", "hunter2").with_passphrase("opensesame");
        let output = format!("{auth:?}");
        assert!(!output.contains("hunter2"));
        assert!(!output.contains("opensesame"));
        assert!(output.contains("<redacted>"));
    }

    #[test]
    fn test_balance_set() {
        let mut balances = BalanceSet::new();
        balances.insert(CurrencyCode::new("BTC"), Balance::new(dec!(0.5)));
        assert_eq!(
            balances[&CurrencyCode::new("BTC")].available,
            dec!(0.5)
        );
    }
}
