//! Reference currencies.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sirocco_gateway::CurrencyCode;
use thiserror::Error;

/// Rejected reference-currency text.
#[derive(Debug, Error)]
#[error("invalid reference currency: {0}")]
pub struct InvalidCurrency(pub String);

/// The closed set of currencies every balance is re-priced into.
///
/// Serialized as uppercase text; unknown values reject the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReferenceCurrency {
    /// Tether.
    Usdt,
    /// Bitcoin.
    Btc,
}

impl ReferenceCurrency {
    /// All reference currencies, in pricing order.
    pub const ALL: [Self; 2] = [Self::Usdt, Self::Btc];

    /// Returns the uppercase text form.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Usdt => "USDT",
            Self::Btc => "BTC",
        }
    }

    /// Returns the exchange-side currency code.
    #[must_use]
    pub fn code(&self) -> CurrencyCode {
        CurrencyCode::new(self.as_str())
    }
}

impl fmt::Display for ReferenceCurrency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ReferenceCurrency {
    type Err = InvalidCurrency;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "USDT" => Ok(Self::Usdt),
            "BTC" => Ok(Self::Btc),
            other => Err(InvalidCurrency(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serde_uppercase() {
        assert_eq!(
            serde_json::to_string(&ReferenceCurrency::Usdt).unwrap(),
            "\"USDT\""
        );
        let parsed: ReferenceCurrency = serde_json::from_str("\"BTC\"").unwrap();
        assert_eq!(parsed, ReferenceCurrency::Btc);
    }

    #[test]
    fn test_serde_rejects_unknown() {
        let result: Result<ReferenceCurrency, _> = serde_json::from_str("\"DOGE\"");
        assert!(result.is_err());
    }

    #[test]
    fn test_from_str() {
        assert_eq!("USDT".parse::<ReferenceCurrency>().unwrap(), ReferenceCurrency::Usdt);
        assert_eq!("BTC".parse::<ReferenceCurrency>().unwrap(), ReferenceCurrency::Btc);
        assert!("usdt".parse::<ReferenceCurrency>().is_err());
        assert!("ETH".parse::<ReferenceCurrency>().is_err());
    }

    #[test]
    fn test_code() {
        assert_eq!(ReferenceCurrency::Btc.code().as_str(), "BTC");
    }
}
