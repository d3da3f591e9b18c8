//! Re-priced snapshot and its holder.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sirocco_gateway::CurrencyCode;

use crate::currency::ReferenceCurrency;
use crate::ports::{CacheError, SnapshotCache};

/// A value per reference currency.
pub type ConvertedTo = HashMap<ReferenceCurrency, Decimal>;

/// A portfolio's re-priced snapshot, cached under `portfolio:<name>`.
///
/// Redundant with the relational store; losing it never corrupts trigger
/// semantics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Data {
    /// Unit price of every balance currency in each reference currency.
    pub prices: HashMap<CurrencyCode, ConvertedTo>,

    /// Cost breakdown of the balances.
    pub balance: BalanceBreakdown,
}

/// Per-currency costs and their sums.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BalanceBreakdown {
    /// Summed cost per reference currency.
    pub total: ConvertedTo,

    /// Cost of each balance currency in each reference currency.
    pub details: HashMap<CurrencyCode, ConvertedTo>,
}

/// Cache-backed snapshot holder with a hot in-memory total view.
///
/// Only the portfolio's worker writes; triggers read totals through
/// [`DataHolder::total_balance`] under that single-writer discipline, so a
/// plain read lock suffices.
pub struct DataHolder {
    portfolio: String,
    cache: Arc<dyn SnapshotCache>,
    totals: RwLock<ConvertedTo>,
}

impl DataHolder {
    /// Creates a holder for `portfolio`.
    #[must_use]
    pub fn new(portfolio: impl Into<String>, cache: Arc<dyn SnapshotCache>) -> Self {
        Self {
            portfolio: portfolio.into(),
            cache,
            totals: RwLock::new(ConvertedTo::new()),
        }
    }

    /// Reads the cached snapshot; `None` when nothing is cached yet.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] on cache failure.
    pub async fn get(&self) -> Result<Option<Data>, CacheError> {
        self.cache.get(&self.portfolio).await
    }

    /// Persists the snapshot and refreshes the hot total view.
    ///
    /// The hot view is updated first so triggers observe the new totals even
    /// if the cache write fails.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] on cache failure.
    pub async fn save(&self, data: &Data) -> Result<(), CacheError> {
        *self.totals.write() = data.balance.total.clone();
        self.cache.save(&self.portfolio, data).await
    }

    /// Removes the cached snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] on cache failure.
    pub async fn delete(&self) -> Result<(), CacheError> {
        self.cache.delete(&self.portfolio).await
    }

    /// O(1) read of the last committed total for `currency`.
    #[must_use]
    pub fn total_balance(&self, currency: ReferenceCurrency) -> Decimal {
        self.totals
            .read()
            .get(&currency)
            .copied()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::MemoryCache;
    use rust_decimal_macros::dec;

    fn sample_data() -> Data {
        let mut data = Data::default();
        data.prices.insert(
            CurrencyCode::new("ETH"),
            ConvertedTo::from([
                (ReferenceCurrency::Usdt, dec!(200)),
                (ReferenceCurrency::Btc, dec!(0.05)),
            ]),
        );
        data.balance.details.insert(
            CurrencyCode::new("ETH"),
            ConvertedTo::from([
                (ReferenceCurrency::Usdt, dec!(400)),
                (ReferenceCurrency::Btc, dec!(0.1)),
            ]),
        );
        data.balance.total = ConvertedTo::from([
            (ReferenceCurrency::Usdt, dec!(400)),
            (ReferenceCurrency::Btc, dec!(0.1)),
        ]);
        data
    }

    #[tokio::test]
    async fn test_save_updates_hot_totals() {
        let holder = DataHolder::new("acc", Arc::new(MemoryCache::default()));
        assert_eq!(
            holder.total_balance(ReferenceCurrency::Usdt),
            Decimal::ZERO
        );

        holder.save(&sample_data()).await.unwrap();

        assert_eq!(holder.total_balance(ReferenceCurrency::Usdt), dec!(400));
        assert_eq!(holder.total_balance(ReferenceCurrency::Btc), dec!(0.1));
    }

    #[tokio::test]
    async fn test_get_roundtrip_and_delete() {
        let holder = DataHolder::new("acc", Arc::new(MemoryCache::default()));
        assert!(holder.get().await.unwrap().is_none());

        let data = sample_data();
        holder.save(&data).await.unwrap();
        assert_eq!(holder.get().await.unwrap(), Some(data));

        holder.delete().await.unwrap();
        assert!(holder.get().await.unwrap().is_none());
    }

    #[test]
    fn test_snapshot_json_shape() {
        let json = serde_json::to_value(sample_data()).unwrap();
        assert_eq!(json["prices"]["ETH"]["USDT"], "200");
        assert_eq!(json["balance"]["details"]["ETH"]["BTC"], "0.1");
        assert_eq!(json["balance"]["total"]["USDT"], "400");
    }
}
