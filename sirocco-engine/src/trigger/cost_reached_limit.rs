//! Limit trigger.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use super::{ExecutionStatus, Trigger, TriggerContext, TriggerKind, TriggerSettings};
use crate::currency::ReferenceCurrency;
use crate::error::PortfolioError;

/// Fires once when the portfolio's total cost in the target currency
/// reaches `limit`. Always retires itself on fire.
pub struct CostReachedLimit {
    id: Uuid,
    currency: ReferenceCurrency,
    limit: Decimal,
    created_at: DateTime<Utc>,
}

impl CostReachedLimit {
    /// Creates a new trigger with a fresh identity.
    #[must_use]
    pub fn new(currency: ReferenceCurrency, limit: Decimal) -> Self {
        Self {
            id: Uuid::new_v4(),
            currency,
            limit,
            created_at: Utc::now(),
        }
    }

    /// Re-hydrates a trigger from stored state.
    #[must_use]
    pub fn restore(
        id: Uuid,
        currency: ReferenceCurrency,
        limit: Decimal,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            currency,
            limit,
            created_at,
        }
    }
}

#[async_trait]
impl Trigger for CostReachedLimit {
    fn id(&self) -> Uuid {
        self.id
    }

    fn settings(&self) -> TriggerSettings {
        TriggerSettings {
            id: self.id,
            kind: TriggerKind::CostReachedLimit,
            created_at: self.created_at.timestamp(),
            currency: self.currency,
            limit: Some(self.limit),
            percent: None,
            start_total_cost: None,
            trailing_alert: false,
        }
    }

    async fn try_execute(
        &mut self,
        ctx: &TriggerContext<'_>,
    ) -> Result<ExecutionStatus, PortfolioError> {
        let total = ctx.data.total_balance(self.currency);
        let fired = total >= self.limit;
        Ok(ExecutionStatus {
            fired,
            done: fired,
            current_value: total,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Data, DataHolder};
    use crate::testutil::{MemoryCache, MemoryRepository};
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    async fn holder_with_total(total: Decimal) -> DataHolder {
        let holder = DataHolder::new("acc", Arc::new(MemoryCache::default()));
        let mut data = Data::default();
        data.balance
            .total
            .insert(ReferenceCurrency::Usdt, total);
        holder.save(&data).await.unwrap();
        holder
    }

    #[tokio::test]
    async fn test_fires_at_and_above_limit() {
        let repo = MemoryRepository::default();

        for (total, expect_fired) in [
            (dec!(99.99), false),
            (dec!(100), true),
            (dec!(120), true),
        ] {
            let holder = holder_with_total(total).await;
            let ctx = TriggerContext {
                data: &holder,
                repo: &repo,
            };
            let mut trigger = CostReachedLimit::new(ReferenceCurrency::Usdt, dec!(100));

            let status = trigger.try_execute(&ctx).await.unwrap();
            assert_eq!(status.fired, expect_fired, "total {total}");
            assert_eq!(status.done, expect_fired);
            assert_eq!(status.current_value, total);
        }
    }

    #[tokio::test]
    async fn test_settings() {
        let trigger = CostReachedLimit::new(ReferenceCurrency::Btc, dec!(2));
        let settings = trigger.settings();
        assert_eq!(settings.id, trigger.id());
        assert_eq!(settings.kind, TriggerKind::CostReachedLimit);
        assert_eq!(settings.currency, ReferenceCurrency::Btc);
        assert_eq!(settings.limit, Some(dec!(2)));
        assert_eq!(settings.percent, None);
        assert!(!settings.trailing_alert);
    }
}
