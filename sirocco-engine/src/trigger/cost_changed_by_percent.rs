//! Deviation trigger.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use super::{ExecutionStatus, Trigger, TriggerContext, TriggerKind, TriggerSettings};
use crate::currency::ReferenceCurrency;
use crate::error::PortfolioError;

/// Fires when the portfolio's total cost deviates from `start_total_cost`
/// by at least `percent` percent, in either direction.
///
/// With `trailing_alert` the trigger is perpetual: each fire replaces the
/// anchor with the current total, in the store first and then in memory, and
/// the trigger stays armed. Without it the trigger retires on fire.
pub struct CostChangedByPercent {
    id: Uuid,
    currency: ReferenceCurrency,
    percent: Decimal,
    start_total_cost: Decimal,
    trailing_alert: bool,
    created_at: DateTime<Utc>,
}

impl CostChangedByPercent {
    /// Creates a new trigger anchored at `start_total_cost` with a fresh
    /// identity. Callers seed the anchor from the portfolio's current total.
    #[must_use]
    pub fn new(
        currency: ReferenceCurrency,
        percent: Decimal,
        trailing_alert: bool,
        start_total_cost: Decimal,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            currency,
            percent,
            start_total_cost,
            trailing_alert,
            created_at: Utc::now(),
        }
    }

    /// Re-hydrates a trigger from stored state.
    #[must_use]
    pub fn restore(
        id: Uuid,
        currency: ReferenceCurrency,
        percent: Decimal,
        start_total_cost: Decimal,
        trailing_alert: bool,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            currency,
            percent,
            start_total_cost,
            trailing_alert,
            created_at,
        }
    }
}

#[async_trait]
impl Trigger for CostChangedByPercent {
    fn id(&self) -> Uuid {
        self.id
    }

    fn settings(&self) -> TriggerSettings {
        TriggerSettings {
            id: self.id,
            kind: TriggerKind::CostChangedByPercent,
            created_at: self.created_at.timestamp(),
            currency: self.currency,
            limit: None,
            percent: Some(self.percent),
            start_total_cost: Some(self.start_total_cost),
            trailing_alert: self.trailing_alert,
        }
    }

    async fn try_execute(
        &mut self,
        ctx: &TriggerContext<'_>,
    ) -> Result<ExecutionStatus, PortfolioError> {
        if self.start_total_cost <= Decimal::ZERO {
            return Err(PortfolioError::InvalidTrigger(format!(
                "trigger {} has non-positive anchor {}",
                self.id, self.start_total_cost
            )));
        }

        let total = ctx.data.total_balance(self.currency);
        let deviation =
            (total - self.start_total_cost).abs() / self.start_total_cost * Decimal::ONE_HUNDRED;
        let fired = deviation >= self.percent;

        // Trailing re-arm: the new anchor reaches the store before memory,
        // so a crash in between restores a consistent (already advanced)
        // anchor. On store failure both sides keep the old anchor.
        if fired && self.trailing_alert {
            ctx.repo.update_start_total_cost(self.id, total).await?;
            self.start_total_cost = total;
        }

        Ok(ExecutionStatus {
            fired,
            done: fired && !self.trailing_alert,
            current_value: deviation,
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

    async fn set_total(holder: &DataHolder, total: Decimal) {
        let mut data = Data::default();
        data.balance.total.insert(ReferenceCurrency::Usdt, total);
        holder.save(&data).await.unwrap();
    }

    #[tokio::test]
    async fn test_one_shot_fire_and_deviation_value() {
        let holder = DataHolder::new("acc", Arc::new(MemoryCache::default()));
        let repo = MemoryRepository::default();
        let ctx = TriggerContext {
            data: &holder,
            repo: &repo,
        };
        let mut trigger =
            CostChangedByPercent::new(ReferenceCurrency::Usdt, dec!(10), false, dec!(100));

        set_total(&holder, dec!(105)).await;
        let status = trigger.try_execute(&ctx).await.unwrap();
        assert!(!status.fired);
        assert_eq!(status.current_value, dec!(5));

        // Downward deviation counts too.
        set_total(&holder, dec!(90)).await;
        let status = trigger.try_execute(&ctx).await.unwrap();
        assert!(status.fired);
        assert!(status.done);
        assert_eq!(status.current_value, dec!(10));
        // One-shot triggers never touch the stored anchor.
        assert!(repo.anchor_updates().is_empty());
    }

    #[tokio::test]
    async fn test_trailing_advances_anchor() {
        let holder = DataHolder::new("acc", Arc::new(MemoryCache::default()));
        let repo = MemoryRepository::default();
        let ctx = TriggerContext {
            data: &holder,
            repo: &repo,
        };
        let mut trigger =
            CostChangedByPercent::new(ReferenceCurrency::Usdt, dec!(10), true, dec!(100));

        set_total(&holder, dec!(110)).await;
        let status = trigger.try_execute(&ctx).await.unwrap();
        assert!(status.fired);
        assert!(!status.done);
        assert_eq!(repo.anchor_updates(), vec![(trigger.id(), dec!(110))]);
        assert_eq!(trigger.settings().start_total_cost, Some(dec!(110)));

        // 110 -> 115 is under 10% of the new anchor.
        set_total(&holder, dec!(115)).await;
        let status = trigger.try_execute(&ctx).await.unwrap();
        assert!(!status.fired);

        // 110 -> 121 reaches 10% and re-arms at 121.
        set_total(&holder, dec!(121)).await;
        let status = trigger.try_execute(&ctx).await.unwrap();
        assert!(status.fired);
        assert_eq!(
            repo.anchor_updates(),
            vec![(trigger.id(), dec!(110)), (trigger.id(), dec!(121))]
        );
        assert_eq!(trigger.settings().start_total_cost, Some(dec!(121)));
    }

    #[tokio::test]
    async fn test_trailing_keeps_anchor_on_store_failure() {
        let holder = DataHolder::new("acc", Arc::new(MemoryCache::default()));
        let repo = MemoryRepository::default();
        repo.fail_anchor_updates();
        let ctx = TriggerContext {
            data: &holder,
            repo: &repo,
        };
        let mut trigger =
            CostChangedByPercent::new(ReferenceCurrency::Usdt, dec!(10), true, dec!(100));

        set_total(&holder, dec!(120)).await;
        let result = trigger.try_execute(&ctx).await;
        assert!(result.is_err());
        assert_eq!(trigger.settings().start_total_cost, Some(dec!(100)));
    }

    #[tokio::test]
    async fn test_non_positive_anchor_is_an_error() {
        let holder = DataHolder::new("acc", Arc::new(MemoryCache::default()));
        let repo = MemoryRepository::default();
        let ctx = TriggerContext {
            data: &holder,
            repo: &repo,
        };
        let mut trigger =
            CostChangedByPercent::new(ReferenceCurrency::Usdt, dec!(10), false, Decimal::ZERO);

        let result = trigger.try_execute(&ctx).await;
        assert!(matches!(result, Err(PortfolioError::InvalidTrigger(_))));
    }
}
