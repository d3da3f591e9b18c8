//! Trigger contract and variants.
//!
//! A trigger is a predicate over a portfolio's total cost in one reference
//! currency. The portfolio worker evaluates every attached trigger on each
//! balance update; a fired trigger emits an event, and a finished one is
//! retired from the store and from memory.

mod cost_changed_by_percent;
mod cost_reached_limit;

pub use cost_changed_by_percent::CostChangedByPercent;
pub use cost_reached_limit::CostReachedLimit;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::currency::ReferenceCurrency;
use crate::data::DataHolder;
use crate::error::PortfolioError;
use crate::ports::{NewTrigger, StoredTrigger, TriggerRepository};

/// Rejected trigger-kind text.
#[derive(Debug, Error)]
#[error("invalid trigger type: {0}")]
pub struct InvalidTriggerKind(pub String);

/// Type discriminator of a trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerKind {
    /// Fires once when the total cost reaches a limit.
    #[serde(rename = "COST_REACHED_LIMIT")]
    CostReachedLimit,

    /// Fires when the total cost deviates from an anchor by a percentage.
    #[serde(rename = "COST_CHANGED_BY_PERCENT")]
    CostChangedByPercent,
}

impl TriggerKind {
    /// Returns the wire/storage text form.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::CostReachedLimit => "COST_REACHED_LIMIT",
            Self::CostChangedByPercent => "COST_CHANGED_BY_PERCENT",
        }
    }
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TriggerKind {
    type Err = InvalidTriggerKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "COST_REACHED_LIMIT" => Ok(Self::CostReachedLimit),
            "COST_CHANGED_BY_PERCENT" => Ok(Self::CostChangedByPercent),
            other => Err(InvalidTriggerKind(other.to_string())),
        }
    }
}

/// Outcome of one trigger evaluation.
///
/// `fired` reports that the predicate held and an event should be emitted;
/// `done` reports that the trigger wants to be retired. The two coincide for
/// one-shot triggers and diverge for trailing alerts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExecutionStatus {
    /// The predicate held.
    pub fired: bool,
    /// The trigger should be deleted from store and memory.
    pub done: bool,
    /// The evaluated value: a total cost or a deviation percentage.
    pub current_value: Decimal,
}

/// Evaluation environment handed to a trigger.
///
/// Triggers read totals and persist their own state through this context;
/// they never hold a reference back to the portfolio.
pub struct TriggerContext<'a> {
    /// The owning portfolio's snapshot holder.
    pub data: &'a DataHolder,
    /// The trigger store, for trailing-anchor updates.
    pub repo: &'a dyn TriggerRepository,
}

/// A registered trigger.
#[async_trait]
pub trait Trigger: Send + Sync {
    /// Globally unique, lifetime-stable identity.
    fn id(&self) -> Uuid;

    /// Flat settings record used for HTTP responses and event payloads.
    fn settings(&self) -> TriggerSettings;

    /// Evaluates the predicate against the current totals.
    ///
    /// # Errors
    ///
    /// Returns [`PortfolioError`] when the trigger state is unusable or a
    /// trailing-anchor update fails; the caller logs and keeps the trigger.
    async fn try_execute(
        &mut self,
        ctx: &TriggerContext<'_>,
    ) -> Result<ExecutionStatus, PortfolioError>;
}

/// Flat view of a trigger's configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerSettings {
    /// Trigger identity.
    pub id: Uuid,

    /// Type discriminator.
    #[serde(rename = "type")]
    pub kind: TriggerKind,

    /// Creation time, Unix seconds.
    pub created_at: i64,

    /// Target reference currency.
    pub currency: ReferenceCurrency,

    /// Threshold of the cost-reached-limit kind.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<Decimal>,

    /// Threshold of the cost-changed-by-percent kind.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percent: Option<Decimal>,

    /// Anchor of the cost-changed-by-percent kind.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_total_cost: Option<Decimal>,

    /// Whether the trigger re-arms after firing.
    #[serde(default)]
    pub trailing_alert: bool,
}

impl TriggerSettings {
    /// Converts the settings into an insertable row for `portfolio_id`.
    #[must_use]
    pub fn into_row(self, portfolio_id: i64) -> NewTrigger {
        NewTrigger {
            id: self.id,
            portfolio_id,
            kind: self.kind.as_str().to_string(),
            currency: self.currency.as_str().to_string(),
            created_at: DateTime::<Utc>::from_timestamp(self.created_at, 0)
                .unwrap_or_else(Utc::now),
            limit: self.limit,
            percent: self.percent,
            start_total_cost: self.start_total_cost,
            trailing_alert: self.trailing_alert,
        }
    }
}

/// Re-hydrates a trigger from its stored row.
///
/// Returns `Ok(None)` for unknown kind text so callers can skip rows written
/// by newer deployments.
///
/// # Errors
///
/// Returns [`PortfolioError::InvalidTrigger`] when the currency text is not
/// a reference currency or a required threshold is missing.
pub fn from_stored(row: &StoredTrigger) -> Result<Option<Box<dyn Trigger>>, PortfolioError> {
    let Ok(kind) = row.kind.parse::<TriggerKind>() else {
        return Ok(None);
    };

    let currency: ReferenceCurrency = row.currency.parse().map_err(|_| {
        PortfolioError::InvalidTrigger(format!(
            "invalid currency {:?} on trigger {}",
            row.currency, row.id
        ))
    })?;

    let trigger: Box<dyn Trigger> = match kind {
        TriggerKind::CostReachedLimit => {
            let limit = row.limit.ok_or_else(|| {
                PortfolioError::InvalidTrigger(format!("limit is required on trigger {}", row.id))
            })?;
            Box::new(CostReachedLimit::restore(
                row.id,
                currency,
                limit,
                row.created_at,
            ))
        }
        TriggerKind::CostChangedByPercent => {
            let percent = row.percent.ok_or_else(|| {
                PortfolioError::InvalidTrigger(format!(
                    "percent is required on trigger {}",
                    row.id
                ))
            })?;
            let anchor = row.start_total_cost.ok_or_else(|| {
                PortfolioError::InvalidTrigger(format!(
                    "start total cost is required on trigger {}",
                    row.id
                ))
            })?;
            Box::new(CostChangedByPercent::restore(
                row.id,
                currency,
                percent,
                anchor,
                row.trailing_alert,
                row.created_at,
            ))
        }
    };

    Ok(Some(trigger))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn stored(kind: &str) -> StoredTrigger {
        StoredTrigger {
            id: Uuid::new_v4(),
            kind: kind.to_string(),
            currency: "USDT".to_string(),
            created_at: Utc::now(),
            limit: Some(dec!(100)),
            percent: Some(dec!(5)),
            start_total_cost: Some(dec!(1000)),
            trailing_alert: true,
        }
    }

    #[test]
    fn test_kind_text_roundtrip() {
        for kind in [TriggerKind::CostReachedLimit, TriggerKind::CostChangedByPercent] {
            assert_eq!(kind.as_str().parse::<TriggerKind>().unwrap(), kind);
        }
        assert!("PRICE_ALERT".parse::<TriggerKind>().is_err());
    }

    #[test]
    fn test_from_stored_restores_both_kinds() {
        let crl = from_stored(&stored("COST_REACHED_LIMIT")).unwrap().unwrap();
        assert_eq!(crl.settings().kind, TriggerKind::CostReachedLimit);
        assert_eq!(crl.settings().limit, Some(dec!(100)));

        let ccbp = from_stored(&stored("COST_CHANGED_BY_PERCENT"))
            .unwrap()
            .unwrap();
        assert_eq!(ccbp.settings().kind, TriggerKind::CostChangedByPercent);
        assert_eq!(ccbp.settings().start_total_cost, Some(dec!(1000)));
        assert!(ccbp.settings().trailing_alert);
    }

    #[test]
    fn test_from_stored_skips_unknown_kind() {
        assert!(from_stored(&stored("PRICE_ALERT")).unwrap().is_none());
    }

    #[test]
    fn test_from_stored_rejects_bad_currency() {
        let mut row = stored("COST_REACHED_LIMIT");
        row.currency = "DOGE".to_string();
        assert!(matches!(
            from_stored(&row),
            Err(PortfolioError::InvalidTrigger(_))
        ));
    }

    #[test]
    fn test_from_stored_rejects_missing_threshold() {
        let mut row = stored("COST_REACHED_LIMIT");
        row.limit = None;
        assert!(from_stored(&row).is_err());

        let mut row = stored("COST_CHANGED_BY_PERCENT");
        row.start_total_cost = None;
        assert!(from_stored(&row).is_err());
    }
}
