//! Outgoing trigger events.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::trigger::TriggerSettings;

/// Payload published to `portfolio.trigger_events` when a trigger fires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerEvent {
    /// Owning portfolio name.
    pub portfolio: String,

    /// Fire time, Unix seconds.
    pub timestamp: i64,

    /// The value the trigger fired on: the total cost for
    /// cost-reached-limit, the deviation percentage for
    /// cost-changed-by-percent.
    pub current_value: Decimal,

    /// Snapshot of the trigger's settings at fire time.
    pub trigger_settings: TriggerSettings,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::currency::ReferenceCurrency;
    use crate::trigger::TriggerKind;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    #[test]
    fn test_event_json_shape() {
        let id = Uuid::new_v4();
        let event = TriggerEvent {
            portfolio: "main".to_string(),
            timestamp: 1_700_000_000,
            current_value: dec!(120),
            trigger_settings: TriggerSettings {
                id,
                kind: TriggerKind::CostReachedLimit,
                created_at: 1_699_999_000,
                currency: ReferenceCurrency::Usdt,
                limit: Some(dec!(100)),
                percent: None,
                start_total_cost: None,
                trailing_alert: false,
            },
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["portfolio"], "main");
        assert_eq!(json["timestamp"], 1_700_000_000);
        assert_eq!(json["current_value"], "120");

        let settings = &json["trigger_settings"];
        assert_eq!(settings["id"], id.to_string());
        assert_eq!(settings["type"], "COST_REACHED_LIMIT");
        assert_eq!(settings["currency"], "USDT");
        assert_eq!(settings["limit"], "100");
        assert_eq!(settings["trailing_alert"], false);
        // Unset thresholds stay off the wire.
        assert!(settings.get("percent").is_none());
        assert!(settings.get("start_total_cost").is_none());
    }
}
