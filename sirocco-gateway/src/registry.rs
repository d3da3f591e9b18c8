//! Adapter registry.

use std::collections::HashMap;
use std::sync::Arc;

use crate::traits::Gateway;

/// Name-keyed set of configured exchange adapters.
///
/// Built once at boot and shared read-only afterwards. Accounts that
/// reference an unregistered exchange are skipped by the portfolio manager;
/// a separate deployment owns those exchanges.
#[derive(Default)]
pub struct GatewayRegistry {
    gateways: HashMap<String, Arc<dyn Gateway>>,
}

impl GatewayRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an adapter under its own name.
    pub fn register(&mut self, gateway: Arc<dyn Gateway>) {
        self.gateways.insert(gateway.name().to_string(), gateway);
    }

    /// Returns the adapter registered under `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Gateway>> {
        self.gateways.get(name).cloned()
    }

    /// Returns the registered adapter names.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.gateways.keys().map(String::as_str).collect()
    }

    /// Returns true if no adapter is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.gateways.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockGateway;

    #[test]
    fn test_register_and_get() {
        let mut registry = GatewayRegistry::new();
        assert!(registry.is_empty());

        registry.register(Arc::new(MockGateway::new("Binance.PROD")));

        assert!(registry.get("Binance.PROD").is_some());
        assert!(registry.get("Mars").is_none());
        assert_eq!(registry.names(), vec!["Binance.PROD"]);
    }
}
