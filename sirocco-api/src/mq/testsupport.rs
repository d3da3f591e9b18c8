//! In-memory wiring for API tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sirocco_engine::data::Data;
use sirocco_engine::ports::{
    AccountRecord, AccountWithTriggers, CacheError, NewTrigger, PublishError, SnapshotCache,
    StoreError, TriggerEventSink, TriggerRepository,
};
use sirocco_engine::{PortfolioManager, TriggerEvent};
use sirocco_gateway::mock::{MockAccount, MockGateway};
use sirocco_gateway::{Balance, BalanceSet, CurrencyCode, GatewayRegistry};
use uuid::Uuid;

/// Account name used by the single-account fixtures.
pub(crate) const NAME: &str = "main";

const EXCHANGE: &str = "Binance.PROD";

pub(crate) fn account_row(name: &str, exchange: &str) -> AccountWithTriggers {
    AccountWithTriggers {
        account: AccountRecord {
            id: 1,
            name: name.to_string(),
            exchange: exchange.to_string(),
            api_key: "key".to_string(),
            api_secret: "secret".to_string(),
            passphrase: None,
        },
        triggers: Vec::new(),
    }
}

/// Minimal repository fake.
#[derive(Default)]
pub(crate) struct TestRepo {
    accounts: Mutex<Vec<AccountWithTriggers>>,
    created: Mutex<HashMap<Uuid, NewTrigger>>,
    fail_lookups: AtomicBool,
}

impl TestRepo {
    pub fn fail_lookups(&self) {
        self.fail_lookups.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl TriggerRepository for TestRepo {
    async fn account_by_name(&self, name: &str) -> Result<Option<AccountRecord>, StoreError> {
        if self.fail_lookups.load(Ordering::SeqCst) {
            return Err(StoreError::new("connection reset"));
        }
        Ok(self
            .accounts
            .lock()
            .unwrap()
            .iter()
            .find(|row| row.account.name == name)
            .map(|row| row.account.clone()))
    }

    async fn accounts_with_triggers(&self) -> Result<Vec<AccountWithTriggers>, StoreError> {
        Ok(self.accounts.lock().unwrap().clone())
    }

    async fn create_triggers(&self, triggers: &[NewTrigger]) -> Result<u64, StoreError> {
        let mut created = self.created.lock().unwrap();
        for trigger in triggers {
            created.insert(trigger.id, trigger.clone());
        }
        Ok(triggers.len() as u64)
    }

    async fn delete_trigger(&self, id: Uuid) -> Result<(), StoreError> {
        self.created.lock().unwrap().remove(&id);
        Ok(())
    }

    async fn delete_portfolio_triggers(&self, portfolio_id: i64) -> Result<(), StoreError> {
        self.created
            .lock()
            .unwrap()
            .retain(|_, trigger| trigger.portfolio_id != portfolio_id);
        Ok(())
    }

    async fn update_start_total_cost(&self, id: Uuid, value: Decimal) -> Result<(), StoreError> {
        if let Some(trigger) = self.created.lock().unwrap().get_mut(&id) {
            trigger.start_total_cost = Some(value);
        }
        Ok(())
    }
}

/// Map-backed cache fake.
#[derive(Default)]
pub(crate) struct TestCache {
    entries: Mutex<HashMap<String, Data>>,
}

#[async_trait]
impl SnapshotCache for TestCache {
    async fn get(&self, portfolio: &str) -> Result<Option<Data>, CacheError> {
        Ok(self.entries.lock().unwrap().get(portfolio).cloned())
    }

    async fn save(&self, portfolio: &str, data: &Data) -> Result<(), CacheError> {
        self.entries
            .lock()
            .unwrap()
            .insert(portfolio.to_string(), data.clone());
        Ok(())
    }

    async fn delete(&self, portfolio: &str) -> Result<(), CacheError> {
        self.entries.lock().unwrap().remove(portfolio);
        Ok(())
    }
}

/// Sink that drops events.
pub(crate) struct NullSink;

#[async_trait]
impl TriggerEventSink for NullSink {
    async fn publish(&self, _event: TriggerEvent) -> Result<(), PublishError> {
        Ok(())
    }
}

/// Manager over the given account rows, all served by one mock gateway
/// holding 120 USDT.
pub(crate) fn manager_with_rows(
    rows: Vec<AccountWithTriggers>,
) -> (Arc<PortfolioManager>, Arc<TestRepo>) {
    let repo = Arc::new(TestRepo {
        accounts: Mutex::new(rows),
        ..TestRepo::default()
    });

    let balances = BalanceSet::from([(CurrencyCode::new("USDT"), Balance::new(dec!(120)))]);
    let account = MockAccount::new(balances);
    let mut registry = GatewayRegistry::new();
    registry.register(Arc::new(MockGateway::new(EXCHANGE).with_account(account)));

    let manager = Arc::new(PortfolioManager::new(
        repo.clone(),
        Arc::new(TestCache::default()),
        Arc::new(registry),
        Arc::new(NullSink),
    ));
    (manager, repo)
}

/// Manager knowing one account named [`NAME`] on the mock exchange.
pub(crate) fn manager_with_account() -> Arc<PortfolioManager> {
    let (manager, _repo) = manager_with_rows(vec![account_row(NAME, EXCHANGE)]);
    manager
}
