//! In-memory port implementations for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::data::Data;
use crate::events::TriggerEvent;
use crate::ports::{
    AccountRecord, AccountWithTriggers, CacheError, NewTrigger, PublishError, SnapshotCache,
    StoreError, TriggerEventSink, TriggerRepository,
};

/// Scripted trigger repository.
#[derive(Default)]
pub(crate) struct MemoryRepository {
    accounts: Mutex<Vec<AccountWithTriggers>>,
    created: Mutex<HashMap<Uuid, NewTrigger>>,
    deleted: Mutex<Vec<Uuid>>,
    deleted_portfolios: Mutex<Vec<i64>>,
    anchors: Mutex<Vec<(Uuid, Decimal)>>,
    fail_anchor_updates: AtomicBool,
    fail_trigger_deletes: AtomicBool,
    fail_creates: AtomicBool,
}

impl MemoryRepository {
    pub fn with_accounts(accounts: Vec<AccountWithTriggers>) -> Self {
        Self {
            accounts: Mutex::new(accounts),
            ..Self::default()
        }
    }

    pub fn fail_anchor_updates(&self) {
        self.fail_anchor_updates.store(true, Ordering::SeqCst);
    }

    pub fn fail_trigger_deletes(&self, fail: bool) {
        self.fail_trigger_deletes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_creates(&self) {
        self.fail_creates.store(true, Ordering::SeqCst);
    }

    pub fn anchor_updates(&self) -> Vec<(Uuid, Decimal)> {
        self.anchors.lock().clone()
    }

    pub fn stored_ids(&self) -> Vec<Uuid> {
        self.created.lock().keys().copied().collect()
    }

    pub fn deleted_ids(&self) -> Vec<Uuid> {
        self.deleted.lock().clone()
    }

    pub fn deleted_portfolios(&self) -> Vec<i64> {
        self.deleted_portfolios.lock().clone()
    }
}

#[async_trait]
impl TriggerRepository for MemoryRepository {
    async fn account_by_name(&self, name: &str) -> Result<Option<AccountRecord>, StoreError> {
        Ok(self
            .accounts
            .lock()
            .iter()
            .find(|row| row.account.name == name)
            .map(|row| row.account.clone()))
    }

    async fn accounts_with_triggers(&self) -> Result<Vec<AccountWithTriggers>, StoreError> {
        Ok(self.accounts.lock().clone())
    }

    async fn create_triggers(&self, triggers: &[NewTrigger]) -> Result<u64, StoreError> {
        if self.fail_creates.load(Ordering::SeqCst) {
            return Err(StoreError::new("insert failed"));
        }
        let mut created = self.created.lock();
        for trigger in triggers {
            created.insert(trigger.id, trigger.clone());
        }
        Ok(triggers.len() as u64)
    }

    async fn delete_trigger(&self, id: Uuid) -> Result<(), StoreError> {
        if self.fail_trigger_deletes.load(Ordering::SeqCst) {
            return Err(StoreError::new("delete failed"));
        }
        self.created.lock().remove(&id);
        self.deleted.lock().push(id);
        Ok(())
    }

    async fn delete_portfolio_triggers(&self, portfolio_id: i64) -> Result<(), StoreError> {
        self.created
            .lock()
            .retain(|_, trigger| trigger.portfolio_id != portfolio_id);
        self.deleted_portfolios.lock().push(portfolio_id);
        Ok(())
    }

    async fn update_start_total_cost(&self, id: Uuid, value: Decimal) -> Result<(), StoreError> {
        if self.fail_anchor_updates.load(Ordering::SeqCst) {
            return Err(StoreError::new("update failed"));
        }
        if let Some(trigger) = self.created.lock().get_mut(&id) {
            trigger.start_total_cost = Some(value);
        }
        self.anchors.lock().push((id, value));
        Ok(())
    }
}

/// Map-backed snapshot cache.
#[derive(Default)]
pub(crate) struct MemoryCache {
    entries: Mutex<HashMap<String, Data>>,
}

impl MemoryCache {
    pub fn contains(&self, portfolio: &str) -> bool {
        self.entries.lock().contains_key(portfolio)
    }
}

#[async_trait]
impl SnapshotCache for MemoryCache {
    async fn get(&self, portfolio: &str) -> Result<Option<Data>, CacheError> {
        Ok(self.entries.lock().get(portfolio).cloned())
    }

    async fn save(&self, portfolio: &str, data: &Data) -> Result<(), CacheError> {
        self.entries
            .lock()
            .insert(portfolio.to_string(), data.clone());
        Ok(())
    }

    async fn delete(&self, portfolio: &str) -> Result<(), CacheError> {
        self.entries.lock().remove(portfolio);
        Ok(())
    }
}

/// Sink that records published events.
#[derive(Default)]
pub(crate) struct RecordingSink {
    events: Mutex<Vec<TriggerEvent>>,
    fail: AtomicBool,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<TriggerEvent> {
        self.events.lock().clone()
    }

    pub fn fail_publishes(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl TriggerEventSink for RecordingSink {
    async fn publish(&self, event: TriggerEvent) -> Result<(), PublishError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(PublishError::new("broker unavailable"));
        }
        self.events.lock().push(event);
        Ok(())
    }
}
