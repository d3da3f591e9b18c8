//! Capability contracts consumed by the engine.
//!
//! The engine never talks to Postgres, Redis or the message bus directly;
//! it consumes these ports. Implementations live in `sirocco-store` and
//! `sirocco-api`; tests use in-memory fakes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::data::Data;
use crate::events::TriggerEvent;

/// Opaque relational-store failure. Always transient from the engine's
/// point of view.
#[derive(Debug, thiserror::Error)]
#[error("trigger store error: {source}")]
pub struct StoreError {
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
}

impl StoreError {
    /// Wraps any error raised by a store implementation.
    pub fn new(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self {
            source: source.into(),
        }
    }
}

/// Opaque snapshot-cache failure. The cache is advisory; callers log and
/// continue where the snapshot is redundant.
#[derive(Debug, thiserror::Error)]
#[error("snapshot cache error: {source}")]
pub struct CacheError {
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
}

impl CacheError {
    /// Wraps any error raised by a cache implementation.
    pub fn new(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self {
            source: source.into(),
        }
    }
}

/// Opaque event-publish failure. Logged by the portfolio worker; never
/// affects trigger retirement.
#[derive(Debug, thiserror::Error)]
#[error("event publish error: {source}")]
pub struct PublishError {
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
}

impl PublishError {
    /// Wraps any error raised by a sink implementation.
    pub fn new(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self {
            source: source.into(),
        }
    }
}

/// An account row.
#[derive(Debug, Clone)]
pub struct AccountRecord {
    /// Stable integer identity; doubles as the portfolio id.
    pub id: i64,
    /// Unique account name.
    pub name: String,
    /// Exchange-adapter name, e.g. `Binance.PROD`.
    pub exchange: String,
    /// API key.
    pub api_key: String,
    /// API secret.
    pub api_secret: String,
    /// Extra passphrase required by some exchanges.
    pub passphrase: Option<String>,
}

/// A stored trigger row, as persisted. Kind and currency stay textual here;
/// the engine parses them during restore so that unknown kinds can be
/// skipped instead of failing the whole account.
#[derive(Debug, Clone)]
pub struct StoredTrigger {
    /// Trigger identity.
    pub id: Uuid,
    /// Type discriminator text.
    pub kind: String,
    /// Target currency text.
    pub currency: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Threshold of the cost-reached-limit kind.
    pub limit: Option<Decimal>,
    /// Threshold of the cost-changed-by-percent kind.
    pub percent: Option<Decimal>,
    /// Anchor of the cost-changed-by-percent kind.
    pub start_total_cost: Option<Decimal>,
    /// Whether the trigger re-arms after firing.
    pub trailing_alert: bool,
}

/// An account row joined with its stored triggers. An account with no
/// triggers carries an empty list.
#[derive(Debug, Clone)]
pub struct AccountWithTriggers {
    /// The account row.
    pub account: AccountRecord,
    /// Stored triggers attached to the account's portfolio.
    pub triggers: Vec<StoredTrigger>,
}

/// A trigger row to insert.
#[derive(Debug, Clone)]
pub struct NewTrigger {
    /// Trigger identity.
    pub id: Uuid,
    /// Owning portfolio id.
    pub portfolio_id: i64,
    /// Type discriminator text.
    pub kind: String,
    /// Target currency text.
    pub currency: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Threshold of the cost-reached-limit kind.
    pub limit: Option<Decimal>,
    /// Threshold of the cost-changed-by-percent kind.
    pub percent: Option<Decimal>,
    /// Anchor of the cost-changed-by-percent kind.
    pub start_total_cost: Option<Decimal>,
    /// Whether the trigger re-arms after firing.
    pub trailing_alert: bool,
}

/// Named relational operations used by the engine.
#[async_trait]
pub trait TriggerRepository: Send + Sync {
    /// Fetches an account row by name; `None` when no row exists.
    async fn account_by_name(&self, name: &str) -> Result<Option<AccountRecord>, StoreError>;

    /// Fetches every account left-joined with its stored triggers.
    async fn accounts_with_triggers(&self) -> Result<Vec<AccountWithTriggers>, StoreError>;

    /// Inserts all rows atomically; returns the inserted count.
    async fn create_triggers(&self, triggers: &[NewTrigger]) -> Result<u64, StoreError>;

    /// Deletes one trigger row.
    async fn delete_trigger(&self, id: Uuid) -> Result<(), StoreError>;

    /// Deletes every trigger row of a portfolio.
    async fn delete_portfolio_triggers(&self, portfolio_id: i64) -> Result<(), StoreError>;

    /// Replaces the anchor of a cost-changed-by-percent trigger.
    async fn update_start_total_cost(&self, id: Uuid, value: Decimal) -> Result<(), StoreError>;
}

/// Key-value cache of re-priced snapshots, keyed by portfolio name.
#[async_trait]
pub trait SnapshotCache: Send + Sync {
    /// Reads the snapshot; `None` when the key is absent.
    async fn get(&self, portfolio: &str) -> Result<Option<Data>, CacheError>;

    /// Writes the snapshot with no TTL.
    async fn save(&self, portfolio: &str, data: &Data) -> Result<(), CacheError>;

    /// Removes the snapshot.
    async fn delete(&self, portfolio: &str) -> Result<(), CacheError>;
}

/// Outgoing fired-trigger events.
#[async_trait]
pub trait TriggerEventSink: Send + Sync {
    /// Publishes one event.
    async fn publish(&self, event: TriggerEvent) -> Result<(), PublishError>;
}
