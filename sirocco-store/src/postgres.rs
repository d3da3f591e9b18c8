//! Relational trigger repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use rust_decimal::Decimal;
use sirocco_core::config::DbConfig;
use sirocco_engine::ports::{
    AccountRecord, AccountWithTriggers, NewTrigger, StoreError, StoredTrigger, TriggerRepository,
};
use tokio_postgres::NoTls;
use tracing::info;
use uuid::Uuid;

use crate::ConnectError;

const SELECT_ACCOUNT_BY_NAME: &str = "\
    select id, name, exchange_name, key, secret, passphrase \
    from accounts where name = $1";

const SELECT_ACCOUNTS_WITH_TRIGGERS: &str = "\
    select a.id, a.name, a.exchange_name, a.key, a.secret, a.passphrase, \
           pt.id as trigger_id, pt.type, pt.currency, pt.created_at, \
           pt.\"limit\", pt.percent, pt.start_total_cost, pt.trailing_alert \
    from accounts a \
    left join portfolio_triggers pt on pt.portfolio_id = a.id \
    order by a.id";

const INSERT_TRIGGER: &str = "\
    insert into portfolio_triggers \
        (id, portfolio_id, type, currency, created_at, \"limit\", percent, start_total_cost, trailing_alert) \
    values ($1, $2, $3, $4, $5, $6, $7, $8, $9)";

const DELETE_TRIGGER: &str = "delete from portfolio_triggers where id = $1";

const DELETE_PORTFOLIO_TRIGGERS: &str = "delete from portfolio_triggers where portfolio_id = $1";

const UPDATE_START_TOTAL_COST: &str =
    "update portfolio_triggers set start_total_cost = $2 where id = $1";

/// Postgres-backed [`TriggerRepository`].
pub struct PgRepository {
    pool: Pool,
}

impl PgRepository {
    /// Wraps an existing pool.
    #[must_use]
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Builds the pool from config and verifies connectivity with one
    /// round trip.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectError::Postgres`] when the pool cannot be built or
    /// the database is unreachable; boot treats this as fatal.
    pub async fn connect(config: &DbConfig) -> Result<Self, ConnectError> {
        let (host, port) = match config.host.rsplit_once(':') {
            Some((host, port)) => (
                host.to_string(),
                port.parse::<u16>()
                    .map_err(|e| ConnectError::Postgres(format!("invalid port: {e}")))?,
            ),
            None => (config.host.clone(), 5432),
        };

        let mut pg_config = tokio_postgres::Config::new();
        pg_config
            .host(&host)
            .port(port)
            .dbname(&config.name)
            .user(&config.user)
            .password(&config.password);

        let manager = Manager::from_config(
            pg_config,
            NoTls,
            ManagerConfig {
                recycling_method: RecyclingMethod::Fast,
            },
        );
        let pool = Pool::builder(manager)
            .max_size(config.max_conns)
            .build()
            .map_err(|e| ConnectError::Postgres(e.to_string()))?;

        let client = pool
            .get()
            .await
            .map_err(|e| ConnectError::Postgres(e.to_string()))?;
        client
            .simple_query("select 1")
            .await
            .map_err(|e| ConnectError::Postgres(e.to_string()))?;

        info!(host = %config.host, db = %config.name, "Postgres pool ready");
        Ok(Self::new(pool))
    }
}

#[async_trait]
impl TriggerRepository for PgRepository {
    async fn account_by_name(&self, name: &str) -> Result<Option<AccountRecord>, StoreError> {
        let client = self.pool.get().await.map_err(StoreError::new)?;
        let row = client
            .query_opt(SELECT_ACCOUNT_BY_NAME, &[&name])
            .await
            .map_err(StoreError::new)?;

        match row {
            None => Ok(None),
            Some(row) => Ok(Some(AccountRecord {
                id: row.try_get("id").map_err(StoreError::new)?,
                name: row.try_get("name").map_err(StoreError::new)?,
                exchange: row.try_get("exchange_name").map_err(StoreError::new)?,
                api_key: row.try_get("key").map_err(StoreError::new)?,
                api_secret: row.try_get("secret").map_err(StoreError::new)?,
                passphrase: row.try_get("passphrase").map_err(StoreError::new)?,
            })),
        }
    }

    async fn accounts_with_triggers(&self) -> Result<Vec<AccountWithTriggers>, StoreError> {
        let client = self.pool.get().await.map_err(StoreError::new)?;
        let rows = client
            .query(SELECT_ACCOUNTS_WITH_TRIGGERS, &[])
            .await
            .map_err(StoreError::new)?;

        let mut joined = Vec::with_capacity(rows.len());
        for row in rows {
            let trigger_id: Option<Uuid> = row.try_get("trigger_id").map_err(StoreError::new)?;
            let trigger = match trigger_id {
                None => None,
                Some(id) => Some(StoredTrigger {
                    id,
                    kind: row.try_get("type").map_err(StoreError::new)?,
                    currency: row.try_get("currency").map_err(StoreError::new)?,
                    created_at: row
                        .try_get::<_, DateTime<Utc>>("created_at")
                        .map_err(StoreError::new)?,
                    limit: row.try_get("limit").map_err(StoreError::new)?,
                    percent: row.try_get("percent").map_err(StoreError::new)?,
                    start_total_cost: row
                        .try_get("start_total_cost")
                        .map_err(StoreError::new)?,
                    trailing_alert: row.try_get("trailing_alert").map_err(StoreError::new)?,
                }),
            };
            joined.push(JoinedRow {
                account: AccountRecord {
                    id: row.try_get("id").map_err(StoreError::new)?,
                    name: row.try_get("name").map_err(StoreError::new)?,
                    exchange: row.try_get("exchange_name").map_err(StoreError::new)?,
                    api_key: row.try_get("key").map_err(StoreError::new)?,
                    api_secret: row.try_get("secret").map_err(StoreError::new)?,
                    passphrase: row.try_get("passphrase").map_err(StoreError::new)?,
                },
                trigger,
            });
        }

        Ok(group_rows(joined))
    }

    async fn create_triggers(&self, triggers: &[NewTrigger]) -> Result<u64, StoreError> {
        let mut client = self.pool.get().await.map_err(StoreError::new)?;
        let tx = client.transaction().await.map_err(StoreError::new)?;

        let statement = tx.prepare(INSERT_TRIGGER).await.map_err(StoreError::new)?;
        let mut inserted = 0;
        for trigger in triggers {
            inserted += tx
                .execute(
                    &statement,
                    &[
                        &trigger.id,
                        &trigger.portfolio_id,
                        &trigger.kind,
                        &trigger.currency,
                        &trigger.created_at,
                        &trigger.limit,
                        &trigger.percent,
                        &trigger.start_total_cost,
                        &trigger.trailing_alert,
                    ],
                )
                .await
                .map_err(StoreError::new)?;
        }

        tx.commit().await.map_err(StoreError::new)?;
        Ok(inserted)
    }

    async fn delete_trigger(&self, id: Uuid) -> Result<(), StoreError> {
        let client = self.pool.get().await.map_err(StoreError::new)?;
        client
            .execute(DELETE_TRIGGER, &[&id])
            .await
            .map_err(StoreError::new)?;
        Ok(())
    }

    async fn delete_portfolio_triggers(&self, portfolio_id: i64) -> Result<(), StoreError> {
        let client = self.pool.get().await.map_err(StoreError::new)?;
        client
            .execute(DELETE_PORTFOLIO_TRIGGERS, &[&portfolio_id])
            .await
            .map_err(StoreError::new)?;
        Ok(())
    }

    async fn update_start_total_cost(&self, id: Uuid, value: Decimal) -> Result<(), StoreError> {
        let client = self.pool.get().await.map_err(StoreError::new)?;
        client
            .execute(UPDATE_START_TOTAL_COST, &[&id, &value])
            .await
            .map_err(StoreError::new)?;
        Ok(())
    }
}

/// One result row of the left join.
struct JoinedRow {
    account: AccountRecord,
    trigger: Option<StoredTrigger>,
}

/// Folds join rows into one entry per account. An account with no triggers
/// yields an empty list; input order is preserved.
fn group_rows(rows: Vec<JoinedRow>) -> Vec<AccountWithTriggers> {
    let mut accounts: Vec<AccountWithTriggers> = Vec::new();
    let mut index: std::collections::HashMap<i64, usize> = std::collections::HashMap::new();

    for row in rows {
        let position = match index.get(&row.account.id) {
            Some(&position) => position,
            None => {
                index.insert(row.account.id, accounts.len());
                accounts.push(AccountWithTriggers {
                    account: row.account,
                    triggers: Vec::new(),
                });
                accounts.len() - 1
            }
        };
        if let Some(trigger) = row.trigger {
            accounts[position].triggers.push(trigger);
        }
    }

    accounts
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn account(id: i64, name: &str) -> AccountRecord {
        AccountRecord {
            id,
            name: name.to_string(),
            exchange: "Binance.PROD".to_string(),
            api_key: "key".to_string(),
            api_secret: "secret".to_string(),
            passphrase: None,
        }
    }

    fn trigger() -> StoredTrigger {
        StoredTrigger {
            id: Uuid::new_v4(),
            kind: "COST_REACHED_LIMIT".to_string(),
            currency: "USDT".to_string(),
            created_at: Utc::now(),
            limit: Some(dec!(100)),
            percent: None,
            start_total_cost: None,
            trailing_alert: false,
        }
    }

    #[test]
    fn test_group_rows_folds_triggers_per_account() {
        let first = trigger();
        let second = trigger();
        let rows = vec![
            JoinedRow {
                account: account(1, "a"),
                trigger: Some(first.clone()),
            },
            JoinedRow {
                account: account(1, "a"),
                trigger: Some(second.clone()),
            },
            JoinedRow {
                account: account(2, "b"),
                trigger: None,
            },
        ];

        let grouped = group_rows(rows);
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped[0].account.name, "a");
        assert_eq!(grouped[0].triggers.len(), 2);
        assert_eq!(grouped[0].triggers[0].id, first.id);
        assert_eq!(grouped[0].triggers[1].id, second.id);
        // The account with no triggers still shows up, with an empty list.
        assert_eq!(grouped[1].account.name, "b");
        assert!(grouped[1].triggers.is_empty());
    }

    #[test]
    fn test_group_rows_empty() {
        assert!(group_rows(Vec::new()).is_empty());
    }
}
