//! Portfolio registry.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use sirocco_gateway::{Auth, ExchangeAccount, Gateway, GatewayRegistry};
use tracing::{error, info, warn};

use crate::error::PortfolioError;
use crate::portfolio::Portfolio;
use crate::ports::{
    AccountRecord, AccountWithTriggers, SnapshotCache, TriggerEventSink, TriggerRepository,
};
use crate::trigger::{self, Trigger};

/// Thread-safe registry of live portfolios, keyed by account name.
///
/// Reads never block each other; add/delete hold the write lock only around
/// the map mutation, and the actual worker start/close happens outside it.
pub struct PortfolioManager {
    portfolios: RwLock<HashMap<String, Arc<Portfolio>>>,
    repo: Arc<dyn TriggerRepository>,
    cache: Arc<dyn SnapshotCache>,
    gateways: Arc<GatewayRegistry>,
    events: Arc<dyn TriggerEventSink>,
}

impl PortfolioManager {
    /// Creates an empty manager.
    #[must_use]
    pub fn new(
        repo: Arc<dyn TriggerRepository>,
        cache: Arc<dyn SnapshotCache>,
        gateways: Arc<GatewayRegistry>,
        events: Arc<dyn TriggerEventSink>,
    ) -> Self {
        Self {
            portfolios: RwLock::new(HashMap::new()),
            repo,
            cache,
            gateways,
            events,
        }
    }

    /// Loads every account with its persisted triggers and starts a
    /// portfolio for each. A bad row fails only its own account: the error
    /// is logged and the remaining accounts still load.
    ///
    /// # Errors
    ///
    /// Returns [`PortfolioError::Store`] only if the join query itself
    /// fails; boot treats this as fatal.
    pub async fn start(&self) -> Result<(), PortfolioError> {
        let accounts = self.repo.accounts_with_triggers().await?;
        info!(count = accounts.len(), "Loading portfolios from store");

        for row in accounts {
            let name = row.account.name.clone();
            if let Err(err) = self.load(row).await {
                error!(account = %name, error = %err, "Failed to load portfolio");
            }
        }
        Ok(())
    }

    /// Returns the live portfolio registered under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`PortfolioError::NotFound`] when no portfolio is registered.
    pub fn portfolio(&self, name: &str) -> Result<Arc<Portfolio>, PortfolioError> {
        self.portfolios
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| PortfolioError::NotFound(name.to_string()))
    }

    /// Fetches the account row for `name` and starts a new portfolio for it.
    ///
    /// Accounts on exchanges this deployment does not serve are skipped
    /// silently (success, a warning is logged): a separate deployment owns
    /// those exchanges.
    ///
    /// # Errors
    ///
    /// - [`PortfolioError::AlreadyExists`] if the name is registered
    /// - [`PortfolioError::AccountNotFound`] if no account row exists
    /// - [`PortfolioError::Gateway`] if the exchange rejected the credentials
    /// - transient store/adapter errors unchanged
    pub async fn add_portfolio(&self, name: &str) -> Result<(), PortfolioError> {
        if self.portfolios.read().contains_key(name) {
            return Err(PortfolioError::AlreadyExists(name.to_string()));
        }

        let account = self
            .repo
            .account_by_name(name)
            .await?
            .ok_or_else(|| PortfolioError::AccountNotFound(name.to_string()))?;

        let Some((gateway, handle)) = self.open_account(&account).await? else {
            return Ok(());
        };

        let portfolio = self.build_portfolio(&account, gateway, handle.clone());
        if !self.insert(&portfolio) {
            handle.release();
            return Err(PortfolioError::AlreadyExists(name.to_string()));
        }

        portfolio.start().await
    }

    /// Destroys the portfolio registered under `name` and removes it.
    ///
    /// # Errors
    ///
    /// Returns [`PortfolioError::NotFound`] when no portfolio is registered.
    pub async fn delete_portfolio(&self, name: &str) -> Result<(), PortfolioError> {
        let portfolio = self.portfolio(name)?;
        portfolio.close(true);
        self.portfolios.write().remove(name);
        Ok(())
    }

    /// Closes every registered portfolio without destroying state.
    /// Idempotent.
    pub fn close(&self) {
        let portfolios: Vec<_> = self.portfolios.read().values().cloned().collect();
        info!(count = portfolios.len(), "Closing all portfolios");
        for portfolio in portfolios {
            portfolio.close(false);
        }
    }

    /// Restores one account's portfolio from its stored row.
    async fn load(&self, row: AccountWithTriggers) -> Result<(), PortfolioError> {
        if self.portfolios.read().contains_key(&row.account.name) {
            return Ok(());
        }

        let Some((gateway, handle)) = self.open_account(&row.account).await? else {
            return Ok(());
        };

        let portfolio = self.build_portfolio(&row.account, gateway, handle.clone());

        let mut restored: Vec<Box<dyn Trigger>> = Vec::with_capacity(row.triggers.len());
        for stored in &row.triggers {
            match trigger::from_stored(stored) {
                Ok(Some(restored_trigger)) => restored.push(restored_trigger),
                Ok(None) => {
                    warn!(trigger = %stored.id, kind = %stored.kind, "Unknown stored trigger kind, skipping");
                }
                Err(err) => return Err(err),
            }
        }
        if !restored.is_empty() {
            portfolio.attach_triggers(restored).await;
        }

        if !self.insert(&portfolio) {
            handle.release();
            return Ok(());
        }

        portfolio.start().await
    }

    /// Resolves the adapter and opens the account handle. `Ok(None)` means
    /// the exchange is not served by this deployment.
    async fn open_account(
        &self,
        account: &AccountRecord,
    ) -> Result<Option<(Arc<dyn Gateway>, Arc<dyn ExchangeAccount>)>, PortfolioError> {
        let Some(gateway) = self.gateways.get(&account.exchange) else {
            warn!(
                account = %account.name,
                exchange = %account.exchange,
                "Exchange is not served by this deployment, skipping account",
            );
            return Ok(None);
        };

        let mut auth = Auth::new(account.api_key.clone(), account.api_secret.clone());
        if let Some(passphrase) = &account.passphrase {
            auth = auth.with_passphrase(passphrase.clone());
        }

        let handle = gateway.account(auth).await.map_err(|source| {
            if source.is_rejection() {
                PortfolioError::Gateway {
                    account: account.name.clone(),
                    source,
                }
            } else {
                PortfolioError::Adapter {
                    account: account.name.clone(),
                    source,
                }
            }
        })?;

        Ok(Some((gateway, handle)))
    }

    fn build_portfolio(
        &self,
        account: &AccountRecord,
        gateway: Arc<dyn Gateway>,
        handle: Arc<dyn ExchangeAccount>,
    ) -> Arc<Portfolio> {
        Portfolio::new(
            account.id,
            account.name.clone(),
            self.repo.clone(),
            self.cache.clone(),
            gateway,
            handle,
            self.events.clone(),
        )
    }

    /// Double-checked insertion: membership is re-verified under the write
    /// lock. Returns false when another caller won the race.
    fn insert(&self, portfolio: &Arc<Portfolio>) -> bool {
        let mut map = self.portfolios.write();
        if map.contains_key(portfolio.name()) {
            return false;
        }
        map.insert(portfolio.name().to_string(), portfolio.clone());
        true
    }
}
