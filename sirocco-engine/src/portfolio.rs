//! Per-account portfolio runtime.
//!
//! Each portfolio owns a worker task that is the single writer of the
//! portfolio's trigger map and snapshot holder. The worker consumes the
//! adapter's balance stream strictly in arrival order: the snapshot write
//! and every trigger evaluation complete before the next update is
//! dequeued.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use chrono::Utc;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sirocco_gateway::{BalanceSet, ExchangeAccount, Gateway};
use tokio::sync::{mpsc, RwLock};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::currency::ReferenceCurrency;
use crate::data::{ConvertedTo, Data, DataHolder};
use crate::error::PortfolioError;
use crate::events::TriggerEvent;
use crate::ports::{SnapshotCache, TriggerEventSink, TriggerRepository};
use crate::pricing::price;
use crate::trigger::{Trigger, TriggerContext, TriggerSettings};

/// Buffer between the adapter's balance push and the worker.
const BALANCE_STREAM_BUFFER: usize = 16;

/// Trigger settings plus the current snapshot, served on the HTTP read path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioInfo {
    /// Settings of every attached trigger.
    pub trigger_settings: Vec<TriggerSettings>,
    /// The re-priced snapshot.
    pub data: Data,
}

/// A live per-account portfolio.
///
/// Created closed; [`Portfolio::start`] runs one synchronous re-pricing pass
/// and spawns the supervising worker. [`Portfolio::close`] delivers exactly
/// one signal to the worker; with `destroy` the worker also wipes the
/// portfolio's stored triggers and cached snapshot.
pub struct Portfolio {
    id: i64,
    name: String,
    closed: AtomicBool,
    close_tx: mpsc::Sender<bool>,
    close_rx: Mutex<Option<mpsc::Receiver<bool>>>,
    triggers: RwLock<HashMap<Uuid, Box<dyn Trigger>>>,
    data: DataHolder,
    gateway: Arc<dyn Gateway>,
    account: Arc<dyn ExchangeAccount>,
    repo: Arc<dyn TriggerRepository>,
    events: Arc<dyn TriggerEventSink>,
    me: Weak<Self>,
}

impl Portfolio {
    /// Creates a closed portfolio for `account` on `gateway`.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: i64,
        name: impl Into<String>,
        repo: Arc<dyn TriggerRepository>,
        cache: Arc<dyn SnapshotCache>,
        gateway: Arc<dyn Gateway>,
        account: Arc<dyn ExchangeAccount>,
        events: Arc<dyn TriggerEventSink>,
    ) -> Arc<Self> {
        let name = name.into();
        let (close_tx, close_rx) = mpsc::channel(1);
        Arc::new_cyclic(|me| Self {
            id,
            data: DataHolder::new(name.clone(), cache),
            name,
            closed: AtomicBool::new(true),
            close_tx,
            close_rx: Mutex::new(Some(close_rx)),
            triggers: RwLock::new(HashMap::new()),
            gateway,
            account,
            repo,
            events,
            me: me.clone(),
        })
    }

    /// Portfolio id (the owning account's id).
    #[must_use]
    pub fn id(&self) -> i64 {
        self.id
    }

    /// Portfolio name (the owning account's name).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Last committed total cost in `currency`.
    #[must_use]
    pub fn total_balance(&self, currency: ReferenceCurrency) -> Decimal {
        self.data.total_balance(currency)
    }

    /// Returns true while no worker is running.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Signals the worker to stop. Idempotent: only the first call after a
    /// start delivers a signal. `destroy` additionally wipes the stored
    /// triggers and the cached snapshot.
    pub fn close(&self, destroy: bool) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            // The channel holds one slot, so this never blocks.
            let _ = self.close_tx.try_send(destroy);
        }
    }

    /// Pulls initial balances, commits the first snapshot (firing any
    /// already-satisfied triggers), subscribes to the adapter's balance
    /// stream and spawns the worker.
    ///
    /// No-op when the portfolio is already open.
    ///
    /// # Errors
    ///
    /// Returns [`PortfolioError`] if the initial balance pull or the first
    /// re-pricing pass fails; the portfolio stays closed.
    pub async fn start(&self) -> Result<(), PortfolioError> {
        if !self.closed.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        let initial = match self.account.balances().await {
            Ok(balances) => balances,
            Err(source) => {
                self.closed.store(true, Ordering::SeqCst);
                return Err(PortfolioError::Adapter {
                    account: self.name.clone(),
                    source,
                });
            }
        };
        if let Err(error) = self.handle_balance_update(initial).await {
            self.closed.store(true, Ordering::SeqCst);
            return Err(error);
        }

        let (balance_tx, balance_rx) = mpsc::channel(BALANCE_STREAM_BUFFER);
        self.account.notify_balance(balance_tx);

        let Some(close_rx) = self.close_rx.lock().take() else {
            warn!(portfolio = %self.name, "Close signal receiver missing, not spawning worker");
            self.closed.store(true, Ordering::SeqCst);
            return Ok(());
        };
        let Some(this) = self.me.upgrade() else {
            return Ok(());
        };

        info!(portfolio = %self.name, "Portfolio started");
        tokio::spawn(this.run(close_rx, balance_rx));
        Ok(())
    }

    /// Persists `triggers` in one batch and attaches them on success.
    ///
    /// # Errors
    ///
    /// Returns the store error unchanged; nothing is attached in-memory on
    /// failure.
    pub async fn add_triggers(
        &self,
        triggers: Vec<Box<dyn Trigger>>,
    ) -> Result<Vec<TriggerSettings>, PortfolioError> {
        let rows: Vec<_> = triggers
            .iter()
            .map(|trigger| trigger.settings().into_row(self.id))
            .collect();
        self.repo.create_triggers(&rows).await?;
        Ok(self.attach_triggers(triggers).await)
    }

    /// Returns the trigger settings plus the snapshot, reading through the
    /// cache and re-pricing from live balances on a cache miss.
    ///
    /// # Errors
    ///
    /// Returns [`PortfolioError`] on cache or adapter failure.
    pub async fn info(&self) -> Result<PortfolioInfo, PortfolioError> {
        let trigger_settings: Vec<_> = {
            let triggers = self.triggers.read().await;
            triggers.values().map(|trigger| trigger.settings()).collect()
        };

        let data = match self.data.get().await? {
            Some(data) => data,
            None => {
                let balances =
                    self.account
                        .balances()
                        .await
                        .map_err(|source| PortfolioError::Adapter {
                            account: self.name.clone(),
                            source,
                        })?;
                self.update_data(&balances).await?
            }
        };

        Ok(PortfolioInfo {
            trigger_settings,
            data,
        })
    }

    /// Attaches triggers to the in-memory map without persisting.
    pub(crate) async fn attach_triggers(
        &self,
        triggers: Vec<Box<dyn Trigger>>,
    ) -> Vec<TriggerSettings> {
        let mut settings = Vec::with_capacity(triggers.len());
        {
            let mut map = self.triggers.write().await;
            for trigger in triggers {
                settings.push(trigger.settings());
                map.insert(trigger.id(), trigger);
            }
        }
        info!(portfolio = %self.name, count = settings.len(), "Triggers registered");
        settings
    }

    /// Supervising worker loop.
    async fn run(
        self: Arc<Self>,
        mut close_rx: mpsc::Receiver<bool>,
        mut balance_rx: mpsc::Receiver<BalanceSet>,
    ) {
        loop {
            tokio::select! {
                signal = close_rx.recv() => {
                    let destroy = signal.unwrap_or(false);
                    if destroy {
                        info!(portfolio = %self.name, "Destroying portfolio");
                        if let Err(error) = self.repo.delete_portfolio_triggers(self.id).await {
                            error!(portfolio = %self.name, %error, "Failed to delete stored triggers");
                        }
                        if let Err(error) = self.data.delete().await {
                            error!(portfolio = %self.name, %error, "Failed to delete cached snapshot");
                        }
                    } else {
                        info!(portfolio = %self.name, "Closing portfolio");
                    }
                    break;
                }
                update = balance_rx.recv() => match update {
                    Some(balances) => {
                        if let Err(error) = self.handle_balance_update(balances).await {
                            error!(portfolio = %self.name, %error, "Failed to handle balance update");
                        }
                    }
                    None => {
                        info!(
                            portfolio = %self.name,
                            gateway = self.gateway.name(),
                            "Balance stream closed by adapter, closing portfolio",
                        );
                        self.closed.store(true, Ordering::SeqCst);
                        break;
                    }
                }
            }
        }

        self.account.release();
        *self.close_rx.lock() = Some(close_rx);
        info!(portfolio = %self.name, "Portfolio stopped");
    }

    /// Commits a new snapshot, then evaluates every trigger against it.
    ///
    /// Evaluation errors and publish failures are logged per trigger and
    /// never tear the worker down. A trigger whose store deletion fails is
    /// kept in memory so retirement is retried on the next update.
    async fn handle_balance_update(&self, balances: BalanceSet) -> Result<(), PortfolioError> {
        self.update_data(&balances).await?;

        let mut triggers = self.triggers.write().await;
        let ids: Vec<Uuid> = triggers.keys().copied().collect();
        for id in ids {
            let (status, settings) = {
                let Some(trigger) = triggers.get_mut(&id) else {
                    continue;
                };
                let ctx = TriggerContext {
                    data: &self.data,
                    repo: self.repo.as_ref(),
                };
                match trigger.try_execute(&ctx).await {
                    Ok(status) => (status, trigger.settings()),
                    Err(error) => {
                        error!(portfolio = %self.name, trigger = %id, %error, "Trigger evaluation failed");
                        continue;
                    }
                }
            };

            if status.fired {
                info!(
                    portfolio = %self.name,
                    trigger = %id,
                    current_value = %status.current_value,
                    "Trigger fired",
                );
                let event = TriggerEvent {
                    portfolio: self.name.clone(),
                    timestamp: Utc::now().timestamp(),
                    current_value: status.current_value,
                    trigger_settings: settings,
                };
                if let Err(error) = self.events.publish(event).await {
                    error!(portfolio = %self.name, trigger = %id, %error, "Failed to publish trigger event");
                }
            }

            if status.done {
                if let Err(error) = self.repo.delete_trigger(id).await {
                    error!(portfolio = %self.name, trigger = %id, %error, "Failed to delete stored trigger, keeping it for retry");
                    continue;
                }
                triggers.remove(&id);
            }
        }

        Ok(())
    }

    /// Re-prices `balances` into the reference currencies and persists the
    /// snapshot.
    ///
    /// The previous snapshot is the starting point (cache miss starts
    /// fresh), so currencies absent from this update keep their last
    /// priced state; totals are re-derived from the per-currency costs.
    async fn update_data(&self, balances: &BalanceSet) -> Result<Data, PortfolioError> {
        let mut data = self.data.get().await?.unwrap_or_default();

        for (code, balance) in balances {
            let mut converted = ConvertedTo::with_capacity(ReferenceCurrency::ALL.len());
            let mut costs = ConvertedTo::with_capacity(ReferenceCurrency::ALL.len());
            for currency in ReferenceCurrency::ALL {
                let unit = price(self.gateway.as_ref(), code, &currency.code(), 0);
                converted.insert(currency, unit);
                costs.insert(currency, balance.available * unit);
            }
            data.prices.insert(code.clone(), converted);
            data.balance.details.insert(code.clone(), costs);
        }

        let mut totals = ConvertedTo::new();
        for costs in data.balance.details.values() {
            for (currency, cost) in costs {
                *totals.entry(*currency).or_default() += *cost;
            }
        }
        data.balance.total = totals;

        self.data.save(&data).await?;
        Ok(data)
    }
}
