//! Broker connection supervision.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use lapin::ConnectionProperties;
use tokio::sync::{mpsc, watch, RwLock};
use tracing::{debug, error, info, warn};

use crate::channel::Channel;
use crate::error::BusError;

/// Delay between reconnect attempts after the TCP session drops.
const RECONNECT_BACKOFF: Duration = Duration::from_secs(3);

/// A long-lived session to the message broker.
///
/// On unexpected close the connection re-dials in a background task with a
/// fixed back-off until the session is re-established. Reconnection is
/// transparent to holders of the connection itself; multiplexed channels
/// created before the drop are dead and must be re-acquired.
pub struct BusConnection {
    uri: String,
    server_tag: String,
    inner: RwLock<lapin::Connection>,
    health_tx: watch::Sender<bool>,
    disconnect_tx: mpsc::Sender<()>,
    closing: AtomicBool,
}

impl BusConnection {
    /// Dials the broker and starts the reconnect supervisor.
    ///
    /// `server_tag` is mixed into every routing key published through
    /// channels of this connection.
    ///
    /// # Errors
    ///
    /// Returns [`BusError`] if the initial dial fails; boot treats this as
    /// fatal.
    pub async fn connect(
        uri: impl Into<String>,
        server_tag: impl Into<String>,
    ) -> Result<Arc<Self>, BusError> {
        let uri = uri.into();
        debug!(%uri, "Dialing message broker");
        let conn = lapin::Connection::connect(&uri, ConnectionProperties::default()).await?;

        let (health_tx, _) = watch::channel(true);
        let (disconnect_tx, disconnect_rx) = mpsc::channel(1);

        let this = Arc::new(Self {
            uri,
            server_tag: server_tag.into(),
            inner: RwLock::new(conn),
            health_tx,
            disconnect_tx,
            closing: AtomicBool::new(false),
        });

        this.install_close_hook().await;
        tokio::spawn(Arc::clone(&this).supervise(disconnect_rx));

        info!("Message broker connection established");
        Ok(this)
    }

    /// Opens a fresh multiplexed channel.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::ConnectionClosed`] while the session is down.
    pub async fn create_channel(&self) -> Result<Channel, BusError> {
        let guard = self.inner.read().await;
        if !guard.status().connected() {
            return Err(BusError::ConnectionClosed);
        }
        let channel = guard.create_channel().await?;
        Ok(Channel::new(channel, self.server_tag.clone()))
    }

    /// Cheap health snapshot.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        !*self.health_tx.borrow()
    }

    /// Returns a watch receiver that tracks connection health.
    #[must_use]
    pub fn health(&self) -> watch::Receiver<bool> {
        self.health_tx.subscribe()
    }

    /// Returns the per-deployment tag.
    #[must_use]
    pub fn server_tag(&self) -> &str {
        &self.server_tag
    }

    /// Closes the session for good and stops the supervisor.
    pub async fn shutdown(&self) {
        self.closing.store(true, Ordering::SeqCst);
        let _ = self.health_tx.send(false);

        info!("Closing message broker connection");
        let guard = self.inner.read().await;
        if let Err(error) = guard.close(320, "shutting down").await {
            warn!(%error, "Failed to close broker connection cleanly");
        }
    }

    /// Registers a hook that wakes the supervisor on unexpected close.
    async fn install_close_hook(&self) {
        let disconnects = self.disconnect_tx.clone();
        let guard = self.inner.read().await;
        guard.on_error(move |error| {
            warn!(%error, "Broker connection reported an error");
            let _ = disconnects.try_send(());
        });
    }

    /// Re-dials with fixed back-off every time a disconnect is reported.
    async fn supervise(self: Arc<Self>, mut disconnects: mpsc::Receiver<()>) {
        while disconnects.recv().await.is_some() {
            if self.closing.load(Ordering::SeqCst) {
                return;
            }
            let _ = self.health_tx.send(false);
            warn!("Broker connection lost, reconnecting");

            loop {
                if self.closing.load(Ordering::SeqCst) {
                    return;
                }
                match lapin::Connection::connect(&self.uri, ConnectionProperties::default()).await
                {
                    Ok(conn) => {
                        *self.inner.write().await = conn;
                        self.install_close_hook().await;
                        let _ = self.health_tx.send(true);
                        info!("Broker connection re-established");
                        break;
                    }
                    Err(error) => {
                        error!(%error, "Reconnect attempt failed");
                        tokio::time::sleep(RECONNECT_BACKOFF).await;
                    }
                }
            }
        }
    }
}
