//! Shutdown coordination.
//!
//! A single controller fans a shutdown signal out to the bus consumer, the
//! portfolio manager and the HTTP servers, and waits (bounded) for them to
//! report completion.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tracing::{info, warn};

/// Coordinates graceful termination across components.
#[derive(Debug, Clone)]
pub struct ShutdownController {
    triggered: Arc<AtomicBool>,
    signal_tx: broadcast::Sender<()>,
    done_tx: Arc<watch::Sender<bool>>,
    done_rx: watch::Receiver<bool>,
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownController {
    /// Creates a new controller.
    #[must_use]
    pub fn new() -> Self {
        let (signal_tx, _) = broadcast::channel(1);
        let (done_tx, done_rx) = watch::channel(false);
        Self {
            triggered: Arc::new(AtomicBool::new(false)),
            signal_tx,
            done_tx: Arc::new(done_tx),
            done_rx,
        }
    }

    /// Initiates shutdown. Idempotent: only the first call emits the signal.
    pub fn trigger(&self) {
        if self
            .triggered
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            info!("Shutdown initiated");
            let _ = self.signal_tx.send(());
        }
    }

    /// Returns whether shutdown has been initiated.
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    /// Returns a receiver that yields once when shutdown is initiated.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.signal_tx.subscribe()
    }

    /// Marks teardown as finished.
    pub fn mark_done(&self) {
        let _ = self.done_tx.send(true);
    }

    /// Waits for teardown to finish, up to `deadline`.
    ///
    /// Returns `false` if the deadline elapsed first; stragglers are
    /// abandoned by the caller.
    pub async fn wait_done(&self, deadline: Duration) -> bool {
        let mut rx = self.done_rx.clone();
        if *rx.borrow() {
            return true;
        }
        tokio::select! {
            changed = rx.changed() => changed.is_ok() && *rx.borrow(),
            () = tokio::time::sleep(deadline) => {
                warn!(?deadline, "Shutdown deadline elapsed, abandoning remaining workers");
                false
            }
        }
    }
}

/// Blocks until SIGINT or SIGTERM, then triggers the controller.
pub async fn listen_for_signals(controller: ShutdownController) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt()).expect("SIGINT handler");
        let mut sigterm = signal(SignalKind::terminate()).expect("SIGTERM handler");

        tokio::select! {
            _ = sigint.recv() => info!("Received SIGINT"),
            _ = sigterm.recv() => info!("Received SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.expect("Ctrl+C handler");
        info!("Received Ctrl+C");
    }

    controller.trigger();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_trigger_is_idempotent() {
        let controller = ShutdownController::new();
        assert!(!controller.is_triggered());

        controller.trigger();
        controller.trigger();
        assert!(controller.is_triggered());
    }

    #[tokio::test]
    async fn test_subscriber_receives_signal() {
        let controller = ShutdownController::new();
        let mut rx = controller.subscribe();

        let ctrl = controller.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            ctrl.trigger();
        });

        let received = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await;
        assert!(received.is_ok());
    }

    #[tokio::test]
    async fn test_wait_done() {
        let controller = ShutdownController::new();
        controller.mark_done();
        assert!(controller.wait_done(Duration::from_millis(100)).await);
    }

    #[tokio::test]
    async fn test_wait_done_deadline() {
        let controller = ShutdownController::new();
        assert!(!controller.wait_done(Duration::from_millis(50)).await);
    }
}
