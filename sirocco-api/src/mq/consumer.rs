//! Account-event consumer.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use lapin::message::Delivery;
use lapin::options::{BasicAckOptions, BasicRejectOptions};
use sirocco_bus::{BusError, ChannelPool};
use sirocco_engine::PortfolioManager;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use super::event::{AccountEvent, AccountEventEnvelope, EVENT_QUEUE};

/// Delay before resubscribing after a lost consume session.
const RESUBSCRIBE_BACKOFF: Duration = Duration::from_secs(5);

/// Unacknowledged deliveries allowed in flight.
const PREFETCH: u16 = 5;

/// A rejected delivery: `requeue` is false for deterministic failures
/// (decode errors and domain rejections) where replaying cannot help.
#[derive(Debug, Error)]
#[error("{source}")]
struct Rejection {
    requeue: bool,
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
}

/// Subscribes to [`EVENT_QUEUE`] and translates deliveries into portfolio
/// registry mutations.
///
/// The consumer runs in a supervising loop: a lost channel or session is
/// logged and the subscription is re-established after a fixed back-off.
pub struct EventConsumer {
    id: String,
    pool: Arc<ChannelPool>,
    manager: Arc<PortfolioManager>,
}

impl EventConsumer {
    /// Creates a consumer identified as `portfolio.events.<server_tag>`.
    #[must_use]
    pub fn new(server_tag: &str, pool: Arc<ChannelPool>, manager: Arc<PortfolioManager>) -> Self {
        Self {
            id: format!("{EVENT_QUEUE}.{server_tag}"),
            pool,
            manager,
        }
    }

    /// Consumes until `shutdown` fires, resubscribing on session loss.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        loop {
            match self.listen(&mut shutdown).await {
                Ok(()) => {
                    info!(consumer = %self.id, "Consumer stopped");
                    return;
                }
                Err(err) => {
                    error!(consumer = %self.id, error = %err, "Consume session failed, resubscribing");
                    tokio::select! {
                        () = tokio::time::sleep(RESUBSCRIBE_BACKOFF) => {}
                        _ = shutdown.recv() => return,
                    }
                }
            }
        }
    }

    /// One consume session over one pooled channel.
    async fn listen(&self, shutdown: &mut broadcast::Receiver<()>) -> Result<(), BusError> {
        let channel = self.pool.acquire().await?;
        channel.set_prefetch(PREFETCH).await?;
        let mut deliveries = channel.consume(EVENT_QUEUE, &self.id).await?;

        info!(consumer = %self.id, queue = EVENT_QUEUE, "Consuming account events");

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    if let Err(err) = channel.cancel(&self.id).await {
                        warn!(consumer = %self.id, error = %err, "Failed to cancel consumer");
                    }
                    return Ok(());
                }
                delivery = deliveries.next() => {
                    let Some(delivery) = delivery else {
                        return Err(BusError::ConnectionClosed);
                    };
                    let delivery = delivery?;
                    self.process(delivery).await;
                }
            }
        }
    }

    /// Dispatches one delivery and settles it.
    async fn process(&self, delivery: Delivery) {
        debug!(consumer = %self.id, bytes = delivery.data.len(), "Received account event");

        match dispatch(&self.manager, &delivery.data).await {
            Ok(()) => {
                if let Err(err) = delivery.ack(BasicAckOptions::default()).await {
                    warn!(consumer = %self.id, error = %err, "Failed to ack delivery");
                }
            }
            Err(rejection) => {
                if rejection.requeue {
                    error!(consumer = %self.id, error = %rejection, "Rejecting delivery with requeue");
                } else {
                    debug!(consumer = %self.id, error = %rejection, "Rejecting delivery");
                }
                if let Err(err) = delivery
                    .reject(BasicRejectOptions {
                        requeue: rejection.requeue,
                    })
                    .await
                {
                    warn!(consumer = %self.id, error = %err, "Failed to reject delivery");
                }
            }
        }
    }
}

/// Decodes the envelope and applies it to the manager.
///
/// Decode failures never requeue: the payload is already delivered and will
/// not parse any better on replay. Domain errors never requeue either;
/// everything else is transient and does.
async fn dispatch(manager: &PortfolioManager, body: &[u8]) -> Result<(), Rejection> {
    let envelope: AccountEventEnvelope =
        serde_json::from_slice(body).map_err(|err| Rejection {
            requeue: false,
            source: err.into(),
        })?;

    let result = match envelope.event {
        AccountEvent::AccountCreated => manager.add_portfolio(&envelope.account_name).await,
        AccountEvent::AccountDeleted => manager.delete_portfolio(&envelope.account_name).await,
    };

    result.map_err(|err| Rejection {
        requeue: !err.is_domain(),
        source: err.into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mq::testsupport::{account_row, manager_with_account, manager_with_rows, NAME};

    fn body(event: &str, name: &str) -> Vec<u8> {
        format!(r#"{{"event":"{event}","account_name":"{name}"}}"#).into_bytes()
    }

    #[tokio::test]
    async fn test_dispatch_create_then_delete() {
        let manager = manager_with_account();

        dispatch(&manager, &body("ACCOUNT_CREATED", NAME))
            .await
            .unwrap();
        assert!(manager.portfolio(NAME).is_ok());

        dispatch(&manager, &body("ACCOUNT_DELETED", NAME))
            .await
            .unwrap();
        assert!(manager.portfolio(NAME).is_err());
    }

    #[tokio::test]
    async fn test_dispatch_unknown_event_rejects_without_requeue() {
        let manager = manager_with_account();

        let rejection = dispatch(&manager, &body("BOGUS", "x")).await.unwrap_err();
        assert!(!rejection.requeue);
        // Registry unchanged.
        assert!(manager.portfolio("x").is_err());
        assert!(manager.portfolio(NAME).is_err());
    }

    #[tokio::test]
    async fn test_dispatch_garbage_rejects_without_requeue() {
        let manager = manager_with_account();
        let rejection = dispatch(&manager, b"not json").await.unwrap_err();
        assert!(!rejection.requeue);
    }

    #[tokio::test]
    async fn test_dispatch_domain_error_rejects_without_requeue() {
        let manager = manager_with_account();

        dispatch(&manager, &body("ACCOUNT_CREATED", NAME))
            .await
            .unwrap();
        // A second create for the same name is deterministic.
        let rejection = dispatch(&manager, &body("ACCOUNT_CREATED", NAME))
            .await
            .unwrap_err();
        assert!(!rejection.requeue);

        // Deleting a name that is not registered is deterministic too.
        let rejection = dispatch(&manager, &body("ACCOUNT_DELETED", "ghost"))
            .await
            .unwrap_err();
        assert!(!rejection.requeue);
    }

    #[tokio::test]
    async fn test_dispatch_transient_error_requeues() {
        let (manager, repo) = manager_with_rows(Vec::new());
        repo.fail_lookups();

        let rejection = dispatch(&manager, &body("ACCOUNT_CREATED", "a"))
            .await
            .unwrap_err();
        assert!(rejection.requeue);
    }

    #[tokio::test]
    async fn test_dispatch_unsupported_exchange_acks() {
        let (manager, _repo) = manager_with_rows(vec![account_row("b", "Mars")]);

        // Success: the delivery would be acked, and nothing was registered.
        dispatch(&manager, &body("ACCOUNT_CREATED", "b"))
            .await
            .unwrap();
        assert!(manager.portfolio("b").is_err());
    }
}
