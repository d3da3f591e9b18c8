//! Bounded channel pool.

use std::ops::Deref;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

use crate::channel::Channel;
use crate::connection::BusConnection;
use crate::error::BusError;

/// Pool capacity used when the configured size is zero.
pub const DEFAULT_POOL_SIZE: usize = 10;

/// Bounded pool of multiplexed channels over one [`BusConnection`].
///
/// Invariant relied on by every caller: a channel returned by
/// [`ChannelPool::acquire`] was not known-closed at the moment of return.
/// Channels found dead on the shelf are discarded and replaced lazily on a
/// later acquire.
pub struct ChannelPool {
    conn: Arc<BusConnection>,
    idle: Mutex<Vec<Channel>>,
    permits: Arc<Semaphore>,
    closed: AtomicBool,
}

impl ChannelPool {
    /// Creates a pool of `size` channels (0 selects [`DEFAULT_POOL_SIZE`]).
    ///
    /// Channels are created lazily; a background task drops pooled channels
    /// whenever the connection loses its session, so acquires after a
    /// reconnect always start from fresh channels.
    #[must_use]
    pub fn new(conn: Arc<BusConnection>, size: usize) -> Arc<Self> {
        let size = if size == 0 { DEFAULT_POOL_SIZE } else { size };
        let pool = Arc::new(Self {
            conn,
            idle: Mutex::new(Vec::with_capacity(size)),
            permits: Arc::new(Semaphore::new(size)),
            closed: AtomicBool::new(false),
        });
        tokio::spawn(Arc::clone(&pool).watch_connection());
        pool
    }

    /// Acquires a channel, waiting for a free slot if the pool is saturated.
    ///
    /// # Errors
    ///
    /// - [`BusError::PoolClosed`] once [`ChannelPool::close`] has been called
    /// - [`BusError::ConnectionClosed`] while the broker session is down
    /// - any AMQP error raised while opening a replacement channel
    pub async fn acquire(self: &Arc<Self>) -> Result<PooledChannel, BusError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BusError::PoolClosed);
        }

        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| BusError::PoolClosed)?;

        loop {
            let candidate = self.idle.lock().pop();
            match candidate {
                // Dead on the shelf: discard and keep looking.
                Some(channel) if channel.is_closed() => continue,
                Some(channel) => return Ok(PooledChannel::new(channel, Arc::clone(self), permit)),
                None => {
                    let channel = self.conn.create_channel().await?;
                    return Ok(PooledChannel::new(channel, Arc::clone(self), permit));
                }
            }
        }
    }

    /// Closes the pool and drops every idle channel. Idempotent.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.permits.close();
            let dropped = self.idle.lock().drain(..).count();
            debug!(dropped, "Channel pool closed");
        }
    }

    /// Returns true once the pool has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn release(&self, channel: Channel) {
        if self.closed.load(Ordering::SeqCst) || channel.is_closed() {
            return;
        }
        self.idle.lock().push(channel);
    }

    /// Drops pooled channels whenever the connection reports unhealthy.
    async fn watch_connection(self: Arc<Self>) {
        let mut health = self.conn.health();
        loop {
            if health.changed().await.is_err() {
                return;
            }
            if self.closed.load(Ordering::SeqCst) {
                return;
            }
            if !*health.borrow() {
                let dropped = self.idle.lock().drain(..).count();
                debug!(dropped, "Broker session lost, dropped pooled channels");
            }
        }
    }
}

/// A pooled channel handle; dropping it returns the channel to the pool.
pub struct PooledChannel {
    channel: Option<Channel>,
    pool: Arc<ChannelPool>,
    _permit: OwnedSemaphorePermit,
}

impl PooledChannel {
    fn new(channel: Channel, pool: Arc<ChannelPool>, permit: OwnedSemaphorePermit) -> Self {
        Self {
            channel: Some(channel),
            pool,
            _permit: permit,
        }
    }
}

impl Deref for PooledChannel {
    type Target = Channel;

    fn deref(&self) -> &Self::Target {
        self.channel
            .as_ref()
            .expect("channel present until dropped")
    }
}

impl Drop for PooledChannel {
    fn drop(&mut self) {
        if let Some(channel) = self.channel.take() {
            self.pool.release(channel);
        }
    }
}
