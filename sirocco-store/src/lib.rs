//! # Sirocco Store
//!
//! Implementations of the engine's storage ports:
//! - [`PgRepository`] - the relational trigger repository on Postgres
//!   (tokio-postgres behind a deadpool pool)
//! - [`RedisSnapshotCache`] - the advisory snapshot cache on Redis

#![warn(missing_docs)]

mod cache;
mod postgres;

pub use cache::{connect_redis, RedisSnapshotCache};
pub use postgres::PgRepository;

use thiserror::Error;

/// Boot-time connectivity failures. All fatal.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// The Postgres pool could not be built or reached.
    #[error("postgres is unavailable: {0}")]
    Postgres(String),

    /// Redis could not be reached.
    #[error("redis is unavailable: {0}")]
    Redis(String),
}
