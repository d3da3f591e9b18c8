//! # Sirocco Gateway
//!
//! Capability contracts for exchange adapters.
//!
//! The portfolio engine never talks to an exchange directly; it consumes the
//! [`Gateway`], [`ExchangeAccount`] and [`Instrument`] traits defined here.
//! Concrete adapters live in deployment-specific builds and are registered
//! into a [`GatewayRegistry`] at boot. An in-memory adapter for tests ships
//! behind the `mock` feature.

#![warn(missing_docs)]

mod error;
mod registry;
mod traits;
mod types;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use error::GatewayError;
pub use registry::GatewayRegistry;
pub use traits::{ExchangeAccount, Gateway, Instrument};
pub use types::{Auth, Balance, BalanceSet, CurrencyCode, Symbol};
