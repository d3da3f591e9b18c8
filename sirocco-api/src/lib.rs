//! # Sirocco API
//!
//! Inbound surfaces of the Sirocco portfolio service:
//! - [`rest`] - the JWT-protected HTTP endpoints and the health probe
//! - [`mq`] - the account-event consumer and the trigger-event publisher

#![warn(missing_docs)]

pub mod auth;
pub mod error;
pub mod mq;
pub mod rest;

pub use error::ApiError;
pub use rest::{health_router, router, ApiState, HealthState};
