//! # exoplanet-core
//!
//! Layered configuration and the HTTP prediction gateway. Scoring itself
//! lives in `exoplanet-ml`; this crate wires it to a server.

pub mod config;
pub mod gateway;

pub use config::{AppConfig, load_config};
pub use gateway::{ApiError, GatewayState, SharedState, gateway_router, run_gateway};
