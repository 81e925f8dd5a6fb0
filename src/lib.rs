// Library crate; main.rs and the integration tests both build on it.

pub mod config;
pub mod dataset;
pub mod encoder;
pub mod error;
pub mod metrics;
pub mod routes;
pub mod server;
pub mod settings;
pub mod state;
