//! Uppe sentinel: check engine, edge-triggered alert routing and maintenance
//! window scheduling.

pub mod cli;
pub mod config;
pub mod database;
pub mod error;
pub mod events;
pub mod maintenance;
pub mod models;
pub mod monitoring;
pub mod notification;
pub mod orchestrator;
pub mod pool;

#[cfg(test)]
pub(crate) mod testing;

pub use cli::Cli;
pub use config::Config;
pub use orchestrator::Orchestrator;
