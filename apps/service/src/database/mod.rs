/// Store seams and their libsql implementation
///
/// The core only talks to the traits in `repository`. `LibsqlStore` is the
/// implementation the service binary wires in; anything else implementing
/// the traits (a relational store owned by another service, test fakes) can
/// replace it.
pub mod libsql_store;
pub mod migrations;
pub mod repository;

pub use libsql_store::LibsqlStore;
pub use repository::{ChannelStore, MaintenanceStore, MonitorStore, ResultStore};

use anyhow::Result;

/// Initialize database with schema
pub async fn initialize_database(conn: &libsql::Connection) -> Result<()> {
    migrations::run_migrations(conn).await
}
