/// Monitoring engine module - turns monitor definitions into check results
///
/// This module is responsible for:
/// - One protocol checker per monitor kind, behind the `Checker` trait
/// - The registry mapping kinds to checkers, built once at startup
/// - Executing, timing and guarding checks (`MonitoringExecutor`)
/// - Driving monitors on their configured interval (`MonitoringScheduler`)
pub mod checker;
pub mod checkers;
pub mod executor;
pub mod scheduler;

pub use checker::{Checker, CheckerRegistry};
pub use executor::MonitoringExecutor;
pub use scheduler::MonitoringScheduler;
