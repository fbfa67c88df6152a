//! Records the core reads: monitors, results, channels and maintenance windows.
//!
//! Monitors, channels and windows are owned by the admin surface and only ever
//! read here. Results are produced by the engine and never mutated afterwards.

pub mod channel;
pub mod monitor;
pub mod result;
pub mod window;

pub use channel::NotificationChannel;
pub use monitor::{Monitor, MonitorKind};
pub use result::{CheckResult, CheckStatus};
pub use window::MaintenanceWindow;
