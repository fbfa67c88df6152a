//! Maintenance windows: alert suppression lookups and boundary notifications

pub mod jobs;
pub mod scheduler;
pub mod suppressor;

pub use jobs::{Boundary, Enqueued, Job, JobKind, JobQueue, LocalJobQueue};
pub use scheduler::{MaintenanceScheduler, ScanReport};
pub use suppressor::MaintenanceSuppressor;
