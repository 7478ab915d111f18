//! E2E test scenarios.

mod config_error;
mod fault_isolation;
mod lifecycle;
mod reconciler;
mod recovery;
mod shared_database;
