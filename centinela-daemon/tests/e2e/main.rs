//! E2E integration tests for centinela-daemon.
//!
//! These tests run the full orchestrator (backends, worker pools, recovery,
//! reconciler) against mock recon modules.
//!
//! # Test Structure
//!
//! - `helpers/` -- config builder, mock modules, daemon runner
//! - `scenarios/` -- one file per scenario
//!
//! # Running
//!
//! ```bash
//! cargo test -p centinela-daemon --test e2e
//! ```

mod helpers;
mod scenarios;
