//! Relay - file synchronization engine across heterogeneous storage
//! backends.
//!
//! The backend abstraction (`backend`), the reconciliation pipeline
//! (`core`: pair builder, equality oracle, transfer scheduler, sync
//! orchestrator, stats aggregator), the filter engine (`filter`), and the
//! supporting path/hash/config/error/logging utilities are all exposed
//! here so `main.rs` is a thin CLI shell over this library.

pub mod backend;
pub mod config;
pub mod core;
pub mod error;
pub mod filter;
pub mod hash;
pub mod logging;
pub mod path;
pub mod stats;

pub use backend::{Backend, BackendError};
pub use config::SyncConfig;
pub use core::sync::{run, RunReport, SyncMode, SyncPlan};
pub use error::{RelayError, Result};
pub use filter::FilterList;

/// Library version, reported by `relay version`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
