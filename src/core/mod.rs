//! The sync engine: equality oracle, bandwidth limiting, concurrency
//! pools, the pair builder, the transfer scheduler, whole-run retry, the
//! stats aggregator, and the orchestrator that wires them together.

pub mod bandwidth;
pub mod concurrency;
pub mod equality;
pub mod pair;
pub mod retry;
pub mod stats;
pub mod sync;
pub mod transfer;
