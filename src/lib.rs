//! Elastic work queue for async Rust.
//!
//! # Features
//! - FIFO dispatch of opaque payloads to a caller-supplied engine
//! - Workers spawned on demand, bounded by a configurable parallelism limit
//! - Idle workers retire after a timeout and are respawned when work appears
//! - Quiescent shutdown: queued items drain, then the pool runs down
//! - Panic isolation for engine invocations
//! - Metrics snapshots and periodic monitoring

pub mod errors;
pub mod model;
pub mod queue;
pub mod result;

pub use queue::{Config, WorkQueue, WorkQueueInner};
