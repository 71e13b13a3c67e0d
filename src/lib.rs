//! Usage-telemetry reporting: one-time installation registration against a
//! remote collector, plus fire-and-forget usage events tagged with the
//! persisted installation id.
//!
//! # REGISTRATION INVARIANT
//! An installation registers at most once. The liveness loop is the sole
//! writer of the installation record and guards registration with the store
//! count, so exactly one loop may run per process; [`Reporter::start`]
//! enforces that.
//!
//! # NON-BLOCKING INVARIANT
//! Emission methods never await and never surface failures to the caller.
//! Store reads, encoding, and collector I/O happen on the dispatch worker;
//! a failed dispatch is logged and dropped.

pub mod collector;
pub mod config;
pub mod event;
pub mod reporter;
pub mod store;

pub use collector::{Collector, HttpCollector};
pub use config::{EscalationPolicy, ReporterConfig};
pub use event::{Event, EventKind, Meta, MetaValue};
pub use reporter::{AlreadyStarted, DispatchError, Reporter, ReporterHandle};
pub use store::InstallationStore;
