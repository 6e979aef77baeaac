//! Turns events from the rest of the system into exclusion maintenance.
//!
//! - A finished library sync recomputes every user.
//! - A changed restriction recomputes its user.
//! - A hide is applied incrementally before the call returns.
//! - An unhide is queued durably and picked up by the [`Worker`], which also
//!   sweeps the queue periodically.

mod dispatcher;
pub mod error;
mod trigger;
mod worker;

pub use crate::dispatcher::Dispatcher;
pub use crate::trigger::{Outcome, Trigger};
pub use crate::worker::{DEFAULT_MAX_ATTEMPTS, DEFAULT_SWEEP_INTERVAL, Drained, Worker, WorkerSettings};
