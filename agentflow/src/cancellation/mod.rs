//! Cooperative cancellation for pipeline runs.
//!
//! A single [`CancellationToken`] flows through one request. Steps check it
//! before and after their work and return an aborted status instead of
//! raising.

mod token;

pub use token::{CancelCallback, CancellationToken};
