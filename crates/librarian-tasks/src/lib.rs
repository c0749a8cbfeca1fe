//! librarian-tasks — where work runs.
//!
//! A single [`ControlLoop`] owns every mutation of persisted state. Timers
//! ([`ControlHandle::call_later`], [`ControlHandle::schedule`]) fire onto that
//! loop, and the [`TaskRunner`] executes blocking work on a bounded worker
//! pool and reports outcomes back onto it.

pub mod control;
pub mod error;
pub mod runner;

pub use control::{ControlHandle, ControlLoop, Reschedule};
pub use error::{TaskError, TaskResult};
pub use runner::TaskRunner;
