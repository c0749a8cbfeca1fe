//! librarian-orders — standing orders.
//!
//! A standing order pairs a search with a destination connection. Every
//! file the search matches is copied to the connection's store once, and
//! the copy is remembered with a `standing_order_succeeded:<order>` file
//! event.
//!
//! - [`StandingOrder`] validates and persists orders and lists the files
//!   that still need copying.
//! - [`CopyTaskManager`] runs the copies in the background and keeps the
//!   list of copies in flight.
//! - [`StandingOrderManager`] evaluates all orders, at most once per
//!   minimum interval and subject to the operating mode.
//! - [`StandingOrderService`] turns upload notifications and a periodic
//!   check-in into delayed evaluations on the control loop.

pub mod copy;
pub mod error;
pub mod manager;
pub mod order;
pub mod service;

pub use copy::{CopyLauncher, CopyTask, CopyTaskManager, LaunchOutcome};
pub use error::{OrderError, OrderResult};
pub use manager::{CheckOutcome, Clock, StandingOrderManager};
pub use order::{DEFAULT_CONNECTION, DEFAULT_SEARCH, StandingOrder, succeeded_event_type};
pub use service::StandingOrderService;
