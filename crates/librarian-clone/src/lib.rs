//! librarian-clone — the CreateClone replication job.
//!
//! For a (source store, destination store, age window) triple, copies every
//! recently created instance that the destination lacks, recording one
//! `CloneTransfer` per attempt.
//!
//! # Transfer lifecycle
//!
//! ```text
//! PENDING ──stage+transfer──▶ STAGED ──commit──▶ COMPLETED
//!    │                          │
//!    └──capacity / transport────┴──conflict────▶ FAILED
//! ```
//!
//! Failures are per instance: they end that instance's transfer as FAILED
//! and the run moves on. A later run rediscovers the instance and starts a
//! fresh transfer.

pub mod create_clone;
pub mod error;

pub use create_clone::{CloneSummary, CreateClone};
pub use error::{CloneError, CloneResult};
