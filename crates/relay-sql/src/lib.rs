//! Durable storage for relay jobs.
//!
//! This crate is the sole rendezvous point between the intake API, the
//! attestation poller, and the submitter: none of those components talk to
//! each other directly, they only read and write rows through [`Store`].

mod error;
mod model;
mod store;

pub use error::StoreError;
pub use model::{JobUpdate, NewJob, Outcome, RelayJob, Status, StatusCounts};
pub use store::Store;
