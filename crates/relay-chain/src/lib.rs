//! The destination-chain (EVM) client: the only crate in this workspace
//! that speaks to the deployed router contract, and the only place that
//! decides whether a receipt means `confirmed` or `failed`.

mod classify;
mod client;
mod contract;
mod error;

pub use classify::{classify_topics, is_terminal_revert, LogClassification, SubmissionOutcome};
pub use client::ChainClient;
pub use contract::IRelayRouter;
pub use error::ChainError;
