//! TerminusDB engine over its HTTP document and WOQL APIs.

pub mod client;
mod documents;
pub mod woql;

pub use client::{TerminusAuth, TerminusClient};
