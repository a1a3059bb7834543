//! Shared plumbing for the failmail crates: logging setup and the
//! configuration types used by both the SMTP client and the notifier.

pub mod config;
pub mod logging;

pub use tracing;
