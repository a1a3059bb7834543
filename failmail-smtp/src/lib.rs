//! A small SMTP submission client.
//!
//! Only the primitives a notification sender needs are provided: connect and
//! greeting, EHLO with capability parsing, STARTTLS, AUTH PLAIN, and the
//! MAIL/RCPT/DATA transaction. Callers decide what a reply code means and
//! apply their own timeouts.

pub mod client;

pub use client::{Capabilities, ClientError, Response, SmtpClient};
