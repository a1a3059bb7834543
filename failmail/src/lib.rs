//! Failure notifications over SMTP.
//!
//! A [`Notifier`] owns a chain of sending identities. Each notification is
//! delivered through the first identity that can take it: an identity whose
//! delivery fails reconnects and retries, and once it gives up the
//! notification moves on to its backup with a note appended to the body.
//! Nothing is queued; a notification that no identity could deliver is
//! dropped.
//!
//! ```no_run
//! # async fn run() -> Result<(), failmail::ConfigError> {
//! let config = failmail::Config::load("/etc/failmail/failmail.toml")?;
//! let notifier = failmail::Notifier::connect(&config).await?;
//! notifier.send("nginx.service failed", b"see journalctl -u nginx").await;
//! # Ok(())
//! # }
//! ```

pub mod chain;
pub mod composer;
pub mod config;
pub mod connection;
pub mod error;
pub mod events;
pub mod identity;
pub mod transaction;

pub use chain::{AccountChain, Notifier, backup_note};
pub use composer::{Composer, Destination};
pub use config::{Config, ConfigError, DestinationConfig, IdentityConfig, Settings};
pub use connection::ConnectionManager;
pub use error::{DeliveryError, DialError, Step, StepError};
pub use events::{DeliveryEvent, DeliveryObserver, TracingObserver};
pub use identity::Identity;
