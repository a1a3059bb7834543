//! Configuration types shared between the SMTP client and the notifier.
//!
//! - [`timeouts`]: per-step bounds for outbound SMTP sessions
//! - [`tls`]: STARTTLS policy and certificate validation settings

pub mod timeouts;
pub mod tls;

pub use timeouts::ClientTimeouts;
pub use tls::{TlsCertificatePolicy, TlsConfig, TlsPolicy};
