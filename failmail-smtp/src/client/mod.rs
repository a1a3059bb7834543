//! SMTP client with STARTTLS and AUTH PLAIN support.
//!
//! # Example
//!
//! ```no_run
//! use failmail_smtp::client::{Capabilities, SmtpClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut client = SmtpClient::connect("mail.example.com:587", "mail.example.com").await?;
//! client.read_greeting().await?;
//!
//! let ehlo = client.ehlo("localhost").await?;
//! if Capabilities::from_ehlo(&ehlo).starttls() {
//!     client.starttls().await?;
//!     client.ehlo("localhost").await?;
//! }
//!
//! client.mail_from("alerts@example.com").await?;
//! client.rcpt_to("oncall@example.com").await?;
//! client.data().await?;
//! client.send_data(b"Subject: disk full\r\n\r\n/var is at 100%").await?;
//! # Ok(())
//! # }
//! ```

mod capabilities;
mod data;
mod error;
mod response;
mod smtp_client;

pub use capabilities::Capabilities;
pub use data::dot_stuff;
pub use error::{ClientError, Result};
pub use response::{Response, ResponseLine};
pub use smtp_client::SmtpClient;
