//! Configuration binding.
//!
//! The document describes the top-level sending identity directly, with its
//! backup nested under `backup` to any depth:
//!
//! ```toml
//! addr = "smtp.example.com:587"
//! username = "alerts@example.com"
//! password = "hunter2"
//!
//! [[destinations]]
//! name = "On call"
//! email = "oncall@example.com"
//!
//! [backup]
//! addr = "smtp.backup.example.net:587"
//! username = "alerts@backup.example.net"
//!
//! [[backup.destinations]]
//! email = "oncall@example.com"
//! ```
//!
//! Any error here is fatal for startup. Structural problems (a missing
//! required key, `destinations` that is not an array of tables, `backup` that
//! is not a table) are reported by the TOML parser with their line and
//! column; value problems are reported with the dotted path of the key.

use std::{path::Path, time::Duration};

use failmail_common::config::{ClientTimeouts, TlsConfig};
use mailparse::MailAddr;
use serde::Deserialize;
use thiserror::Error;

/// Minimum time between two dial attempts of the same identity.
pub const DEFAULT_RECONNECT_COOLDOWN_SECS: u64 = 30;

/// Delivery attempts one identity makes per notification before handing over
/// to its backup.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Display name used in the `From` header when none is configured.
pub const DEFAULT_FROM_NAME: &str = "systemd";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config from {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Parse(#[from] toml::de::Error),

    #[error("{key}: {value:?} is not in \"host:port\" format")]
    InvalidAddress { key: String, value: String },

    #[error("{key}: must not be empty")]
    Empty { key: String },

    #[error("{key}: {value:?} is not a single email address")]
    InvalidEmail { key: String, value: String },

    #[error("{key}: {reason}")]
    InvalidSetting { key: String, reason: String },
}

/// A whole configuration document: chain-wide settings plus the top-level
/// identity.
#[derive(Debug, Clone)]
pub struct Config {
    pub settings: Settings,
    pub identity: IdentityConfig,
}

/// Chain-wide settings, read from the top level of the document next to the
/// identity keys.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Settings {
    /// Seconds that must pass between two dials of the same identity.
    #[serde(default = "default_reconnect_cooldown_secs")]
    pub reconnect_cooldown_secs: u64,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default)]
    pub timeouts: ClientTimeouts,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            reconnect_cooldown_secs: DEFAULT_RECONNECT_COOLDOWN_SECS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            timeouts: ClientTimeouts::default(),
        }
    }
}

impl Settings {
    #[must_use]
    pub const fn reconnect_cooldown(&self) -> Duration {
        Duration::from_secs(self.reconnect_cooldown_secs)
    }
}

/// One sending identity and, optionally, its backup.
#[derive(Debug, Clone, Deserialize)]
pub struct IdentityConfig {
    /// `host:port` of the submission server.
    pub addr: String,

    /// Used for MAIL FROM, the `From` header and AUTH.
    pub username: String,

    /// AUTH is only attempted when a password is set.
    #[serde(default)]
    pub password: Option<String>,

    #[serde(default = "default_from_name")]
    pub from_name: String,

    #[serde(default = "default_helo_name")]
    pub helo_name: String,

    #[serde(default)]
    pub tls: TlsConfig,

    pub destinations: Vec<DestinationConfig>,

    #[serde(default)]
    pub backup: Option<Box<IdentityConfig>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DestinationConfig {
    #[serde(default)]
    pub name: Option<String>,
    pub email: String,
}

const fn default_reconnect_cooldown_secs() -> u64 {
    DEFAULT_RECONNECT_COOLDOWN_SECS
}

const fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_from_name() -> String {
    DEFAULT_FROM_NAME.to_string()
}

fn default_helo_name() -> String {
    "localhost".to_string()
}

impl Config {
    /// Parse and validate a TOML document.
    ///
    /// # Errors
    ///
    /// Returns the first problem found in the document.
    pub fn from_toml_str(document: &str) -> Result<Self, ConfigError> {
        // Two passes over the same document keep the parser's positions in
        // error messages, which a flattened struct would lose.
        let config = Self {
            settings: toml::from_str(document)?,
            identity: toml::from_str(document)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file can't be read or is invalid.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let document = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&document)
    }

    /// # Errors
    ///
    /// Returns the first invalid setting or identity.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.settings.max_attempts == 0 {
            return Err(ConfigError::InvalidSetting {
                key: "max_attempts".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        let mut prefix = String::new();
        for identity in self.identities() {
            identity.validate(&prefix)?;
            prefix.push_str("backup.");
        }
        Ok(())
    }

    /// The top-level identity followed by its backups, in fallback order.
    pub fn identities(&self) -> impl Iterator<Item = &IdentityConfig> {
        std::iter::successors(Some(&self.identity), |identity| {
            identity.backup.as_deref()
        })
    }
}

impl IdentityConfig {
    /// Host part of `addr`, without IPv6 brackets.
    ///
    /// # Errors
    ///
    /// Returns an error if `addr` is not `host:port`.
    pub fn host(&self) -> Result<&str, ConfigError> {
        split_host_port(&self.addr).ok_or_else(|| ConfigError::InvalidAddress {
            key: "addr".to_string(),
            value: self.addr.clone(),
        })
    }

    fn validate(&self, prefix: &str) -> Result<(), ConfigError> {
        if split_host_port(&self.addr).is_none() {
            return Err(ConfigError::InvalidAddress {
                key: format!("{prefix}addr"),
                value: self.addr.clone(),
            });
        }

        if self.username.trim().is_empty() {
            return Err(ConfigError::Empty {
                key: format!("{prefix}username"),
            });
        }

        if self.destinations.is_empty() {
            return Err(ConfigError::Empty {
                key: format!("{prefix}destinations"),
            });
        }

        for (index, destination) in self.destinations.iter().enumerate() {
            if !is_single_mailbox(&destination.email) {
                return Err(ConfigError::InvalidEmail {
                    key: format!("{prefix}destinations[{index}].email"),
                    value: destination.email.clone(),
                });
            }
        }

        Ok(())
    }
}

/// `host:port` with a numeric port. Returns the host, brackets stripped.
fn split_host_port(addr: &str) -> Option<&str> {
    let (host, port) = addr.rsplit_once(':')?;
    port.parse::<u16>().ok()?;

    let host = match host.strip_prefix('[') {
        Some(inner) => inner.strip_suffix(']')?,
        None if host.contains(':') => return None,
        None => host,
    };

    (!host.is_empty()).then_some(host)
}

/// A bare `local@domain` address, no display name, no group, no list.
fn is_single_mailbox(email: &str) -> bool {
    match mailparse::addrparse(email) {
        Ok(list) => match &list[..] {
            [MailAddr::Single(info)] => {
                info.display_name.is_none() && info.addr == email && email.contains('@')
            }
            _ => false,
        },
        Err(_) => false,
    }
}
