//! TLS configuration for outbound SMTP sessions.

use serde::{Deserialize, Serialize};

/// When to upgrade a session with STARTTLS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TlsPolicy {
    /// Upgrade whenever the server advertises STARTTLS.
    ///
    /// A failed upgrade aborts the dial; there is no plaintext retry on the
    /// same connection.
    #[default]
    Opportunistic,

    /// Fail the dial if the server does not advertise STARTTLS.
    Required,

    /// Never upgrade, even when STARTTLS is advertised.
    ///
    /// **WARNING**: credentials are then only sent to loopback servers.
    Disabled,
}

/// Certificate validation policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct TlsCertificatePolicy {
    /// Accept invalid certificates (self-signed, expired, wrong name).
    ///
    /// **SECURITY WARNING**: only for test servers.
    ///
    /// Default: `false`
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

/// Complete TLS configuration for one sending identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct TlsConfig {
    #[serde(default)]
    pub policy: TlsPolicy,

    #[serde(default)]
    pub certificate: TlsCertificatePolicy,
}

impl TlsConfig {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            policy: TlsPolicy::Opportunistic,
            certificate: TlsCertificatePolicy {
                accept_invalid_certs: false,
            },
        }
    }

    #[must_use]
    pub const fn required() -> Self {
        Self {
            policy: TlsPolicy::Required,
            certificate: TlsCertificatePolicy {
                accept_invalid_certs: false,
            },
        }
    }

    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            policy: TlsPolicy::Disabled,
            certificate: TlsCertificatePolicy {
                accept_invalid_certs: false,
            },
        }
    }

    /// Returns `true` if the dial must fail without STARTTLS.
    #[must_use]
    pub const fn is_required(&self) -> bool {
        matches!(self.policy, TlsPolicy::Required)
    }

    /// Returns `true` if STARTTLS is never attempted.
    #[must_use]
    pub const fn is_disabled(&self) -> bool {
        matches!(self.policy, TlsPolicy::Disabled)
    }

    #[must_use]
    pub const fn accepts_invalid_certs(&self) -> bool {
        self.certificate.accept_invalid_certs
    }

    /// Whether a session whose server advertised (or did not advertise)
    /// STARTTLS should be upgraded.
    #[must_use]
    pub const fn should_upgrade(&self, advertised: bool) -> bool {
        match self.policy {
            TlsPolicy::Opportunistic | TlsPolicy::Required => advertised,
            TlsPolicy::Disabled => false,
        }
    }
}
