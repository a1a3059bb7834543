//! Errors observed while dialing and delivering.
//!
//! None of these reach the caller of [`Notifier::send`](crate::Notifier::send);
//! they decide between retry, fallback and drop and are reported as
//! [`DeliveryEvent`](crate::DeliveryEvent)s.

use std::{fmt, future::Future, time::Duration};

use failmail_smtp::{ClientError, Response};
use thiserror::Error;

/// One step of an SMTP session, for error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Connect,
    Greeting,
    Ehlo,
    StartTls,
    Auth,
    MailFrom,
    RcptTo,
    Data,
    DataEnd,
    Rset,
    Quit,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Connect => "connect",
            Self::Greeting => "greeting",
            Self::Ehlo => "EHLO",
            Self::StartTls => "STARTTLS",
            Self::Auth => "AUTH",
            Self::MailFrom => "MAIL FROM",
            Self::RcptTo => "RCPT TO",
            Self::Data => "DATA",
            Self::DataEnd => "end of DATA",
            Self::Rset => "RSET",
            Self::Quit => "QUIT",
        })
    }
}

/// Failure of a single session step.
#[derive(Debug, Error)]
pub enum StepError {
    #[error("{step} timed out after {limit:?}")]
    Timeout { step: Step, limit: Duration },

    #[error("{step} failed: {source}")]
    Client {
        step: Step,
        #[source]
        source: ClientError,
    },

    #[error("server rejected {step}: {code} {message}")]
    Rejected {
        step: Step,
        code: u16,
        message: String,
    },
}

impl StepError {
    #[must_use]
    pub const fn step(&self) -> Step {
        match self {
            Self::Timeout { step, .. } | Self::Client { step, .. } | Self::Rejected { step, .. } => {
                *step
            }
        }
    }

    pub(crate) fn rejected(step: Step, response: &Response) -> Self {
        Self::Rejected {
            step,
            code: response.code,
            message: response.message(),
        }
    }
}

/// Runs one client call under `limit`.
pub(crate) async fn bounded<T>(
    step: Step,
    limit: Duration,
    call: impl Future<Output = Result<T, ClientError>>,
) -> Result<T, StepError> {
    tokio::time::timeout(limit, call)
        .await
        .map_err(|_| StepError::Timeout { step, limit })?
        .map_err(|source| StepError::Client { step, source })
}

/// Why a dial did not produce a usable session.
#[derive(Debug, Error)]
pub enum DialError {
    /// The previous dial was too recent; the network was not touched.
    #[error("reconnection attempted {elapsed:?} after the last one, cooldown is {cooldown:?}")]
    ReconnectTooSoon { elapsed: Duration, cooldown: Duration },

    #[error(transparent)]
    Step(#[from] StepError),

    #[error("server does not offer STARTTLS and TLS is required")]
    TlsUnavailable,

    #[error("refusing to send credentials to {host} over an unencrypted connection")]
    InsecureAuth { host: String },

    #[error("server does not offer the PLAIN authentication mechanism")]
    AuthMechanismUnavailable,
}

impl DialError {
    #[must_use]
    pub const fn is_cooldown(&self) -> bool {
        matches!(self, Self::ReconnectTooSoon { .. })
    }
}

/// Why a delivery attempt failed.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("no open session")]
    NoSession,

    #[error(transparent)]
    Step(#[from] StepError),
}
