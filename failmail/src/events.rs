//! Delivery outcomes, reported to a [`DeliveryObserver`].

use std::fmt;

use failmail_common::tracing;

/// Something that happened while sending a notification.
///
/// `identity` is always the `username` of the identity concerned. Errors are
/// carried as their rendered message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryEvent {
    /// The initial dial at startup succeeded.
    Connected { identity: String },

    /// The initial dial at startup failed; the identity will dial again when
    /// it is next used.
    InitialDialFailed { identity: String, error: String },

    /// A notification reached this identity.
    Sending { identity: String, subject: String },

    Sent { identity: String, attempt: u32 },

    AttemptFailed {
        identity: String,
        attempt: u32,
        error: String,
    },

    Reconnecting { identity: String },

    Reconnected { identity: String },

    ReconnectFailed { identity: String, error: String },

    /// `max_attempts` delivery attempts failed.
    RetriesExhausted { identity: String, attempts: u32 },

    FallingBack { from: String, to: String },

    /// Every identity in the chain failed; the notification is lost.
    Dropped { identity: String, subject: String },
}

impl fmt::Display for DeliveryEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connected { identity } => write!(f, "{identity}: connected"),
            Self::InitialDialFailed { identity, error } => {
                write!(f, "{identity}: initial connection failed: {error}")
            }
            Self::Sending { identity, subject } => write!(f, "{identity}: sending {subject:?}"),
            Self::Sent { identity, attempt } => {
                write!(f, "{identity}: sent on attempt {attempt}")
            }
            Self::AttemptFailed {
                identity,
                attempt,
                error,
            } => write!(f, "{identity}: attempt {attempt} failed: {error}"),
            Self::Reconnecting { identity } => write!(f, "{identity}: reconnecting"),
            Self::Reconnected { identity } => write!(f, "{identity}: reconnected"),
            Self::ReconnectFailed { identity, error } => {
                write!(f, "{identity}: reconnect failed: {error}")
            }
            Self::RetriesExhausted { identity, attempts } => {
                write!(f, "{identity}: giving up after {attempts} attempt(s)")
            }
            Self::FallingBack { from, to } => write!(f, "{from}: falling back to {to}"),
            Self::Dropped { identity, subject } => {
                write!(f, "{identity}: no backup left, dropping {subject:?}")
            }
        }
    }
}

/// Receives every [`DeliveryEvent`] of a chain.
///
/// Called while the chain is locked, so implementations must not block.
pub trait DeliveryObserver: Send + Sync {
    fn observe(&self, event: &DeliveryEvent);
}

/// Writes events to the `tracing` subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl DeliveryObserver for TracingObserver {
    fn observe(&self, event: &DeliveryEvent) {
        match event {
            DeliveryEvent::Sent { .. }
            | DeliveryEvent::Connected { .. }
            | DeliveryEvent::Reconnected { .. } => tracing::info!("{event}"),
            DeliveryEvent::Sending { .. } | DeliveryEvent::Reconnecting { .. } => {
                tracing::debug!("{event}");
            }
            DeliveryEvent::InitialDialFailed { .. }
            | DeliveryEvent::AttemptFailed { .. }
            | DeliveryEvent::ReconnectFailed { .. }
            | DeliveryEvent::RetriesExhausted { .. }
            | DeliveryEvent::FallingBack { .. } => tracing::warn!("{event}"),
            DeliveryEvent::Dropped { .. } => tracing::error!("{event}"),
        }
    }
}

impl<F> DeliveryObserver for F
where
    F: Fn(&DeliveryEvent) + Send + Sync,
{
    fn observe(&self, event: &DeliveryEvent) {
        self(event);
    }
}
