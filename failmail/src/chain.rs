//! The chain of identities a notification walks through, and the
//! [`Notifier`] that guards it.

use std::{borrow::Cow, sync::Arc};

use tokio::sync::Mutex;

use crate::{
    config::{Config, ConfigError},
    events::{DeliveryEvent, DeliveryObserver, TracingObserver},
    identity::Identity,
};

/// Appended to the body when `failed` hands a notification over to `backup`.
#[must_use]
pub fn backup_note(failed: &str, backup: &str) -> String {
    format!("\r\nnote: error sending to {failed}, sending to backup {backup} instead")
}

/// The top-level identity followed by its backups, in fallback order.
#[derive(Debug)]
pub struct AccountChain {
    identities: Vec<Identity>,
    max_attempts: u32,
}

impl AccountChain {
    /// Builds every identity of `config` without dialing.
    ///
    /// # Errors
    ///
    /// Returns the first invalid setting or identity.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        config.validate()?;

        Ok(Self {
            identities: config
                .identities()
                .map(|identity| Identity::from_config(identity, &config.settings))
                .collect(),
            max_attempts: config.settings.max_attempts,
        })
    }

    #[must_use]
    pub fn identities(&self) -> &[Identity] {
        &self.identities
    }

    pub fn identities_mut(&mut self) -> &mut [Identity] {
        &mut self.identities
    }

    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Dials every identity once. Failures are reported and otherwise
    /// ignored; those identities dial again when they are next used.
    pub async fn connect_all(&mut self, observer: &dyn DeliveryObserver) {
        for identity in &mut self.identities {
            let event = match identity.dial().await {
                Ok(()) => DeliveryEvent::Connected {
                    identity: identity.username().to_string(),
                },
                Err(error) => DeliveryEvent::InitialDialFailed {
                    identity: identity.username().to_string(),
                    error: error.to_string(),
                },
            };
            observer.observe(&event);
        }
    }

    /// Ends every open session with QUIT.
    pub async fn close_all(&mut self) {
        for identity in &mut self.identities {
            identity.connection_mut().close().await;
        }
    }

    /// Walks the chain until one identity delivers. Each handover appends a
    /// note naming the failed identity and its backup to the body.
    ///
    /// Returns `true` if some identity delivered.
    pub async fn send(
        &mut self,
        subject: &str,
        body: &[u8],
        observer: &dyn DeliveryObserver,
    ) -> bool {
        let mut body = Cow::Borrowed(body);
        let max_attempts = self.max_attempts;
        let mut identities = self.identities.iter_mut().peekable();

        while let Some(identity) = identities.next() {
            observer.observe(&DeliveryEvent::Sending {
                identity: identity.username().to_string(),
                subject: subject.to_string(),
            });

            if identity
                .send_with_retry(subject, &body, max_attempts, observer)
                .await
            {
                return true;
            }

            let Some(backup) = identities.peek() else {
                observer.observe(&DeliveryEvent::Dropped {
                    identity: identity.username().to_string(),
                    subject: subject.to_string(),
                });
                return false;
            };

            observer.observe(&DeliveryEvent::FallingBack {
                from: identity.username().to_string(),
                to: backup.username().to_string(),
            });
            body.to_mut()
                .extend_from_slice(backup_note(identity.username(), backup.username()).as_bytes());
        }

        false
    }
}

/// Entry point for sending notifications.
///
/// Sends through one `Notifier` are serialized; separate notifiers work in
/// parallel.
pub struct Notifier {
    chain: Mutex<AccountChain>,
    observer: Arc<dyn DeliveryObserver>,
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier").finish_non_exhaustive()
    }
}

impl Notifier {
    /// Builds the chain from `config` and dials every identity once,
    /// reporting through [`TracingObserver`].
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid. Failed dials are
    /// not errors.
    pub async fn connect(config: &Config) -> Result<Self, ConfigError> {
        Self::connect_with_observer(config, Arc::new(TracingObserver)).await
    }

    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub async fn connect_with_observer(
        config: &Config,
        observer: Arc<dyn DeliveryObserver>,
    ) -> Result<Self, ConfigError> {
        let mut chain = AccountChain::from_config(config)?;
        chain.connect_all(observer.as_ref()).await;
        Ok(Self::new(chain, observer))
    }

    /// Wraps a chain as is, without dialing.
    #[must_use]
    pub fn new(chain: AccountChain, observer: Arc<dyn DeliveryObserver>) -> Self {
        Self {
            chain: Mutex::new(chain),
            observer,
        }
    }

    /// Sends a notification through the chain.
    ///
    /// Never fails: the outcome, including a dropped notification, is only
    /// reported to the observer.
    pub async fn send(&self, subject: &str, body: &[u8]) {
        let mut chain = self.chain.lock().await;
        chain.send(subject, body, self.observer.as_ref()).await;
    }

    /// Waits for any send in progress, then ends every open session.
    pub async fn shutdown(&self) {
        self.chain.lock().await.close_all().await;
    }

    /// Locks the chain, for inspection.
    pub async fn chain(&self) -> tokio::sync::MutexGuard<'_, AccountChain> {
        self.chain.lock().await
    }
}
