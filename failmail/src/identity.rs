//! A sending identity: its session, its message buffer and its destinations.

use crate::{
    composer::{Composer, Destination},
    config::{IdentityConfig, Settings},
    connection::ConnectionManager,
    error::{DeliveryError, DialError},
    events::{DeliveryEvent, DeliveryObserver},
};

#[derive(Debug)]
pub struct Identity {
    username: String,
    destinations: Vec<String>,
    connection: ConnectionManager,
    composer: Composer,
}

impl Identity {
    /// Builds the identity without dialing. `config` must already be
    /// validated; its `backup` is ignored.
    #[must_use]
    pub fn from_config(config: &IdentityConfig, settings: &Settings) -> Self {
        let destinations: Vec<Destination> = config
            .destinations
            .iter()
            .map(|d| Destination::new(d.name.as_deref(), d.email.clone()))
            .collect();

        Self {
            username: config.username.clone(),
            composer: Composer::new(&config.from_name, &config.username, &destinations),
            destinations: destinations.into_iter().map(|d| d.email).collect(),
            connection: ConnectionManager::new(
                config,
                settings.reconnect_cooldown(),
                settings.timeouts.clone(),
            ),
        }
    }

    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Destination addresses in RCPT order.
    #[must_use]
    pub fn destinations(&self) -> &[String] {
        &self.destinations
    }

    #[must_use]
    pub const fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    pub const fn connection_mut(&mut self) -> &mut ConnectionManager {
        &mut self.connection
    }

    #[must_use]
    pub const fn composer(&self) -> &Composer {
        &self.composer
    }

    /// See [`ConnectionManager::dial`].
    ///
    /// # Errors
    ///
    /// Returns why no session could be opened.
    pub async fn dial(&mut self) -> Result<(), DialError> {
        self.connection.dial().await
    }

    /// One delivery attempt over the open session.
    ///
    /// The message buffer is back at its header prefix when this returns,
    /// whatever the outcome. A failed transaction is reset with RSET, or the
    /// session is dropped if it can no longer be trusted.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::NoSession`] if no session is open, otherwise
    /// the first step that failed.
    pub async fn deliver(&mut self, subject: &str, body: &[u8]) -> Result<(), DeliveryError> {
        let transaction = self
            .connection
            .transaction()
            .ok_or(DeliveryError::NoSession)?;

        let message = self.composer.compose(subject, body);
        let result = transaction
            .execute(&self.username, &self.destinations, &message)
            .await;
        drop(message);

        if let Err(error) = &result {
            self.connection.recover(error).await;
        }
        result.map_err(DeliveryError::Step)
    }

    /// Delivers, reconnecting after each failed attempt, until a delivery
    /// succeeds, `max_attempts` attempts have failed, or a reconnect fails.
    ///
    /// Returns `true` if the message was delivered.
    pub async fn send_with_retry(
        &mut self,
        subject: &str,
        body: &[u8],
        max_attempts: u32,
        observer: &dyn DeliveryObserver,
    ) -> bool {
        let mut attempt = 0;

        loop {
            attempt += 1;

            match self.deliver(subject, body).await {
                Ok(()) => {
                    observer.observe(&DeliveryEvent::Sent {
                        identity: self.username.clone(),
                        attempt,
                    });
                    return true;
                }
                Err(error) => observer.observe(&DeliveryEvent::AttemptFailed {
                    identity: self.username.clone(),
                    attempt,
                    error: error.to_string(),
                }),
            }

            if attempt >= max_attempts {
                observer.observe(&DeliveryEvent::RetriesExhausted {
                    identity: self.username.clone(),
                    attempts: attempt,
                });
                return false;
            }

            observer.observe(&DeliveryEvent::Reconnecting {
                identity: self.username.clone(),
            });
            match self.dial().await {
                Ok(()) => observer.observe(&DeliveryEvent::Reconnected {
                    identity: self.username.clone(),
                }),
                Err(error) => {
                    observer.observe(&DeliveryEvent::ReconnectFailed {
                        identity: self.username.clone(),
                        error: error.to_string(),
                    });
                    return false;
                }
            }
        }
    }
}
