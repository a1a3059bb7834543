//! The lazily (re)connected SMTP session of one identity.

use std::time::{Duration, Instant};

use failmail_common::{
    config::{ClientTimeouts, TlsConfig},
    internal, tracing,
};
use failmail_smtp::{Capabilities, SmtpClient};

use crate::{
    config::IdentityConfig,
    error::{DialError, Step, StepError, bounded},
    transaction::Transaction,
};

/// Username and password for AUTH PLAIN.
#[derive(Clone)]
pub struct Credential {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Owns the session handle and the last-dial timestamp of one identity.
#[derive(Debug)]
pub struct ConnectionManager {
    address: String,
    host: String,
    helo_name: String,
    credential: Option<Credential>,
    tls: TlsConfig,
    cooldown: Duration,
    timeouts: ClientTimeouts,
    session: Option<Session>,
    last_dial: Option<Instant>,
}

/// An established session.
pub(crate) struct Session(SmtpClient);

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("server", &self.0.server_domain())
            .field("tls", &self.0.is_tls())
            .finish()
    }
}

impl ConnectionManager {
    /// `config` must already be validated.
    #[must_use]
    pub fn new(config: &IdentityConfig, cooldown: Duration, timeouts: ClientTimeouts) -> Self {
        let host = config.host().unwrap_or(config.addr.as_str()).to_string();

        Self {
            address: config.addr.clone(),
            host,
            helo_name: config.helo_name.clone(),
            credential: config.password.as_ref().map(|password| Credential {
                username: config.username.clone(),
                password: password.clone(),
            }),
            tls: config.tls,
            cooldown,
            timeouts,
            session: None,
            last_dial: None,
        }
    }

    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    #[must_use]
    pub const fn last_dial(&self) -> Option<Instant> {
        self.last_dial
    }

    /// Returns `true` if the open session was upgraded with STARTTLS.
    #[must_use]
    pub fn is_tls(&self) -> bool {
        self.session.as_ref().is_some_and(|session| session.0.is_tls())
    }

    /// The open session, ready for a transaction.
    pub(crate) fn transaction(&mut self) -> Option<Transaction<'_>> {
        let Self {
            session, timeouts, ..
        } = self;
        session
            .as_mut()
            .map(|session| Transaction::new(&mut session.0, timeouts))
    }

    /// Opens a new session, replacing the current one.
    ///
    /// Fails with [`DialError::ReconnectTooSoon`] without touching the
    /// network if the previous dial attempt is younger than the cooldown.
    /// Otherwise the attempt is recorded, the previous session is discarded,
    /// and a new one is connected, upgraded with STARTTLS when advertised (or
    /// required), and authenticated when the server offers AUTH and a
    /// password is configured.
    ///
    /// # Errors
    ///
    /// Returns the first step that failed; no session is kept in that case.
    pub async fn dial(&mut self) -> Result<(), DialError> {
        let now = Instant::now();
        if let Some(last) = self.last_dial {
            let elapsed = now.duration_since(last);
            if elapsed < self.cooldown {
                return Err(DialError::ReconnectTooSoon {
                    elapsed,
                    cooldown: self.cooldown,
                });
            }
        }

        self.last_dial = Some(now);
        self.session = None;

        let client = self.open().await?;
        self.session = Some(Session(client));
        Ok(())
    }

    /// Leaves the session fit for the next transaction after `error`.
    ///
    /// A rejected step is followed by RSET. After a timeout or a wire error
    /// the stream may still hold a late reply, so the session is dropped and
    /// the next attempt has to dial. A failed RSET drops it too.
    pub(crate) async fn recover(&mut self, error: &StepError) {
        let Some(Session(client)) = self.session.as_mut() else {
            return;
        };

        if matches!(error, StepError::Rejected { .. }) {
            match bounded(Step::Rset, self.timeouts.quit(), client.rset()).await {
                Ok(response) if response.is_success() => return,
                Ok(response) => internal!(
                    level = DEBUG,
                    "{} refused RSET: {} {}",
                    self.address,
                    response.code,
                    response.message()
                ),
                Err(err) => {
                    internal!(level = DEBUG, "Resetting session to {}: {err}", self.address);
                }
            }
        }

        internal!(level = DEBUG, "Dropping session to {}", self.address);
        self.session = None;
    }

    /// Sends QUIT on the open session, if any, and drops it. The reply is
    /// not checked.
    pub async fn close(&mut self) {
        let Some(Session(mut client)) = self.session.take() else {
            return;
        };

        if let Err(err) = bounded(Step::Quit, self.timeouts.quit(), client.quit()).await {
            internal!(level = DEBUG, "Closing session to {}: {err}", self.address);
        }
    }

    async fn open(&self) -> Result<SmtpClient, DialError> {
        if self.tls.accepts_invalid_certs() {
            tracing::warn!(
                server = %self.address,
                "SECURITY WARNING: TLS certificate validation is disabled for this connection"
            );
        }

        internal!(level = DEBUG, "Dialing {}", self.address);

        let mut client = bounded(
            Step::Connect,
            self.timeouts.connect(),
            SmtpClient::connect(&self.address, self.host.clone()),
        )
        .await?
        .accept_invalid_certs(self.tls.accepts_invalid_certs());

        let greeting = bounded(
            Step::Greeting,
            self.timeouts.connect(),
            client.read_greeting(),
        )
        .await?;
        if !greeting.is_success() {
            return Err(StepError::rejected(Step::Greeting, &greeting).into());
        }

        let mut capabilities = self.ehlo(&mut client).await?;

        if self.tls.should_upgrade(capabilities.starttls()) {
            let response =
                bounded(Step::StartTls, self.timeouts.starttls(), client.starttls()).await?;
            if !response.is_success() {
                return Err(StepError::rejected(Step::StartTls, &response).into());
            }

            // Capabilities announced before the handshake are void.
            capabilities = self.ehlo(&mut client).await?;
            internal!(level = DEBUG, "TLS negotiated with {}", self.host);
        } else if self.tls.is_required() {
            return Err(DialError::TlsUnavailable);
        }

        if capabilities.auth() {
            if let Some(credential) = &self.credential {
                self.authenticate(&mut client, &capabilities, credential)
                    .await?;
            }
        }

        Ok(client)
    }

    async fn ehlo(&self, client: &mut SmtpClient) -> Result<Capabilities, DialError> {
        let response = bounded(
            Step::Ehlo,
            self.timeouts.ehlo(),
            client.ehlo(&self.helo_name),
        )
        .await?;
        if !response.is_success() {
            return Err(StepError::rejected(Step::Ehlo, &response).into());
        }
        Ok(Capabilities::from_ehlo(&response))
    }

    async fn authenticate(
        &self,
        client: &mut SmtpClient,
        capabilities: &Capabilities,
        credential: &Credential,
    ) -> Result<(), DialError> {
        if !capabilities.auth_mechanism("PLAIN") {
            return Err(DialError::AuthMechanismUnavailable);
        }

        if !client.is_tls() && !is_loopback(&self.host) {
            return Err(DialError::InsecureAuth {
                host: self.host.clone(),
            });
        }

        let response = bounded(
            Step::Auth,
            self.timeouts.starttls(),
            client.auth_plain(&credential.username, &credential.password),
        )
        .await?;

        if response.is_success() {
            Ok(())
        } else {
            Err(StepError::rejected(Step::Auth, &response).into())
        }
    }
}

/// Credentials may travel in plaintext only to the local machine.
fn is_loopback(host: &str) -> bool {
    host.eq_ignore_ascii_case("localhost")
        || host
            .parse::<std::net::IpAddr>()
            .is_ok_and(|ip| ip.is_loopback())
}
