//! Mock SMTP server for exercising identities against a real socket.
//!
//! The server can:
//! - Reply with configurable codes per command
//! - Fail MAIL FROM for the first N transactions across all connections
//! - Fail a specific RCPT TO within a transaction
//! - Delay every reply, or hang on the Nth command of a connection
//! - Record every command, AUTH token and message it receives
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), std::io::Error> {
//! let server = MockSmtpServer::builder()
//!     .with_mail_from_responses(vec![(451, "try later"), (250, "OK")])
//!     .build()
//!     .await?;
//!
//! // point an identity at server.addr()
//!
//! server.shutdown();
//! # Ok(())
//! # }
//! ```

use std::{
    fmt::Write,
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use failmail_common::tracing;
use tokio::{
    io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
    sync::RwLock,
    time::timeout,
};

/// SMTP command received by the mock server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmtpCommand {
    Ehlo(String),
    StartTls,
    /// Everything after `AUTH `
    Auth(String),
    /// The address between the angle brackets
    MailFrom(String),
    /// The address between the angle brackets
    RcptTo(String),
    Data,
    /// Message content after DATA, dot-unstuffed, without the terminator
    MessageContent(Vec<u8>),
    Rset,
    Quit,
    Other(String),
}

#[derive(Debug, Clone)]
pub struct SmtpResponse {
    pub code: u16,
    pub message: String,
}

impl SmtpResponse {
    fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    fn to_bytes(&self) -> Vec<u8> {
        format!("{} {}\r\n", self.code, self.message).into_bytes()
    }
}

#[derive(Clone)]
struct MockServerConfig {
    greeting: SmtpResponse,
    ehlo_code: u16,
    capabilities: Vec<String>,
    auth_response: SmtpResponse,
    starttls_response: Option<SmtpResponse>,
    /// Indexed by the server-wide MAIL FROM count; the last entry repeats.
    mail_from_responses: Vec<SmtpResponse>,
    /// Indexed by RCPT position within a transaction; missing entries are 250.
    rcpt_to_responses: Vec<SmtpResponse>,
    data_response: SmtpResponse,
    data_end_response: SmtpResponse,
    rset_response: SmtpResponse,

    response_delay: Option<Duration>,
    timeout_on_command: Option<usize>,
}

impl Default for MockServerConfig {
    fn default() -> Self {
        Self {
            greeting: SmtpResponse::new(220, "Mock SMTP Server"),
            ehlo_code: 250,
            capabilities: vec!["mock.local".to_string(), "SIZE 10000".to_string()],
            auth_response: SmtpResponse::new(235, "Authentication successful"),
            starttls_response: None,
            mail_from_responses: vec![SmtpResponse::new(250, "OK")],
            rcpt_to_responses: Vec::new(),
            data_response: SmtpResponse::new(354, "Start mail input; end with <CRLF>.<CRLF>"),
            data_end_response: SmtpResponse::new(250, "OK: Message accepted"),
            rset_response: SmtpResponse::new(250, "OK"),
            response_delay: None,
            timeout_on_command: None,
        }
    }
}

impl MockServerConfig {
    fn ehlo_bytes(&self) -> Vec<u8> {
        let mut response = String::new();
        let last = self.capabilities.len().saturating_sub(1);

        for (i, cap) in self.capabilities.iter().enumerate() {
            let separator = if i < last { '-' } else { ' ' };
            let _ = write!(&mut response, "{}{separator}{cap}\r\n", self.ehlo_code);
        }

        response.into_bytes()
    }
}

struct Shared {
    config: MockServerConfig,
    commands: RwLock<Vec<SmtpCommand>>,
    connections: AtomicUsize,
    mail_from_count: AtomicUsize,
}

/// Mock SMTP server for testing
pub struct MockSmtpServer {
    addr: SocketAddr,
    shared: Arc<Shared>,
    shutdown: Arc<AtomicBool>,
}

impl MockSmtpServer {
    #[must_use]
    pub fn builder() -> MockServerBuilder {
        MockServerBuilder::default()
    }

    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// All commands received, across connections, in arrival order.
    pub async fn commands(&self) -> Vec<SmtpCommand> {
        self.shared.commands.read().await.clone()
    }

    /// Every message body received after DATA.
    pub async fn messages(&self) -> Vec<Vec<u8>> {
        self.commands()
            .await
            .into_iter()
            .filter_map(|command| match command {
                SmtpCommand::MessageContent(content) => Some(content),
                _ => None,
            })
            .collect()
    }

    /// Number of MAIL FROM commands received.
    pub async fn mail_from_count(&self) -> usize {
        self.commands()
            .await
            .iter()
            .filter(|command| matches!(command, SmtpCommand::MailFrom(_)))
            .count()
    }

    /// Number of TCP connections accepted.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.shared.connections.load(Ordering::SeqCst)
    }

    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    async fn respond(
        writer: &mut (impl AsyncWrite + Unpin),
        config: &MockServerConfig,
        response: &[u8],
    ) -> std::io::Result<()> {
        if let Some(delay) = config.response_delay {
            tokio::time::sleep(delay).await;
        }
        writer.write_all(response).await?;
        writer.flush().await
    }

    async fn handle_client(
        mut stream: TcpStream,
        shared: Arc<Shared>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let config = &shared.config;
        let (reader, mut writer) = stream.split();
        let mut reader = BufReader::new(reader);
        let mut line = String::new();
        let mut local_command_count = 0;
        let mut rcpt_index = 0;

        Self::respond(&mut writer, config, &config.greeting.to_bytes()).await?;

        loop {
            line.clear();

            if config.timeout_on_command == Some(local_command_count) {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                return Ok(());
            }

            let Ok(read_result) = timeout(Duration::from_secs(10), reader.read_line(&mut line)).await
            else {
                return Ok(());
            };
            if read_result? == 0 {
                return Ok(());
            }
            local_command_count += 1;

            let cmd_line = line.trim_end();
            tracing::debug!("Mock server received: {}", cmd_line);

            let (verb, argument) = cmd_line.split_once(' ').unwrap_or((cmd_line, ""));
            let (response, command) = match verb.to_uppercase().as_str() {
                "EHLO" => (config.ehlo_bytes(), SmtpCommand::Ehlo(argument.to_string())),
                "STARTTLS" => (
                    config
                        .starttls_response
                        .as_ref()
                        .map_or_else(
                            || SmtpResponse::new(502, "Command not implemented"),
                            Clone::clone,
                        )
                        .to_bytes(),
                    SmtpCommand::StartTls,
                ),
                "AUTH" => (
                    config.auth_response.to_bytes(),
                    SmtpCommand::Auth(argument.to_string()),
                ),
                "MAIL" => {
                    rcpt_index = 0;
                    let n = shared.mail_from_count.fetch_add(1, Ordering::SeqCst);
                    let responses = &config.mail_from_responses;
                    let response = &responses[n.min(responses.len() - 1)];
                    (
                        response.to_bytes(),
                        SmtpCommand::MailFrom(bracketed(argument)),
                    )
                }
                "RCPT" => {
                    let response = config
                        .rcpt_to_responses
                        .get(rcpt_index)
                        .cloned()
                        .unwrap_or_else(|| SmtpResponse::new(250, "OK"));
                    rcpt_index += 1;
                    (
                        response.to_bytes(),
                        SmtpCommand::RcptTo(bracketed(argument)),
                    )
                }
                "DATA" => (config.data_response.to_bytes(), SmtpCommand::Data),
                "RSET" => {
                    rcpt_index = 0;
                    (config.rset_response.to_bytes(), SmtpCommand::Rset)
                }
                "QUIT" => {
                    shared.commands.write().await.push(SmtpCommand::Quit);
                    Self::respond(&mut writer, config, b"221 Bye\r\n").await?;
                    return Ok(());
                }
                _ => (
                    SmtpResponse::new(500, "Unknown command").to_bytes(),
                    SmtpCommand::Other(cmd_line.to_string()),
                ),
            };

            let accepts_data =
                matches!(command, SmtpCommand::Data) && config.data_response.code == 354;
            shared.commands.write().await.push(command);
            Self::respond(&mut writer, config, &response).await?;

            if accepts_data {
                let mut content = Vec::new();
                let mut data_line = Vec::new();

                loop {
                    data_line.clear();
                    if reader.read_until(b'\n', &mut data_line).await? == 0 {
                        return Ok(());
                    }
                    if data_line == b".\r\n" {
                        break;
                    }
                    let unstuffed = data_line.strip_prefix(b".").unwrap_or(&data_line);
                    content.extend_from_slice(unstuffed);
                }

                shared
                    .commands
                    .write()
                    .await
                    .push(SmtpCommand::MessageContent(content));
                Self::respond(&mut writer, config, &config.data_end_response.to_bytes()).await?;
            }
        }
    }
}

impl Drop for MockSmtpServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// `<a@x.com>` from `FROM:<a@x.com>` or `TO:<a@x.com>`.
fn bracketed(argument: &str) -> String {
    argument
        .split_once('<')
        .and_then(|(_, rest)| rest.split_once('>'))
        .map_or_else(|| argument.to_string(), |(address, _)| address.to_string())
}

#[derive(Default)]
pub struct MockServerBuilder {
    config: MockServerConfig,
}

impl MockServerBuilder {
    #[must_use]
    pub fn with_greeting(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.greeting = SmtpResponse::new(code, message);
        self
    }

    /// Capabilities after the domain line of the EHLO reply.
    #[must_use]
    pub fn with_capabilities(mut self, capabilities: &[&str]) -> Self {
        self.config
            .capabilities
            .extend(capabilities.iter().map(|cap| (*cap).to_string()));
        self
    }

    /// Advertises `AUTH PLAIN` and answers AUTH with `code`.
    #[must_use]
    pub fn with_auth_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.capabilities.push("AUTH PLAIN".to_string());
        self.config.auth_response = SmtpResponse::new(code, message);
        self
    }

    /// Responses to successive MAIL FROM commands across all connections.
    #[must_use]
    pub fn with_mail_from_responses(mut self, responses: Vec<(u16, &str)>) -> Self {
        self.config.mail_from_responses = responses
            .into_iter()
            .map(|(code, message)| SmtpResponse::new(code, message))
            .collect();
        self
    }

    /// Responses to the RCPT TO commands of each transaction, by position.
    #[must_use]
    pub fn with_rcpt_to_responses(mut self, responses: Vec<(u16, &str)>) -> Self {
        self.config.rcpt_to_responses = responses
            .into_iter()
            .map(|(code, message)| SmtpResponse::new(code, message))
            .collect();
        self
    }

    #[must_use]
    pub fn with_data_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.data_response = SmtpResponse::new(code, message);
        self
    }

    #[must_use]
    pub fn with_data_end_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.data_end_response = SmtpResponse::new(code, message);
        self
    }

    #[must_use]
    pub fn with_rset_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.rset_response = SmtpResponse::new(code, message);
        self
    }

    #[must_use]
    pub const fn with_response_delay(mut self, delay: Duration) -> Self {
        self.config.response_delay = Some(delay);
        self
    }

    /// Hang on the Nth command of each connection (0-indexed)
    #[must_use]
    pub const fn with_timeout_on_command(mut self, command_index: usize) -> Self {
        self.config.timeout_on_command = Some(command_index);
        self
    }

    /// Build and start the mock SMTP server
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to bind to a port
    pub async fn build(self) -> Result<MockSmtpServer, std::io::Error> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let shared = Arc::new(Shared {
            config: self.config,
            commands: RwLock::new(Vec::new()),
            connections: AtomicUsize::new(0),
            mail_from_count: AtomicUsize::new(0),
        });
        let shutdown = Arc::new(AtomicBool::new(false));

        let shared_clone = Arc::clone(&shared);
        let shutdown_clone = Arc::clone(&shutdown);

        tokio::spawn(async move {
            loop {
                if shutdown_clone.load(Ordering::Relaxed) {
                    break;
                }

                // Accept with a timeout so the shutdown flag is checked
                let accept_result = timeout(Duration::from_millis(100), listener.accept()).await;

                if let Ok(Ok((stream, _peer))) = accept_result {
                    shared_clone.connections.fetch_add(1, Ordering::SeqCst);
                    let shared = Arc::clone(&shared_clone);

                    tokio::spawn(async move {
                        if let Err(e) = MockSmtpServer::handle_client(stream, shared).await {
                            tracing::debug!("Mock server client error: {}", e);
                        }
                    });
                }
            }
        });

        Ok(MockSmtpServer {
            addr,
            shared,
            shutdown,
        })
    }
}

/// An address nothing listens on.
pub fn unused_addr() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    listener.local_addr().expect("local addr")
}
