//! Sends a failure notification through the configured identity chain.
//!
//! Typically wired to a systemd `OnFailure=` unit:
//!
//! ```text
//! systemctl status --full "%i" | failmail send "%i failed"
//! ```

#[cfg(not(any(target_os = "macos", unix)))]
compile_error!("Only macos and unix are currently supported");

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use failmail::{AccountChain, Config, Notifier};
use failmail_common::{internal, logging};
use tokio::io::AsyncReadExt;

/// Environment variable naming the configuration file.
const CONFIG_ENV: &str = "FAILMAIL_CONFIG";

#[derive(Parser, Debug)]
#[command(name = "failmail")]
#[command(about = "Send failure notifications over SMTP", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, global = true, env = CONFIG_ENV)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Send one notification
    Send {
        /// Subject line
        subject: String,

        /// Message body; read from standard input when omitted
        #[arg(short, long)]
        body: Option<String>,
    },
    /// Validate the configuration without connecting
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init();

    let config_path = find_config_file(cli.config)?;
    let config = Config::load(&config_path)?;

    match cli.command {
        Commands::Check => {
            let chain = AccountChain::from_config(&config)?;
            println!(
                "{}: ok, {} identit{} in chain",
                config_path.display(),
                chain.identities().len(),
                if chain.identities().len() == 1 { "y" } else { "ies" }
            );
        }
        Commands::Send { subject, body } => {
            let body = match body {
                Some(body) => body.into_bytes(),
                None => {
                    let mut body = Vec::new();
                    tokio::io::stdin().read_to_end(&mut body).await?;
                    body
                }
            };

            internal!(level = DEBUG, "Using configuration {}", config_path.display());
            let notifier = Notifier::connect(&config).await?;
            notifier.send(&subject, &body).await;
            notifier.shutdown().await;
        }
    }

    Ok(())
}

/// Find the configuration file using the following precedence:
/// 1. `--config`, or the `FAILMAIL_CONFIG` environment variable
/// 2. ./failmail.toml (current working directory)
/// 3. /etc/failmail/failmail.toml (system-wide config)
fn find_config_file(explicit: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    if let Some(path) = explicit {
        if path.exists() {
            return Ok(path);
        }
        anyhow::bail!("Configuration file does not exist: {}", path.display());
    }

    let default_paths = [
        PathBuf::from("./failmail.toml"),
        PathBuf::from("/etc/failmail/failmail.toml"),
    ];

    if let Some(path) = default_paths.iter().find(|path| path.exists()) {
        return Ok(path.clone());
    }

    let paths_tried = default_paths
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    anyhow::bail!(
        "No configuration file found. Tried:\n  - --config / {CONFIG_ENV}\n{paths_tried}"
    )
}
