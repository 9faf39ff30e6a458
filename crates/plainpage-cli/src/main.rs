//! PlainPage CLI - a command-line client for PlainPage servers.
//!
//! Logs in, keeps the session in the cache directory between runs, and sends
//! requests through the same authenticated request layer the web UI uses.

mod commands;
mod credentials;

use std::io;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use plainpage_core::Config;

#[derive(Parser, Debug)]
#[command(name = "plainpage", version, about = "Command-line client for PlainPage")]
pub struct Cli {
    /// Server URL, overrides the config file
    #[arg(long, global = true, env = "PLAINPAGE_URL")]
    pub server: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Log in and keep the session for later commands
    Login {
        #[arg(short, long, env = "PLAINPAGE_USERNAME")]
        username: Option<String>,
        /// Remember the password in the OS keychain
        #[arg(long)]
        remember: bool,
    },
    /// End the session on the server and locally
    Logout {
        /// Also forget a password remembered in the keychain
        #[arg(long)]
        forget: bool,
    },
    /// Show the logged-in user and when the session expires
    Whoami,
    /// Show server title, version and registration status
    Info,
    /// GET an API path and print the JSON response
    Get {
        /// Path below the API prefix, e.g. /pages/home
        path: String,
    },
    /// Update the display name of the logged-in user
    Profile {
        #[arg(long)]
        display_name: String,
    },
    /// Change the password of the logged-in user
    Passwd,
    /// Delete the logged-in user's account
    DeleteAccount {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
}

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // RUST_LOG controls the level, e.g. RUST_LOG=plainpage_core=debug
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_tracing();

    let mut config = Config::load()?;
    if let Some(server) = cli.server {
        config.server_url = server.trim_end_matches('/').to_string();
    }
    debug!(server = %config.server_url, "Using server");

    commands::run(cli.command, &mut config).await
}
