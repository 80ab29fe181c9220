//! `pipe`: send Pipe calls and serve demo routes over HTTP.

use std::net::SocketAddr;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use pipe_cli::commands::{self, SendArgs};
use pipe_cli::{account, CliConfig};
use pipe_types::Environment;

/// Authenticated request/response calls between addresses
#[derive(Parser, Debug)]
#[command(name = "pipe", version)]
#[command(about = "Send Pipe calls and serve Pipe routes")]
struct Args {
    /// Network deployment (local, dev, production); overrides the config file
    #[arg(long, global = true)]
    env: Option<Environment>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send one request and print the response
    Send {
        /// Target base URL or host:port
        #[arg(long)]
        to: String,

        #[arg(short, long, default_value = "GET")]
        method: String,

        #[arg(short, long, default_value = "/")]
        path: String,

        /// JSON body
        #[arg(long)]
        body: Option<String>,

        /// JSON object of query parameters
        #[arg(long)]
        params: Option<String>,

        /// Timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Serve demo routes until Ctrl+C
    Serve {
        /// Listen address (default 127.0.0.1:7070)
        #[arg(short, long)]
        listen: Option<SocketAddr>,
    },

    /// Print the account address, creating a key on first use
    Account,

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Print the effective configuration
    Show,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Logs go to stderr so command output stays pipeable.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = CliConfig::load().context("Failed to load configuration")?;
    let env = args.env.unwrap_or(config.env);

    match args.command {
        Command::Send {
            to,
            method,
            path,
            body,
            params,
            timeout,
        } => {
            let send_args = SendArgs {
                to,
                method,
                path,
                body,
                params,
                timeout,
            };
            let response = commands::send::run(&config, send_args, env).await?;
            println!("{}", commands::send::render(&response));
            if !response.code.is_ok() {
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::Serve { listen } => {
            commands::serve::run(&config, listen, env).await?;
        }
        Command::Account => {
            let (account, created) = account::load_or_create(&config)?;
            println!("{}", account.address());
            if created {
                eprintln!("Saved new key to {}", config.key_file().display());
            }
        }
        Command::Config {
            command: ConfigCommand::Show,
        } => {
            let shown = toml::to_string_pretty(&config.redacted())
                .context("Failed to render configuration")?;
            print!("{shown}");
        }
    }

    Ok(ExitCode::SUCCESS)
}
