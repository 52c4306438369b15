//! socksd - SOCKS5 proxy server
//!
//! Command line entry point: loads configuration, starts the server and
//! wires process signals to graceful shutdown.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use socksd::config::load_config;
use socksd::error::ProxyError;
use socksd::socks::Server;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

/// How long shutdown waits for in-flight sessions to drain
const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(30);

/// A SOCKS5 proxy server
#[derive(Parser, Debug)]
#[command(name = "socksd")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the server
    Serve {
        /// Path to the configuration file
        #[arg(short, long)]
        config: PathBuf,

        /// Log level (trace, debug, info, warn, error)
        #[arg(long, default_value = "info")]
        log_level: String,

        /// Enable JSON logging format
        #[arg(long)]
        json_log: bool,
    },
    /// Print the version string
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Version => {
            println!("{} {}", socksd::NAME, socksd::VERSION);
            Ok(())
        }
        Command::Serve {
            config,
            log_level,
            json_log,
        } => serve(config, &log_level, json_log).await,
    }
}

async fn serve(config_path: PathBuf, log_level: &str, json_log: bool) -> Result<()> {
    setup_logging(log_level, json_log)?;

    let config = load_config(&config_path)?;
    info!("socksd v{}", socksd::VERSION);
    info!("configuration loaded from {:?}", config_path);

    let server = Arc::new(Server::new(&config));
    let mut serve_task = tokio::spawn(Arc::clone(&server).listen_and_serve());

    tokio::select! {
        _ = shutdown_signal() => {
            info!("shutting down");
            if let Err(e) = server.shutdown(SHUTDOWN_DEADLINE).await {
                error!("shutdown did not complete cleanly: {}", e);
                return Err(e.into());
            }
            match serve_task.await.context("server task panicked")? {
                Ok(()) | Err(ProxyError::ServerClosed) => {
                    info!("bye");
                    Ok(())
                }
                Err(e) => Err(e.into()),
            }
        }
        res = &mut serve_task => {
            // The server stopped on its own, usually a bind failure
            match res.context("server task panicked")? {
                Ok(()) | Err(ProxyError::ServerClosed) => Ok(()),
                Err(e) => {
                    error!("server error: {}", e);
                    Err(e.into())
                }
            }
        }
    }
}

/// Wait for Ctrl+C or SIGTERM
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                error!("failed to install SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("received Ctrl+C"),
            _ = sigterm.recv() => info!("received SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("received Ctrl+C");
    }
}

/// Configure the global tracing subscriber
fn setup_logging(level: &str, json: bool) -> Result<()> {
    let level = match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    if json {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .json()
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .with_target(true)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }

    Ok(())
}
