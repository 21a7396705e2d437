//! nmproxy - native messaging bridge that routes frames over loopback HTTP.
//!
//! Started by the browser in place of the real native messaging host. Frames
//! on stdin/stdout are relayed through an optional upstream proxy to the
//! configured host and back.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{CommandFactory, FromArgMatches, Parser};

use nmproxy::config::{CONFIG_ENV, Config, config_path};
use nmproxy::logging::{LogTarget, SessionClock, init_tracing};
use nmproxy::{CancellationToken, Coordinator, PeerIo};

#[derive(Parser, Debug)]
#[command(name = "nmproxy")]
#[command(version, about = "Native messaging proxy bridge")]
struct Cli {
    /// Config file path
    #[arg(long, env = CONFIG_ENV)]
    config: Option<PathBuf>,

    /// Arguments appended by the browser (extension origin, parent window)
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, hide = true)]
    browser_args: Vec<String>,
}

fn parse_cli() -> Cli {
    let help = format!(
        "Config file: {}\nOverride the location with {CONFIG_ENV}.",
        config_path().display()
    );
    let matches = Cli::command().after_help(help).get_matches();
    Cli::from_arg_matches(&matches).unwrap_or_else(|e| e.exit())
}

/// Resolves when SIGINT or SIGTERM arrives. A handler that cannot be
/// installed never resolves.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT, shutting down..."),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down..."),
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let path = cli.config.unwrap_or_else(config_path);
    let (config, config_error) = Config::load_or_default(&path);

    let target = LogTarget::parse(&config.log);
    if let Err(e) = init_tracing(&target, SessionClock::starting_now()) {
        eprintln!("nmproxy: logging to {target:?} unavailable: {e}");
        return Err(e).context("logging unavailable");
    }

    tracing::info!(
        version = nmproxy::NMPROXY_VERSION,
        config = %path.display(),
        "Starting nmproxy"
    );
    if let Some(e) = config_error {
        tracing::warn!(error = %e, "Using empty config");
    }
    if !cli.browser_args.is_empty() {
        tracing::debug!(args = ?cli.browser_args, "Browser arguments");
    }

    let coordinator = Coordinator::from_config(&config)?;

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_token.cancel();
    });

    coordinator.run(PeerIo::stdio(), shutdown).await?;
    Ok(())
}

fn main() -> ExitCode {
    let cli = parse_cli();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("nmproxy: failed to start runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    let code = match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "nmproxy exiting");
            ExitCode::FAILURE
        }
    };

    // A blocking stdin read cannot be interrupted; don't wait for it.
    runtime.shutdown_background();
    code
}
