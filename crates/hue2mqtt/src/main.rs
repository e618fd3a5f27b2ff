mod cli;
mod error;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use hue2mqtt_api::HubClient;
use hue2mqtt_core::Bridge;

use crate::cli::Cli;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("error: {err}");
        std::process::exit(code);
    }
}

fn init_tracing(verbosity: u8) {
    let filter = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<(), CliError> {
    if let Some(host) = cli.discover {
        return discover(&host).await;
    }

    let config = hue2mqtt_config::load(cli.config.as_deref())?;
    let bridge = Bridge::new(config.bridge_config()?, config.hub_config())?;

    let cancel = CancellationToken::new();
    spawn_signal_handler(cancel.clone());

    info!(version = env!("CARGO_PKG_VERSION"), "starting hue2mqtt");
    bridge.run(cancel).await?;
    info!("bridge stopped");
    Ok(())
}

/// Pairing flow: obtain an application key from the hub and print it.
async fn discover(host: &str) -> Result<(), CliError> {
    let key = HubClient::register(host, "hue2mqtt").await?;
    println!("{key}");
    info!("registration complete -- set this key as [hue] username in hue2mqtt.toml");
    Ok(())
}

/// Cancel the bridge on SIGINT/SIGTERM (SIGHUP too on unix).
fn spawn_signal_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};

            let mut interrupt = match signal(SignalKind::interrupt()) {
                Ok(s) => s,
                Err(e) => {
                    warn!(error = %e, "signal handler unavailable");
                    return;
                }
            };
            let mut terminate = match signal(SignalKind::terminate()) {
                Ok(s) => s,
                Err(e) => {
                    warn!(error = %e, "signal handler unavailable");
                    return;
                }
            };
            let mut hangup = match signal(SignalKind::hangup()) {
                Ok(s) => s,
                Err(e) => {
                    warn!(error = %e, "signal handler unavailable");
                    return;
                }
            };

            tokio::select! {
                _ = interrupt.recv() => info!("interrupt received"),
                _ = terminate.recv() => info!("termination requested"),
                _ = hangup.recv() => info!("hangup received"),
            }
        }

        #[cfg(not(unix))]
        {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "signal handler unavailable");
                return;
            }
            info!("interrupt received");
        }

        cancel.cancel();
    });
}
