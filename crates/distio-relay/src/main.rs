//! `distio-serve` — stand up a relay server that accepts master connections
//! and forks child-process slaves on this host.

use anyhow::{Context, Result};
use clap::Parser;
use distio_relay::RelayConfig;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Relay server for distio: forks local slaves on behalf of remote masters.
#[derive(Parser, Debug)]
#[command(name = "distio-serve")]
#[command(about = "Relay server for distio: forks local slaves on behalf of remote masters")]
#[command(version)]
struct Args {
    /// TCP port to listen on.
    #[arg(long, value_name = "PORT", default_value_t = distio_core::DEFAULT_RELAY_PORT)]
    port: u16,

    /// Shared passphrase a connecting master must present.
    #[arg(long, value_name = "PASSPHRASE")]
    passphrase: Option<String>,

    /// HTTP-basic-style username, paired with `--pass`.
    #[arg(long, value_name = "USER", requires = "pass")]
    user: Option<String>,

    /// HTTP-basic-style password, paired with `--user`.
    #[arg(long, value_name = "PASS", requires = "user")]
    pass: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    distio_core::logging::init();
    let args = Args::parse();

    let config = RelayConfig {
        port: args.port,
        passphrase: args.passphrase,
        basic_auth: args.user.zip(args.pass),
        ..Default::default()
    };

    let cancel = CancellationToken::new();
    let cancel_for_signals = cancel.clone();
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
            tokio::select! {
                _ = ctrl_c => info!("received SIGINT"),
                _ = sigterm.recv() => info!("received SIGTERM"),
            }
        }
        #[cfg(not(unix))]
        {
            ctrl_c.await.expect("failed to listen for Ctrl+C");
            info!("received Ctrl+C");
        }

        cancel_for_signals.cancel();
    });

    distio_relay::server::serve(config, cancel)
        .await
        .context("relay server failed")?;

    info!("distio-serve shutdown complete");
    Ok(())
}
