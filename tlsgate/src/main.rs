#![forbid(unsafe_code)]

mod echo;

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tlsgate_lib::config::{load_from_path, Config};
use tlsgate_lib::telemetry::{init_metrics, init_tracing, start_observability_server};
use tlsgate_lib::{build_server, Stats};
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about = "TLS-terminating echo server")]
struct Cli {
    /// Path to configuration TOML file
    #[arg(short, long, value_name = "FILE", env = "TLSGATE_CONFIG", default_value = "tlsgate.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let cfg = match load_from_path(&cli.config) {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("failed to load configuration: {err}");
            std::process::exit(1);
        }
    };

    if let Err(err) = init_tracing(&cfg.logging) {
        eprintln!("failed to initialize tracing: {err}");
        std::process::exit(1);
    }

    info!(listen = ?cfg.listen, host = %cfg.host, tls = cfg.tls.is_some(), "configuration loaded");
    if let Err(err) = run(cfg).await {
        error!(%err, "server exited with error");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let (stats, registry) = match cfg.telemetry.metrics_port {
        Some(_) => {
            let (metrics, registry) = init_metrics()?;
            (Arc::new(Stats::with_metrics(metrics)), Some(registry))
        }
        None => (Arc::new(Stats::new()), None),
    };

    let server = build_server(&cfg, Arc::clone(&stats))?;
    info!(server = %server.describe(), "server ready");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    if let (Some(port), Some(registry)) = (cfg.telemetry.metrics_port, registry) {
        let info = server.describe();
        let stats = Arc::clone(&stats);
        tokio::spawn(async move {
            if let Err(e) =
                start_observability_server(port, registry, info, stats, shutdown_rx).await
            {
                error!(error = %e, "observability server failed");
            }
        });
    }

    let listener = TcpListener::bind(cfg.listen).await?;
    info!(addr = ?listener.local_addr()?, "listening");

    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
        .map_err(|e| std::io::Error::other(format!("Failed to setup SIGTERM handler: {e}")))?;

    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                info!("received SIGINT, shutting down");
                break;
            }
            _ = sigterm.recv() => {
                info!("received SIGTERM, shutting down");
                break;
            }
            result = listener.accept() => {
                let (stream, peer) = match result {
                    Ok(v) => v,
                    Err(e) => {
                        warn!(error = %e, "accept error");
                        continue;
                    }
                };
                if let Err(e) = stream.set_nodelay(true) {
                    warn!(?peer, error = %e, "failed to set TCP_NODELAY");
                }

                match server.accept(Box::new(stream)) {
                    Ok(session) => {
                        tokio::spawn(echo::serve_echo(session, peer));
                    }
                    Err(e) => warn!(?peer, error = %e, "session rejected"),
                }
            }
        }
    }

    let _ = shutdown_tx.send(true);
    drop(server);
    info!(counters = ?stats, "server stopped");
    Ok(())
}
