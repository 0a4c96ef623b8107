use hyper::body::Incoming;
use hyper::{Request, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use prometheus::Registry;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::server::ServerInfo;
use crate::stats::Stats;
use crate::telemetry::handlers::{
    health_check_response, metrics_response, stats_response, status_response,
};

/// Serve `/health`, `/stats` and `/metrics` until `shutdown` flips to true
pub async fn start_observability_server(
    port: u16,
    registry: Registry,
    server: ServerInfo,
    stats: Arc<Stats>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let registry = Arc::new(registry);
    let server = Arc::new(server);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;

    info!(?addr, "Observability server started");

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                info!("Observability server: shutting down");
                break;
            }
            result = listener.accept() => {
                let (stream, peer) = match result {
                    Ok(v) => v,
                    Err(e) => {
                        warn!(error = %e, "Observability server: accept error");
                        continue;
                    }
                };

                let registry = Arc::clone(&registry);
                let server = Arc::clone(&server);
                let stats = Arc::clone(&stats);
                tokio::spawn(async move {
                    let svc = hyper::service::service_fn(move |req: Request<Incoming>| {
                        let registry = Arc::clone(&registry);
                        let server = Arc::clone(&server);
                        let stats = Arc::clone(&stats);
                        async move {
                            let result = match req.uri().path() {
                                "/health" => health_check_response(),
                                "/stats" => stats_response(&server, &stats),
                                "/metrics" => metrics_response(&registry),
                                _ => Ok(status_response(StatusCode::NOT_FOUND, "Not Found")),
                            };
                            Ok::<_, hyper::Error>(result.unwrap_or_else(|e| {
                                warn!(error = %e, "Observability server: handler error");
                                status_response(
                                    StatusCode::INTERNAL_SERVER_ERROR,
                                    "Internal Server Error",
                                )
                            }))
                        }
                    });

                    let builder = ConnBuilder::new(TokioExecutor::new());
                    if let Err(e) = builder.serve_connection(TokioIo::new(stream), svc).await {
                        warn!(?peer, error = %e, "Observability server: serve_connection error");
                    }
                });
            }
        }
    }

    info!("Observability server stopped");
    Ok(())
}
