use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, warn};

use tlsgate_lib::IoSession;

/// Echo everything the peer sends until it closes or goes idle past the I/O timeout
pub async fn serve_echo(mut session: Box<dyn IoSession>, peer: SocketAddr) {
    if let Err(e) = session.handshake().await {
        warn!(?peer, error = %e, "session negotiation failed");
        return;
    }

    let io_timeout = session.io_timeout();
    let mut buf = vec![0u8; 16 * 1024];
    let mut total = 0u64;

    loop {
        let n = match tokio::time::timeout(io_timeout, session.read(&mut buf)).await {
            Ok(Ok(0)) => break,
            Ok(Ok(n)) => n,
            Ok(Err(e)) => {
                warn!(?peer, error = %e, "read failed");
                return;
            }
            Err(_) => {
                debug!(?peer, timeout_ms = io_timeout.as_millis() as u64, "session idle, closing");
                break;
            }
        };

        match tokio::time::timeout(io_timeout, session.write_all(&buf[..n])).await {
            Ok(Ok(())) => total += n as u64,
            Ok(Err(e)) => {
                warn!(?peer, error = %e, "write failed");
                return;
            }
            Err(_) => {
                warn!(?peer, "write timeout");
                return;
            }
        }
    }

    if let Err(e) = session.shutdown().await {
        debug!(?peer, error = %e, "shutdown failed");
    }
    debug!(?peer, kind = ?session.kind(), bytes = total, "session closed");
}
