// TCP listener harness
// Binds a service port and hands every accepted connection to its own worker

use crate::types::ServiceType;
use anyhow::{Context, Result};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpSocket, TcpStream};
use tokio::sync::broadcast;

/// Pending-connection queue depth; commodity daemons keep this small
const ACCEPT_BACKLOG: u32 = 8;

/// Delay before retrying after a transient accept failure
const ACCEPT_BACKOFF: Duration = Duration::from_secs(1);

/// Run a raw-TCP protocol handler on `0.0.0.0:port` until the shutdown
/// signal fires.
///
/// Each accepted connection is moved into a freshly spawned worker that
/// owns the socket; the harness never touches the stream again, and a
/// worker failure is logged and swallowed without affecting the accept
/// loop. A bind failure is returned to the caller and kills only this
/// service.
pub async fn run_tcp_service<F, Fut>(
    service: ServiceType,
    port: u16,
    mut shutdown: broadcast::Receiver<()>,
    handler: F,
) -> Result<()>
where
    F: Fn(TcpStream, SocketAddr) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    let socket = TcpSocket::new_v4()?;
    socket.set_reuseaddr(true)?;
    socket
        .bind(addr)
        .with_context(|| format!("failed to bind {} honeypot to {}", service, addr))?;
    let listener = socket.listen(ACCEPT_BACKLOG)?;

    log::info!("{} honeypot listening on {}", service, addr);

    let handler = Arc::new(handler);

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, peer)) => {
                        let handler = Arc::clone(&handler);
                        tokio::spawn(async move {
                            if let Err(e) = handler(stream, peer).await {
                                log::debug!("{} session error from {}: {:#}", service, peer, e);
                            }
                        });
                    }
                    Err(e) => {
                        log::error!("{} accept error: {}", service, e);
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                }
            }
            _ = shutdown.recv() => break,
        }
    }

    log::info!("{} honeypot stopped", service);
    Ok(())
}
