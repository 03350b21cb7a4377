//! relayd: the relay server.
//!
//! [`Server`] owns the listener and spawns one session task per accepted
//! connection into a supervised `JoinSet`. Shutdown is a broadcast: the accept
//! loop stops, every session tells its client, and stragglers are aborted once
//! the drain timeout passes.

use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::{TcpListener, TcpSocket};
use tokio::sync::broadcast;
use tokio::task::JoinSet;

use relay_core::config::ServerSettings;
use relay_services::ClientRegistry;

pub mod dispatch;
pub mod session;

pub use dispatch::Dispatcher;
pub use session::SessionEnd;

pub struct Server {
    listener: TcpListener,
    registry: ClientRegistry,
    dispatcher: Arc<Dispatcher>,
    drain_timeout: Duration,
}

impl Server {
    /// Bind the listener described by `settings`.
    pub async fn bind(settings: &ServerSettings) -> Result<Self> {
        let ip: IpAddr = settings
            .bind_addr
            .parse()
            .with_context(|| format!("invalid bind address: {}", settings.bind_addr))?;
        let addr = SocketAddr::new(ip, settings.port);

        let socket = match addr {
            SocketAddr::V4(_) => TcpSocket::new_v4(),
            SocketAddr::V6(_) => TcpSocket::new_v6(),
        }
        .context("failed to create listen socket")?;
        socket.set_reuseaddr(true)?;
        socket
            .bind(addr)
            .with_context(|| format!("failed to bind {addr}"))?;
        let listener = socket
            .listen(settings.backlog)
            .context("failed to listen")?;

        tracing::info!(
            addr = %listener.local_addr()?,
            name = %settings.name,
            backlog = settings.backlog,
            "relay listening"
        );

        Ok(Self {
            listener,
            registry: ClientRegistry::new(),
            dispatcher: Arc::new(Dispatcher::with_defaults(&settings.name)),
            drain_timeout: Duration::from_secs(settings.drain_timeout_secs),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Handle on the live client directory.
    pub fn registry(&self) -> ClientRegistry {
        self.registry.clone()
    }

    /// Accept connections until `shutdown` fires, then drain sessions.
    ///
    /// Subscribes before returning, so a signal sent before the future is
    /// first polled still stops it.
    pub fn run(self, shutdown: broadcast::Sender<()>) -> impl Future<Output = Result<()>> {
        let stop = shutdown.subscribe();
        self.serve(stop, shutdown)
    }

    async fn serve(
        self,
        mut stop: broadcast::Receiver<()>,
        shutdown: broadcast::Sender<()>,
    ) -> Result<()> {
        let mut sessions: JoinSet<session::SessionEnd> = JoinSet::new();

        loop {
            // Subscribed before accepting, so a signal that lands while the
            // connection is being set up still reaches its session.
            let session_shutdown = shutdown.subscribe();

            tokio::select! {
                _ = stop.recv() => {
                    tracing::info!("accept loop shutting down");
                    break;
                }

                Some(finished) = sessions.join_next(), if !sessions.is_empty() => {
                    if let Err(e) = finished {
                        if e.is_panic() {
                            tracing::error!(error = %e, "session task panicked");
                        }
                    }
                }

                accepted = self.listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            tracing::warn!(error = %e, "accept failed");
                            tokio::time::sleep(Duration::from_millis(100)).await;
                            continue;
                        }
                    };
                    if let Err(e) = stream.set_nodelay(true) {
                        tracing::debug!(peer = %peer, error = %e, "set_nodelay failed");
                    }

                    let (reader, writer) = stream.into_split();
                    let client_id = self.registry.register(writer, peer);
                    sessions.spawn(session::run(
                        reader,
                        client_id,
                        self.registry.clone(),
                        self.dispatcher.clone(),
                        session_shutdown,
                    ));
                }
            }
        }

        drop(self.listener);
        tracing::info!(sessions = sessions.len(), "draining sessions");

        let drained = tokio::time::timeout(self.drain_timeout, async {
            while sessions.join_next().await.is_some() {}
        })
        .await;

        if drained.is_err() {
            tracing::warn!(
                remaining = sessions.len(),
                "drain timeout elapsed, aborting sessions"
            );
            sessions.shutdown().await;
            // Aborted tasks never reached their own removal.
            for entry in self.registry.list() {
                self.registry.remove(entry.id).await;
            }
        }

        tracing::info!("relay stopped");
        Ok(())
    }
}
