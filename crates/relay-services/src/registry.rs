//! Client registry: every live session, keyed by its server-assigned id.
//!
//! Shared between the accept loop (register), session tasks (remove, routed
//! sends) and directory queries. The map is sharded, so no operation here
//! holds a global lock, and no map guard is ever held across a network write.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

use relay_core::io::write_packet;
use relay_core::message::ClientEntry;
use relay_core::{ClientId, Packet};

/// Write half of a client connection.
pub type SessionWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// One registered connection.
pub struct Session {
    pub id: ClientId,
    pub peer_addr: SocketAddr,
    pub connected_at: Instant,
    /// Serializes whole frames to this peer.
    writer: Mutex<SessionWriter>,
}

impl Session {
    /// Write one frame to this client.
    pub async fn send(&self, packet: &Packet) -> std::io::Result<()> {
        let mut writer = self.writer.lock().await;
        write_packet(&mut *writer, packet).await
    }

    /// Shut down the write side. Waits for any in-flight frame first.
    async fn close(&self) {
        let mut writer = self.writer.lock().await;
        if let Err(e) = writer.shutdown().await {
            tracing::debug!(client_id = self.id, error = %e, "writer shutdown failed");
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("peer_addr", &self.peer_addr)
            .finish_non_exhaustive()
    }
}

/// The registry handle. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct ClientRegistry {
    sessions: Arc<DashMap<ClientId, Arc<Session>>>,
    next_id: Arc<AtomicU64>,
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            // 0 means "no target" on the wire.
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Register a new connection and return its id. Ids are never reused.
    pub fn register<W>(&self, writer: W, peer_addr: SocketAddr) -> ClientId
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let session = Arc::new(Session {
            id,
            peer_addr,
            connected_at: Instant::now(),
            writer: Mutex::new(Box::new(writer)),
        });
        self.sessions.insert(id, session);
        tracing::info!(client_id = id, peer = %peer_addr, total = self.len(), "client connected");
        id
    }

    /// Drop a session and shut its connection's write side. Unknown ids are
    /// logged and otherwise ignored.
    pub async fn remove(&self, id: ClientId) {
        match self.sessions.remove(&id) {
            Some((_, session)) => {
                session.close().await;
                tracing::info!(
                    client_id = id,
                    peer = %session.peer_addr,
                    connected_secs = session.connected_at.elapsed().as_secs(),
                    total = self.len(),
                    "client disconnected"
                );
            }
            None => tracing::warn!(client_id = id, "remove of unknown client"),
        }
    }

    pub fn lookup(&self, id: ClientId) -> Option<Arc<Session>> {
        self.sessions.get(&id).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, id: ClientId) -> bool {
        self.sessions.contains_key(&id)
    }

    /// Snapshot of the directory, ordered by id.
    pub fn list(&self) -> Vec<ClientEntry> {
        let mut clients: Vec<ClientEntry> = self
            .sessions
            .iter()
            .map(|entry| ClientEntry {
                id: *entry.key(),
                address: entry.peer_addr.ip().to_string(),
                port: entry.peer_addr.port(),
            })
            .collect();
        clients.sort_by_key(|c| c.id);
        clients
    }

    /// Send a packet to client `id`. False if the id is unknown or the write
    /// failed; a failed write leaves the session registered.
    pub async fn send_to(&self, id: ClientId, packet: &Packet) -> bool {
        // `lookup` clones the Arc and releases the shard guard before we write.
        let Some(session) = self.lookup(id) else {
            tracing::debug!(client_id = id, msg_type = %packet.msg_type, "send to unknown client");
            return false;
        };
        match session.send(packet).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    client_id = id,
                    msg_type = %packet.msg_type,
                    error = %e,
                    "routed send failed"
                );
                false
            }
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
