//! relay integration test harness.
//!
//! Every test starts its own in-process server on 127.0.0.1:0 and talks to
//! it over real TCP, either with raw framed clients ([`TestClient`]) or with
//! the relay-cli pipeline. Tests share nothing, so they run in parallel.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use relay_core::config::ServerSettings;
use relay_core::io::{read_packet, write_packet};
use relay_core::message::SystemNotice;
use relay_core::{ClientId, MessageType, Packet, WireError};
use relay_services::ClientRegistry;
use relayd::Server;

mod failures;
mod files;
mod messaging;
mod sessions;

/// Upper bound on any single wait in these tests.
pub const WAIT: Duration = Duration::from_secs(5);

pub const SERVER_NAME: &str = "it-relay";

// ── Server ────────────────────────────────────────────────────────────────────

pub struct TestServer {
    pub addr: SocketAddr,
    pub registry: ClientRegistry,
    shutdown: broadcast::Sender<()>,
    task: JoinHandle<anyhow::Result<()>>,
}

impl TestServer {
    pub async fn start() -> Self {
        let settings = ServerSettings {
            bind_addr: "127.0.0.1".into(),
            port: 0,
            name: SERVER_NAME.into(),
            backlog: 16,
            drain_timeout_secs: 2,
        };
        let server = Server::bind(&settings).await.expect("bind should succeed");
        let addr = server.local_addr().expect("bound address");
        let registry = server.registry();
        let (shutdown, _) = broadcast::channel(1);
        let task = tokio::spawn(server.run(shutdown.clone()));
        Self {
            addr,
            registry,
            shutdown,
            task,
        }
    }

    /// Signal shutdown and wait for the accept loop and drain to finish.
    pub async fn stop(self) {
        let _ = self.shutdown.send(());
        tokio::time::timeout(WAIT, self.task)
            .await
            .expect("server should stop within the drain timeout")
            .expect("server task should not panic")
            .expect("server run should succeed");
    }

    /// Wait until exactly `n` clients are registered.
    pub async fn wait_for_clients(&self, n: usize) {
        let deadline = tokio::time::Instant::now() + WAIT;
        while self.registry.len() != n {
            assert!(
                tokio::time::Instant::now() < deadline,
                "expected {n} clients, have {}",
                self.registry.len()
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

// ── Raw client ────────────────────────────────────────────────────────────────

/// A framed TCP client that has already consumed its welcome notice.
pub struct TestClient {
    pub id: ClientId,
    pub reader: OwnedReadHalf,
    pub writer: OwnedWriteHalf,
}

impl TestClient {
    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.expect("connect should succeed");
        let (mut reader, writer) = stream.into_split();
        let id = read_welcome(&mut reader).await;
        Self { id, reader, writer }
    }

    pub async fn send(&mut self, packet: &Packet) {
        write_packet(&mut self.writer, packet)
            .await
            .expect("write should succeed");
    }

    pub async fn recv(&mut self) -> Packet {
        tokio::time::timeout(WAIT, read_packet(&mut self.reader))
            .await
            .expect("timed out waiting for a packet")
            .expect("read should succeed")
    }

    /// Send a request and return the next packet.
    pub async fn request(&mut self, packet: &Packet) -> Packet {
        self.send(packet).await;
        self.recv().await
    }

    /// Nothing arrives for `quiet`.
    pub async fn expect_silence(&mut self, quiet: Duration) {
        if let Ok(result) = tokio::time::timeout(quiet, read_packet(&mut self.reader)).await {
            panic!("expected silence, got {result:?}");
        }
    }

    /// The server closes the connection.
    pub async fn expect_closed(&mut self) {
        let result = tokio::time::timeout(WAIT, read_packet(&mut self.reader))
            .await
            .expect("timed out waiting for close");
        assert!(
            matches!(result, Err(WireError::ConnectionClosed(_))),
            "expected close, got {result:?}"
        );
    }
}

/// Read the welcome notice and return the assigned id.
pub async fn read_welcome(reader: &mut OwnedReadHalf) -> ClientId {
    let packet = tokio::time::timeout(WAIT, read_packet(reader))
        .await
        .expect("timed out waiting for welcome")
        .expect("welcome should arrive");
    assert_eq!(packet.msg_type, MessageType::SystemNoticeIndication);
    let notice: SystemNotice = packet.parse().expect("welcome should parse");
    notice.client_id.expect("welcome should carry client_id")
}

pub fn temp_dir(name: &str) -> std::path::PathBuf {
    let dir = std::env::temp_dir().join(format!("relay-it-{name}-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    dir
}
