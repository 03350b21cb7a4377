//! Per-connection session task.
//!
//! Reads one request at a time, dispatches it, and carries out the resulting
//! action before reading the next. The task removes its client from the
//! registry exactly once, whichever way the session ends.

use std::sync::Arc;

use tokio::io::AsyncRead;
use tokio::sync::broadcast;

use relay_core::io::read_packet;
use relay_core::message::{ServerShutdownIndication, SystemNotice};
use relay_core::{ClientId, MessageType, Packet, WireError};
use relay_services::{Action, ClientRegistry, RequestContext, Session};

use crate::dispatch::Dispatcher;

/// Why a session ended.
#[derive(Debug)]
pub enum SessionEnd {
    /// Peer closed the connection or the read failed.
    PeerClosed,
    /// Peer sent something that is not a valid frame.
    ProtocolViolation(WireError),
    /// Peer asked to disconnect.
    Disconnected,
    /// Server is shutting down.
    Shutdown,
    /// A reply to the peer could not be written.
    WriteFailed(std::io::Error),
    /// The client was removed before its task started.
    NotRegistered,
}

/// Drive one connection until it ends, then unregister it.
pub async fn run<R>(
    mut reader: R,
    client_id: ClientId,
    registry: ClientRegistry,
    dispatcher: Arc<Dispatcher>,
    mut shutdown: broadcast::Receiver<()>,
) -> SessionEnd
where
    R: AsyncRead + Unpin,
{
    let end = serve(&mut reader, client_id, &registry, &dispatcher, &mut shutdown).await;

    match &end {
        SessionEnd::ProtocolViolation(e) => {
            tracing::warn!(client_id, error = %e, "protocol violation, closing session")
        }
        SessionEnd::WriteFailed(e) => {
            tracing::warn!(client_id, error = %e, "write to client failed, closing session")
        }
        other => tracing::debug!(client_id, reason = ?other, "session ended"),
    }

    registry.remove(client_id).await;
    end
}

async fn serve<R>(
    reader: &mut R,
    client_id: ClientId,
    registry: &ClientRegistry,
    dispatcher: &Dispatcher,
    shutdown: &mut broadcast::Receiver<()>,
) -> SessionEnd
where
    R: AsyncRead + Unpin,
{
    let Some(session) = registry.lookup(client_id) else {
        return SessionEnd::NotRegistered;
    };

    let welcome = SystemNotice {
        message: format!("welcome, you are client {client_id}"),
        client_id: Some(client_id),
    };
    if let Err(e) = session
        .send(&Packet::json(MessageType::SystemNoticeIndication, &welcome))
        .await
    {
        return SessionEnd::WriteFailed(e);
    }

    loop {
        let request = tokio::select! {
            _ = shutdown.recv() => {
                notify_shutdown(&session).await;
                return SessionEnd::Shutdown;
            }
            result = read_packet(reader) => match result {
                Ok(packet) => packet,
                Err(WireError::ConnectionClosed(_)) => return SessionEnd::PeerClosed,
                Err(e) => return SessionEnd::ProtocolViolation(e),
            },
        };

        tracing::debug!(
            client_id,
            msg_type = %request.msg_type,
            bytes = request.content.len(),
            "request"
        );

        let ctx = RequestContext {
            client_id,
            registry,
        };
        let result = match dispatcher.dispatch(&ctx, &request) {
            Action::Reply(packet) => session.send(&packet).await,
            Action::Forward {
                target,
                indication,
                ack,
                nack,
            } => {
                if registry.send_to(target, &indication).await {
                    match ack {
                        Some(ack) => session.send(&ack).await,
                        None => Ok(()),
                    }
                } else {
                    session.send(&nack).await
                }
            }
            Action::Disconnect => return SessionEnd::Disconnected,
        };

        if let Err(e) = result {
            return SessionEnd::WriteFailed(e);
        }
    }
}

async fn notify_shutdown(session: &Session) {
    let indication = Packet::json(
        MessageType::ServerShutdownIndication,
        &ServerShutdownIndication {
            reason: "server shutting down".into(),
        },
    );
    if let Err(e) = session.send(&indication).await {
        tracing::debug!(client_id = session.id, error = %e, "shutdown indication not delivered");
    }
}
