//! Request handlers: one per request type.
//!
//! A handler turns a request into an [`Action`]. It never touches the
//! network itself; the session task performs whatever the action asks for,
//! so one request is fully processed before the next is read.

use relay_core::message::{
    ClientListResponse, DeliveryStatus, FileIndication, FileResponse, MessageIndication,
    MessageResponse, NameResponse, SendFileRequest, SendMessageRequest, SystemNotice,
    TimeResponse,
};
use relay_core::{wire, ClientId, MessageType, Packet};

use crate::file_transfer::decode_chunk;
use crate::registry::ClientRegistry;

/// Format of the time in time responses.
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

/// Per-request view of the server handed to handlers.
pub struct RequestContext<'a> {
    /// The requesting session.
    pub client_id: ClientId,
    pub registry: &'a ClientRegistry,
}

/// What the session should do with a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Send this packet back to the requester.
    Reply(Packet),
    /// Deliver `indication` to `target`. On success send `ack` (if any) to
    /// the requester, otherwise send `nack`.
    Forward {
        target: ClientId,
        indication: Packet,
        ack: Option<Packet>,
        nack: Packet,
    },
    /// End the session without a reply.
    Disconnect,
}

/// A request whose content could not be used.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("malformed {msg_type} payload: {source}")]
    Malformed {
        msg_type: MessageType,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

/// Handles one request type.
pub trait RequestHandler: Send + Sync {
    /// The request type this handler answers.
    fn message_type(&self) -> MessageType;

    fn handle(&self, ctx: &RequestContext<'_>, request: &Packet) -> Result<Action, RequestError>;

    /// Reply sent when `handle` fails. Defaults to a system notice.
    fn reject(&self, err: &RequestError) -> Packet {
        Packet::json(
            MessageType::SystemNoticeIndication,
            &SystemNotice::text(format!("request rejected: {err}")),
        )
    }
}

fn parse<T: serde::de::DeserializeOwned>(request: &Packet) -> Result<T, RequestError> {
    request.parse().map_err(|source| RequestError::Malformed {
        msg_type: request.msg_type,
        source,
    })
}

fn unknown_target(target: ClientId) -> DeliveryStatus {
    DeliveryStatus::Error {
        reason: format!("client {target} not found"),
    }
}

fn delivery_failed(target: ClientId) -> DeliveryStatus {
    DeliveryStatus::Error {
        reason: format!("delivery to client {target} failed"),
    }
}

fn too_large(err: &wire::WireError) -> DeliveryStatus {
    DeliveryStatus::Error {
        reason: format!("too large to relay: {err}"),
    }
}

// ── Queries ───────────────────────────────────────────────────────────────────

pub struct TimeHandler;

impl RequestHandler for TimeHandler {
    fn message_type(&self) -> MessageType {
        MessageType::GetTimeRequest
    }

    fn handle(&self, _ctx: &RequestContext<'_>, _request: &Packet) -> Result<Action, RequestError> {
        let time = chrono::Utc::now().format(TIME_FORMAT).to_string();
        Ok(Action::Reply(Packet::json(
            MessageType::GetTimeResponse,
            &TimeResponse { time },
        )))
    }
}

pub struct NameHandler {
    name: String,
}

impl NameHandler {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl RequestHandler for NameHandler {
    fn message_type(&self) -> MessageType {
        MessageType::GetNameRequest
    }

    fn handle(&self, _ctx: &RequestContext<'_>, _request: &Packet) -> Result<Action, RequestError> {
        Ok(Action::Reply(Packet::json(
            MessageType::GetNameResponse,
            &NameResponse {
                name: self.name.clone(),
            },
        )))
    }
}

pub struct ClientListHandler;

impl RequestHandler for ClientListHandler {
    fn message_type(&self) -> MessageType {
        MessageType::GetClientListRequest
    }

    fn handle(&self, ctx: &RequestContext<'_>, _request: &Packet) -> Result<Action, RequestError> {
        Ok(Action::Reply(Packet::json(
            MessageType::GetClientListResponse,
            &ClientListResponse {
                clients: ctx.registry.list(),
            },
        )))
    }
}

// ── Routed sends ──────────────────────────────────────────────────────────────

pub struct SendMessageHandler;

impl SendMessageHandler {
    fn response(target_id: ClientId, status: DeliveryStatus) -> Packet {
        Packet::json(
            MessageType::SendMessageResponse,
            &MessageResponse { target_id, status },
        )
    }
}

impl RequestHandler for SendMessageHandler {
    fn message_type(&self) -> MessageType {
        MessageType::SendMessageRequest
    }

    fn handle(&self, ctx: &RequestContext<'_>, request: &Packet) -> Result<Action, RequestError> {
        let req: SendMessageRequest = parse(request)?;
        let target = req.target_id;

        if !ctx.registry.contains(target) {
            return Ok(Action::Reply(Self::response(target, unknown_target(target))));
        }

        // The indication can outgrow the request when the sender's id is longer.
        let indication = Packet::json(
            MessageType::MessageIndication,
            &MessageIndication {
                sender_id: ctx.client_id,
                message: req.message,
            },
        );
        if let Err(e) = wire::check_packet(&indication) {
            return Ok(Action::Reply(Self::response(target, too_large(&e))));
        }

        Ok(Action::Forward {
            target,
            indication,
            ack: Some(Self::response(target, DeliveryStatus::Success)),
            nack: Self::response(target, delivery_failed(target)),
        })
    }

    fn reject(&self, err: &RequestError) -> Packet {
        Self::response(
            0,
            DeliveryStatus::Error {
                reason: err.to_string(),
            },
        )
    }
}

pub struct SendFileHandler;

impl SendFileHandler {
    fn response(target_id: ClientId, filename: String, status: DeliveryStatus) -> Packet {
        Packet::json(
            MessageType::SendFileResponse,
            &FileResponse {
                target_id,
                filename,
                status,
            },
        )
    }
}

impl RequestHandler for SendFileHandler {
    fn message_type(&self) -> MessageType {
        MessageType::SendFileRequest
    }

    fn handle(&self, ctx: &RequestContext<'_>, request: &Packet) -> Result<Action, RequestError> {
        let req: SendFileRequest = parse(request)?;
        let target = req.target_id;

        if req.filename.is_empty() {
            return Err(RequestError::InvalidField {
                field: "filename",
                reason: "empty".into(),
            });
        }
        if let Err(e) = decode_chunk(&req.data) {
            return Err(RequestError::InvalidField {
                field: "data",
                reason: e.to_string(),
            });
        }

        if !ctx.registry.contains(target) {
            return Ok(Action::Reply(Self::response(target, req.filename, unknown_target(target))));
        }

        // Only the final chunk is acknowledged.
        let ack = req
            .eof
            .then(|| Self::response(target, req.filename.clone(), DeliveryStatus::Success));
        let nack = Self::response(target, req.filename.clone(), delivery_failed(target));

        let indication = Packet::json(
            MessageType::FileIndication,
            &FileIndication {
                sender_id: ctx.client_id,
                filename: req.filename.clone(),
                data: req.data,
                eof: req.eof,
            },
        );
        if let Err(e) = wire::check_packet(&indication) {
            return Ok(Action::Reply(Self::response(target, req.filename, too_large(&e))));
        }

        Ok(Action::Forward {
            target,
            indication,
            ack,
            nack,
        })
    }

    fn reject(&self, err: &RequestError) -> Packet {
        Self::response(
            0,
            String::new(),
            DeliveryStatus::Error {
                reason: err.to_string(),
            },
        )
    }
}

// ── Session control ───────────────────────────────────────────────────────────

pub struct DisconnectHandler;

impl RequestHandler for DisconnectHandler {
    fn message_type(&self) -> MessageType {
        MessageType::DisconnectRequest
    }

    fn handle(&self, _ctx: &RequestContext<'_>, _request: &Packet) -> Result<Action, RequestError> {
        Ok(Action::Disconnect)
    }
}
