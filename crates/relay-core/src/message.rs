//! JSON payload schemas for every message type.
//!
//! Field names here are part of the wire contract. Query requests and the
//! disconnect directive carry no payload and have no struct.

use serde::{Deserialize, Serialize};

/// Session identifier assigned by the server. 0 means "no target".
pub type ClientId = u64;

// ── Requests ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendMessageRequest {
    pub target_id: ClientId,
    pub message: String,
}

/// One chunk of a file on its way to `target_id`. `data` is base64.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendFileRequest {
    pub target_id: ClientId,
    pub filename: String,
    pub data: String,
    pub eof: bool,
}

// ── Responses ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeResponse {
    pub time: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameResponse {
    pub name: String,
}

/// One row of the client directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientEntry {
    pub id: ClientId,
    pub address: String,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientListResponse {
    pub clients: Vec<ClientEntry>,
}

/// Outcome of a routed send, as reported back to the requester.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum DeliveryStatus {
    Success,
    Error { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageResponse {
    pub target_id: ClientId,
    #[serde(flatten)]
    pub status: DeliveryStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileResponse {
    pub target_id: ClientId,
    pub filename: String,
    #[serde(flatten)]
    pub status: DeliveryStatus,
}

// ── Indications ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageIndication {
    pub sender_id: ClientId,
    pub message: String,
}

/// A relayed file chunk. `data` is base64; `eof` marks the last chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileIndication {
    pub sender_id: ClientId,
    pub filename: String,
    pub data: String,
    pub eof: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerShutdownIndication {
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemNotice {
    pub message: String,
    /// Set on the welcome notice: the id this connection was assigned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<ClientId>,
}

impl SystemNotice {
    pub fn text(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            client_id: None,
        }
    }
}
