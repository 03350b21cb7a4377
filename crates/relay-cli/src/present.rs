//! Presentation rules: one per inbound message type.
//!
//! Every rule can fail on its own. A failure is shown as a `[Parse error]`
//! line carrying the sanitized raw content; it never stops the presenter.
//! Everything a peer controls goes through [`sanitize::for_terminal`].

use std::io::Write;

use relay_core::message::{
    ClientListResponse, DeliveryStatus, FileIndication, FileResponse, MessageIndication,
    MessageResponse, NameResponse, ServerShutdownIndication, SystemNotice, TimeResponse,
};
use relay_core::sanitize::for_terminal;
use relay_core::{MessageType, Packet};
use relay_services::file_transfer::decode_chunk;
use relay_services::{FileReassembler, ReassemblyOutcome};

#[derive(Debug, thiserror::Error)]
pub enum PresentationError {
    #[error("{msg_type}: {source}")]
    Parse {
        msg_type: MessageType,
        #[source]
        source: serde_json::Error,
    },

    #[error("file chunk from client {sender}: {source}")]
    FileData {
        sender: u64,
        #[source]
        source: base64::DecodeError,
    },

    #[error("could not save file chunk: {0:#}")]
    Sink(anyhow::Error),
}

/// Renders packets to `out`, saving inbound files through `reassembler`.
pub struct Presenter<W> {
    out: W,
    reassembler: FileReassembler,
}

impl<W: Write> Presenter<W> {
    pub fn new(out: W, reassembler: FileReassembler) -> Self {
        Self { out, reassembler }
    }

    /// Present one packet. Only a failing output stream is an error.
    pub async fn present(&mut self, packet: &Packet) -> std::io::Result<()> {
        let text = match render(&self.reassembler, packet).await {
            Ok(Some(text)) => text,
            Ok(None) => return Ok(()),
            Err(e) => format!(
                "[Parse error] {}\n  raw: {}",
                for_terminal(&e.to_string()),
                raw_content(&packet.content)
            ),
        };
        writeln!(self.out, "{text}")?;
        self.out.flush()
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

async fn render(
    reassembler: &FileReassembler,
    packet: &Packet,
) -> Result<Option<String>, PresentationError> {
    let text = match packet.msg_type {
        MessageType::GetTimeResponse => {
            let resp: TimeResponse = parse(packet)?;
            format!("[Server time] {}", for_terminal(&resp.time))
        }
        MessageType::GetNameResponse => {
            let resp: NameResponse = parse(packet)?;
            format!("[Server name] {}", for_terminal(&resp.name))
        }
        MessageType::GetClientListResponse => {
            let resp: ClientListResponse = parse(packet)?;
            client_table(&resp)
        }
        MessageType::SendMessageResponse => {
            let resp: MessageResponse = parse(packet)?;
            match resp.status {
                DeliveryStatus::Success => {
                    format!("[Sent] message delivered to client {}", resp.target_id)
                }
                DeliveryStatus::Error { reason } => format!(
                    "[Send failed] client {}: {}",
                    resp.target_id,
                    for_terminal(&reason)
                ),
            }
        }
        MessageType::SendFileResponse => {
            let resp: FileResponse = parse(packet)?;
            let name = for_terminal(&resp.filename);
            match resp.status {
                DeliveryStatus::Success => {
                    format!("[Sent] file '{name}' delivered to client {}", resp.target_id)
                }
                DeliveryStatus::Error { reason } => format!(
                    "[File send failed] '{name}' to client {}: {}",
                    resp.target_id,
                    for_terminal(&reason)
                ),
            }
        }
        MessageType::MessageIndication => {
            let ind: MessageIndication = parse(packet)?;
            format!(
                "[Message from client {}] {}",
                ind.sender_id,
                for_terminal(&ind.message)
            )
        }
        MessageType::FileIndication => {
            let ind: FileIndication = parse(packet)?;
            return receive_file_chunk(reassembler, ind).await;
        }
        MessageType::ServerShutdownIndication => {
            let ind: ServerShutdownIndication = parse(packet)?;
            format!("[Server shutdown] {}", for_terminal(&ind.reason))
        }
        MessageType::SystemNoticeIndication => {
            let notice: SystemNotice = parse(packet)?;
            format!("[Notice] {}", for_terminal(&notice.message))
        }
        other => generic(other, &packet.content),
    };
    Ok(Some(text))
}

async fn receive_file_chunk(
    reassembler: &FileReassembler,
    ind: FileIndication,
) -> Result<Option<String>, PresentationError> {
    let data = decode_chunk(&ind.data).map_err(|source| PresentationError::FileData {
        sender: ind.sender_id,
        source,
    })?;

    let outcome = reassembler
        .accept(ind.sender_id, &ind.filename, &data, ind.eof)
        .await
        .map_err(PresentationError::Sink)?;

    Ok(match outcome {
        ReassemblyOutcome::Appended { .. } | ReassemblyOutcome::Discarded { eof: false } => None,
        ReassemblyOutcome::Discarded { eof: true } => Some(format!(
            "[File dropped] '{}' from client {}: an earlier chunk could not be saved",
            for_terminal(&ind.filename),
            ind.sender_id
        )),
        ReassemblyOutcome::Completed { path, bytes } => Some(format!(
            "[File received] '{}' from client {} ({bytes} bytes) saved to {}",
            for_terminal(&ind.filename),
            ind.sender_id,
            for_terminal(&path.display().to_string())
        )),
    })
}

fn parse<T: serde::de::DeserializeOwned>(packet: &Packet) -> Result<T, PresentationError> {
    packet.parse().map_err(|source| PresentationError::Parse {
        msg_type: packet.msg_type,
        source,
    })
}

fn client_table(resp: &ClientListResponse) -> String {
    let mut out = String::new();
    out.push_str("═══════════════════════════════════════\n");
    out.push_str(&format!("  Connected clients ({})\n", resp.clients.len()));
    out.push_str("═══════════════════════════════════════\n");
    out.push_str(&format!("  {:<8}{:<24}{}", "ID", "ADDRESS", "PORT"));
    for client in &resp.clients {
        out.push_str(&format!(
            "\n  {:<8}{:<24}{}",
            client.id,
            for_terminal(&client.address),
            client.port
        ));
    }
    out
}

/// Types without a dedicated rule: pretty JSON if it parses, else raw.
fn generic(msg_type: MessageType, content: &[u8]) -> String {
    if content.is_empty() {
        return format!("[{msg_type}] (empty)");
    }
    match serde_json::from_slice::<serde_json::Value>(content)
        .ok()
        .and_then(|v| serde_json::to_string_pretty(&v).ok())
    {
        Some(pretty) => format!("[{msg_type}]\n{}", for_terminal(&pretty)),
        None => format!("[{msg_type}] {}", raw_content(content)),
    }
}

/// Content as sanitized text, or hex when it is not UTF-8.
pub fn raw_content(content: &[u8]) -> String {
    match std::str::from_utf8(content) {
        Ok(text) => for_terminal(text),
        Err(_) => format!("hex:{}", hex::encode(content)),
    }
}
