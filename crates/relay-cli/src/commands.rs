//! Interactive commands typed at the client prompt.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use tokio::io::AsyncWrite;

use relay_core::io::write_packet;
use relay_core::message::SendMessageRequest;
use relay_core::{ClientId, MessageType, Packet};
use relay_services::chunk_file;

pub const HELP: &str = "\
commands:
  /time                 server time
  /name                 server name
  /list                 connected clients
  /send <id> <text>     message a client
  /file <id> <path>     send a file to a client
  /quit                 disconnect and exit
  /help                 this text";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Time,
    Name,
    List,
    Send { target: ClientId, text: String },
    File { target: ClientId, path: PathBuf },
    Quit,
    Help,
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("commands start with '/'; try /help")]
    NotACommand,
    #[error("unknown command: {0}")]
    Unknown(String),
    #[error("usage: {0}")]
    Usage(&'static str),
}

/// Parse one input line. Surrounding whitespace is ignored.
pub fn parse(line: &str) -> Result<Command, CommandError> {
    let line = line.trim();
    let Some(rest) = line.strip_prefix('/') else {
        return Err(CommandError::NotACommand);
    };
    let (name, args) = match rest.split_once(char::is_whitespace) {
        Some((name, args)) => (name, args.trim()),
        None => (rest, ""),
    };

    match name {
        "time" => Ok(Command::Time),
        "name" => Ok(Command::Name),
        "list" => Ok(Command::List),
        "quit" | "exit" => Ok(Command::Quit),
        "help" => Ok(Command::Help),
        "send" => {
            const USAGE: &str = "/send <id> <text>";
            let (target, text) = target_and_rest(args).ok_or(CommandError::Usage(USAGE))?;
            Ok(Command::Send {
                target,
                text: text.to_string(),
            })
        }
        "file" => {
            const USAGE: &str = "/file <id> <path>";
            let (target, path) = target_and_rest(args).ok_or(CommandError::Usage(USAGE))?;
            Ok(Command::File {
                target,
                path: PathBuf::from(path),
            })
        }
        other => Err(CommandError::Unknown(format!("/{other}"))),
    }
}

/// `<id> <non-empty rest>`.
fn target_and_rest(args: &str) -> Option<(ClientId, &str)> {
    let (id, rest) = args.split_once(char::is_whitespace)?;
    let target = id.parse().ok()?;
    let rest = rest.trim();
    (!rest.is_empty()).then_some((target, rest))
}

impl Command {
    /// The single request this command sends, if it sends exactly one.
    pub fn request(&self) -> Option<Packet> {
        match self {
            Command::Time => Some(Packet::empty(MessageType::GetTimeRequest)),
            Command::Name => Some(Packet::empty(MessageType::GetNameRequest)),
            Command::List => Some(Packet::empty(MessageType::GetClientListRequest)),
            Command::Quit => Some(Packet::empty(MessageType::DisconnectRequest)),
            Command::Send { target, text } => Some(Packet::json(
                MessageType::SendMessageRequest,
                &SendMessageRequest {
                    target_id: *target,
                    message: text.clone(),
                },
            )),
            Command::File { .. } | Command::Help => None,
        }
    }
}

/// Stream a file to `target` as send-file requests, `pacing` apart.
/// Returns the number of requests written.
pub async fn send_file<W>(
    writer: &mut W,
    path: &Path,
    target: ClientId,
    pacing: Duration,
) -> Result<usize>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let chunks = chunk_file(path, target)?;
    let count = chunks.len();
    for (i, chunk) in chunks.iter().enumerate() {
        write_packet(writer, &Packet::json(MessageType::SendFileRequest, chunk)).await?;
        if i + 1 < count && !pacing.is_zero() {
            tokio::time::sleep(pacing).await;
        }
    }
    tracing::debug!(path = %path.display(), target, chunks = count, "file sent");
    Ok(count)
}
