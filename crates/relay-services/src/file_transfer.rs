//! File transfer: sender-side chunking and receiver-side reassembly.
//!
//! Files travel as a run of send-file requests carrying base64 chunks, ended
//! by one request with `eof` set and no data. The server relays each chunk as
//! a file indication; the receiver appends chunks per (sender, filename).

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use tokio::sync::Mutex;

use relay_core::message::SendFileRequest;
use relay_core::sanitize;
use relay_core::ClientId;

/// Maximum raw bytes per chunk (before base64).
pub const MAX_CHUNK_SIZE: usize = 32 * 1024; // 32KB

pub fn encode_chunk(data: &[u8]) -> String {
    STANDARD.encode(data)
}

pub fn decode_chunk(data: &str) -> Result<Vec<u8>, base64::DecodeError> {
    STANDARD.decode(data)
}

/// Split a file into send-file requests addressed to `target_id`.
pub fn chunk_file(path: &Path, target_id: ClientId) -> Result<Vec<SendFileRequest>> {
    let data =
        std::fs::read(path).with_context(|| format!("failed to read file: {}", path.display()))?;

    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown")
        .to_string();

    let mut chunks: Vec<SendFileRequest> = data
        .chunks(MAX_CHUNK_SIZE)
        .map(|chunk| SendFileRequest {
            target_id,
            filename: filename.clone(),
            data: encode_chunk(chunk),
            eof: false,
        })
        .collect();

    chunks.push(SendFileRequest {
        target_id,
        filename,
        data: String::new(),
        eof: true,
    });

    Ok(chunks)
}

/// What happened to a chunk handed to [`FileReassembler::accept`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReassemblyOutcome {
    /// More chunks expected.
    Appended { path: PathBuf, bytes: u64 },
    /// Final chunk written; the file is closed.
    Completed { path: PathBuf, bytes: u64 },
    /// An earlier chunk of this file could not be saved, so the rest is
    /// dropped until its final chunk clears the key.
    Discarded { eof: bool },
}

/// Tracks files being reassembled from incoming chunks.
pub struct FileReassembler {
    /// Transfers in flight, keyed by (sender, sanitized filename).
    active: Arc<Mutex<HashMap<(ClientId, String), Transfer>>>,
    /// Where to write files.
    output_dir: PathBuf,
}

enum Transfer {
    Writing(FileAssembly),
    Failed,
}

struct FileAssembly {
    path: PathBuf,
    file: std::fs::File,
    bytes: u64,
    started_at: Instant,
}

impl FileReassembler {
    /// The directory is created lazily, on the first chunk.
    pub fn new(output_dir: PathBuf) -> Self {
        Self {
            active: Arc::new(Mutex::new(HashMap::new())),
            output_dir,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Append one decoded chunk. `eof` closes the sink after writing `data`.
    ///
    /// A chunk that cannot be saved fails its whole file: later chunks under
    /// the same key are discarded until the final one arrives.
    pub async fn accept(
        &self,
        sender: ClientId,
        filename: &str,
        data: &[u8],
        eof: bool,
    ) -> Result<ReassemblyOutcome> {
        let name = sanitize::file_name(filename);
        let key = (sender, name);
        let mut active = self.active.lock().await;

        // Taken out while writing; put back unless this was the last chunk.
        let mut assembly = match active.remove(&key) {
            Some(Transfer::Writing(assembly)) => assembly,
            Some(Transfer::Failed) => {
                tracing::debug!(sender, filename = %key.1, eof, "chunk of failed file discarded");
                if !eof {
                    active.insert(key, Transfer::Failed);
                }
                return Ok(ReassemblyOutcome::Discarded { eof });
            }
            None => match self.open_sink(sender, &key.1) {
                Ok(assembly) => {
                    tracing::debug!(
                        sender,
                        path = %assembly.path.display(),
                        "file transfer started"
                    );
                    assembly
                }
                Err(e) => {
                    if !eof {
                        active.insert(key, Transfer::Failed);
                    }
                    return Err(e);
                }
            },
        };

        if let Err(e) = assembly.file.write_all(data) {
            tracing::warn!(
                sender,
                path = %assembly.path.display(),
                error = %e,
                "file write failed, dropping the rest of the file"
            );
            let path = assembly.path.display().to_string();
            if !eof {
                active.insert(key, Transfer::Failed);
            }
            return Err(e).with_context(|| format!("failed to write {path}"));
        }
        assembly.bytes += data.len() as u64;

        if !eof {
            let outcome = ReassemblyOutcome::Appended {
                path: assembly.path.clone(),
                bytes: assembly.bytes,
            };
            active.insert(key, Transfer::Writing(assembly));
            return Ok(outcome);
        }

        assembly
            .file
            .flush()
            .with_context(|| format!("failed to flush {}", assembly.path.display()))?;

        tracing::info!(
            sender,
            bytes = assembly.bytes,
            elapsed_ms = assembly.started_at.elapsed().as_millis() as u64,
            path = %assembly.path.display(),
            "file received and reassembled"
        );

        Ok(ReassemblyOutcome::Completed {
            path: assembly.path,
            bytes: assembly.bytes,
        })
    }

    /// Open a new sink at a path no earlier transfer used.
    fn open_sink(&self, sender: ClientId, name: &str) -> Result<FileAssembly> {
        std::fs::create_dir_all(&self.output_dir).with_context(|| {
            format!("failed to create {}", self.output_dir.display())
        })?;

        let base = format!("{sender}_{name}");
        let mut attempt = 0u32;
        loop {
            let candidate = if attempt == 0 {
                self.output_dir.join(&base)
            } else {
                self.output_dir.join(format!("{base}.{attempt}"))
            };
            match std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&candidate)
            {
                Ok(file) => {
                    return Ok(FileAssembly {
                        path: candidate,
                        file,
                        bytes: 0,
                        started_at: Instant::now(),
                    })
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => attempt += 1,
                Err(e) => {
                    return Err(e)
                        .with_context(|| format!("failed to create {}", candidate.display()));
                }
            }
        }
    }

    /// Files currently being received. Failed files are not listed.
    pub async fn in_progress(&self) -> Vec<(ClientId, String)> {
        let active = self.active.lock().await;
        let mut keys: Vec<_> = active
            .iter()
            .filter(|(_, transfer)| matches!(transfer, Transfer::Writing(_)))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }
}
