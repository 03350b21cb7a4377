//! Connection I/O: exact reads and whole-frame reads/writes.
//!
//! `read_packet` is the only place that decides where one frame ends and
//! the next begins. Callers never peek ahead.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::wire::{self, Packet, WireError, LENGTH_PREFIX_SIZE};

/// Read exactly `n` bytes. EOF or an I/O error before that is
/// `ConnectionClosed`; a short read is never returned.
pub async fn read_exact<R>(reader: &mut R, n: usize) -> Result<Vec<u8>, WireError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut buf = vec![0u8; n];
    let mut filled = 0;
    while filled < n {
        match reader.read(&mut buf[filled..]).await {
            Ok(0) => return Err(WireError::ConnectionClosed(None)),
            Ok(read) => filled += read,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(WireError::ConnectionClosed(Some(e))),
        }
    }
    Ok(buf)
}

/// Read one framed packet: prefix, bounds check, body, decode.
pub async fn read_packet<R>(reader: &mut R) -> Result<Packet, WireError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let prefix = read_exact(reader, LENGTH_PREFIX_SIZE).await?;
    let total_len = u32::from_be_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]) as usize;

    // Checked before reading the body so a hostile prefix can't make us allocate.
    wire::check_total_len(total_len)?;

    let body = read_exact(reader, total_len).await?;
    wire::decode(&body)
}

/// Frame and write one packet, then flush. A packet the peer would reject
/// as oversized is refused with `InvalidInput` and nothing is written.
pub async fn write_packet<W>(writer: &mut W, packet: &Packet) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    wire::check_packet(packet)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
    let frame = wire::encode(packet);
    writer.write_all(&frame).await?;
    writer.flush().await
}
