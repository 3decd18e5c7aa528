use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::config::Limits;
use crate::error::{Error, Result};
use crate::protocol::frame::{MAX_HEADER_LEN, header_len_for, parse_header};
use crate::protocol::{Frame, apply_mask, encode_masked_text};

/// Fill `buf` completely, looping over short reads.
///
/// A zero-length read means the peer half-closed: before any byte arrived
/// that is `ConnectionClosed`, afterwards `IncompleteFrame`.
async fn read_full<R: AsyncRead + Unpin>(reader: &mut R, buf: &mut [u8]) -> Result<()> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            return Err(if filled == 0 {
                Error::ConnectionClosed
            } else {
                Error::IncompleteFrame {
                    needed: buf.len() - filled,
                }
            });
        }
        filled += n;
    }
    Ok(())
}

/// Read exactly one frame from `reader`.
///
/// Reads the two fixed header bytes, then the length extension and mask key
/// they announce, then the payload. The payload is unmasked if a key was
/// present. The caller bounds the whole operation with a timeout.
///
/// # Errors
///
/// - `Error::ConnectionClosed` if the peer closes before the header is complete
/// - `Error::IncompleteFrame` if the peer closes mid-payload
/// - `Error::ReservedOpcode` if the opcode nibble is reserved
/// - `Error::FrameTooLarge` if the announced length exceeds `limits`
pub async fn decode_one_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
    limits: &Limits,
) -> Result<Frame> {
    let mut header = [0u8; MAX_HEADER_LEN];
    read_full(reader, &mut header[..2]).await.map_err(|e| match e {
        Error::IncompleteFrame { .. } => Error::ConnectionClosed,
        other => other,
    })?;

    let header_len = header_len_for(header[1]);
    if header_len > 2 {
        read_full(reader, &mut header[2..header_len])
            .await
            .map_err(|e| match e {
                Error::ConnectionClosed | Error::IncompleteFrame { .. } => Error::ConnectionClosed,
                other => other,
            })?;
    }

    let header = parse_header(&header[..header_len])?;
    let payload_len = limits.check_frame_size(header.payload_len)?;

    let mut payload = vec![0u8; payload_len];
    read_full(reader, &mut payload).await.map_err(|e| match e {
        Error::ConnectionClosed => Error::IncompleteFrame {
            needed: payload_len,
        },
        other => other,
    })?;

    if let Some(key) = header.mask {
        apply_mask(&mut payload, key);
    }

    Ok(Frame::from_parts(header, payload))
}

/// Send `payload` as one masked text frame with a fresh key.
///
/// Returns the number of bytes written.
///
/// # Errors
///
/// Returns `Error::Io` if the write fails.
pub async fn send_masked_text<W: AsyncWrite + Unpin>(writer: &mut W, payload: &[u8]) -> Result<usize> {
    let wire = encode_masked_text(payload);
    writer.write_all(&wire).await?;
    writer.flush().await?;
    Ok(wire.len())
}
