//! WebSocket frame layout and serialization (RFC 6455 section 5.2).
//!
//! Only single, unfragmented frames are produced. Outbound frames are always
//! masked; the decoder accepts either form so that a misbehaving server that
//! masks its frames is still readable.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};
use crate::protocol::OpCode;
use crate::protocol::mask::{apply_mask, random_mask};

/// Largest payload that fits the 7-bit length field.
pub const MAX_INLINE_PAYLOAD: usize = 125;

/// Largest payload that fits the 16-bit extension.
pub const MAX_EXTENDED16_PAYLOAD: usize = u16::MAX as usize;

/// Longest possible header: 2 + 8 (length) + 4 (mask key).
pub const MAX_HEADER_LEN: usize = 14;

/// How a frame encodes its payload length on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthForm {
    /// 0-125 in the 7-bit field.
    Inline,
    /// 126 marker followed by a 16-bit big-endian length.
    Extended16,
    /// 127 marker followed by a 64-bit big-endian length.
    Extended64,
}

impl LengthForm {
    /// Form required for a payload of `len` bytes.
    #[must_use]
    pub const fn for_len(len: usize) -> Self {
        if len <= MAX_INLINE_PAYLOAD {
            LengthForm::Inline
        } else if len <= MAX_EXTENDED16_PAYLOAD {
            LengthForm::Extended16
        } else {
            LengthForm::Extended64
        }
    }

    /// Form announced by the 7-bit length field of a header's second byte.
    #[must_use]
    pub const fn from_marker(byte1: u8) -> Self {
        match byte1 & 0x7F {
            126 => LengthForm::Extended16,
            127 => LengthForm::Extended64,
            _ => LengthForm::Inline,
        }
    }

    /// Number of extension bytes after the first two header bytes.
    #[must_use]
    pub const fn extension_len(self) -> usize {
        match self {
            LengthForm::Inline => 0,
            LengthForm::Extended16 => 2,
            LengthForm::Extended64 => 8,
        }
    }
}

/// Total header length implied by a frame's second byte.
#[inline]
#[must_use]
pub const fn header_len_for(byte1: u8) -> usize {
    let mask_len = if byte1 & 0x80 != 0 { 4 } else { 0 };
    2 + LengthForm::from_marker(byte1).extension_len() + mask_len
}

/// Decoded fixed part of a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FrameHeader {
    pub(crate) fin: bool,
    pub(crate) opcode: OpCode,
    pub(crate) mask: Option<[u8; 4]>,
    pub(crate) length_form: LengthForm,
    pub(crate) payload_len: u64,
    pub(crate) header_len: usize,
}

/// Parse a frame header from the start of `buf`.
///
/// # Errors
///
/// - `Error::IncompleteFrame` if `buf` ends before the header does
/// - `Error::ReservedOpcode` if the opcode nibble is reserved
pub(crate) fn parse_header(buf: &[u8]) -> Result<FrameHeader> {
    if buf.len() < 2 {
        return Err(Error::IncompleteFrame {
            needed: 2 - buf.len(),
        });
    }

    let header_len = header_len_for(buf[1]);
    if buf.len() < header_len {
        return Err(Error::IncompleteFrame {
            needed: header_len - buf.len(),
        });
    }

    let fin = buf[0] & 0x80 != 0;
    let opcode = OpCode::from_u8(buf[0] & 0x0F)?;
    let length_form = LengthForm::from_marker(buf[1]);

    let payload_len = match length_form {
        LengthForm::Inline => u64::from(buf[1] & 0x7F),
        LengthForm::Extended16 => u64::from(u16::from_be_bytes([buf[2], buf[3]])),
        LengthForm::Extended64 => {
            let mut ext = [0u8; 8];
            ext.copy_from_slice(&buf[2..10]);
            u64::from_be_bytes(ext)
        }
    };

    let mask = if buf[1] & 0x80 != 0 {
        let at = 2 + length_form.extension_len();
        Some([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
    } else {
        None
    };

    Ok(FrameHeader {
        fin,
        opcode,
        mask,
        length_form,
        payload_len,
        header_len,
    })
}

/// One WebSocket frame.
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-------+-+-------------+-------------------------------+
/// |F|R|R|R| opcode|M| Payload len |    Extended payload length    |
/// |I|S|S|S|  (4)  |A|     (7)     |             (16/64)           |
/// |N|V|V|V|       |S|             |   (if payload len==126/127)   |
/// +-+-+-+-+-------+-+-------------+-------------------------------+
/// |                     Masking key (if MASK=1)                   |
/// +---------------------------------------------------------------+
/// |                          Payload data                         |
/// +---------------------------------------------------------------+
/// ```
///
/// `payload` always holds the unmasked bytes. `mask` records the key the frame
/// was (or will be) sent with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Final fragment flag.
    pub fin: bool,
    /// Frame opcode.
    pub opcode: OpCode,
    /// Masking key, present iff the MASK bit is set.
    pub mask: Option<[u8; 4]>,
    /// Length encoding used on the wire.
    pub length_form: LengthForm,
    payload: Bytes,
}

impl Frame {
    /// Unmasked final frame.
    #[must_use]
    pub fn new(opcode: OpCode, payload: impl Into<Bytes>) -> Self {
        let payload = payload.into();
        Self {
            fin: true,
            opcode,
            mask: None,
            length_form: LengthForm::for_len(payload.len()),
            payload,
        }
    }

    /// Final frame that will be masked with `mask`.
    #[must_use]
    pub fn masked(opcode: OpCode, payload: impl Into<Bytes>, mask: [u8; 4]) -> Self {
        Self {
            mask: Some(mask),
            ..Self::new(opcode, payload)
        }
    }

    /// Whether the MASK bit is set.
    #[inline]
    #[must_use]
    pub fn is_masked(&self) -> bool {
        self.mask.is_some()
    }

    /// Unmasked payload bytes.
    #[inline]
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Bytes needed to serialize this frame.
    #[must_use]
    pub fn wire_size(&self) -> usize {
        let mask_len = if self.is_masked() { 4 } else { 0 };
        2 + LengthForm::for_len(self.payload.len()).extension_len() + mask_len + self.payload.len()
    }

    /// Serialize into `buf`, returning the number of bytes written.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidFrame` if `buf` is shorter than [`wire_size`](Self::wire_size).
    pub fn write(&self, buf: &mut [u8]) -> Result<usize> {
        let total = self.wire_size();
        if buf.len() < total {
            return Err(Error::InvalidFrame(format!(
                "Buffer too small: need {} bytes, have {}",
                total,
                buf.len()
            )));
        }

        let mut out = &mut buf[..total];
        self.put(&mut out);
        Ok(total)
    }

    /// Serialize into a fresh buffer.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        let mut out = BytesMut::with_capacity(self.wire_size());
        self.put(&mut out);
        out.freeze()
    }

    fn put(&self, out: &mut impl BufMut) {
        let len = self.payload.len();

        let fin_bit = if self.fin { 0x80 } else { 0 };
        out.put_u8(fin_bit | self.opcode.as_u8());

        let mask_bit = if self.is_masked() { 0x80 } else { 0 };
        match LengthForm::for_len(len) {
            LengthForm::Inline => out.put_u8(mask_bit | len as u8),
            LengthForm::Extended16 => {
                out.put_u8(mask_bit | 126);
                out.put_u16(len as u16);
            }
            LengthForm::Extended64 => {
                out.put_u8(mask_bit | 127);
                out.put_u64(len as u64);
            }
        }

        match self.mask {
            Some(key) => {
                out.put_slice(&key);
                let mut masked = self.payload.to_vec();
                apply_mask(&mut masked, key);
                out.put_slice(&masked);
            }
            None => out.put_slice(&self.payload),
        }
    }

    /// Parse one complete frame from `buf`, returning it and the bytes consumed.
    ///
    /// # Errors
    ///
    /// - `Error::IncompleteFrame` if `buf` ends before the frame does
    /// - `Error::ReservedOpcode` if the opcode nibble is reserved
    pub fn parse(buf: &[u8]) -> Result<(Self, usize)> {
        let header = parse_header(buf)?;
        let payload_len = usize::try_from(header.payload_len).map_err(|_| Error::FrameTooLarge {
            size: header.payload_len,
            max: usize::MAX,
        })?;

        let total = header.header_len.saturating_add(payload_len);
        if buf.len() < total {
            return Err(Error::IncompleteFrame {
                needed: total - buf.len(),
            });
        }

        let mut payload = buf[header.header_len..total].to_vec();
        if let Some(key) = header.mask {
            apply_mask(&mut payload, key);
        }

        Ok((Self::from_parts(header, payload), total))
    }

    pub(crate) fn from_parts(header: FrameHeader, payload: Vec<u8>) -> Self {
        Self {
            fin: header.fin,
            opcode: header.opcode,
            mask: header.mask,
            length_form: header.length_form,
            payload: Bytes::from(payload),
        }
    }
}

/// Encode a final, masked text frame with a fresh random key.
#[must_use]
pub fn encode_masked_text(payload: &[u8]) -> Bytes {
    encode_masked(OpCode::Text, payload, random_mask())
}

/// Encode a final frame masked with `mask`.
#[must_use]
pub fn encode_masked(opcode: OpCode, payload: &[u8], mask: [u8; 4]) -> Bytes {
    Frame::masked(opcode, Bytes::copy_from_slice(payload), mask).encode()
}
