//! WebSocket wire format: frames, masking and the Upgrade handshake.

pub mod frame;
pub mod handshake;
pub mod mask;
pub mod opcode;

pub use frame::{Frame, LengthForm, encode_masked, encode_masked_text};
pub use handshake::{
    HandshakeResponse, RawHttpResponse, WS_GUID, compute_accept_key, upgrade_request,
};
pub use mask::{apply_mask, random_mask};
pub use opcode::OpCode;
