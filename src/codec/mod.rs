//! Frame I/O over async streams.

mod framed;

pub use framed::{decode_one_frame, send_masked_text};
