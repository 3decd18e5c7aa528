//! Property-based tests for the frame codec.
//!
//! These tests use proptest to fuzz encoding and decoding across the three
//! length forms and arbitrary masking keys.

use proptest::prelude::*;
use wsprobe::config::Limits;
use wsprobe::protocol::{Frame, LengthForm, OpCode, RawHttpResponse, apply_mask, encode_masked};

fn output_opcode_strategy() -> impl Strategy<Value = OpCode> {
    prop_oneof![Just(OpCode::Text), Just(OpCode::Binary)]
}

fn any_opcode_strategy() -> impl Strategy<Value = OpCode> {
    prop_oneof![
        Just(OpCode::Continuation),
        Just(OpCode::Text),
        Just(OpCode::Binary),
        Just(OpCode::Close),
        Just(OpCode::Ping),
        Just(OpCode::Pong),
    ]
}

/// Payload lengths clustered around the length-form boundaries.
fn boundary_len_strategy() -> impl Strategy<Value = usize> {
    prop_oneof![
        0usize..=2,
        123usize..=128,
        65_533usize..=65_538,
        0usize..70_000,
    ]
}

fn expected_form(len: usize) -> LengthForm {
    if len <= 125 {
        LengthForm::Inline
    } else if len <= 65_535 {
        LengthForm::Extended16
    } else {
        LengthForm::Extended64
    }
}

proptest! {
    // =========================================================================
    // Property 1: masked encode then parse recovers the payload
    // =========================================================================
    #[test]
    fn test_masked_roundtrip(
        opcode in any_opcode_strategy(),
        payload in prop::collection::vec(any::<u8>(), 0..2000),
        mask in any::<[u8; 4]>()
    ) {
        let wire = encode_masked(opcode, &payload, mask);
        let (parsed, consumed) = Frame::parse(&wire).unwrap();

        prop_assert_eq!(consumed, wire.len());
        prop_assert_eq!(parsed.opcode, opcode);
        prop_assert_eq!(parsed.mask, Some(mask));
        prop_assert!(parsed.fin);
        prop_assert_eq!(parsed.payload(), payload.as_slice());
    }

    // =========================================================================
    // Property 2: the length form follows the payload size bucket
    // =========================================================================
    #[test]
    fn test_length_form_matches_bucket(len in boundary_len_strategy()) {
        let payload = vec![0x5A; len];
        let wire = encode_masked(OpCode::Binary, &payload, [1, 2, 3, 4]);
        let (parsed, _) = Frame::parse(&wire).unwrap();

        prop_assert_eq!(parsed.length_form, expected_form(len));
        prop_assert_eq!(parsed.payload().len(), len);
        prop_assert_eq!(wire.len(), 2 + expected_form(len).extension_len() + 4 + len);
    }

    // =========================================================================
    // Property 3: client frames always carry MASK=1
    // =========================================================================
    #[test]
    fn test_encoder_sets_mask_bit(
        opcode in output_opcode_strategy(),
        payload in prop::collection::vec(any::<u8>(), 0..300),
        mask in any::<[u8; 4]>()
    ) {
        let wire = encode_masked(opcode, &payload, mask);
        prop_assert_eq!(wire[1] & 0x80, 0x80);
        prop_assert_eq!(wire[0] & 0x0F, opcode.as_u8());
    }

    // =========================================================================
    // Property 4: masking is self-inverse
    // =========================================================================
    #[test]
    fn test_mask_reversible(
        data in prop::collection::vec(any::<u8>(), 0..2000),
        mask in any::<[u8; 4]>()
    ) {
        let mut masked = data.clone();
        apply_mask(&mut masked, mask);
        apply_mask(&mut masked, mask);
        prop_assert_eq!(data, masked);
    }

    // =========================================================================
    // Property 5: unmasked server frames parse the same way
    // =========================================================================
    #[test]
    fn test_unmasked_roundtrip(
        opcode in output_opcode_strategy(),
        payload in prop::collection::vec(any::<u8>(), 0..1000)
    ) {
        let frame = Frame::new(opcode, payload.clone());
        let mut buf = vec![0u8; frame.wire_size()];
        let written = frame.write(&mut buf).unwrap();

        let (parsed, consumed) = Frame::parse(&buf[..written]).unwrap();
        prop_assert_eq!(consumed, written);
        prop_assert!(!parsed.is_masked());
        prop_assert_eq!(parsed.payload(), payload.as_slice());
    }

    // =========================================================================
    // Property 6: truncated input is reported, never misparsed
    // =========================================================================
    #[test]
    fn test_truncated_frame_is_error(
        payload in prop::collection::vec(any::<u8>(), 1..500),
        cut in 1usize..50
    ) {
        let wire = encode_masked(OpCode::Text, &payload, [9, 8, 7, 6]);
        let keep = wire.len().saturating_sub(cut).max(1);
        prop_assert!(Frame::parse(&wire[..keep]).is_err());
    }

    // =========================================================================
    // Property 7: the async decoder agrees with the slice parser
    // =========================================================================
    #[test]
    fn test_async_decoder_agrees(
        payload in prop::collection::vec(any::<u8>(), 0..5000),
        mask in any::<[u8; 4]>()
    ) {
        let wire = encode_masked(OpCode::Binary, &payload, mask);
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let decoded = runtime.block_on(async {
            let mut reader = &wire[..];
            wsprobe::codec::decode_one_frame(&mut reader, &Limits::default()).await
        }).unwrap();
        prop_assert_eq!(decoded.payload(), payload.as_slice());
    }

    // =========================================================================
    // Property 8: arbitrary bytes never panic the response helpers
    // =========================================================================
    #[test]
    fn test_response_helpers_no_panic(data in prop::collection::vec(any::<u8>(), 0..600)) {
        let response = RawHttpResponse::new(data);
        let _ = response.status_line();
        let _ = response.status_code();
        let _ = response.is_upgrade();
        let _ = response.parse();
    }
}

#[cfg(test)]
mod targeted_tests {
    use super::*;

    /// Lengths named by the wire format at each boundary.
    #[test]
    fn test_boundary_lengths() {
        for len in [0usize, 1, 125, 126, 65_535, 65_536] {
            let payload = vec![0xAB; len];
            let wire = encode_masked(OpCode::Text, &payload, [0x37, 0xFA, 0x21, 0x3D]);
            let (parsed, _) = Frame::parse(&wire).unwrap();
            assert_eq!(parsed.payload().len(), len);
            assert_eq!(parsed.length_form, expected_form(len));
        }
    }

    /// All-zero and all-0xFF masks are stripped like any other.
    #[test]
    fn test_degenerate_masks() {
        let payload = b"test payload";
        for mask in [[0, 0, 0, 0], [0xFF, 0xFF, 0xFF, 0xFF]] {
            let wire = encode_masked(OpCode::Text, payload, mask);
            let (parsed, _) = Frame::parse(&wire).unwrap();
            assert_eq!(parsed.payload(), payload);
        }
    }
}
