//! Payload masking (RFC 6455 section 5.3).

/// XOR `data` with `mask`, repeating the key every 4 bytes.
///
/// Masking is its own inverse: applying the same key twice restores the input.
#[inline]
pub fn apply_mask(data: &mut [u8], mask: [u8; 4]) {
    let key = u32::from_ne_bytes(mask);
    let mut chunks = data.chunks_exact_mut(4);
    for chunk in &mut chunks {
        let word = u32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]) ^ key;
        chunk.copy_from_slice(&word.to_ne_bytes());
    }
    for (i, byte) in chunks.into_remainder().iter_mut().enumerate() {
        *byte ^= mask[i];
    }
}

/// Fresh masking key from the OS RNG.
///
/// Falls back to a time-derived key if the RNG is unavailable; the key only
/// has to be unpredictable to intermediaries, not cryptographically strong.
#[must_use]
pub fn random_mask() -> [u8; 4] {
    let mut key = [0u8; 4];
    if getrandom::getrandom(&mut key).is_err() {
        use std::time::{SystemTime, UNIX_EPOCH};
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.subsec_nanos())
            .unwrap_or(0x1234_5678);
        key = nanos.wrapping_mul(0x9E37_79B9).to_le_bytes();
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference_mask(data: &mut [u8], mask: [u8; 4]) {
        for (i, byte) in data.iter_mut().enumerate() {
            *byte ^= mask[i % 4];
        }
    }

    #[test]
    fn test_rfc_example() {
        // RFC 6455 5.7: "Hello" with key 37 fa 21 3d
        let mut data = *b"Hello";
        apply_mask(&mut data, [0x37, 0xfa, 0x21, 0x3d]);
        assert_eq!(data, [0x7f, 0x9f, 0x4d, 0x51, 0x58]);
    }

    #[test]
    fn test_matches_bytewise_for_all_tail_lengths() {
        let mask = [0xde, 0xad, 0xbe, 0xef];
        for len in 0..=9 {
            let original: Vec<u8> = (0..len as u8).collect();
            let mut fast = original.clone();
            let mut slow = original.clone();
            apply_mask(&mut fast, mask);
            reference_mask(&mut slow, mask);
            assert_eq!(fast, slow, "len {len}");
        }
    }

    #[test]
    fn test_degenerate_keys() {
        let original = b"ls\n".to_vec();

        let mut zero = original.clone();
        apply_mask(&mut zero, [0; 4]);
        assert_eq!(zero, original);

        let mut ones = original.clone();
        apply_mask(&mut ones, [0xFF; 4]);
        assert_eq!(ones, vec![!b'l', !b's', !b'\n']);
        apply_mask(&mut ones, [0xFF; 4]);
        assert_eq!(ones, original);
    }

    #[test]
    fn test_random_masks_vary() {
        let keys: Vec<[u8; 4]> = (0..8).map(|_| random_mask()).collect();
        assert!(keys.windows(2).any(|w| w[0] != w[1]));
    }
}
