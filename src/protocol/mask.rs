//! Payload masking (RFC 6455 Section 5.3).

/// XOR `data` with the 4-byte masking key, starting at key offset 0.
///
/// Masking is its own inverse, so the same call masks and unmasks.
#[inline]
pub fn apply_mask(data: &mut [u8], mask: [u8; 4]) {
    let key = u32::from_ne_bytes(mask);
    let mut chunks = data.chunks_exact_mut(4);
    for chunk in &mut chunks {
        let word = u32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]) ^ key;
        chunk.copy_from_slice(&word.to_ne_bytes());
    }
    for (byte, k) in chunks.into_remainder().iter_mut().zip(mask) {
        *byte ^= k;
    }
}
