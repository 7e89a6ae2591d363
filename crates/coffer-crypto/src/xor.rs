//! Word-wide XOR used to apply keystream and CBC chaining blocks.

/// XOR `src` into `dst`, byte by byte, `u64` lanes at a time.
///
/// Lane width is a throughput choice only: the output is identical to a
/// plain byte loop regardless of how the slices are split into lanes.
/// Slices must be the same length.
pub(crate) fn xor_in_place(dst: &mut [u8], src: &[u8]) {
    debug_assert_eq!(dst.len(), src.len());

    let mut dst_lanes = dst.chunks_exact_mut(8);
    let mut src_lanes = src.chunks_exact(8);
    for (d, s) in dst_lanes.by_ref().zip(src_lanes.by_ref()) {
        let mut d_word = [0u8; 8];
        let mut s_word = [0u8; 8];
        d_word.copy_from_slice(d);
        s_word.copy_from_slice(s);
        let x = u64::from_ne_bytes(d_word) ^ u64::from_ne_bytes(s_word);
        d.copy_from_slice(&x.to_ne_bytes());
    }
    for (d, s) in dst_lanes.into_remainder().iter_mut().zip(src_lanes.remainder()) {
        *d ^= *s;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn xor_bytewise(dst: &mut [u8], src: &[u8]) {
        for (d, s) in dst.iter_mut().zip(src) {
            *d ^= *s;
        }
    }

    #[test]
    fn matches_bytewise_loop_at_every_length() {
        for len in 0..64 {
            let src: Vec<u8> = (0..len).map(|i| (i as u8).wrapping_mul(37)).collect();
            let base: Vec<u8> = (0..len).map(|i| (i as u8).wrapping_add(101)).collect();

            let mut lane = base.clone();
            let mut scalar = base;
            xor_in_place(&mut lane, &src);
            xor_bytewise(&mut scalar, &src);

            assert_eq!(lane, scalar, "lane and scalar XOR diverged at length {len}");
        }
    }

    #[test]
    fn xor_is_an_involution() {
        let src = [0x5Au8; 23];
        let original = [0xC3u8; 23];
        let mut buf = original;
        xor_in_place(&mut buf, &src);
        xor_in_place(&mut buf, &src);
        assert_eq!(buf, original);
    }
}
