//! SP 800-108 counter-mode key derivation over HMAC-SHA-384
//!
//! Per-iteration input is `BE32(i) || label || 0x00 || context || BE32(bits)`
//! and the leftmost bytes of each HMAC output fill the caller's buffer.
//! The record layer passes a per-record random context here, so equal
//! master keys never yield equal session keys across records.

use hmac::{Hmac, Mac};
use sha2::Sha384;
use zeroize::Zeroize;

use crate::error::CryptoError;

type HmacSha384 = Hmac<Sha384>;

/// HMAC-SHA-384 output length in bytes
pub const HASH_LEN: usize = 48;

/// Fill `output` with key material derived from `key`.
///
/// `label` distinguishes independent uses of the same key; `None` and
/// `Some(&[])` derive identical output. `context` carries the per-use
/// entropy. `counter` numbers the first HMAC iteration; the stream layer
/// uses it to give every chunk an independent derivation.
///
/// An empty `output` returns immediately. The iteration counter uses
/// checked increments: wrapping past `u32::MAX` while output remains is
/// reported as [`CryptoError::CounterExhausted`] rather than silently
/// re-deriving an earlier block.
pub fn derive_key(
    key: &[u8],
    label: Option<&[u8]>,
    context: &[u8],
    counter: u32,
    output: &mut [u8],
) -> Result<(), CryptoError> {
    if output.is_empty() {
        return Ok(());
    }

    let label = label.unwrap_or_default();
    let bits = (output.len() * 8) as u32;

    let mut buffer = Vec::with_capacity(4 + label.len() + 1 + context.len() + 4);
    buffer.extend_from_slice(&[0u8; 4]);
    buffer.extend_from_slice(label);
    buffer.push(0x00);
    buffer.extend_from_slice(context);
    buffer.extend_from_slice(&bits.to_be_bytes());

    let Ok(base_mac) = HmacSha384::new_from_slice(key) else {
        unreachable!("HMAC-SHA384 accepts any key size");
    };

    let mut iteration = counter;
    let mut written = 0;
    loop {
        buffer[..4].copy_from_slice(&iteration.to_be_bytes());
        let mut mac = base_mac.clone();
        mac.update(&buffer);
        let mut block = mac.finalize().into_bytes();

        let take = (output.len() - written).min(block.len());
        output[written..written + take].copy_from_slice(&block[..take]);
        block.as_mut_slice().zeroize();
        written += take;

        if written == output.len() {
            return Ok(());
        }
        iteration = iteration
            .checked_add(1)
            .ok_or(CryptoError::CounterExhausted { counter: iteration })?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_KEY: &[u8] = b"master key material for kdf tests";
    const TEST_CONTEXT: &[u8] = &[0x42; 32];

    #[test]
    fn derivation_is_deterministic() {
        let mut a = [0u8; 64];
        let mut b = [0u8; 64];
        derive_key(TEST_KEY, Some(b"label"), TEST_CONTEXT, 1, &mut a).unwrap();
        derive_key(TEST_KEY, Some(b"label"), TEST_CONTEXT, 1, &mut b).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn matches_manual_hmac_construction() {
        // One-iteration output must equal HMAC(key, BE32(1) || label || 0x00
        // || context || BE32(bits)) truncated to the requested length.
        let label = b"coffer";
        let mut output = [0u8; 32];
        derive_key(TEST_KEY, Some(label), TEST_CONTEXT, 1, &mut output).unwrap();

        let mut input = Vec::new();
        input.extend_from_slice(&1u32.to_be_bytes());
        input.extend_from_slice(label);
        input.push(0x00);
        input.extend_from_slice(TEST_CONTEXT);
        input.extend_from_slice(&256u32.to_be_bytes());

        let mut mac = HmacSha384::new_from_slice(TEST_KEY).unwrap();
        mac.update(&input);
        let reference = mac.finalize().into_bytes();

        assert_eq!(output, reference[..32]);
    }

    #[test]
    fn empty_output_returns_immediately() {
        let mut output = [0u8; 0];
        derive_key(TEST_KEY, None, TEST_CONTEXT, u32::MAX, &mut output).unwrap();
    }

    #[test]
    fn absent_and_empty_label_agree() {
        let mut absent = [0u8; 48];
        let mut empty = [0u8; 48];
        derive_key(TEST_KEY, None, TEST_CONTEXT, 1, &mut absent).unwrap();
        derive_key(TEST_KEY, Some(&[]), TEST_CONTEXT, 1, &mut empty).unwrap();
        assert_eq!(absent, empty);
    }

    #[test]
    fn label_separates_derivations() {
        let mut a = [0u8; 48];
        let mut b = [0u8; 48];
        derive_key(TEST_KEY, Some(b"a"), TEST_CONTEXT, 1, &mut a).unwrap();
        derive_key(TEST_KEY, Some(b"b"), TEST_CONTEXT, 1, &mut b).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn counter_separates_derivations() {
        let mut a = [0u8; 48];
        let mut b = [0u8; 48];
        derive_key(TEST_KEY, None, TEST_CONTEXT, 1, &mut a).unwrap();
        derive_key(TEST_KEY, None, TEST_CONTEXT, 2, &mut b).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn long_output_spans_iterations() {
        // 100 bytes needs three hash blocks; the tail iteration is truncated.
        let mut long = [0u8; 100];
        derive_key(TEST_KEY, None, TEST_CONTEXT, 1, &mut long).unwrap();

        let mut first = [0u8; HASH_LEN];
        derive_key(TEST_KEY, None, TEST_CONTEXT, 1, &mut first).unwrap();
        let mut second = [0u8; HASH_LEN];
        derive_key(TEST_KEY, None, TEST_CONTEXT, 2, &mut second).unwrap();

        assert_eq!(long[..HASH_LEN], first);
        assert_eq!(long[HASH_LEN..2 * HASH_LEN], second);
    }

    #[test]
    fn counter_overflow_is_detected() {
        // Needs a second iteration, but the counter cannot advance.
        let mut output = [0u8; HASH_LEN + 1];
        let result = derive_key(TEST_KEY, None, TEST_CONTEXT, u32::MAX, &mut output);
        assert!(matches!(
            result,
            Err(CryptoError::CounterExhausted { counter: u32::MAX })
        ));
    }

    #[test]
    fn max_counter_single_iteration_succeeds() {
        // A one-block output at counter MAX never increments, so it succeeds.
        let mut output = [0u8; HASH_LEN];
        derive_key(TEST_KEY, None, TEST_CONTEXT, u32::MAX, &mut output).unwrap();
    }
}
