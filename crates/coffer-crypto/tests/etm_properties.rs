//! Property-based tests for the Encrypt-then-MAC composition
//!
//! These tests verify the fundamental invariants of the record and stream
//! layers:
//!
//! 1. **Round-trip**: decrypt(encrypt(p)) == p for all plaintexts, salts,
//!    and counters, in both cipher modes
//! 2. **Tamper detection**: flipping any single bit anywhere in a record
//!    makes decryption fail
//! 3. **Length formulas**: the published length helpers match the records
//!    actually produced
//! 4. **Keystream continuity**: splitting input across calls never changes
//!    the output
//! 5. **Context uniqueness**: fresh contexts never collide across a large
//!    number of encryptions

use std::collections::HashSet;

use coffer_crypto::keystream::BLOCK_LEN;
use coffer_crypto::stream::{CIPHERTEXT_CHUNK_LEN, PLAINTEXT_CHUNK_LEN};
use coffer_crypto::{CryptoError, CtrKeystream, StreamDecryptor, StreamEncryptor, etm_cbc, etm_ctr};
use proptest::prelude::*;

const MASTER_KEY: &[u8] = &[0x61; 32];

fn salt_strategy() -> impl Strategy<Value = Option<Vec<u8>>> {
    prop::option::of(prop::collection::vec(any::<u8>(), 0..32))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_ctr_roundtrip(
        plaintext in prop::collection::vec(any::<u8>(), 0..2000),
        salt in salt_strategy(),
        counter in any::<u32>(),
    ) {
        let record = etm_ctr::encrypt(MASTER_KEY, &plaintext, salt.as_deref(), counter).unwrap();
        prop_assert_eq!(record.len(), etm_ctr::ciphertext_len(plaintext.len()));

        let recovered = etm_ctr::decrypt(MASTER_KEY, &record, salt.as_deref(), counter).unwrap();
        prop_assert_eq!(recovered, plaintext);
        prop_assert!(etm_ctr::authenticate(MASTER_KEY, &record, salt.as_deref(), counter));
    }

    #[test]
    fn prop_cbc_roundtrip(
        plaintext in prop::collection::vec(any::<u8>(), 0..2000),
        salt in salt_strategy(),
        counter in any::<u32>(),
    ) {
        let record = etm_cbc::encrypt(MASTER_KEY, &plaintext, salt.as_deref(), counter).unwrap();
        prop_assert_eq!(record.len(), etm_cbc::ciphertext_len(plaintext.len()));

        let recovered = etm_cbc::decrypt(MASTER_KEY, &record, salt.as_deref(), counter).unwrap();
        prop_assert_eq!(recovered, plaintext);
        prop_assert!(etm_cbc::authenticate(MASTER_KEY, &record, salt.as_deref(), counter));
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_ctr_single_bit_flip_is_rejected(
        plaintext in prop::collection::vec(any::<u8>(), 0..500),
        salt in salt_strategy(),
        position in any::<prop::sample::Index>(),
        bit in 0u8..8,
    ) {
        let record = etm_ctr::encrypt(MASTER_KEY, &plaintext, salt.as_deref(), 1).unwrap();

        let mut tampered = record;
        let byte = position.index(tampered.len());
        tampered[byte] ^= 1 << bit;

        prop_assert!(matches!(
            etm_ctr::decrypt(MASTER_KEY, &tampered, salt.as_deref(), 1),
            Err(CryptoError::AuthenticationFailed)
        ));
        prop_assert!(!etm_ctr::authenticate(MASTER_KEY, &tampered, salt.as_deref(), 1));
    }

    #[test]
    fn prop_cbc_single_bit_flip_is_rejected(
        plaintext in prop::collection::vec(any::<u8>(), 0..500),
        salt in salt_strategy(),
        position in any::<prop::sample::Index>(),
        bit in 0u8..8,
    ) {
        let record = etm_cbc::encrypt(MASTER_KEY, &plaintext, salt.as_deref(), 1).unwrap();

        let mut tampered = record;
        let byte = position.index(tampered.len());
        tampered[byte] ^= 1 << bit;

        prop_assert!(matches!(
            etm_cbc::decrypt(MASTER_KEY, &tampered, salt.as_deref(), 1),
            Err(CryptoError::AuthenticationFailed)
        ));
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_keystream_continuity_across_splits(
        input in prop::collection::vec(any::<u8>(), 0..800),
        splits in prop::collection::vec(1usize..100, 0..10),
    ) {
        let key = [0x10u8; 32];
        let counter_block = [0x42u8; BLOCK_LEN];

        let mut one_shot = vec![0u8; input.len()];
        CtrKeystream::new(&key, &counter_block)
            .finalize(&input, &mut one_shot)
            .unwrap();

        // Consume the input in the proposed split sizes, then the rest.
        let mut cipher = CtrKeystream::new(&key, &counter_block);
        let mut piecewise = vec![0u8; input.len()];
        let mut offset = 0;
        for split in splits {
            let end = (offset + split).min(input.len());
            cipher.transform(&input[offset..end], &mut piecewise[offset..end]).unwrap();
            offset = end;
        }
        cipher.transform(&input[offset..], &mut piecewise[offset..]).unwrap();

        prop_assert_eq!(piecewise, one_shot);
    }

    #[test]
    fn prop_ctr_record_length_formula(len in 0usize..4000) {
        prop_assert_eq!(etm_ctr::ciphertext_len(len), len + etm_ctr::RECORD_OVERHEAD);
        prop_assert_eq!(etm_ctr::plaintext_len(etm_ctr::ciphertext_len(len)), Some(len));
    }

    #[test]
    fn prop_cbc_record_length_formula(len in 0usize..4000) {
        let expected_ciphertext = (len / BLOCK_LEN + 1) * BLOCK_LEN;
        prop_assert_eq!(
            etm_cbc::ciphertext_len(len),
            etm_cbc::CONTEXT_LEN + expected_ciphertext + etm_cbc::MAC_LEN
        );
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(10))]

    #[test]
    fn prop_stream_roundtrip(
        fills in prop::collection::vec(any::<u8>(), 0..=2),
        tail in prop::collection::vec(any::<u8>(), 0..200),
        salt in salt_strategy(),
    ) {
        let mut plaintext = Vec::new();
        for fill in &fills {
            plaintext.resize(plaintext.len() + PLAINTEXT_CHUNK_LEN, *fill);
        }
        plaintext.extend_from_slice(&tail);

        let mut enc = StreamEncryptor::new(MASTER_KEY, salt.as_deref());
        let mut wire = enc.push_chunk(&plaintext[..fills.len() * PLAINTEXT_CHUNK_LEN]).unwrap();
        wire.extend_from_slice(&enc.finish(&tail).unwrap());
        prop_assert_eq!(
            wire.len(),
            fills.len() * CIPHERTEXT_CHUNK_LEN + tail.len() + etm_ctr::RECORD_OVERHEAD
        );

        let mut dec = StreamDecryptor::new(MASTER_KEY, salt.as_deref());
        let full_len = fills.len() * CIPHERTEXT_CHUNK_LEN;
        let mut recovered = dec.push_chunk(&wire[..full_len]).unwrap();
        recovered.extend_from_slice(&dec.finish(&wire[full_len..]).unwrap());

        prop_assert_eq!(recovered, plaintext);
        prop_assert!(dec.is_complete());

        // The same wire bytes also pass an authenticate-only sweep.
        let mut verifier = StreamDecryptor::authenticate_only(MASTER_KEY, salt.as_deref());
        prop_assert!(verifier.push_chunk(&wire[..full_len]).unwrap().is_empty());
        prop_assert!(verifier.finish(&wire[full_len..]).unwrap().is_empty());
    }
}

/// Birthday-bound uniqueness sweep over fresh record contexts.
///
/// Any repeated context under one master key and salt would break
/// confidentiality, so no two of 10^5 successive records may share one.
#[test]
fn context_uniqueness_birthday_check() {
    let mut contexts = HashSet::with_capacity(100_000);
    for i in 0..100_000u32 {
        let record = etm_ctr::encrypt(MASTER_KEY, b"", None, 1).unwrap();
        assert!(
            contexts.insert(record[..etm_ctr::CONTEXT_LEN].to_vec()),
            "context repeated at iteration {i}"
        );
    }
}
