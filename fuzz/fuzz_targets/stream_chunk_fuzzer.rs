//! Fuzz target for the chunked streaming codec state machine
//!
//! Drives random encrypt streams through decryption, optionally with a
//! single bit flipped somewhere on the wire.
//!
//! # Strategy
//!
//! - 0 to 2 full chunks plus an arbitrary undersized tail
//! - Arbitrary salts, including none
//! - Optional single-bit tamper at an arbitrary wire position
//! - Both plain decryption and authenticate-only verification
//!
//! # Invariants
//!
//! - Untampered streams round-trip and report completion
//! - A tampered stream fails at or before the tampered chunk and emits no
//!   plaintext for the failing chunk
//! - A failed codec is poisoned: every later call errors without output
//! - Chunk numbers advance by exactly one per chunk

#![no_main]

use arbitrary::Arbitrary;
use coffer_crypto::stream::{CIPHERTEXT_CHUNK_LEN, PLAINTEXT_CHUNK_LEN};
use coffer_crypto::{CryptoError, StreamDecryptor, StreamEncryptor};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct StreamScenario {
    master_key: [u8; 32],
    salt: Option<Vec<u8>>,
    /// One full chunk per byte, filled with that byte; capped at 2
    chunk_fills: Vec<u8>,
    /// Final undersized chunk, truncated below the chunk size
    tail: Vec<u8>,
    /// Single-bit tamper: (wire byte selector, bit)
    tamper: Option<(u32, u8)>,
}

fuzz_target!(|scenario: StreamScenario| {
    let salt = scenario.salt.as_deref();
    let fills = &scenario.chunk_fills[..scenario.chunk_fills.len().min(2)];
    let tail = &scenario.tail[..scenario.tail.len().min(PLAINTEXT_CHUNK_LEN - 1)];

    let mut enc = StreamEncryptor::new(&scenario.master_key, salt);
    // Mutable so the tamper branch can flip a bit in place.
    let mut records: Vec<Vec<u8>> = Vec::with_capacity(fills.len() + 1);
    for (i, fill) in fills.iter().enumerate() {
        assert_eq!(enc.chunk_number(), (i + 1) as u32);
        let record = enc.push_chunk(&vec![*fill; PLAINTEXT_CHUNK_LEN]).unwrap();
        assert_eq!(record.len(), CIPHERTEXT_CHUNK_LEN);
        records.push(record);
    }
    records.push(enc.finish(tail).unwrap());

    // Encryptor is closed after finish.
    assert!(matches!(enc.finish(b""), Err(CryptoError::StreamClosed)));

    match scenario.tamper {
        None => {
            // INVARIANT: untampered streams round-trip.
            let mut dec = StreamDecryptor::new(&scenario.master_key, salt);
            let mut recovered = Vec::new();
            for record in &records[..fills.len()] {
                recovered.extend_from_slice(&dec.push_chunk(record).unwrap());
            }
            recovered.extend_from_slice(&dec.finish(&records[fills.len()]).unwrap());
            assert!(dec.is_complete());

            let mut expected = Vec::new();
            for fill in fills {
                expected.resize(expected.len() + PLAINTEXT_CHUNK_LEN, *fill);
            }
            expected.extend_from_slice(tail);
            assert_eq!(recovered, expected);

            // INVARIANT: authenticate-only accepts the same wire bytes and
            // emits nothing.
            let mut verifier = StreamDecryptor::authenticate_only(&scenario.master_key, salt);
            for record in &records[..fills.len()] {
                assert!(verifier.push_chunk(record).unwrap().is_empty());
            }
            assert!(verifier.finish(&records[fills.len()]).unwrap().is_empty());
            assert!(verifier.is_complete());
        },
        Some((position, bit)) => {
            let wire_len: usize = records.iter().map(Vec::len).sum();
            let mut offset = position as usize % wire_len;
            let mut tampered_chunk = 0;
            for i in 0..records.len() {
                if offset < records[i].len() {
                    records[i][offset] ^= 1 << (bit % 8);
                    tampered_chunk = i;
                    break;
                }
                offset -= records[i].len();
            }

            // INVARIANT: failure lands at or before the tampered chunk
            // (tampering chunk 1 re-binds later salts, so decryption can
            // never proceed past it) and nothing after the failure runs.
            let mut dec = StreamDecryptor::new(&scenario.master_key, salt);
            let mut failed_at = None;
            for (i, record) in records[..fills.len()].iter().enumerate() {
                match dec.push_chunk(record) {
                    Ok(plaintext) => assert_eq!(plaintext.len(), PLAINTEXT_CHUNK_LEN),
                    Err(err) => {
                        assert!(matches!(err, CryptoError::DecryptionFailed { .. }));
                        failed_at = Some(i);
                        break;
                    },
                }
            }
            if failed_at.is_none() {
                match dec.finish(&records[fills.len()]) {
                    Ok(_) => panic!("tampered stream was accepted"),
                    Err(err) => assert!(matches!(err, CryptoError::DecryptionFailed { .. })),
                }
            }
            if let Some(i) = failed_at {
                assert!(i <= tampered_chunk, "failed after the tampered chunk");
            }
            assert!(!dec.is_complete());

            // INVARIANT: the codec is poisoned after the failure.
            assert!(matches!(
                dec.push_chunk(&records[0][..0]),
                Err(CryptoError::StreamClosed)
            ));
        },
    }
});
