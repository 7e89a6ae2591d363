//! Fuzz target for one-shot record encoding and decoding
//!
//! Feeds arbitrary bytes and mutated genuine records through both cipher
//! modes' decrypt and authenticate paths.
//!
//! # Strategy
//!
//! - Arbitrary master keys (empty, short, normal, oversized)
//! - Arbitrary record bytes, including lengths around the fixed overhead
//! - Genuine records with a single flipped bit at an arbitrary position
//! - Arbitrary salts and counters on both sides
//!
//! # Invariants
//!
//! - Decrypt and authenticate never panic on any input
//! - Authenticate agrees with decrypt on every record
//! - A genuine record round-trips exactly
//! - Any single-bit mutation of a genuine record is rejected

#![no_main]

use arbitrary::Arbitrary;
use coffer_crypto::{etm_cbc, etm_ctr};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct RecordScenario {
    master_key: Vec<u8>,
    salt: Option<Vec<u8>>,
    counter: u32,
    /// Raw bytes treated as a hostile wire record
    hostile_record: Vec<u8>,
    /// Plaintext for the genuine-record half of the run
    plaintext: Vec<u8>,
    /// Bit flip applied to the genuine records: (byte selector, bit)
    flip: Option<(u32, u8)>,
}

fuzz_target!(|scenario: RecordScenario| {
    let salt = scenario.salt.as_deref();
    let key = &scenario.master_key;

    // INVARIANT 1+2: hostile bytes never panic, and the two verification
    // paths agree.
    let ctr_plain = etm_ctr::decrypt(key, &scenario.hostile_record, salt, scenario.counter);
    let ctr_auth = etm_ctr::authenticate(key, &scenario.hostile_record, salt, scenario.counter);
    assert_eq!(ctr_plain.is_ok(), ctr_auth, "CTR decrypt and authenticate disagree");

    let cbc_plain = etm_cbc::decrypt(key, &scenario.hostile_record, salt, scenario.counter);
    let cbc_auth = etm_cbc::authenticate(key, &scenario.hostile_record, salt, scenario.counter);
    assert_eq!(cbc_plain.is_ok(), cbc_auth, "CBC decrypt and authenticate disagree");

    // INVARIANT 3: genuine records round-trip.
    let plaintext = &scenario.plaintext[..scenario.plaintext.len().min(1024)];
    let ctr_record = etm_ctr::encrypt(key, plaintext, salt, scenario.counter).unwrap();
    assert_eq!(ctr_record.len(), etm_ctr::ciphertext_len(plaintext.len()));
    assert_eq!(
        etm_ctr::decrypt(key, &ctr_record, salt, scenario.counter).unwrap(),
        plaintext
    );

    let cbc_record = etm_cbc::encrypt(key, plaintext, salt, scenario.counter).unwrap();
    assert_eq!(cbc_record.len(), etm_cbc::ciphertext_len(plaintext.len()));
    assert_eq!(
        etm_cbc::decrypt(key, &cbc_record, salt, scenario.counter).unwrap(),
        plaintext
    );

    // INVARIANT 4: one flipped bit anywhere in a genuine record fails.
    if let Some((position, bit)) = scenario.flip {
        let mut tampered = ctr_record;
        let byte = position as usize % tampered.len();
        tampered[byte] ^= 1 << (bit % 8);
        assert!(
            etm_ctr::decrypt(key, &tampered, salt, scenario.counter).is_err(),
            "CTR accepted a record with byte {byte} flipped"
        );
        assert!(!etm_ctr::authenticate(key, &tampered, salt, scenario.counter));

        let mut tampered = cbc_record;
        let byte = position as usize % tampered.len();
        tampered[byte] ^= 1 << (bit % 8);
        assert!(
            etm_cbc::decrypt(key, &tampered, salt, scenario.counter).is_err(),
            "CBC accepted a record with byte {byte} flipped"
        );
    }
});
