//! Encrypt-then-MAC records over AES-256-CTR
//!
//! Wire layout of one record:
//!
//! ```text
//! ┌─────────────────┬──────────────┬─────────────────┬──────────────┐
//! │ tweak (32)      │ nonce (8)    │ ciphertext (N)  │ tag (16)     │
//! └─────────────────┴──────────────┴─────────────────┴──────────────┘
//!  └────── context ──────────────┘
//! ```
//!
//! The tweak feeds the KDF that derives the per-record session key
//! (16-byte MAC key || 32-byte encryption key), the nonce seeds the CTR
//! keystream, and the tag is HMAC-SHA-384 over `nonce || ciphertext`
//! truncated to 16 bytes. The tweak is excluded from the MAC input but is
//! still authenticated transitively: flipping tweak bits changes the
//! derived MAC key, which surfaces as a verification failure.
//!
//! # Security
//!
//! - Fresh 40-byte random context per record means key and nonce reuse
//!   never occurs across records under one master key
//! - Decrypt verifies the tag in constant time before touching the
//!   ciphertext; a bad tag releases no plaintext and no detail
//! - Session key material is zeroized on every exit path

use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha384;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::error::CryptoError;
use crate::kdf;
use crate::keystream::{BLOCK_LEN, CtrKeystream, NONCE_LEN};

type HmacSha384 = Hmac<Sha384>;

/// Record tag length in bytes (truncated HMAC-SHA-384)
pub const MAC_LEN: usize = 16;

/// KDF tweak length in bytes (context head)
pub const CONTEXT_TWEAK_LEN: usize = 32;

/// Full context length in bytes: tweak plus CTR nonce
pub const CONTEXT_LEN: usize = CONTEXT_TWEAK_LEN + NONCE_LEN;

/// Fixed per-record overhead: context plus tag
pub const RECORD_OVERHEAD: usize = CONTEXT_LEN + MAC_LEN;

const MAC_KEY_LEN: usize = 16;
const ENC_KEY_LEN: usize = 32;
const SESSION_KEY_LEN: usize = MAC_KEY_LEN + ENC_KEY_LEN;

/// Record length produced for a plaintext of `plaintext_len` bytes.
pub fn ciphertext_len(plaintext_len: usize) -> usize {
    RECORD_OVERHEAD + plaintext_len
}

/// Plaintext length recovered from a record of `record_len` bytes, or
/// `None` if the record is shorter than the fixed overhead.
pub fn plaintext_len(record_len: usize) -> Option<usize> {
    record_len.checked_sub(RECORD_OVERHEAD)
}

/// Derive the per-record session key from the context tweak.
fn derive_session_key(
    master_key: &[u8],
    salt: Option<&[u8]>,
    tweak: &[u8],
    counter: u32,
) -> Result<Zeroizing<[u8; SESSION_KEY_LEN]>, CryptoError> {
    let mut session_key = Zeroizing::new([0u8; SESSION_KEY_LEN]);
    kdf::derive_key(master_key, salt, tweak, counter, &mut session_key[..])?;
    Ok(session_key)
}

fn keyed_mac(mac_key: &[u8]) -> HmacSha384 {
    let Ok(mac) = HmacSha384::new_from_slice(mac_key) else {
        unreachable!("HMAC-SHA384 accepts any key size");
    };
    mac
}

fn enc_key(session_key: &[u8; SESSION_KEY_LEN]) -> &[u8; ENC_KEY_LEN] {
    let Ok(key) = <&[u8; ENC_KEY_LEN]>::try_from(&session_key[MAC_KEY_LEN..]) else {
        unreachable!("session key tail is ENC_KEY_LEN bytes");
    };
    key
}

/// Encrypt one record under a fresh random context.
///
/// `salt` binds the record to a caller-chosen scope; `counter` numbers the
/// record within that scope (pass 1 for one-shot use). Fails only on a
/// counter that cannot advance, never on the plaintext itself.
pub fn encrypt(
    master_key: &[u8],
    plaintext: &[u8],
    salt: Option<&[u8]>,
    counter: u32,
) -> Result<Vec<u8>, CryptoError> {
    let mut context = [0u8; CONTEXT_LEN];
    rand::thread_rng().fill_bytes(&mut context);
    encrypt_with_context(master_key, plaintext, salt, counter, &context)
}

/// Encrypt one record under a caller-supplied context.
///
/// Context reuse under one (master key, salt, counter) triple destroys
/// confidentiality, so this stays crate-internal for deterministic tests.
pub(crate) fn encrypt_with_context(
    master_key: &[u8],
    plaintext: &[u8],
    salt: Option<&[u8]>,
    counter: u32,
    context: &[u8; CONTEXT_LEN],
) -> Result<Vec<u8>, CryptoError> {
    let mut record = vec![0u8; ciphertext_len(plaintext.len())];

    let session_key =
        derive_session_key(master_key, salt, &context[..CONTEXT_TWEAK_LEN], counter)?;

    record[..CONTEXT_LEN].copy_from_slice(context);

    let mut counter_block = [0u8; BLOCK_LEN];
    counter_block[..NONCE_LEN].copy_from_slice(&context[CONTEXT_TWEAK_LEN..]);

    let ciphertext_end = CONTEXT_LEN + plaintext.len();
    CtrKeystream::new(enc_key(&session_key), &counter_block)
        .finalize(plaintext, &mut record[CONTEXT_LEN..ciphertext_end])?;

    let mut mac = keyed_mac(&session_key[..MAC_KEY_LEN]);
    mac.update(&record[CONTEXT_TWEAK_LEN..ciphertext_end]);
    let tag = mac.finalize().into_bytes();
    record[ciphertext_end..].copy_from_slice(&tag[..MAC_LEN]);

    Ok(record)
}

/// Verify and decrypt one record.
///
/// The tag is recomputed and compared in constant time before any
/// decryption happens; any mismatch, including a truncated record, is a
/// single detail-free [`CryptoError::AuthenticationFailed`].
pub fn decrypt(
    master_key: &[u8],
    record: &[u8],
    salt: Option<&[u8]>,
    counter: u32,
) -> Result<Vec<u8>, CryptoError> {
    let Some(cipher_len) = plaintext_len(record.len()) else {
        return Err(CryptoError::AuthenticationFailed);
    };

    let session_key =
        derive_session_key(master_key, salt, &record[..CONTEXT_TWEAK_LEN], counter)?;

    let ciphertext_end = CONTEXT_LEN + cipher_len;
    let mut mac = keyed_mac(&session_key[..MAC_KEY_LEN]);
    mac.update(&record[CONTEXT_TWEAK_LEN..ciphertext_end]);
    let expected = mac.finalize().into_bytes();

    if expected[..MAC_LEN].ct_eq(&record[ciphertext_end..]).unwrap_u8() != 1 {
        return Err(CryptoError::AuthenticationFailed);
    }

    let mut counter_block = [0u8; BLOCK_LEN];
    counter_block[..NONCE_LEN].copy_from_slice(&record[CONTEXT_TWEAK_LEN..CONTEXT_LEN]);

    let mut plaintext = vec![0u8; cipher_len];
    CtrKeystream::new(enc_key(&session_key), &counter_block)
        .finalize(&record[CONTEXT_LEN..ciphertext_end], &mut plaintext)?;

    Ok(plaintext)
}

/// Verify a record's tag without decrypting it.
pub fn authenticate(master_key: &[u8], record: &[u8], salt: Option<&[u8]>, counter: u32) -> bool {
    let Some(cipher_len) = plaintext_len(record.len()) else {
        return false;
    };

    let Ok(session_key) =
        derive_session_key(master_key, salt, &record[..CONTEXT_TWEAK_LEN], counter)
    else {
        return false;
    };

    let ciphertext_end = CONTEXT_LEN + cipher_len;
    let mut mac = keyed_mac(&session_key[..MAC_KEY_LEN]);
    mac.update(&record[CONTEXT_TWEAK_LEN..ciphertext_end]);
    let expected = mac.finalize().into_bytes();

    expected[..MAC_LEN].ct_eq(&record[ciphertext_end..]).unwrap_u8() == 1
}
