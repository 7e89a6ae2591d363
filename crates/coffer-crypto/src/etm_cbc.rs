//! Encrypt-then-MAC records over AES-256-CBC with PKCS#7 padding
//!
//! Same composition as [`crate::etm_ctr`] with a block-chained ciphertext:
//! the 32-byte context splits into a 16-byte KDF tweak and a 16-byte IV,
//! the KDF consumes the full context, and the ciphertext is always padded
//! (a whole extra block when the plaintext is block-aligned). The tag
//! covers `iv || ciphertext` and is verified before any block is
//! decrypted, so padding is only ever examined on authentic records and
//! no padding oracle exists.
//!
//! Chaining is built directly on the AES block oracle rather than a mode
//! wrapper, mirroring how the CTR side drives the same oracle.

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use aes::{Aes256Dec, Aes256Enc};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha384;
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, Zeroizing};

use crate::error::CryptoError;
use crate::kdf;
use crate::keystream::BLOCK_LEN;
use crate::xor;

type HmacSha384 = Hmac<Sha384>;

/// Record tag length in bytes (truncated HMAC-SHA-384)
pub const MAC_LEN: usize = 16;

/// CBC initialization vector length in bytes
pub const IV_LEN: usize = BLOCK_LEN;

/// KDF tweak length in bytes (context head)
pub const CONTEXT_TWEAK_LEN: usize = 16;

/// Full context length in bytes: tweak plus IV
pub const CONTEXT_LEN: usize = CONTEXT_TWEAK_LEN + IV_LEN;

const MAC_KEY_LEN: usize = 16;
const ENC_KEY_LEN: usize = 32;
const SESSION_KEY_LEN: usize = MAC_KEY_LEN + ENC_KEY_LEN;

/// Record length produced for a plaintext of `plaintext_len` bytes.
///
/// Padding is always present, so a block-aligned plaintext grows by a
/// full block.
pub fn ciphertext_len(plaintext_len: usize) -> usize {
    let padding = BLOCK_LEN - plaintext_len % BLOCK_LEN;
    CONTEXT_LEN + plaintext_len + padding + MAC_LEN
}

/// Largest plaintext a record of `record_len` bytes can decrypt to, or
/// `None` if no well-formed record has that length.
///
/// The exact plaintext length is only known after decryption strips the
/// padding; this bound sizes caller buffers.
pub fn max_plaintext_len(record_len: usize) -> Option<usize> {
    let cipher_len = record_len.checked_sub(CONTEXT_LEN + MAC_LEN)?;
    if cipher_len < BLOCK_LEN || cipher_len % BLOCK_LEN != 0 {
        return None;
    }
    Some(cipher_len - 1)
}

fn derive_session_key(
    master_key: &[u8],
    salt: Option<&[u8]>,
    context: &[u8],
    counter: u32,
) -> Result<Zeroizing<[u8; SESSION_KEY_LEN]>, CryptoError> {
    let mut session_key = Zeroizing::new([0u8; SESSION_KEY_LEN]);
    kdf::derive_key(master_key, salt, context, counter, &mut session_key[..])?;
    Ok(session_key)
}

fn keyed_mac(mac_key: &[u8]) -> HmacSha384 {
    let Ok(mac) = <HmacSha384 as Mac>::new_from_slice(mac_key) else {
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

/// CBC-encrypt `plaintext` with PKCS#7 padding into `output`.
///
/// `output` must be exactly the padded length.
fn cbc_encrypt(key: &[u8; ENC_KEY_LEN], iv: &[u8; IV_LEN], plaintext: &[u8], output: &mut [u8]) {
    let cipher = Aes256Enc::new(key.into());
    let mut prev = *iv;

    let full = plaintext.len() & !(BLOCK_LEN - 1);
    let mut offset = 0;
    for block in plaintext[..full].chunks_exact(BLOCK_LEN) {
        let out_block = &mut output[offset..offset + BLOCK_LEN];
        out_block.copy_from_slice(block);
        xor::xor_in_place(out_block, &prev);
        cipher.encrypt_block(GenericArray::from_mut_slice(out_block));
        prev.copy_from_slice(out_block);
        offset += BLOCK_LEN;
    }

    // Final block carries the tail plus padding; a full padding block when
    // the plaintext is block-aligned.
    let tail = &plaintext[full..];
    let padding = (BLOCK_LEN - tail.len()) as u8;
    let mut last = [0u8; BLOCK_LEN];
    last[..tail.len()].copy_from_slice(tail);
    last[tail.len()..].fill(padding);
    xor::xor_in_place(&mut last, &prev);
    cipher.encrypt_block(GenericArray::from_mut_slice(&mut last));
    output[offset..offset + BLOCK_LEN].copy_from_slice(&last);
}

/// Encrypt one record under a fresh random context.
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

/// Encrypt one record under a caller-supplied context; crate-internal for
/// deterministic tests.
pub(crate) fn encrypt_with_context(
    master_key: &[u8],
    plaintext: &[u8],
    salt: Option<&[u8]>,
    counter: u32,
    context: &[u8; CONTEXT_LEN],
) -> Result<Vec<u8>, CryptoError> {
    let mut record = vec![0u8; ciphertext_len(plaintext.len())];

    let session_key = derive_session_key(master_key, salt, context, counter)?;

    record[..CONTEXT_LEN].copy_from_slice(context);

    let Ok(iv) = <&[u8; IV_LEN]>::try_from(&context[CONTEXT_TWEAK_LEN..]) else {
        unreachable!("context tail is IV_LEN bytes");
    };

    let ciphertext_end = record.len() - MAC_LEN;
    cbc_encrypt(
        enc_key(&session_key),
        iv,
        plaintext,
        &mut record[CONTEXT_LEN..ciphertext_end],
    );

    let mut mac = keyed_mac(&session_key[..MAC_KEY_LEN]);
    mac.update(&record[CONTEXT_TWEAK_LEN..ciphertext_end]);
    let tag = mac.finalize().into_bytes();
    record[ciphertext_end..].copy_from_slice(&tag[..MAC_LEN]);

    Ok(record)
}

/// Verify and decrypt one record.
///
/// The tag is checked in constant time before any block is decrypted; a
/// record whose length, tag, or padding is wrong yields the same
/// detail-free [`CryptoError::AuthenticationFailed`].
pub fn decrypt(
    master_key: &[u8],
    record: &[u8],
    salt: Option<&[u8]>,
    counter: u32,
) -> Result<Vec<u8>, CryptoError> {
    let Some(cipher_len) = record.len().checked_sub(CONTEXT_LEN + MAC_LEN) else {
        return Err(CryptoError::AuthenticationFailed);
    };
    if cipher_len < BLOCK_LEN || cipher_len % BLOCK_LEN != 0 {
        return Err(CryptoError::AuthenticationFailed);
    }

    let session_key = derive_session_key(master_key, salt, &record[..CONTEXT_LEN], counter)?;

    let ciphertext_end = CONTEXT_LEN + cipher_len;
    let mut mac = keyed_mac(&session_key[..MAC_KEY_LEN]);
    mac.update(&record[CONTEXT_TWEAK_LEN..ciphertext_end]);
    let expected = mac.finalize().into_bytes();

    if expected[..MAC_LEN].ct_eq(&record[ciphertext_end..]).unwrap_u8() != 1 {
        return Err(CryptoError::AuthenticationFailed);
    }

    let cipher = Aes256Dec::new(enc_key(&session_key).into());
    let ciphertext = &record[CONTEXT_LEN..ciphertext_end];
    let mut prev = [0u8; BLOCK_LEN];
    prev.copy_from_slice(&record[CONTEXT_TWEAK_LEN..CONTEXT_LEN]);

    let mut plaintext = vec![0u8; cipher_len];
    for (out_block, in_block) in
        plaintext.chunks_exact_mut(BLOCK_LEN).zip(ciphertext.chunks_exact(BLOCK_LEN))
    {
        out_block.copy_from_slice(in_block);
        cipher.decrypt_block(GenericArray::from_mut_slice(out_block));
        xor::xor_in_place(out_block, &prev);
        prev.copy_from_slice(in_block);
    }

    // Padding is examined only after the tag has verified, so this check
    // can never act as a decryption oracle. An honest encryptor always
    // produces valid padding; anything else fails closed.
    let padding = plaintext[cipher_len - 1] as usize;
    if padding == 0
        || padding > BLOCK_LEN
        || plaintext[cipher_len - padding..].iter().any(|&b| b as usize != padding)
    {
        plaintext.zeroize();
        return Err(CryptoError::AuthenticationFailed);
    }
    plaintext.truncate(cipher_len - padding);

    Ok(plaintext)
}

/// Verify a record's tag without decrypting it.
pub fn authenticate(master_key: &[u8], record: &[u8], salt: Option<&[u8]>, counter: u32) -> bool {
    let Some(cipher_len) = record.len().checked_sub(CONTEXT_LEN + MAC_LEN) else {
        return false;
    };
    if cipher_len < BLOCK_LEN || cipher_len % BLOCK_LEN != 0 {
        return false;
    }

    let Ok(session_key) = derive_session_key(master_key, salt, &record[..CONTEXT_LEN], counter)
    else {
        return false;
    };

    let ciphertext_end = CONTEXT_LEN + cipher_len;
    let mut mac = keyed_mac(&session_key[..MAC_KEY_LEN]);
    mac.update(&record[CONTEXT_TWEAK_LEN..ciphertext_end]);
    let expected = mac.finalize().into_bytes();

    expected[..MAC_LEN].ct_eq(&record[ciphertext_end..]).unwrap_u8() == 1
}
