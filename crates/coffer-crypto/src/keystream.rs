//! Counter-mode keystream engine over the AES-256 block oracle
//!
//! Turns single-block ECB encryption into an arbitrary-length stream
//! cipher. Keystream left over from a partial block is retained between
//! calls, so a message split across any sequence of
//! [`transform`](CtrKeystream::transform) calls produces byte-identical
//! output to a single call over the whole message.
//!
//! # Security
//!
//! - Counter blocks are `nonce(8) || BE64(counter)`; the counter must never
//!   repeat under one key, which the record layer guarantees by deriving a
//!   fresh key and nonce per record
//! - Counter increment is unchecked 64-bit wraparound; record sizes are
//!   bounded far below 2^64 blocks by the caller
//! - Buffered keystream is zeroized on drop, and the AES key schedule is
//!   wiped by the cipher itself

use aes::Aes256Enc;
use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockEncrypt, KeyInit};
use zeroize::Zeroize;

use crate::error::CryptoError;
use crate::xor;

/// AES block size in bytes
pub const BLOCK_LEN: usize = 16;

/// Fixed (non-counting) prefix of each counter block, in bytes
pub const NONCE_LEN: usize = 8;

/// Streaming counter-mode cipher.
///
/// Encryption and decryption are the same operation (XOR against the
/// keystream), so one type serves both directions.
pub struct CtrKeystream {
    cipher: Aes256Enc,
    /// Upper half of every counter block, taken from the initial block
    nonce: [u8; NONCE_LEN],
    /// Next counter value; big-endian in the low half of the block
    counter: u64,
    /// One pre-generated keystream block for partial-block tails
    keystream: [u8; BLOCK_LEN],
    /// Unused keystream bytes left at the end of `keystream`
    remaining: usize,
}

impl CtrKeystream {
    /// Create a keystream seeded by a 16-byte initial counter block.
    ///
    /// The upper 8 bytes of `counter_block` are the fixed nonce; the lower
    /// 8 bytes are parsed as the big-endian starting counter value.
    pub fn new(key: &[u8; 32], counter_block: &[u8; BLOCK_LEN]) -> Self {
        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&counter_block[..NONCE_LEN]);
        let mut counter = [0u8; 8];
        counter.copy_from_slice(&counter_block[NONCE_LEN..]);

        Self {
            cipher: Aes256Enc::new(key.into()),
            nonce,
            counter: u64::from_be_bytes(counter),
            keystream: [0u8; BLOCK_LEN],
            remaining: 0,
        }
    }

    /// XOR keystream against `input`, writing `input.len()` bytes into the
    /// head of `output`.
    ///
    /// Repeated calls continue the keystream exactly where the previous
    /// call stopped, including mid-block.
    pub fn transform(&mut self, input: &[u8], output: &mut [u8]) -> Result<(), CryptoError> {
        if output.len() < input.len() {
            return Err(CryptoError::BufferTooSmall {
                needed: input.len(),
                actual: output.len(),
            });
        }
        if input.is_empty() {
            return Ok(());
        }
        let output = &mut output[..input.len()];

        // Drain keystream buffered from a previous partial block first.
        let drained = self.remaining.min(input.len());
        if drained > 0 {
            let start = BLOCK_LEN - self.remaining;
            for i in 0..drained {
                output[i] = input[i] ^ self.keystream[start + i];
            }
            self.remaining -= drained;
        }
        let input = &input[drained..];
        let output = &mut output[drained..];
        if input.is_empty() {
            return Ok(());
        }

        let full = input.len() & !(BLOCK_LEN - 1);
        let partial = input.len() - full;

        // Full blocks: write counter values into the output, encrypt them in
        // place to turn them into keystream, then XOR the input over them.
        if full > 0 {
            for counter_block in output[..full].chunks_exact_mut(BLOCK_LEN) {
                counter_block[..NONCE_LEN].copy_from_slice(&self.nonce);
                counter_block[NONCE_LEN..].copy_from_slice(&self.counter.to_be_bytes());
                self.counter = self.counter.wrapping_add(1);
                self.cipher.encrypt_block(GenericArray::from_mut_slice(counter_block));
            }
            xor::xor_in_place(&mut output[..full], &input[..full]);
        }

        // Partial tail: generate one more block to the side, use its prefix,
        // keep the suffix for the next call.
        if partial > 0 {
            self.keystream[..NONCE_LEN].copy_from_slice(&self.nonce);
            self.keystream[NONCE_LEN..].copy_from_slice(&self.counter.to_be_bytes());
            self.counter = self.counter.wrapping_add(1);
            self.cipher.encrypt_block(GenericArray::from_mut_slice(&mut self.keystream));

            for i in 0..partial {
                output[full + i] = input[full + i] ^ self.keystream[i];
            }
            self.remaining = BLOCK_LEN - partial;
        }

        Ok(())
    }

    /// Transform one final span of bytes, then consume the engine.
    ///
    /// Buffered keystream is zeroized and the block cipher released.
    pub fn finalize(mut self, input: &[u8], output: &mut [u8]) -> Result<(), CryptoError> {
        self.transform(input, output)
    }
}

impl Drop for CtrKeystream {
    fn drop(&mut self) {
        self.keystream.zeroize();
    }
}
