//! Coffer Authenticated Encryption
//!
//! Encrypt-then-MAC authenticated encryption built from a block cipher, a
//! keyed hash, and a counter-mode KDF. Every record is encrypted under a
//! one-time session key derived from the master key and a fresh random
//! context, so the master key itself never touches a cipher.
//!
//! # Record Pipeline
//!
//! ```text
//! Master Key + random Context
//!        │
//!        ▼
//! SP 800-108 KDF → Session Key (per record: MAC key ‖ encryption key)
//!        │
//!        ▼
//! AES-256-CTR (or CBC) → Ciphertext
//!        │
//!        ▼
//! HMAC-SHA-384 over nonce ‖ ciphertext → truncated Tag
//! ```
//!
//! The wire record is `Context ‖ Ciphertext ‖ Tag`. Streams larger than
//! one buffer run the same pipeline once per fixed-size chunk, with the
//! first chunk's context folded into every later chunk's derivation so
//! chunk order and stream identity are tamper-evident.
//!
//! # Security
//!
//! Confidentiality:
//! - Fresh random context per record -> derived keys and nonces never
//!   repeat under one master key
//! - CTR counters are unique per (key, nonce) within a record
//!
//! Integrity:
//! - Tags are verified in constant time before any decryption
//! - Failed verification releases nothing and reports no detail
//! - Chunk binding: splicing, reordering, or truncating stream chunks
//!   fails verification
//!
//! Key hygiene:
//! - Session keys, keystream buffers, and stream state are zeroized on
//!   every exit path, success or failure

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod error;
pub mod etm_cbc;
pub mod etm_ctr;
pub mod kdf;
pub mod keystream;
pub mod stream;
mod xor;

pub use error::CryptoError;
pub use keystream::CtrKeystream;
pub use stream::{StreamDecryptor, StreamEncryptor};
