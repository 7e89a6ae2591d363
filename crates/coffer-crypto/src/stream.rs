//! Chunked streaming encryption with cryptographic chunk-order binding
//!
//! Streams too large for one buffer are processed as fixed-size
//! [`crate::etm_ctr`] records. Each chunk's sequence number is the KDF
//! counter for that record, and after the first chunk the salt is rebound
//! to `first_chunk_tweak || original_salt`. Every later chunk therefore
//! derives its keys from the first chunk's random context, which pins
//! chunks to their position in this specific stream: reordering chunks,
//! dropping chunks, or splicing a chunk from another stream all surface
//! as verification failures.
//!
//! # State machine
//!
//! Both codecs start open at chunk 1. `push_chunk` accepts exact
//! multiples of the fixed chunk size; `finish` accepts one final
//! undersized chunk and closes the codec. A failed chunk closes the codec
//! immediately and every later call returns
//! [`CryptoError::StreamClosed`]; no plaintext is ever emitted for a
//! stream that fails verification anywhere.

use zeroize::Zeroizing;

use crate::error::CryptoError;
use crate::etm_ctr;

/// Plaintext bytes per full stream chunk. A multiple of the cipher block
/// size, so no keystream is discarded between chunks.
pub const PLAINTEXT_CHUNK_LEN: usize = 65536;

/// Wire bytes per full stream chunk: one record per chunk.
pub const CIPHERTEXT_CHUNK_LEN: usize = PLAINTEXT_CHUNK_LEN + etm_ctr::RECORD_OVERHEAD;

const INITIAL_CHUNK_NUMBER: u32 = 1;

/// Prepend the first chunk's KDF tweak to the caller's salt.
///
/// `record_head` is the first chunk's wire record (context first).
fn bind_salt_to_stream(salt: Option<&[u8]>, record_head: &[u8]) -> Zeroizing<Vec<u8>> {
    let salt_len = salt.map_or(0, <[u8]>::len);
    let mut bound = Vec::with_capacity(etm_ctr::CONTEXT_TWEAK_LEN + salt_len);
    bound.extend_from_slice(&record_head[..etm_ctr::CONTEXT_TWEAK_LEN]);
    if let Some(salt) = salt {
        bound.extend_from_slice(salt);
    }
    Zeroizing::new(bound)
}

/// Streaming encryptor producing one record per fixed-size chunk.
pub struct StreamEncryptor {
    master_key: Zeroizing<Vec<u8>>,
    salt: Option<Zeroizing<Vec<u8>>>,
    chunk_number: u32,
    closed: bool,
}

impl StreamEncryptor {
    /// Create an encryptor for one stream.
    pub fn new(master_key: &[u8], salt: Option<&[u8]>) -> Self {
        Self {
            master_key: Zeroizing::new(master_key.to_vec()),
            salt: salt.map(|s| Zeroizing::new(s.to_vec())),
            chunk_number: INITIAL_CHUNK_NUMBER,
            closed: false,
        }
    }

    /// Sequence number the next chunk will be encrypted under.
    pub fn chunk_number(&self) -> u32 {
        self.chunk_number
    }

    fn current_salt(&self) -> Option<&[u8]> {
        self.salt.as_ref().map(|s| s.as_slice())
    }

    /// Encrypt one or more full chunks.
    ///
    /// `plaintext` must be an exact multiple of [`PLAINTEXT_CHUNK_LEN`];
    /// each chunk becomes one record in the returned buffer.
    pub fn push_chunk(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if self.closed {
            return Err(CryptoError::StreamClosed);
        }
        if plaintext.len() % PLAINTEXT_CHUNK_LEN != 0 {
            return Err(CryptoError::ChunkMisaligned {
                len: plaintext.len(),
                multiple_of: PLAINTEXT_CHUNK_LEN,
            });
        }

        let chunks = plaintext.len() / PLAINTEXT_CHUNK_LEN;
        let mut output = Vec::with_capacity(chunks * CIPHERTEXT_CHUNK_LEN);
        for chunk in plaintext.chunks_exact(PLAINTEXT_CHUNK_LEN) {
            let record = match etm_ctr::encrypt(
                &self.master_key,
                chunk,
                self.current_salt(),
                self.chunk_number,
            ) {
                Ok(record) => record,
                Err(err) => {
                    self.closed = true;
                    return Err(err);
                },
            };

            if self.chunk_number == INITIAL_CHUNK_NUMBER {
                self.salt = Some(bind_salt_to_stream(self.current_salt(), &record));
            }
            self.chunk_number = match self.chunk_number.checked_add(1) {
                Some(next) => next,
                None => {
                    self.closed = true;
                    return Err(CryptoError::CounterExhausted { counter: self.chunk_number });
                },
            };

            output.extend_from_slice(&record);
        }
        Ok(output)
    }

    /// Encrypt the final, possibly empty, undersized chunk and close the
    /// stream.
    ///
    /// An empty stream is valid: `finish(b"")` on a fresh encryptor yields
    /// a single context-and-tag record.
    pub fn finish(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if self.closed {
            return Err(CryptoError::StreamClosed);
        }
        if plaintext.len() >= PLAINTEXT_CHUNK_LEN {
            return Err(CryptoError::FinalChunkOversized {
                len: plaintext.len(),
                max: PLAINTEXT_CHUNK_LEN,
            });
        }

        let record = match etm_ctr::encrypt(
            &self.master_key,
            plaintext,
            self.current_salt(),
            self.chunk_number,
        ) {
            Ok(record) => record,
            Err(err) => {
                self.closed = true;
                return Err(err);
            },
        };
        self.closed = true;
        Ok(record)
    }
}

/// Streaming decryptor consuming one record per fixed-size chunk.
///
/// In authenticate-only mode every chunk is verified but no plaintext is
/// materialized, which validates a large stream's integrity cheaply.
pub struct StreamDecryptor {
    master_key: Zeroizing<Vec<u8>>,
    salt: Option<Zeroizing<Vec<u8>>>,
    chunk_number: u32,
    verify_only: bool,
    closed: bool,
    complete: bool,
}

impl StreamDecryptor {
    /// Create a decryptor for one stream.
    pub fn new(master_key: &[u8], salt: Option<&[u8]>) -> Self {
        Self {
            master_key: Zeroizing::new(master_key.to_vec()),
            salt: salt.map(|s| Zeroizing::new(s.to_vec())),
            chunk_number: INITIAL_CHUNK_NUMBER,
            verify_only: false,
            closed: false,
            complete: false,
        }
    }

    /// Create a verifier that authenticates every chunk without emitting
    /// plaintext.
    pub fn authenticate_only(master_key: &[u8], salt: Option<&[u8]>) -> Self {
        Self { verify_only: true, ..Self::new(master_key, salt) }
    }

    /// Sequence number the next chunk will be verified under.
    pub fn chunk_number(&self) -> u32 {
        self.chunk_number
    }

    /// True once the final chunk has been verified successfully.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    fn current_salt(&self) -> Option<&[u8]> {
        self.salt.as_ref().map(|s| s.as_slice())
    }

    /// Verify (and unless in authenticate-only mode, decrypt) one record,
    /// poisoning the codec on failure.
    fn open_chunk(&mut self, record: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if self.verify_only {
            if etm_ctr::authenticate(&self.master_key, record, self.current_salt(), self.chunk_number)
            {
                return Ok(Vec::new());
            }
        } else if let Ok(plaintext) =
            etm_ctr::decrypt(&self.master_key, record, self.current_salt(), self.chunk_number)
        {
            return Ok(plaintext);
        }
        self.closed = true;
        Err(CryptoError::DecryptionFailed { chunk: self.chunk_number })
    }

    /// Verify and decrypt one or more full chunks.
    ///
    /// `ciphertext` must be an exact multiple of [`CIPHERTEXT_CHUNK_LEN`].
    /// The first failing chunk closes the codec and reports its sequence
    /// number; no bytes from the failing chunk onward are emitted.
    pub fn push_chunk(&mut self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if self.closed {
            return Err(CryptoError::StreamClosed);
        }
        if ciphertext.len() % CIPHERTEXT_CHUNK_LEN != 0 {
            return Err(CryptoError::ChunkMisaligned {
                len: ciphertext.len(),
                multiple_of: CIPHERTEXT_CHUNK_LEN,
            });
        }

        let chunks = ciphertext.len() / CIPHERTEXT_CHUNK_LEN;
        let mut output = Vec::with_capacity(if self.verify_only {
            0
        } else {
            chunks * PLAINTEXT_CHUNK_LEN
        });
        for record in ciphertext.chunks_exact(CIPHERTEXT_CHUNK_LEN) {
            let plaintext = self.open_chunk(record)?;

            if self.chunk_number == INITIAL_CHUNK_NUMBER {
                self.salt = Some(bind_salt_to_stream(self.current_salt(), record));
            }
            self.chunk_number = match self.chunk_number.checked_add(1) {
                Some(next) => next,
                None => {
                    self.closed = true;
                    return Err(CryptoError::CounterExhausted { counter: self.chunk_number });
                },
            };

            output.extend_from_slice(&plaintext);
        }
        Ok(output)
    }

    /// Verify and decrypt the final undersized chunk and close the stream.
    ///
    /// The final chunk must be strictly smaller than
    /// [`CIPHERTEXT_CHUNK_LEN`] and at least one record overhead long.
    pub fn finish(&mut self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if self.closed {
            return Err(CryptoError::StreamClosed);
        }
        if ciphertext.len() >= CIPHERTEXT_CHUNK_LEN {
            return Err(CryptoError::FinalChunkOversized {
                len: ciphertext.len(),
                max: CIPHERTEXT_CHUNK_LEN,
            });
        }
        if ciphertext.len() < etm_ctr::RECORD_OVERHEAD {
            return Err(CryptoError::FinalChunkTruncated {
                len: ciphertext.len(),
                min: etm_ctr::RECORD_OVERHEAD,
            });
        }

        let plaintext = self.open_chunk(ciphertext)?;
        self.closed = true;
        self.complete = true;
        Ok(plaintext)
    }
}
