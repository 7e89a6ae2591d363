//! Error types for authenticated-encryption operations

use thiserror::Error;

/// Errors from encryption, decryption, and streaming operations
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Output buffer is too small for the transformed bytes
    #[error("output buffer too small: need {needed} bytes, have {actual}")]
    BufferTooSmall {
        /// Bytes the operation needs to write
        needed: usize,
        /// Bytes the caller provided
        actual: usize,
    },

    /// Streamed input is not an exact multiple of the fixed chunk size
    #[error("chunk input of {len} bytes is not a multiple of {multiple_of}")]
    ChunkMisaligned {
        /// Length of the offending input
        len: usize,
        /// Required chunk size
        multiple_of: usize,
    },

    /// Final chunk must be strictly smaller than the fixed chunk size
    #[error("final chunk of {len} bytes must be smaller than {max}")]
    FinalChunkOversized {
        /// Length of the offending input
        len: usize,
        /// Fixed chunk size the final chunk must stay below
        max: usize,
    },

    /// Final ciphertext chunk is smaller than the record overhead
    #[error("final chunk of {len} bytes is below the {min}-byte record minimum")]
    FinalChunkTruncated {
        /// Length of the offending input
        len: usize,
        /// Smallest valid record length
        min: usize,
    },

    /// MAC verification failed.
    ///
    /// Carries no detail: a truncated record, a flipped ciphertext bit, and
    /// a forged tag are indistinguishable to the caller.
    #[error("authentication failed")]
    AuthenticationFailed,

    /// Streaming decryption failed at a specific chunk
    #[error("decryption failed for chunk {chunk}")]
    DecryptionFailed {
        /// Sequence number of the chunk that failed verification
        chunk: u32,
    },

    /// A KDF iteration counter or stream chunk counter would wrap around
    #[error("counter exhausted at {counter}")]
    CounterExhausted {
        /// Counter value at which the overflow was detected
        counter: u32,
    },

    /// Operation attempted on a stream codec that already finished or failed
    #[error("stream is closed")]
    StreamClosed,
}

impl CryptoError {
    /// Returns true if this error is fatal (unrecoverable)
    ///
    /// Fatal errors mean the record or stream can never be processed; the
    /// argument errors are recoverable once the caller fixes its input.
    pub fn is_fatal(&self) -> bool {
        match self {
            // The record is either forged or destroyed; retrying is meaningless
            Self::AuthenticationFailed => true,
            Self::DecryptionFailed { .. } => true,
            Self::CounterExhausted { .. } => true,
            Self::StreamClosed => true,

            // Caller errors, detected before any cryptographic work
            Self::BufferTooSmall { .. } => false,
            Self::ChunkMisaligned { .. } => false,
            Self::FinalChunkOversized { .. } => false,
            Self::FinalChunkTruncated { .. } => false,
        }
    }
}
