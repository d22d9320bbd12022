//! Error types for protocol operations.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur while encoding or decoding engine state.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Encoding a value to CBOR failed.
    #[error("encode error: {0}")]
    Encode(String),

    /// Decoding a CBOR blob failed.
    #[error("decode error: {0}")]
    Decode(String),

    /// The blob was written by an unknown state format version.
    #[error("unsupported state format version: found {found}, expected {expected}")]
    UnsupportedVersion {
        /// Version stored in the blob.
        found: u16,
        /// Version this build understands.
        expected: u16,
    },
}
