//! Codec error types.
//!
//! Every error here is terminal for the payload being processed: the caller
//! aborts the in-flight RPC and the assembler resets. None of these errors
//! cross the wire; the peripheral logs them and continues.

use thiserror::Error;

/// Result alias for codec operations.
pub type Result<T> = std::result::Result<T, ProtoError>;

/// Errors produced by the container, command, splitter, and assembler codecs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtoError {
    /// Frame bytes do not form a valid container or command packet
    #[error("malformed frame: {reason}")]
    MalformedFrame {
        /// What the parser rejected
        reason: &'static str,
    },

    /// Output buffer cannot hold the serialized frame
    #[error("buffer too small: need {needed} bytes, have {available}")]
    BufferTooSmall {
        /// Bytes required by the frame
        needed: usize,
        /// Bytes available in the output buffer
        available: usize,
    },

    /// Command name length outside the 1..=16 range
    #[error("invalid command name: length {len} outside 1..=16")]
    InvalidCommandName {
        /// Offending name length
        len: usize,
    },

    /// Subsequent container arrived with the wrong sequence number
    #[error("sequence gap: expected {expected}, got {actual}")]
    SequenceGap {
        /// Sequence number the assembler was waiting for
        expected: u8,
        /// Sequence number actually received
        actual: u8,
    },

    /// FIRST container arrived while a payload was already in flight
    #[error("unexpected FIRST container while assembling")]
    UnexpectedFirst,

    /// SUBSEQUENT container arrived with no payload in flight
    #[error("unexpected SUBSEQUENT container while idle")]
    UnexpectedSubsequent,

    /// Subsequent container carried a different transaction id
    #[error("transaction id mismatch: expected {expected}, got {actual}")]
    TidMismatch {
        /// Transaction id of the in-flight payload
        expected: u8,
        /// Transaction id actually received
        actual: u8,
    },

    /// Payload exceeds the declared total length or the configured cap
    #[error("payload overflow: {size} bytes exceeds limit {max}")]
    Overflow {
        /// Observed or declared payload size
        size: usize,
        /// Limit that was exceeded
        max: usize,
    },
}
