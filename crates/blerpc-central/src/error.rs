//! Central-side error types.
//!
//! Every RPC surfaces exactly one typed error to the caller. Codec and
//! crypto errors convert in via `#[from]`; channel errors propagate
//! unchanged.

use blerpc_core::ChannelError;
use blerpc_crypto::CryptoError;
use blerpc_proto::ProtoError;
use thiserror::Error;

/// Result alias for central session operations.
pub type Result<T> = std::result::Result<T, CentralError>;

/// Errors surfaced by the central session.
#[derive(Error, Debug)]
pub enum CentralError {
    /// Wire codec failure; the RPC is aborted and the assembler reset
    #[error("codec error: {0}")]
    Codec(#[from] ProtoError),

    /// Transport failure, propagated from the channel unchanged
    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),

    /// Session crypto failure; fatal to the session
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// The reply parsed as a request instead of a response
    #[error("unexpected response type")]
    UnexpectedResponseType,

    /// The reply's command name does not match the call
    #[error("command name mismatch: called {expected:?}, reply names {actual:?}")]
    CommandNameMismatch {
        /// Name the call was issued under
        expected: String,
        /// Name carried by the reply
        actual: String,
    },

    /// Request exceeds the peripheral's advertised limit
    #[error("request payload too large: {size} bytes exceeds peer limit {max}")]
    PayloadTooLarge {
        /// Size of the built request payload
        size: usize,
        /// Peripheral's advertised request limit
        max: usize,
    },

    /// Peripheral reported the response exceeds its limit (code 0x01)
    #[error("peripheral response too large")]
    ResponseTooLarge,

    /// Peripheral is busy with another request (code 0x02)
    #[error("peripheral busy")]
    Busy,

    /// Peripheral error code the central does not recognize
    #[error("peripheral error code {0:#04x}")]
    Peripheral(u8),

    /// Policy requires encryption but the peripheral does not support it
    #[error("encryption required but peer does not support it")]
    EncryptionRequired,
}

impl CentralError {
    /// Translate a CONTROL/ERROR code into a typed error.
    pub fn from_peripheral_code(code: u8) -> Self {
        match code {
            blerpc_proto::ERROR_RESPONSE_TOO_LARGE => Self::ResponseTooLarge,
            blerpc_proto::ERROR_BUSY => Self::Busy,
            other => Self::Peripheral(other),
        }
    }

    /// Whether the error came from a read timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Channel(ChannelError::Timeout { .. }))
    }
}
