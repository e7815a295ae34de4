//! Crypto error types.
//!
//! Every variant here is fatal to the session: the peers discard key
//! material and the link must reconnect and re-handshake.

use thiserror::Error;

/// Result alias for crypto operations.
pub type Result<T> = std::result::Result<T, CryptoError>;

/// Errors produced by the secure session and the key-exchange handshake.
#[derive(Error, Debug)]
pub enum CryptoError {
    /// Handshake message arrived out of order or with a bad shape
    #[error("key exchange protocol violation: {reason}")]
    KeyExchangeProtocolViolation {
        /// What the state machine rejected
        reason: &'static str,
    },

    /// Peripheral identity key does not match the pinned key
    #[error("peripheral identity key does not match the pinned key")]
    IdentityMismatch,

    /// Authentication tag or frame structure check failed
    #[error("decryption failed")]
    DecryptionFailed,

    /// Frame counter at or below the receive high-water mark
    #[error("replay detected: counter {counter} already seen")]
    ReplayDetected {
        /// Counter carried by the rejected frame
        counter: u32,
    },

    /// Transmit counter space exhausted; the session must be rebuilt
    #[error("nonce space exhausted, reconnect required")]
    NonceExhausted,

    /// Identity store I/O failure
    #[error("identity store: {0}")]
    Store(String),
}
