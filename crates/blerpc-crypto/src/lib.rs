//! bleRPC session cryptography.
//!
//! End-to-end encryption for assembled payloads: a one-round X25519
//! key agreement authenticated by the peripheral's Ed25519 identity key,
//! an HKDF-SHA256 schedule with independent directions, and an
//! AES-128-GCM session with strictly-increasing counters for replay
//! protection.
//!
//! # Session lifecycle
//!
//! ```text
//! four-message handshake
//!        │
//!        ▼
//! HKDF-SHA256 → per-direction key + nonce base
//!        │
//!        ▼
//! AES-128-GCM frames (counter_le ‖ ciphertext ‖ tag)
//!        │
//!        ▼
//! disconnect → key material zeroized
//! ```
//!
//! A session is live between handshake completion and channel
//! disconnect; it can never be rebuilt in place. Nonce exhaustion and
//! every handshake violation force a reconnect.
//!
//! # Security
//!
//! Authenticity:
//! - The peripheral signs both ephemerals, so the central knows who it
//!   derived keys with; TOFU pinning makes the second contact stronger
//!   than the first.
//! - Both confirmation frames prove key possession before any payload
//!   flows.
//!
//! Replay and reordering:
//! - Frame counters are strictly increasing per direction; an accepted
//!   frame can never be accepted again.
//!
//! Key hygiene:
//! - Callers provide randomness, keeping derivation deterministic under
//!   test.
//! - Direction keys and counters are zeroized on drop, on every exit
//!   path.

pub mod error;
pub mod handshake;
pub mod identity;
pub mod schedule;
pub mod session;

pub use error::{CryptoError, Result};
pub use handshake::{
    CentralHandshake, HandshakeProgress, MSG1_LEN, MSG2_LEN, PeripheralHandshake,
};
pub use identity::{FileIdentityStore, IdentityStore, MemoryIdentityStore};
pub use schedule::{DirectionKeys, KEY_SIZE, KeySchedule, NONCE_SIZE, derive_schedule};
pub use session::{COUNTER_PREFIX_SIZE, Role, SecureSession, TAG_SIZE};

pub use ed25519_dalek::SigningKey;
