//! Authenticated-encryption session with replay protection.
//!
//! A live session protects assembled payloads with AES-128-GCM. Each
//! direction has its own key, nonce base, and 32-bit frame counter; the
//! counter travels in clear as a 4-byte little-endian prefix and doubles
//! as the low 32 bits of the nonce:
//!
//! ```text
//!   counter_le_u32 ‖ ciphertext ‖ tag_16
//! ```
//!
//! The receive side enforces a strictly increasing counter, so replaying
//! any accepted frame fails without touching the cipher. Key material is
//! zeroized when the session drops, which the owning session guarantees on
//! every disconnect path.

use aes_gcm::{
    Aes128Gcm, Key, Nonce,
    aead::{Aead, KeyInit, Payload},
};
use zeroize::Zeroize;

use crate::{
    error::{CryptoError, Result},
    schedule::{DirectionKeys, KeySchedule, NONCE_SIZE},
};

/// GCM authentication tag size.
pub const TAG_SIZE: usize = 16;

/// Clear counter prefix size on encrypted frames.
pub const COUNTER_PREFIX_SIZE: usize = 4;

/// Role of the local peer, selecting which schedule direction transmits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Initiating peer; transmits on the central-to-peripheral direction
    Central,
    /// Accepting peer; transmits on the peripheral-to-central direction
    Peripheral,
}

/// One live encrypted session between a central and a peripheral.
///
/// Encrypt and decrypt take `&mut self`; the owning session serializes
/// both directions behind a single lock, which is fine since neither is a
/// hot path.
pub struct SecureSession {
    tx: DirectionKeys,
    rx: DirectionKeys,
    tx_counter: u32,
    rx_high_water: u32,
    rx_started: bool,
}

impl SecureSession {
    /// Build a session from a derived schedule and the local role.
    pub fn new(schedule: KeySchedule, role: Role) -> Self {
        let KeySchedule { central_to_peripheral, peripheral_to_central } = schedule;
        let (tx, rx) = match role {
            Role::Central => (central_to_peripheral, peripheral_to_central),
            Role::Peripheral => (peripheral_to_central, central_to_peripheral),
        };

        Self { tx, rx, tx_counter: 0, rx_high_water: 0, rx_started: false }
    }

    /// Counter the next transmitted frame will carry.
    pub fn tx_counter(&self) -> u32 {
        self.tx_counter
    }

    /// Force the transmit counter, for exhaustion tests.
    #[cfg(test)]
    pub(crate) fn set_tx_counter(&mut self, counter: u32) {
        self.tx_counter = counter;
    }

    /// Encrypt one payload, producing a counter-prefixed frame.
    ///
    /// # Errors
    ///
    /// `CryptoError::NonceExhausted` once the counter space is used up;
    /// the session refuses further encryption and the link must
    /// reconnect.
    pub fn encrypt(&mut self, plaintext: &[u8]) -> Result<Vec<u8>> {
        if self.tx_counter == u32::MAX {
            return Err(CryptoError::NonceExhausted);
        }
        let counter = self.tx_counter;

        let cipher = Aes128Gcm::new(Key::<Aes128Gcm>::from_slice(&self.tx.key));
        let nonce = direction_nonce(&self.tx.nonce_base, counter);
        let Ok(ciphertext) =
            cipher.encrypt(Nonce::from_slice(&nonce), Payload { msg: plaintext, aad: &[] })
        else {
            unreachable!("AES-GCM encryption cannot fail with valid inputs");
        };

        self.tx_counter += 1;

        let mut frame = Vec::with_capacity(COUNTER_PREFIX_SIZE + ciphertext.len());
        frame.extend_from_slice(&counter.to_le_bytes());
        frame.extend_from_slice(&ciphertext);
        Ok(frame)
    }

    /// Decrypt one counter-prefixed frame.
    ///
    /// # Errors
    ///
    /// - `CryptoError::DecryptionFailed` on a short frame or a bad tag
    /// - `CryptoError::ReplayDetected` when the counter is at or below
    ///   the high-water mark; the session state is left unchanged
    pub fn decrypt(&mut self, frame: &[u8]) -> Result<Vec<u8>> {
        if frame.len() < COUNTER_PREFIX_SIZE + TAG_SIZE {
            return Err(CryptoError::DecryptionFailed);
        }

        let counter = u32::from_le_bytes([frame[0], frame[1], frame[2], frame[3]]);
        if self.rx_started && counter <= self.rx_high_water {
            return Err(CryptoError::ReplayDetected { counter });
        }

        let cipher = Aes128Gcm::new(Key::<Aes128Gcm>::from_slice(&self.rx.key));
        let nonce = direction_nonce(&self.rx.nonce_base, counter);
        let plaintext = cipher
            .decrypt(
                Nonce::from_slice(&nonce),
                Payload { msg: &frame[COUNTER_PREFIX_SIZE..], aad: &[] },
            )
            .map_err(|_| CryptoError::DecryptionFailed)?;

        self.rx_high_water = counter;
        self.rx_started = true;
        Ok(plaintext)
    }
}

impl Drop for SecureSession {
    fn drop(&mut self) {
        self.tx_counter.zeroize();
        self.rx_high_water.zeroize();
        // DirectionKeys zeroize their own material on drop
    }
}

/// Build the 96-bit nonce for one frame: the direction base with its low
/// 32 bits XORed against the little-endian counter.
fn direction_nonce(base: &[u8; NONCE_SIZE], counter: u32) -> [u8; NONCE_SIZE] {
    let mut nonce = *base;
    for (b, c) in nonce[NONCE_SIZE - 4..].iter_mut().zip(counter.to_le_bytes()) {
        *b ^= c;
    }
    nonce
}
