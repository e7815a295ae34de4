//! Session key schedule derived with HKDF-SHA256.
//!
//! One X25519 shared secret expands into two independent directions, each
//! with a 128-bit AES key and a 96-bit nonce base. The handshake
//! transcript (both ephemeral public keys) salts the extraction so the
//! schedule is bound to this exchange.

use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::Zeroize;

/// Label used for session key derivation (domain separation).
const SESSION_LABEL: &[u8] = b"blerpc session v1";

/// AES-128-GCM key size.
pub const KEY_SIZE: usize = 16;

/// AES-GCM nonce size.
pub const NONCE_SIZE: usize = 12;

/// Key material for one direction of the session.
#[derive(Clone)]
pub struct DirectionKeys {
    /// 128-bit AEAD key
    pub key: [u8; KEY_SIZE],
    /// 96-bit nonce base; the low 32 bits are XORed with the frame counter
    pub nonce_base: [u8; NONCE_SIZE],
}

impl Drop for DirectionKeys {
    fn drop(&mut self) {
        self.key.zeroize();
        self.nonce_base.zeroize();
    }
}

/// The full directional schedule for one session.
///
/// `central_to_peripheral` is the central's transmit direction and the
/// peripheral's receive direction; `peripheral_to_central` is the mirror.
pub struct KeySchedule {
    /// Keys protecting central-to-peripheral frames
    pub central_to_peripheral: DirectionKeys,
    /// Keys protecting peripheral-to-central frames
    pub peripheral_to_central: DirectionKeys,
}

/// Derive the session schedule from the X25519 shared secret.
///
/// The transcript is `central_epk ‖ peripheral_epk`, the same byte string
/// the peripheral's identity signature covers.
pub fn derive_schedule(shared_secret: &[u8; 32], transcript: &[u8; 64]) -> KeySchedule {
    let hkdf = Hkdf::<Sha256>::new(Some(transcript), shared_secret);

    // c2p key ‖ p2c key ‖ c2p nonce base ‖ p2c nonce base
    let mut okm = [0u8; 2 * KEY_SIZE + 2 * NONCE_SIZE];
    let Ok(()) = hkdf.expand(SESSION_LABEL, &mut okm) else {
        unreachable!("56 bytes is a valid HKDF-SHA256 output length");
    };

    let mut c2p = DirectionKeys { key: [0; KEY_SIZE], nonce_base: [0; NONCE_SIZE] };
    let mut p2c = DirectionKeys { key: [0; KEY_SIZE], nonce_base: [0; NONCE_SIZE] };

    c2p.key.copy_from_slice(&okm[0..16]);
    p2c.key.copy_from_slice(&okm[16..32]);
    c2p.nonce_base.copy_from_slice(&okm[32..44]);
    p2c.nonce_base.copy_from_slice(&okm[44..56]);

    okm.zeroize();

    KeySchedule { central_to_peripheral: c2p, peripheral_to_central: p2c }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivation_is_deterministic() {
        let secret = [0x42u8; 32];
        let transcript = [0x17u8; 64];

        let a = derive_schedule(&secret, &transcript);
        let b = derive_schedule(&secret, &transcript);

        assert_eq!(a.central_to_peripheral.key, b.central_to_peripheral.key);
        assert_eq!(a.peripheral_to_central.nonce_base, b.peripheral_to_central.nonce_base);
    }

    #[test]
    fn directions_are_independent() {
        let schedule = derive_schedule(&[0x42u8; 32], &[0x17u8; 64]);

        assert_ne!(schedule.central_to_peripheral.key, schedule.peripheral_to_central.key);
        assert_ne!(
            schedule.central_to_peripheral.nonce_base,
            schedule.peripheral_to_central.nonce_base
        );
    }

    #[test]
    fn transcript_binds_the_schedule() {
        let secret = [0x42u8; 32];

        let a = derive_schedule(&secret, &[0x17u8; 64]);
        let b = derive_schedule(&secret, &[0x18u8; 64]);

        assert_ne!(a.central_to_peripheral.key, b.central_to_peripheral.key);
    }

    #[test]
    fn different_secrets_produce_different_keys() {
        let transcript = [0x17u8; 64];

        let a = derive_schedule(&[0x01u8; 32], &transcript);
        let b = derive_schedule(&[0x02u8; 32], &transcript);

        assert_ne!(a.central_to_peripheral.key, b.central_to_peripheral.key);
    }
}
