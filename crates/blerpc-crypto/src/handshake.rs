//! Four-message key-exchange handshake.
//!
//! One-round X25519 ephemeral-ephemeral agreement, authenticated by the
//! peripheral's Ed25519 identity key and confirmed in both directions
//! under the derived session keys:
//!
//! ```text
//!   central                                    peripheral
//!     │ ── 1: central ephemeral pk (32 B) ──────> │
//!     │ <── 2: ephemeral pk ‖ identity pk ‖ sig ── │   (128 B)
//!     │ ── 3: "client finished" under tx key ────> │   (≥16 B)
//!     │ <── 4: "server finished" under tx key ──── │   (≥16 B)
//! ```
//!
//! The signature in message 2 covers `central_epk ‖ peripheral_epk`, the
//! same transcript that salts the key schedule. Messages received out of
//! order poison the handshake: every later input fails
//! `KeyExchangeProtocolViolation` and the key material is discarded.
//!
//! The central pins the peripheral's identity key on first contact (TOFU)
//! and refuses any later handshake presenting a different key.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand_core::{CryptoRng, RngCore};
use tracing::debug;
use x25519_dalek::{EphemeralSecret, PublicKey};

use crate::{
    error::{CryptoError, Result},
    identity::IdentityStore,
    schedule::derive_schedule,
    session::{Role, SecureSession},
};

/// Size of handshake message 1 (central ephemeral public key).
pub const MSG1_LEN: usize = 32;

/// Size of handshake message 2 (ephemeral pk ‖ identity pk ‖ signature).
pub const MSG2_LEN: usize = 128;

/// Plaintext of the central's confirmation frame.
const CLIENT_FINISHED: &[u8] = b"client finished";

/// Plaintext of the peripheral's confirmation frame.
const SERVER_FINISHED: &[u8] = b"server finished";

fn violation(reason: &'static str) -> CryptoError {
    CryptoError::KeyExchangeProtocolViolation { reason }
}

/// Progress reported by a handshake step.
pub enum HandshakeProgress {
    /// Send this key-exchange payload and keep driving the handshake.
    Send(Vec<u8>),
    /// Handshake complete; the session is live. A final payload to send
    /// accompanies completion on the peripheral side.
    Complete {
        /// The live session
        session: Box<SecureSession>,
        /// Confirmation payload still owed to the peer, if any
        reply: Option<Vec<u8>>,
    },
}

enum CentralState {
    Sent1 { secret: EphemeralSecret, our_epk: PublicKey },
    Sent3 { session: Box<SecureSession> },
    Poisoned,
}

/// Central-side handshake: `Sent1 → Sent3 → Live`.
pub struct CentralHandshake {
    state: CentralState,
}

impl CentralHandshake {
    /// Start a handshake, returning the state machine and message 1.
    pub fn initiate<R: RngCore + CryptoRng>(rng: &mut R) -> (Self, Vec<u8>) {
        let secret = EphemeralSecret::random_from_rng(rng);
        let our_epk = PublicKey::from(&secret);
        let msg1 = our_epk.as_bytes().to_vec();

        (Self { state: CentralState::Sent1 { secret, our_epk } }, msg1)
    }

    /// Drive the handshake with one received key-exchange payload.
    ///
    /// `peer` names the peripheral for identity pinning (a stable device
    /// identifier from the channel layer).
    ///
    /// # Errors
    ///
    /// - `KeyExchangeProtocolViolation` on out-of-order or malformed
    ///   messages; the handshake is poisoned afterwards
    /// - `IdentityMismatch` if the presented identity key differs from
    ///   the pinned one
    /// - `DecryptionFailed` if the peer's confirmation does not verify
    pub fn on_message(
        &mut self,
        payload: &[u8],
        store: &mut dyn IdentityStore,
        peer: &str,
    ) -> Result<HandshakeProgress> {
        match std::mem::replace(&mut self.state, CentralState::Poisoned) {
            CentralState::Sent1 { secret, our_epk } => {
                let (msg3, session) = Self::accept_responder(secret, &our_epk, payload, store, peer)?;
                self.state = CentralState::Sent3 { session };
                Ok(HandshakeProgress::Send(msg3))
            },

            CentralState::Sent3 { mut session } => {
                let confirmation = session.decrypt(payload)?;
                if confirmation != SERVER_FINISHED {
                    return Err(violation("bad server confirmation"));
                }
                debug!(peer, "key exchange complete");
                Ok(HandshakeProgress::Complete { session, reply: None })
            },

            CentralState::Poisoned => Err(violation("handshake already failed or completed")),
        }
    }

    fn accept_responder(
        secret: EphemeralSecret,
        our_epk: &PublicKey,
        msg2: &[u8],
        store: &mut dyn IdentityStore,
        peer: &str,
    ) -> Result<(Vec<u8>, Box<SecureSession>)> {
        if msg2.len() != MSG2_LEN {
            return Err(violation("responder message must be 128 bytes"));
        }

        let mut peer_epk = [0u8; 32];
        peer_epk.copy_from_slice(&msg2[0..32]);
        let mut identity = [0u8; 32];
        identity.copy_from_slice(&msg2[32..64]);
        let mut sig = [0u8; 64];
        sig.copy_from_slice(&msg2[64..128]);

        let verifying = VerifyingKey::from_bytes(&identity)
            .map_err(|_| violation("invalid identity key"))?;

        let mut transcript = [0u8; 64];
        transcript[..32].copy_from_slice(our_epk.as_bytes());
        transcript[32..].copy_from_slice(&peer_epk);

        verifying
            .verify(&transcript, &Signature::from_bytes(&sig))
            .map_err(|_| violation("bad identity signature"))?;

        // Trust on first use: pin now or verify against the earlier pin.
        match store.pinned(peer)? {
            Some(pinned) if pinned != identity => return Err(CryptoError::IdentityMismatch),
            Some(_) => {},
            None => {
                debug!(peer, "pinning peripheral identity key");
                store.pin(peer, &identity)?;
            },
        }

        let shared = secret.diffie_hellman(&PublicKey::from(peer_epk));
        let schedule = derive_schedule(shared.as_bytes(), &transcript);
        let mut session = Box::new(SecureSession::new(schedule, Role::Central));

        let msg3 = session.encrypt(CLIENT_FINISHED)?;
        Ok((msg3, session))
    }
}

enum PeripheralState {
    Uninit { identity: SigningKey },
    Sent2 { session: Box<SecureSession> },
    Poisoned,
}

/// Peripheral-side handshake: `Uninit → Sent2 → Live`.
///
/// The peripheral session constructs one of these per KEY_EXCHANGE
/// conversation and refuses to start another while a session is live.
pub struct PeripheralHandshake {
    state: PeripheralState,
}

impl PeripheralHandshake {
    /// Create a handshake acceptor using the peripheral's identity key.
    pub fn new(identity: SigningKey) -> Self {
        Self { state: PeripheralState::Uninit { identity } }
    }

    /// Drive the handshake with one received key-exchange payload.
    ///
    /// # Errors
    ///
    /// `KeyExchangeProtocolViolation` on out-of-order or malformed input;
    /// `DecryptionFailed` if the initiator's confirmation does not
    /// verify. Either way the handshake is poisoned and a fresh exchange
    /// must restart from message 1.
    pub fn on_message<R: RngCore + CryptoRng>(
        &mut self,
        payload: &[u8],
        rng: &mut R,
    ) -> Result<HandshakeProgress> {
        match std::mem::replace(&mut self.state, PeripheralState::Poisoned) {
            PeripheralState::Uninit { identity } => {
                let (msg2, session) = Self::accept_initiator(&identity, payload, rng)?;
                self.state = PeripheralState::Sent2 { session };
                Ok(HandshakeProgress::Send(msg2))
            },

            PeripheralState::Sent2 { mut session } => {
                let confirmation = session.decrypt(payload)?;
                if confirmation != CLIENT_FINISHED {
                    return Err(violation("bad client confirmation"));
                }

                let msg4 = session.encrypt(SERVER_FINISHED)?;
                debug!("key exchange complete");
                Ok(HandshakeProgress::Complete { session, reply: Some(msg4) })
            },

            PeripheralState::Poisoned => Err(violation("handshake already failed or completed")),
        }
    }

    fn accept_initiator<R: RngCore + CryptoRng>(
        identity: &SigningKey,
        msg1: &[u8],
        rng: &mut R,
    ) -> Result<(Vec<u8>, Box<SecureSession>)> {
        if msg1.len() != MSG1_LEN {
            return Err(violation("initiator message must be 32 bytes"));
        }
        let mut central_epk = [0u8; 32];
        central_epk.copy_from_slice(msg1);

        let secret = EphemeralSecret::random_from_rng(rng);
        let our_epk = PublicKey::from(&secret);

        let mut transcript = [0u8; 64];
        transcript[..32].copy_from_slice(&central_epk);
        transcript[32..].copy_from_slice(our_epk.as_bytes());

        let signature = identity.sign(&transcript);

        let mut msg2 = Vec::with_capacity(MSG2_LEN);
        msg2.extend_from_slice(our_epk.as_bytes());
        msg2.extend_from_slice(identity.verifying_key().as_bytes());
        msg2.extend_from_slice(&signature.to_bytes());
        debug_assert_eq!(msg2.len(), MSG2_LEN);

        let shared = secret.diffie_hellman(&PublicKey::from(central_epk));
        let schedule = derive_schedule(shared.as_bytes(), &transcript);
        let session = Box::new(SecureSession::new(schedule, Role::Peripheral));

        Ok((msg2, session))
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::OsRng;

    use super::*;
    use crate::identity::MemoryIdentityStore;

    fn run_handshake(
        store: &mut dyn IdentityStore,
        identity: &SigningKey,
    ) -> Result<(SecureSession, SecureSession)> {
        let mut rng = OsRng;
        let (mut central, msg1) = CentralHandshake::initiate(&mut rng);
        let mut peripheral = PeripheralHandshake::new(identity.clone());

        let HandshakeProgress::Send(msg2) = peripheral.on_message(&msg1, &mut rng)? else {
            panic!("peripheral must reply to message 1");
        };
        let HandshakeProgress::Send(msg3) = central.on_message(&msg2, store, "peer")? else {
            panic!("central must reply to message 2");
        };
        let HandshakeProgress::Complete { session: p_session, reply: Some(msg4) } =
            peripheral.on_message(&msg3, &mut rng)?
        else {
            panic!("peripheral must complete on message 3");
        };
        let HandshakeProgress::Complete { session: c_session, reply: None } =
            central.on_message(&msg4, store, "peer")?
        else {
            panic!("central must complete on message 4");
        };

        Ok((*c_session, *p_session))
    }

    #[test]
    fn full_handshake_yields_interoperable_sessions() {
        let mut store = MemoryIdentityStore::default();
        let identity = SigningKey::generate(&mut OsRng);

        let (mut central, mut peripheral) = run_handshake(&mut store, &identity).unwrap();

        let frame = central.encrypt(b"post-handshake").unwrap();
        assert_eq!(peripheral.decrypt(&frame).unwrap(), b"post-handshake");

        let reply = peripheral.encrypt(b"ack").unwrap();
        assert_eq!(central.decrypt(&reply).unwrap(), b"ack");
    }

    #[test]
    fn handshake_pins_identity_on_first_use() {
        let mut store = MemoryIdentityStore::default();
        let identity = SigningKey::generate(&mut OsRng);

        assert!(store.pinned("peer").unwrap().is_none());
        run_handshake(&mut store, &identity).unwrap();
        assert_eq!(
            store.pinned("peer").unwrap(),
            Some(identity.verifying_key().to_bytes())
        );
    }

    #[test]
    fn repeat_handshake_with_same_identity_succeeds() {
        let mut store = MemoryIdentityStore::default();
        let identity = SigningKey::generate(&mut OsRng);

        run_handshake(&mut store, &identity).unwrap();
        run_handshake(&mut store, &identity).unwrap();
    }

    #[test]
    fn identity_change_is_rejected() {
        let mut store = MemoryIdentityStore::default();

        run_handshake(&mut store, &SigningKey::generate(&mut OsRng)).unwrap();

        let impostor = SigningKey::generate(&mut OsRng);
        assert!(matches!(
            run_handshake(&mut store, &impostor),
            Err(CryptoError::IdentityMismatch)
        ));
    }

    #[test]
    fn tampered_signature_is_rejected() {
        let mut rng = OsRng;
        let mut store = MemoryIdentityStore::default();

        let (mut central, msg1) = CentralHandshake::initiate(&mut rng);
        let mut peripheral = PeripheralHandshake::new(SigningKey::generate(&mut rng));

        let HandshakeProgress::Send(mut msg2) = peripheral.on_message(&msg1, &mut rng).unwrap()
        else {
            panic!("peripheral must reply");
        };
        msg2[64] ^= 0xFF;

        assert!(matches!(
            central.on_message(&msg2, &mut store, "peer"),
            Err(CryptoError::KeyExchangeProtocolViolation { reason: "bad identity signature" })
        ));
    }

    #[test]
    fn wrong_length_messages_are_rejected() {
        let mut rng = OsRng;
        let mut store = MemoryIdentityStore::default();

        let mut peripheral = PeripheralHandshake::new(SigningKey::generate(&mut rng));
        assert!(peripheral.on_message(&[0u8; 31], &mut rng).is_err());

        let (mut central, _) = CentralHandshake::initiate(&mut rng);
        assert!(central.on_message(&[0u8; 127], &mut store, "peer").is_err());
    }

    #[test]
    fn out_of_order_poisons_the_handshake() {
        let mut rng = OsRng;
        let mut store = MemoryIdentityStore::default();

        let (mut central, msg1) = CentralHandshake::initiate(&mut rng);
        let mut peripheral = PeripheralHandshake::new(SigningKey::generate(&mut rng));

        // Feed the central's own message 1 back to it as if it were
        // message 2: violation, then everything after fails too.
        assert!(central.on_message(&msg1, &mut store, "peer").is_err());

        let HandshakeProgress::Send(msg2) = peripheral.on_message(&msg1, &mut rng).unwrap() else {
            panic!("peripheral must reply");
        };
        assert!(matches!(
            central.on_message(&msg2, &mut store, "peer"),
            Err(CryptoError::KeyExchangeProtocolViolation {
                reason: "handshake already failed or completed"
            })
        ));
    }

    #[test]
    fn garbage_confirmation_is_rejected() {
        let mut rng = OsRng;
        let mut store = MemoryIdentityStore::default();

        let (mut central, msg1) = CentralHandshake::initiate(&mut rng);
        let mut peripheral = PeripheralHandshake::new(SigningKey::generate(&mut rng));

        let HandshakeProgress::Send(msg2) = peripheral.on_message(&msg1, &mut rng).unwrap() else {
            panic!("peripheral must reply");
        };
        let HandshakeProgress::Send(_msg3) = central.on_message(&msg2, &mut store, "peer").unwrap()
        else {
            panic!("central must reply");
        };

        // Hand the peripheral garbage instead of the confirmation frame
        assert!(matches!(
            peripheral.on_message(&[0u8; 35], &mut rng),
            Err(CryptoError::DecryptionFailed)
        ));
    }
}
