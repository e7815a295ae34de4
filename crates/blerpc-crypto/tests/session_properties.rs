//! Property-based tests for the secure session.
//!
//! Verifies the peer round-trip and replay invariants over arbitrary
//! plaintexts and message sequences, with sessions built from a real
//! handshake.

use blerpc_crypto::{
    CentralHandshake, CryptoError, HandshakeProgress, MemoryIdentityStore, PeripheralHandshake,
    SecureSession, SigningKey,
};
use proptest::prelude::*;
use rand::rngs::OsRng;

fn handshake_pair() -> (SecureSession, SecureSession) {
    let mut rng = OsRng;
    let mut store = MemoryIdentityStore::default();
    let identity = SigningKey::generate(&mut rng);

    let (mut central, msg1) = CentralHandshake::initiate(&mut rng);
    let mut peripheral = PeripheralHandshake::new(identity);

    let HandshakeProgress::Send(msg2) = peripheral.on_message(&msg1, &mut rng).expect("msg1")
    else {
        unreachable!("peripheral replies to message 1");
    };
    let HandshakeProgress::Send(msg3) = central.on_message(&msg2, &mut store, "p").expect("msg2")
    else {
        unreachable!("central replies to message 2");
    };
    let HandshakeProgress::Complete { session: p, reply: Some(msg4) } =
        peripheral.on_message(&msg3, &mut rng).expect("msg3")
    else {
        unreachable!("peripheral completes on message 3");
    };
    let HandshakeProgress::Complete { session: c, reply: None } =
        central.on_message(&msg4, &mut store, "p").expect("msg4")
    else {
        unreachable!("central completes on message 4");
    };

    (*c, *p)
}

#[test]
fn prop_peer_round_trip() {
    proptest!(ProptestConfig::with_cases(64), |(
        messages in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..2048), 1..16),
    )| {
        let (mut central, mut peripheral) = handshake_pair();

        for message in &messages {
            // PROPERTY: decrypt(peer, encrypt(local, m)) == m, both ways
            let frame = central.encrypt(message).expect("encrypt");
            prop_assert_eq!(&peripheral.decrypt(&frame).expect("decrypt"), message);

            let frame = peripheral.encrypt(message).expect("encrypt");
            prop_assert_eq!(&central.decrypt(&frame).expect("decrypt"), message);
        }
    });
}

#[test]
fn prop_replay_always_rejected() {
    proptest!(ProptestConfig::with_cases(32), |(
        messages in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..512), 2..10),
        replay_index in any::<prop::sample::Index>(),
    )| {
        let (mut central, mut peripheral) = handshake_pair();

        let frames: Vec<_> = messages
            .iter()
            .map(|m| central.encrypt(m).expect("encrypt"))
            .collect();
        for frame in &frames {
            peripheral.decrypt(frame).expect("decrypt");
        }

        // PROPERTY: any previously accepted frame is rejected on replay
        let replayed = replay_index.get(&frames);
        prop_assert!(
            matches!(peripheral.decrypt(replayed), Err(CryptoError::ReplayDetected { .. })),
            "expected replay rejection"
        );

        // PROPERTY: the rejection leaves the session usable
        let frame = central.encrypt(b"still alive").expect("encrypt");
        prop_assert_eq!(peripheral.decrypt(&frame).expect("decrypt"), b"still alive".to_vec());
    });
}

#[test]
fn prop_ciphertext_never_equals_plaintext_frame() {
    proptest!(ProptestConfig::with_cases(32), |(
        message in prop::collection::vec(any::<u8>(), 16..512),
    )| {
        let (mut central, _) = handshake_pair();
        let frame = central.encrypt(&message).expect("encrypt");

        // PROPERTY: the ciphertext body differs from the plaintext
        prop_assert_ne!(&frame[4..4 + message.len()], &message[..]);
        // PROPERTY: frame = counter ‖ ciphertext ‖ tag
        prop_assert_eq!(frame.len(), 4 + message.len() + 16);
    });
}

#[test]
fn prop_corrupted_frames_never_decrypt() {
    proptest!(ProptestConfig::with_cases(64), |(
        message in prop::collection::vec(any::<u8>(), 0..256),
        flip_byte in any::<prop::sample::Index>(),
        flip_bit in 0u8..8,
    )| {
        let (mut central, mut peripheral) = handshake_pair();

        let mut frame = central.encrypt(&message).expect("encrypt");
        let index = flip_byte.index(frame.len());
        frame[index] ^= 1 << flip_bit;

        // PROPERTY: flipping any bit fails authentication (flipping a
        // counter bit changes the nonce, so it also fails)
        prop_assert!(
            matches!(
                peripheral.decrypt(&frame),
                Err(CryptoError::DecryptionFailed | CryptoError::ReplayDetected { .. })
            ),
            "expected decryption failure"
        );
    });
}
