//! Session-layer replay rejection at the peripheral.
//!
//! A scripted central completes a real key exchange against a live
//! peripheral session, gets one encrypted request answered, then
//! re-injects the identical wire frames. Crypto failures are fatal: the
//! peripheral must wipe its session state and drop the link instead of
//! answering twice.

use std::{sync::Arc, time::Duration};

use blerpc_core::{
    Channel, HandlerOutcome, HandlerRegistry, MemoryChannel, PeripheralConfig, memory_pair,
};
use blerpc_crypto::{
    CentralHandshake, HandshakeProgress, MemoryIdentityStore, SecureSession, SigningKey,
};
use blerpc_peripheral::PeripheralSession;
use blerpc_proto::{
    Assembler, CommandKind, Container, ContainerBody, ControlCmd, FeedOutcome, command_to_vec,
    key_exchange, parse_command, split,
};
use rand::rngs::OsRng;

const READ: Duration = Duration::from_millis(500);

async fn read_key_exchange(driver: &MemoryChannel) -> Vec<u8> {
    loop {
        let frame = driver.read_notification(READ).await.unwrap();
        let container = Container::parse(&frame).unwrap();
        if let ContainerBody::Control { cmd: ControlCmd::KeyExchange, payload } = container.body {
            return payload.to_vec();
        }
    }
}

/// Run the central side of the handshake by hand over raw frames.
async fn handshake_as_central(driver: &MemoryChannel) -> SecureSession {
    let mut rng = OsRng;
    let mut store = MemoryIdentityStore::default();

    let (mut handshake, msg1) = CentralHandshake::initiate(&mut rng);
    driver.write(&key_exchange(0, &msg1).unwrap()).await.unwrap();

    let msg2 = read_key_exchange(driver).await;
    let HandshakeProgress::Send(msg3) = handshake.on_message(&msg2, &mut store, "peer").unwrap()
    else {
        panic!("central must reply to message 2");
    };
    driver.write(&key_exchange(1, &msg3).unwrap()).await.unwrap();

    let msg4 = read_key_exchange(driver).await;
    let HandshakeProgress::Complete { session, reply: None } =
        handshake.on_message(&msg4, &mut store, "peer").unwrap()
    else {
        panic!("central must complete on message 4");
    };
    *session
}

async fn read_encrypted_response(driver: &MemoryChannel, crypto: &mut SecureSession) -> Vec<u8> {
    let mut assembler = Assembler::new(65535);
    loop {
        let frame = driver.read_notification(READ).await.unwrap();
        let container = Container::parse(&frame).unwrap();
        if let FeedOutcome::Complete(payload) = assembler.feed(&container).unwrap() {
            return crypto.decrypt(&payload).unwrap();
        }
    }
}

#[tokio::test]
async fn replayed_request_drops_the_session() {
    let (driver, peripheral_half) = memory_pair(64);

    let registry = HandlerRegistry::new()
        .register_unary("echo", |data| HandlerOutcome::Response(data.to_vec()));
    let identity = SigningKey::generate(&mut OsRng);
    let channel = Arc::clone(&peripheral_half);
    let task = tokio::spawn(async move {
        let mut session =
            PeripheralSession::new(channel, registry, PeripheralConfig::default(), identity);
        session.run().await;
    });

    let mut crypto = handshake_as_central(&driver).await;

    // First delivery: encrypt one request and keep its wire frames
    let packet = command_to_vec(CommandKind::Request, "echo", b"replay me").unwrap();
    let payload = crypto.encrypt(&packet).unwrap();
    let frames: Vec<Vec<u8>> =
        split(&payload, 7, 64).unwrap().map(|c| c.to_vec().unwrap()).collect();
    for frame in &frames {
        driver.write(frame).await.unwrap();
    }

    // The response proves the first delivery was accepted
    let response = read_encrypted_response(&driver, &mut crypto).await;
    let packet = parse_command(&response).unwrap();
    assert_eq!(packet.kind, CommandKind::Response);
    assert_eq!(packet.data, b"replay me");

    // Re-inject the identical frames: the counter has already been
    // accepted, so the peripheral must drop the link, not answer
    for frame in &frames {
        driver.write(frame).await.unwrap();
    }

    tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .expect("peripheral should exit after the replay")
        .expect("peripheral task should not panic");
    assert!(!driver.is_connected());
}
