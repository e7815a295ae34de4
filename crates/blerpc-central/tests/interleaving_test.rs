//! Central behavior against a scripted peer speaking raw frames.
//!
//! Covers the cases a well-behaved peripheral session never produces: a
//! CONTROL frame interleaved between the fragments of one payload, an
//! error report mid-payload, and the 4-byte legacy capabilities record.

use std::{sync::Arc, time::Duration};

use blerpc_central::{CentralError, CentralSession};
use blerpc_core::{CentralConfig, Channel, MemoryChannel, memory_pair};
use blerpc_crypto::MemoryIdentityStore;
use blerpc_proto::{
    Assembler, CommandKind, Container, ContainerBody, ControlCmd, FeedOutcome, command_to_vec,
    control_frame, encode_timeout_ms, error_frame, split,
};

const READ: Duration = Duration::from_millis(1000);

/// Answer the central's session-init requests: timeout 500 ms, then a
/// legacy 4-byte capabilities record (no flags field).
async fn answer_session_init(peer: &MemoryChannel) {
    for _ in 0..2 {
        let frame = peer.read_notification(READ).await.unwrap();
        let request = Container::parse(&frame).unwrap();
        let ContainerBody::Control { cmd, .. } = request.body else {
            panic!("session init sends control requests");
        };

        let reply = match cmd {
            ControlCmd::Timeout => {
                control_frame(request.transaction_id, ControlCmd::Timeout, &encode_timeout_ms(500))
            },
            ControlCmd::Capabilities => {
                // max_request = 1024, max_response = 1024, no flags
                control_frame(
                    request.transaction_id,
                    ControlCmd::Capabilities,
                    &[0x00, 0x04, 0x00, 0x04],
                )
            },
            other => panic!("unexpected init request {other:?}"),
        };
        peer.write(&reply.unwrap()).await.unwrap();
    }
}

/// Drain one full request payload off the wire.
async fn read_request(peer: &MemoryChannel) -> Vec<u8> {
    let mut assembler = Assembler::new(65535);
    loop {
        let frame = peer.read_notification(READ).await.unwrap();
        let container = Container::parse(&frame).unwrap();
        if let FeedOutcome::Complete(payload) = assembler.feed(&container).unwrap() {
            return payload.to_vec();
        }
    }
}

async fn scripted_session() -> (CentralSession, Arc<MemoryChannel>) {
    let (central_half, peer) = memory_pair(23);

    let init_peer = Arc::clone(&peer);
    let init = tokio::spawn(async move { answer_session_init(&init_peer).await });

    let mut store = MemoryIdentityStore::default();
    let session = CentralSession::establish(
        central_half,
        CentralConfig::allow_plaintext(),
        &mut store,
        "scripted",
    )
    .await
    .expect("session init should succeed");
    init.await.unwrap();

    (session, peer)
}

#[tokio::test]
async fn legacy_capabilities_are_accepted() {
    let (session, _peer) = scripted_session().await;

    let caps = session.capabilities();
    assert_eq!(caps.max_request_payload_size, 1024);
    assert_eq!(caps.max_response_payload_size, 1024);
    assert_eq!(caps.flags, 0);
    assert!(!caps.encryption_supported());
    assert_eq!(session.read_timeout(), Duration::from_millis(500));
}

#[tokio::test]
async fn control_frame_between_fragments_does_not_corrupt_assembly() {
    let (mut session, peer) = scripted_session().await;

    let script = tokio::spawn(async move {
        let request = read_request(&peer).await;
        let packet = blerpc_proto::parse_command(&request).unwrap();
        assert_eq!(packet.name, "flash_read");

        // Respond in fragments with an unrelated CONTROL frame wedged in
        let response = command_to_vec(CommandKind::Response, "flash_read", &[0xEE; 40]).unwrap();
        let containers: Vec<Vec<u8>> =
            split(&response, 9, 23).unwrap().map(|c| c.to_vec().unwrap()).collect();
        assert!(containers.len() >= 2);

        peer.write(&containers[0]).await.unwrap();
        let stray = control_frame(0, ControlCmd::Timeout, &encode_timeout_ms(123)).unwrap();
        peer.write(&stray).await.unwrap();
        for container in &containers[1..] {
            peer.write(container).await.unwrap();
        }
    });

    let response = session.call("flash_read", &[0x00, 0x10]).await.unwrap();
    assert_eq!(response, vec![0xEE; 40]);
    script.await.unwrap();
}

#[tokio::test]
async fn error_frame_mid_payload_surfaces_typed_error() {
    let (mut session, peer) = scripted_session().await;

    let script = tokio::spawn(async move {
        let _request = read_request(&peer).await;

        // First fragment of a response, then a BUSY report
        let response = command_to_vec(CommandKind::Response, "flash_read", &[0xEE; 40]).unwrap();
        let containers: Vec<Vec<u8>> =
            split(&response, 3, 23).unwrap().map(|c| c.to_vec().unwrap()).collect();
        peer.write(&containers[0]).await.unwrap();
        peer.write(&error_frame(3, blerpc_proto::ERROR_BUSY)).await.unwrap();
    });

    let err = session.call("flash_read", &[0x00, 0x10]).await.unwrap_err();
    assert!(matches!(err, CentralError::Busy));
    script.await.unwrap();
}

#[tokio::test]
async fn mismatched_response_name_is_rejected() {
    let (mut session, peer) = scripted_session().await;

    let script = tokio::spawn(async move {
        let _request = read_request(&peer).await;
        let response = command_to_vec(CommandKind::Response, "wrong_name", &[1]).unwrap();
        for container in split(&response, 1, 23).unwrap() {
            peer.write(&container.to_vec().unwrap()).await.unwrap();
        }
    });

    let err = session.call("echo", &[0x01]).await.unwrap_err();
    assert!(matches!(err, CentralError::CommandNameMismatch { .. }));
    script.await.unwrap();
}

#[tokio::test]
async fn request_echoed_back_is_not_a_response() {
    let (mut session, peer) = scripted_session().await;

    let script = tokio::spawn(async move {
        let request = read_request(&peer).await;
        // Reflect the request bytes verbatim: still a REQUEST packet
        for container in split(&request, 1, 23).unwrap() {
            peer.write(&container.to_vec().unwrap()).await.unwrap();
        }
    });

    let err = session.call("echo", &[0x01]).await.unwrap_err();
    assert!(matches!(err, CentralError::UnexpectedResponseType));
    script.await.unwrap();
}
