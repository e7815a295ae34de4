//! Central session driver.
//!
//! Owns one connected channel and drives typed RPC over it: unary calls,
//! peripheral-to-central streams, and central-to-peripheral uploads.
//! RPCs are strictly serialized; every operation takes `&mut self` and a
//! streaming RPC holds the session for its full duration.
//!
//! # Session init
//!
//! On establish, the central negotiates in order: per-read timeout,
//! capability record, and (when policy requires it and the peripheral
//! supports it) the key-exchange handshake. A peripheral that answers
//! neither negotiation request still works with defaults; a missing
//! `ENCRYPTION_SUPPORTED` flag under a require-encryption policy is a
//! hard failure.

use std::{sync::Arc, time::Duration};

use blerpc_core::{CentralConfig, Channel, ChannelError, ScannedDevice, Scanner};
use blerpc_crypto::{CentralHandshake, HandshakeProgress, IdentityStore, SecureSession};
use blerpc_proto::{
    Assembler, Capabilities, CommandKind, Container, ContainerBody, ControlCmd, FeedOutcome,
    Splitter, command_to_vec, decode_timeout_ms, key_exchange, parse_command, split,
};
use bytes::Bytes;
use rand::rngs::OsRng;
use tracing::{debug, warn};

use crate::error::{CentralError, Result};

/// Floor applied to the first read after a transmit, absorbing peripheral
/// processing latency without stalling every read on a stuck stream.
const FIRST_READ_FLOOR: Duration = Duration::from_millis(2000);

/// Read timeout used when the peripheral never answered the TIMEOUT
/// negotiation.
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(1000);

/// Read timeout for each step of session init and key exchange.
const INIT_READ_TIMEOUT: Duration = Duration::from_millis(2000);

/// Capabilities assumed when the peripheral never answered the
/// CAPABILITIES negotiation: no limits enforced, no encryption.
const FALLBACK_CAPABILITIES: Capabilities = Capabilities {
    max_request_payload_size: u16::MAX,
    max_response_payload_size: u16::MAX,
    flags: 0,
};

/// Client-side session over one connected channel.
pub struct CentralSession {
    channel: Arc<dyn Channel>,
    config: CentralConfig,
    splitter: Splitter,
    assembler: Assembler,
    crypto: Option<SecureSession>,
    capabilities: Capabilities,
    read_timeout: Duration,
}

impl std::fmt::Debug for CentralSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CentralSession").finish_non_exhaustive()
    }
}

impl CentralSession {
    /// Connect to a scanned device and establish a session on it.
    ///
    /// Convenience over [`CentralSession::establish`] for drivers that
    /// implement [`Scanner`].
    pub async fn connect(
        scanner: &dyn Scanner,
        device: &ScannedDevice,
        config: CentralConfig,
        identity_store: &mut dyn IdentityStore,
    ) -> Result<Self> {
        let channel = scanner.connect(device).await?;
        Self::establish(channel, config, identity_store, &device.id).await
    }

    /// Establish a session on an already-connected channel.
    ///
    /// Performs session init: timeout negotiation, capability exchange,
    /// and the key-exchange handshake when policy and peer support line
    /// up. `peer_id` keys the TOFU identity pin.
    pub async fn establish(
        channel: Arc<dyn Channel>,
        config: CentralConfig,
        identity_store: &mut dyn IdentityStore,
        peer_id: &str,
    ) -> Result<Self> {
        let assembler = Assembler::new(config.max_payload_size);
        let mut session = Self {
            channel,
            config,
            splitter: Splitter::new(),
            assembler,
            crypto: None,
            capabilities: FALLBACK_CAPABILITIES,
            read_timeout: DEFAULT_READ_TIMEOUT,
        };

        session.negotiate_timeout().await?;
        session.negotiate_capabilities().await?;

        if session.config.require_encryption {
            if !session.capabilities.encryption_supported() {
                return Err(CentralError::EncryptionRequired);
            }
            if let Err(err) = session.key_exchange(identity_store, peer_id).await {
                // A failed handshake leaves nothing worth keeping
                session.disconnect().await;
                return Err(err);
            }
        }

        Ok(session)
    }

    /// Capability record cached from session init.
    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// Negotiated per-read timeout.
    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    /// Whether a live encrypted session protects payloads.
    pub fn is_encrypted(&self) -> bool {
        self.crypto.is_some()
    }

    /// One-shot RPC: send `request` under `cmd_name`, await the response.
    pub async fn call(&mut self, cmd_name: &str, request: &[u8]) -> Result<Vec<u8>> {
        let result = self.call_inner(cmd_name, request).await;
        if let Err(err) = &result {
            self.abort_rpc(err).await;
        }
        result
    }

    async fn call_inner(&mut self, cmd_name: &str, request: &[u8]) -> Result<Vec<u8>> {
        self.send_request(cmd_name, request).await?;
        let payload = self.read_response_payload(&mut true).await?;
        self.unwrap_response(cmd_name, &payload)
    }

    /// Peripheral-to-central stream: one request, many responses, ended
    /// by the peripheral's STREAM_END marker.
    ///
    /// Partial results are discarded on any mid-stream error.
    pub async fn stream_receive(
        &mut self,
        cmd_name: &str,
        request: &[u8],
    ) -> Result<Vec<Vec<u8>>> {
        let result = self.stream_receive_inner(cmd_name, request).await;
        if let Err(err) = &result {
            self.abort_rpc(err).await;
        }
        result
    }

    async fn stream_receive_inner(
        &mut self,
        cmd_name: &str,
        request: &[u8],
    ) -> Result<Vec<Vec<u8>>> {
        self.send_request(cmd_name, request).await?;

        let mut results = Vec::new();
        let mut first_read = true;
        loop {
            match self.read_stream_event(&mut first_read).await? {
                StreamEvent::Message(payload) => {
                    results.push(self.unwrap_response(cmd_name, &payload)?);
                },
                StreamEvent::End => return Ok(results),
            }
        }
    }

    /// Central-to-peripheral stream: many messages under `cmd_name`, an
    /// end-of-stream marker, then one response named `final_cmd_name`.
    pub async fn stream_send(
        &mut self,
        cmd_name: &str,
        messages: &[Vec<u8>],
        final_cmd_name: &str,
    ) -> Result<Vec<u8>> {
        let result = self.stream_send_inner(cmd_name, messages, final_cmd_name).await;
        if let Err(err) = &result {
            self.abort_rpc(err).await;
        }
        result
    }

    async fn stream_send_inner(
        &mut self,
        cmd_name: &str,
        messages: &[Vec<u8>],
        final_cmd_name: &str,
    ) -> Result<Vec<u8>> {
        for message in messages {
            self.send_request(cmd_name, message).await?;
        }

        let tid = self.splitter.next_transaction_id();
        self.channel.write(&blerpc_proto::stream_end_c2p(tid)).await?;

        let payload = self.read_response_payload(&mut true).await?;
        self.unwrap_response(final_cmd_name, &payload)
    }

    /// Tear down the session: zeroize crypto state and release the
    /// channel.
    pub async fn disconnect(&mut self) {
        self.crypto = None; // key material zeroizes on drop
        self.assembler.reset();
        self.channel.disconnect().await;
    }

    /// Clean up after a failed RPC. Every error resets the assembler;
    /// crypto errors (replay, bad tag, nonce exhaustion) are fatal and
    /// tear the whole session down.
    async fn abort_rpc(&mut self, err: &CentralError) {
        self.assembler.reset();
        if matches!(err, CentralError::Crypto(_)) {
            warn!(%err, "crypto failure is fatal, dropping session");
            self.disconnect().await;
        }
    }

    // Transmit path

    async fn send_request(&mut self, cmd_name: &str, data: &[u8]) -> Result<()> {
        let packet = command_to_vec(CommandKind::Request, cmd_name, data)?;

        let max = self.capabilities.max_request_payload_size as usize;
        if packet.len() > max {
            return Err(CentralError::PayloadTooLarge { size: packet.len(), max });
        }

        let payload = match self.crypto.as_mut() {
            Some(session) => session.encrypt(&packet)?,
            None => packet,
        };
        self.send_payload(&payload).await
    }

    async fn send_payload(&mut self, payload: &[u8]) -> Result<()> {
        let tid = self.splitter.next_transaction_id();
        for container in split(payload, tid, self.channel.mtu())? {
            self.channel.write(&container.to_vec()?).await?;
        }
        Ok(())
    }

    // Receive path

    async fn read_response_payload(&mut self, first_read: &mut bool) -> Result<Bytes> {
        loop {
            match self.read_stream_event(first_read).await? {
                StreamEvent::Message(payload) => return Ok(payload),
                StreamEvent::End => {
                    warn!("ignoring stray stream end in unary read");
                },
            }
        }
    }

    async fn read_stream_event(&mut self, first_read: &mut bool) -> Result<StreamEvent> {
        loop {
            let timeout = if *first_read {
                self.read_timeout.max(FIRST_READ_FLOOR)
            } else {
                self.read_timeout
            };

            let frame = self.channel.read_notification(timeout).await?;
            *first_read = false;

            let container = Container::parse(&frame)?;
            match container.body {
                ContainerBody::Control { cmd: ControlCmd::Error, payload } => {
                    let code = blerpc_proto::decode_error_code(payload)?;
                    return Err(CentralError::from_peripheral_code(code));
                },
                ContainerBody::Control { cmd: ControlCmd::StreamEndP2c, .. } => {
                    return Ok(StreamEvent::End);
                },
                ContainerBody::Control { cmd, .. } => {
                    debug!(?cmd, "ignoring unexpected control frame");
                },
                ContainerBody::First { .. } | ContainerBody::Subsequent { .. } => {
                    if let FeedOutcome::Complete(payload) = self.assembler.feed(&container)? {
                        let payload = match self.crypto.as_mut() {
                            Some(session) => Bytes::from(session.decrypt(&payload)?),
                            None => payload,
                        };
                        return Ok(StreamEvent::Message(payload));
                    }
                },
            }
        }
    }

    fn unwrap_response(&self, cmd_name: &str, payload: &[u8]) -> Result<Vec<u8>> {
        let packet = parse_command(payload)?;

        if packet.kind != CommandKind::Response {
            return Err(CentralError::UnexpectedResponseType);
        }
        if packet.name != cmd_name {
            return Err(CentralError::CommandNameMismatch {
                expected: cmd_name.to_string(),
                actual: packet.name.to_string(),
            });
        }
        Ok(packet.data.to_vec())
    }

    // Session init

    async fn negotiate_timeout(&mut self) -> Result<()> {
        let tid = self.splitter.next_transaction_id();
        self.channel.write(&blerpc_proto::timeout_request(tid)).await?;

        match self.read_control(ControlCmd::Timeout).await {
            Ok(payload) => {
                let ms = decode_timeout_ms(&payload)?;
                self.read_timeout = Duration::from_millis(u64::from(ms));
                debug!(?ms, "negotiated read timeout");
            },
            Err(CentralError::Channel(ChannelError::Timeout { .. })) => {
                debug!("peer did not answer timeout negotiation, using default");
            },
            Err(err) => return Err(err),
        }
        Ok(())
    }

    async fn negotiate_capabilities(&mut self) -> Result<()> {
        let tid = self.splitter.next_transaction_id();
        self.channel.write(&blerpc_proto::capabilities_request(tid)).await?;

        match self.read_control(ControlCmd::Capabilities).await {
            Ok(payload) => {
                self.capabilities = Capabilities::decode(&payload)?;
                debug!(caps = ?self.capabilities, "negotiated capabilities");
            },
            Err(CentralError::Channel(ChannelError::Timeout { .. })) => {
                debug!("peer did not answer capability negotiation, using defaults");
            },
            Err(err) => return Err(err),
        }
        Ok(())
    }

    /// Read one CONTROL frame of the expected kind, logging and skipping
    /// anything else that arrives in the meantime.
    async fn read_control(&mut self, expected: ControlCmd) -> Result<Vec<u8>> {
        loop {
            let frame = self.channel.read_notification(INIT_READ_TIMEOUT).await?;
            let container = Container::parse(&frame)?;

            match container.body {
                ContainerBody::Control { cmd, payload } if cmd == expected => {
                    return Ok(payload.to_vec());
                },
                ContainerBody::Control { cmd: ControlCmd::Error, payload } => {
                    let code = blerpc_proto::decode_error_code(payload)?;
                    return Err(CentralError::from_peripheral_code(code));
                },
                other => warn!(?other, "ignoring unexpected reply during session init"),
            }
        }
    }

    async fn key_exchange(
        &mut self,
        identity_store: &mut dyn IdentityStore,
        peer_id: &str,
    ) -> Result<()> {
        let mut rng = OsRng;
        let (mut handshake, msg1) = CentralHandshake::initiate(&mut rng);

        let tid = self.splitter.next_transaction_id();
        self.channel.write(&key_exchange(tid, &msg1)?).await?;

        loop {
            let payload = self.read_control(ControlCmd::KeyExchange).await?;
            match handshake.on_message(&payload, identity_store, peer_id)? {
                HandshakeProgress::Send(reply) => {
                    let tid = self.splitter.next_transaction_id();
                    self.channel.write(&key_exchange(tid, &reply)?).await?;
                },
                HandshakeProgress::Complete { session, .. } => {
                    self.crypto = Some(*session);
                    debug!(peer_id, "session encrypted");
                    return Ok(());
                },
            }
        }
    }
}

enum StreamEvent {
    Message(Bytes),
    End,
}
