//! Peripheral session driver.
//!
//! Receives containers on the channel and dispatches them: control
//! requests get immediate replies, key-exchange frames drive the
//! handshake, and completed command payloads run through the handler
//! registry. At most one request is in flight per session; a new command
//! arriving while an upload stream is active is refused with the BUSY
//! error code.
//!
//! Codec violations are logged and never surfaced over the wire; the
//! central observes them as a timeout. Crypto violations are fatal: the
//! session wipes its key material and drops the link.

use std::{sync::Arc, time::Duration};

use blerpc_core::{
    Channel, ChannelError, HandlerOutcome, HandlerRegistry, PeripheralConfig, RpcHandler,
    UploadHandler, VecSink,
};
use blerpc_crypto::{HandshakeProgress, PeripheralHandshake, SecureSession, SigningKey};
use blerpc_proto::{
    Assembler, CommandKind, Container, ContainerBody, ControlCmd, FeedOutcome, Splitter,
    command_to_vec, control_frame, encode_timeout_ms, error_frame, key_exchange, split,
    stream_end_p2c,
};
use bytes::Bytes;
use rand::rngs::OsRng;
use tracing::{debug, warn};

/// Poll interval of the receive loop; timeouts just loop again.
const READ_POLL: Duration = Duration::from_millis(250);

/// Write retry budget for transient link congestion.
const WRITE_RETRIES: u32 = 10;

/// Backoff between write retries.
const WRITE_BACKOFF: Duration = Duration::from_millis(5);

struct ActiveUpload {
    name: String,
    handler: Box<dyn UploadHandler>,
}

/// Server-side session over one connected channel.
///
/// Construct with the handler registry and identity key, then drive with
/// [`PeripheralSession::run`] until the channel disconnects.
pub struct PeripheralSession {
    channel: Arc<dyn Channel>,
    registry: HandlerRegistry,
    config: PeripheralConfig,
    identity: SigningKey,
    splitter: Splitter,
    assembler: Assembler,
    crypto: Option<SecureSession>,
    handshake: Option<PeripheralHandshake>,
    upload: Option<ActiveUpload>,
    /// Transaction id of the request currently being assembled or
    /// processed; error replies echo it.
    request_tid: u8,
}

impl PeripheralSession {
    /// Create a session bound to a connected channel.
    pub fn new(
        channel: Arc<dyn Channel>,
        registry: HandlerRegistry,
        config: PeripheralConfig,
        identity: SigningKey,
    ) -> Self {
        let assembler = Assembler::new(config.max_payload_size);
        Self {
            channel,
            registry,
            config,
            identity,
            splitter: Splitter::new(),
            assembler,
            crypto: None,
            handshake: None,
            upload: None,
            request_tid: 0,
        }
    }

    /// Whether a live encrypted session protects payloads.
    pub fn is_encrypted(&self) -> bool {
        self.crypto.is_some()
    }

    /// Drive the session until the channel disconnects.
    ///
    /// All session state (assembler, handshake, crypto keys, upload
    /// streams) is wiped on return.
    pub async fn run(&mut self) {
        loop {
            let frame = match self.channel.read_notification(READ_POLL).await {
                Ok(frame) => frame,
                Err(ChannelError::Timeout { .. }) => continue,
                Err(err) => {
                    debug!(%err, "channel closed, wiping session state");
                    break;
                },
            };

            if !self.handle_frame(&frame).await {
                break;
            }
        }
        self.wipe();
    }

    fn wipe(&mut self) {
        self.crypto = None; // key material zeroizes on drop
        self.handshake = None;
        self.upload = None;
        self.assembler.reset();
    }

    /// Process one inbound frame. Returns false when the session must
    /// end (crypto violation or dead link).
    async fn handle_frame(&mut self, frame: &[u8]) -> bool {
        let container = match Container::parse(frame) {
            Ok(container) => container,
            Err(err) => {
                warn!(%err, "dropping malformed container");
                self.assembler.reset();
                return true;
            },
        };

        let tid = container.transaction_id;
        match container.body {
            ContainerBody::Control { cmd: ControlCmd::Timeout, .. } => {
                let reply = control_frame(tid, ControlCmd::Timeout, &encode_timeout_ms(self.config.timeout_ms));
                self.send_control(reply).await
            },

            ContainerBody::Control { cmd: ControlCmd::Capabilities, .. } => {
                let reply = control_frame(tid, ControlCmd::Capabilities, &self.config.capabilities.encode());
                self.send_control(reply).await
            },

            ContainerBody::Control { cmd: ControlCmd::KeyExchange, payload } => {
                self.handle_key_exchange(tid, payload).await
            },

            ContainerBody::Control { cmd: ControlCmd::StreamEndC2p, .. } => {
                self.finish_upload().await
            },

            ContainerBody::Control { cmd, .. } => {
                warn!(?cmd, "ignoring control frame not addressed to a peripheral");
                true
            },

            ContainerBody::First { .. } | ContainerBody::Subsequent { .. } => {
                self.request_tid = tid;
                match self.assembler.feed(&container) {
                    Ok(FeedOutcome::Incomplete) => true,
                    Ok(FeedOutcome::Complete(payload)) => self.handle_payload(&payload).await,
                    Err(err) => {
                        warn!(%err, "reassembly failed, dropping payload");
                        true
                    },
                }
            },
        }
    }

    async fn handle_key_exchange(&mut self, tid: u8, payload: &[u8]) -> bool {
        if self.crypto.is_some() {
            warn!("rejecting key exchange on an already-live session");
            return true;
        }

        let mut rng = OsRng;
        let handshake = self
            .handshake
            .get_or_insert_with(|| PeripheralHandshake::new(self.identity.clone()));

        match handshake.on_message(payload, &mut rng) {
            Ok(HandshakeProgress::Send(reply)) => match key_exchange(tid, &reply) {
                Ok(frame) => self.send_control(Ok(frame)).await,
                Err(err) => {
                    warn!(%err, "handshake reply does not fit a container");
                    self.handshake = None;
                    true
                },
            },
            Ok(HandshakeProgress::Complete { session, reply }) => {
                self.handshake = None;
                let sent = match reply {
                    Some(confirmation) => self.send_control(key_exchange(tid, &confirmation)).await,
                    None => true,
                };
                if sent {
                    self.crypto = Some(*session);
                    debug!("session encrypted");
                }
                sent
            },
            Err(err) => {
                // A fresh exchange may restart from message 1.
                warn!(%err, "key exchange failed, discarding handshake");
                self.handshake = None;
                true
            },
        }
    }

    async fn handle_payload(&mut self, payload: &Bytes) -> bool {
        let plaintext = match self.crypto.as_mut() {
            Some(session) => match session.decrypt(payload) {
                Ok(plaintext) => Bytes::from(plaintext),
                Err(err) => {
                    // Crypto failures are fatal to the session
                    warn!(%err, "decryption failed, dropping session");
                    self.channel.disconnect().await;
                    return false;
                },
            },
            None if self.config.require_encryption => {
                warn!("rejecting plaintext payload, encryption is mandatory");
                return true;
            },
            None => payload.clone(),
        };

        let packet = match blerpc_proto::parse_command(&plaintext) {
            Ok(packet) => packet,
            Err(err) => {
                warn!(%err, "dropping undecodable command packet");
                return true;
            },
        };
        if packet.kind != CommandKind::Request {
            warn!(name = packet.name, "ignoring response packet sent to a peripheral");
            return true;
        }
        let name = packet.name.to_string();
        let data = packet.data.to_vec();

        // An active upload owns the session: route its own messages,
        // refuse anything else.
        if let Some(upload) = self.upload.as_mut() {
            if upload.name == name {
                upload.handler.on_message(&data);
                return true;
            }
            warn!(active = %upload.name, refused = %name, "busy: upload stream in progress");
            let busy = error_frame(self.request_tid, blerpc_proto::ERROR_BUSY);
            return self.send_control(Ok(busy)).await;
        }

        // Invoke the handler synchronously, then release the registry
        // borrow before any async emission.
        let dispatch = match self.registry.lookup(&name) {
            None => {
                warn!(%name, "no handler registered");
                return true;
            },
            Some(RpcHandler::Unary(handler)) => Dispatch::Unary(handler(&data)),
            Some(RpcHandler::StreamP2c(handler)) => {
                let mut sink = VecSink::default();
                let outcome = handler(&data, &mut sink);
                Dispatch::Stream(outcome, sink.into_messages())
            },
            Some(RpcHandler::StreamC2p(factory)) => {
                let mut handler = factory();
                handler.on_message(&data);
                Dispatch::StartUpload(handler)
            },
        };

        match dispatch {
            Dispatch::Unary(HandlerOutcome::Response(response)) => {
                self.emit_response(&name, &response).await
            },
            Dispatch::Unary(HandlerOutcome::Failed) => {
                warn!(%name, "handler failed");
                true
            },
            // The handler owns emission; the core stays silent
            Dispatch::Unary(HandlerOutcome::Deferred) => true,

            Dispatch::Stream(HandlerOutcome::Failed, _) => {
                warn!(%name, "stream handler failed");
                true
            },
            Dispatch::Stream(_, messages) => {
                for message in messages {
                    if !self.emit_response(&name, &message).await {
                        return false;
                    }
                }
                let tid = self.splitter.next_transaction_id();
                self.send_control(Ok(stream_end_p2c(tid))).await
            },

            Dispatch::StartUpload(handler) => {
                self.upload = Some(ActiveUpload { name, handler });
                true
            },
        }
    }

    async fn finish_upload(&mut self) -> bool {
        let Some(mut upload) = self.upload.take() else {
            warn!("stream end without an active upload");
            return true;
        };

        match upload.handler.finish() {
            HandlerOutcome::Response(response) => self.emit_response(&upload.name, &response).await,
            HandlerOutcome::Failed => {
                warn!(name = %upload.name, "upload handler failed");
                true
            },
            HandlerOutcome::Deferred => true,
        }
    }

    /// Encode, encrypt, split, and write one response payload.
    async fn emit_response(&mut self, name: &str, data: &[u8]) -> bool {
        let packet = match command_to_vec(CommandKind::Response, name, data) {
            Ok(packet) => packet,
            Err(err) => {
                warn!(%err, name, "response does not encode");
                return true;
            },
        };

        let max = self.config.capabilities.max_response_payload_size as usize;
        if packet.len() > max {
            warn!(name, size = packet.len(), max, "response too large");
            return self
                .send_control(Ok(error_frame(self.request_tid, blerpc_proto::ERROR_RESPONSE_TOO_LARGE)))
                .await;
        }

        let payload = match self.crypto.as_mut() {
            Some(session) => match session.encrypt(&packet) {
                Ok(payload) => payload,
                Err(err) => {
                    warn!(%err, "encryption failed, dropping session");
                    self.channel.disconnect().await;
                    return false;
                },
            },
            None => packet,
        };

        let tid = self.splitter.next_transaction_id();
        let containers = match split(&payload, tid, self.channel.mtu()) {
            Ok(containers) => containers,
            Err(err) => {
                warn!(%err, name, "response does not split at current mtu");
                return true;
            },
        };

        for container in containers {
            let frame = match container.to_vec() {
                Ok(frame) => frame,
                Err(err) => {
                    warn!(%err, "container serialization failed");
                    return true;
                },
            };
            if !self.write_with_retry(&frame).await {
                return false;
            }
        }
        true
    }

    async fn send_control(&mut self, frame: blerpc_proto::Result<Vec<u8>>) -> bool {
        match frame {
            Ok(frame) => self.write_with_retry(&frame).await,
            Err(err) => {
                warn!(%err, "control frame does not encode");
                true
            },
        }
    }

    /// Write one frame, retrying transient congestion with a short
    /// backoff. Returns false only when the link is gone.
    async fn write_with_retry(&self, frame: &[u8]) -> bool {
        for attempt in 0..=WRITE_RETRIES {
            match self.channel.write(frame).await {
                Ok(()) => return true,
                Err(ChannelError::BufferFull) if attempt < WRITE_RETRIES => {
                    tokio::time::sleep(WRITE_BACKOFF).await;
                },
                Err(ChannelError::BufferFull) => {
                    warn!("write retries exhausted, dropping frame");
                    return true;
                },
                Err(ChannelError::NotConnected) => {
                    warn!("write failed, link is gone");
                    return false;
                },
                Err(err) => {
                    warn!(%err, attempt, "write failed, dropping frame");
                    return true;
                },
            }
        }
        true
    }
}

enum Dispatch {
    Unary(HandlerOutcome),
    Stream(HandlerOutcome, Vec<Vec<u8>>),
    StartUpload(Box<dyn UploadHandler>),
}
