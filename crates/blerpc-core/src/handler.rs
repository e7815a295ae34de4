//! RPC handler registry.
//!
//! Handlers are tagged-variant descriptors over a uniform
//! byte-slice-in, byte-sink-out interface; generated per-RPC wrappers
//! layer typed encoding on top, and the core depends only on this
//! interface. The registry is explicit state passed into peripheral
//! session construction, never an ambient global.
//!
//! Lookup is a linear scan keyed on `(len, bytes)` of the command name,
//! which is exactly as fast as anything else at the handful of entries a
//! firmware image registers.

use std::fmt;

/// Result of invoking a handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerOutcome {
    /// Success; the core encodes and emits this response.
    Response(Vec<u8>),
    /// Handler failure; the core emits nothing and the caller times out.
    Failed,
    /// The handler owns response emission (streams); the core must not
    /// emit a response of its own.
    Deferred,
}

/// Ordered sink for the messages of a peripheral-to-central stream.
///
/// The core drains the sink after the handler returns, wrapping each
/// message in a response packet and terminating the stream on the wire.
pub trait ResponseSink {
    /// Queue one stream response message.
    fn push(&mut self, message: Vec<u8>);
}

/// Buffering sink used by the peripheral session.
#[derive(Debug, Default)]
pub struct VecSink {
    messages: Vec<Vec<u8>>,
}

impl VecSink {
    /// Drain the queued messages in push order.
    pub fn into_messages(self) -> Vec<Vec<u8>> {
        self.messages
    }
}

impl ResponseSink for VecSink {
    fn push(&mut self, message: Vec<u8>) {
        self.messages.push(message);
    }
}

/// Receives the messages of one central-to-peripheral upload stream.
///
/// A fresh instance is created when the stream's first message arrives;
/// `finish` runs when the central signals end-of-stream and produces the
/// single response.
pub trait UploadHandler: Send + Sync {
    /// One uploaded message.
    fn on_message(&mut self, data: &[u8]);

    /// End of stream: produce the final response.
    fn finish(&mut self) -> HandlerOutcome;
}

/// Unary request handler.
pub type UnaryFn = Box<dyn Fn(&[u8]) -> HandlerOutcome + Send + Sync>;

/// Peripheral-to-central stream handler.
pub type StreamFn = Box<dyn Fn(&[u8], &mut dyn ResponseSink) -> HandlerOutcome + Send + Sync>;

/// Factory for upload-stream handlers, invoked per stream.
pub type UploadFactory = Box<dyn Fn() -> Box<dyn UploadHandler> + Send + Sync>;

/// One registered RPC.
pub enum RpcHandler {
    /// Single request, single response.
    Unary(UnaryFn),
    /// Single request, stream of responses, terminated by the core.
    StreamP2c(StreamFn),
    /// Stream of requests, single response after end-of-stream.
    StreamC2p(UploadFactory),
}

impl fmt::Debug for RpcHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            Self::Unary(_) => "Unary",
            Self::StreamP2c(_) => "StreamP2c",
            Self::StreamC2p(_) => "StreamC2p",
        };
        f.write_str(kind)
    }
}

/// Static table of RPC handlers, owned by one peripheral session.
#[derive(Debug, Default)]
pub struct HandlerRegistry {
    entries: Vec<(String, RpcHandler)>,
}

impl HandlerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Register a unary handler under `name`.
    pub fn register_unary(
        mut self,
        name: impl Into<String>,
        handler: impl Fn(&[u8]) -> HandlerOutcome + Send + Sync + 'static,
    ) -> Self {
        self.entries.push((name.into(), RpcHandler::Unary(Box::new(handler))));
        self
    }

    /// Register a peripheral-to-central stream handler under `name`.
    pub fn register_stream(
        mut self,
        name: impl Into<String>,
        handler: impl Fn(&[u8], &mut dyn ResponseSink) -> HandlerOutcome + Send + Sync + 'static,
    ) -> Self {
        self.entries.push((name.into(), RpcHandler::StreamP2c(Box::new(handler))));
        self
    }

    /// Register a central-to-peripheral upload handler under `name`.
    pub fn register_upload(
        mut self,
        name: impl Into<String>,
        factory: impl Fn() -> Box<dyn UploadHandler> + Send + Sync + 'static,
    ) -> Self {
        self.entries.push((name.into(), RpcHandler::StreamC2p(Box::new(factory))));
        self
    }

    /// Look up a handler by command name.
    pub fn lookup(&self, name: &str) -> Option<&RpcHandler> {
        self.entries
            .iter()
            .find(|(entry, _)| entry.len() == name.len() && entry.as_bytes() == name.as_bytes())
            .map(|(_, handler)| handler)
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry has no handlers.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
