//! bleRPC peripheral (server) session.
//!
//! The accepting side of the protocol: answers timeout and capability
//! negotiation, accepts the key-exchange handshake (refusing re-keying on
//! a live session), reassembles request payloads, and dispatches them
//! through a [`blerpc_core::HandlerRegistry`]. Stream responses and the
//! end-of-stream marker are emitted by the session; upload streams feed a
//! per-stream handler until the central signals the end.
//!
//! One session serves one channel and at most one request at a time, the
//! shape a 32 KB-RAM firmware port keeps too.

pub mod session;

pub use session::PeripheralSession;
