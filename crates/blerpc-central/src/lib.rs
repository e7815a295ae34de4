//! bleRPC central (client) session.
//!
//! The initiating side of the protocol: establishes a session over a
//! connected channel, negotiates timeout and capabilities, runs the
//! key-exchange handshake under a require-encryption-by-default policy,
//! and drives the three RPC shapes:
//!
//! - [`CentralSession::call`] — unary request/response,
//! - [`CentralSession::stream_receive`] — one request, a stream of
//!   responses ended by the peripheral,
//! - [`CentralSession::stream_send`] — a stream of uploads ended by the
//!   central, answered with one response.
//!
//! Per-RPC typed wrappers generated from service definitions layer on
//! top of these three capabilities; the session only moves opaque bytes.

pub mod error;
pub mod session;

pub use error::{CentralError, Result};
pub use session::CentralSession;
