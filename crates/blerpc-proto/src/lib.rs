//! bleRPC wire codecs.
//!
//! Pure, synchronous codecs for the container and command layers of the
//! bleRPC protocol: framing, MTU-aware fragmentation, single-stream
//! reassembly, typed command packets, and the control payloads used for
//! capability and timeout negotiation. No I/O happens here; the session
//! crates drive these codecs over a channel.
//!
//! # Layering
//!
//! ```text
//! user bytes ──> command packet ──> [encrypt] ──> splitter ──> containers
//! containers ──> assembler ──> [decrypt] ──> command packet ──> user bytes
//! ```
//!
//! Control containers (timeout, capabilities, stream end, error, key
//! exchange) bypass the assembler and are routed directly by the sessions.
//!
//! All multi-byte integers are little-endian on the wire. Parsing returns
//! borrows into the input; nothing is copied until reassembly.

pub mod assembler;
pub mod command;
pub mod container;
pub mod control;
pub mod errors;
pub mod splitter;

pub use assembler::{Assembler, FeedOutcome};
pub use command::{
    CommandKind, CommandPacket, MAX_NAME_LEN, command_len, command_to_vec, parse_command,
    serialize_command,
};
pub use container::{
    ATT_OVERHEAD, Container, ContainerBody, ControlCmd, FIRST_HEADER_LEN, MIN_MTU,
    SHORT_HEADER_LEN, capabilities_request, control_frame, error_frame, key_exchange,
    stream_end_c2p, stream_end_p2c, timeout_request,
};
pub use control::{
    CAPABILITIES_LEN, Capabilities, ERROR_BUSY, ERROR_RESPONSE_TOO_LARGE, decode_error_code,
    decode_timeout_ms, encode_timeout_ms,
};
pub use errors::{ProtoError, Result};
pub use splitter::{SplitIter, Splitter, split};
