//! Shared scaffolding for bleRPC sessions.
//!
//! The seam between the protocol core and everything outside it:
//!
//! - [`Channel`] — the duplex datagram contract a link driver implements
//!   (BLE GATT in production, [`memory_pair`] in tests),
//! - [`HandlerRegistry`] — the peripheral's RPC dispatch table, passed
//!   into session construction rather than living as process globals,
//! - [`CentralConfig`] / [`PeripheralConfig`] — per-peer policy.
//!
//! The session crates (`blerpc-central`, `blerpc-peripheral`) drive these
//! pieces; the codecs live in `blerpc-proto`.

pub mod channel;
pub mod config;
pub mod handler;
pub mod memory;

pub use channel::{
    CHARACTERISTIC_UUID, Channel, ChannelError, SERVICE_UUID, ScannedDevice, Scanner,
};
pub use config::{CentralConfig, DEFAULT_MAX_PAYLOAD, DEFAULT_TIMEOUT_MS, PeripheralConfig};
pub use handler::{
    HandlerOutcome, HandlerRegistry, ResponseSink, RpcHandler, UploadHandler, VecSink,
};
pub use memory::{MemoryChannel, memory_pair};
