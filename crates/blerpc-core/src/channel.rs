//! Channel contract between the sessions and the link layer.
//!
//! The sessions drive any duplex datagram channel that delivers whole
//! container frames in order: a BLE GATT characteristic with notify and
//! write-without-response, or the in-memory [`memory_pair`] used in tests
//! and same-process wiring. The BLE stack itself lives outside the core;
//! a driver implements [`Channel`] (and optionally [`Scanner`]) and hands
//! the session an established connection.
//!
//! Inbound frames land in a single-consumer queue in arrival order; only
//! `read_notification` and `write` suspend. Everything above this trait
//! is synchronous codec work.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// GATT service UUID conventionally advertised by bleRPC peripherals.
///
/// Channel drivers use this as the default scan filter; the sessions
/// themselves never depend on it.
pub const SERVICE_UUID: &str = "12340001-0000-1000-8000-00805f9b34fb";

/// GATT characteristic UUID carrying write-without-response and notify.
pub const CHARACTERISTIC_UUID: &str = "12340002-0000-1000-8000-00805f9b34fb";

/// Transport errors surfaced by a channel implementation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// The channel is not (or no longer) connected
    #[error("not connected")]
    NotConnected,

    /// No notification arrived within the read timeout
    #[error("read timed out after {timeout:?}")]
    Timeout {
        /// The timeout that elapsed
        timeout: Duration,
    },

    /// The link rejected a write
    #[error("write failed: {0}")]
    WriteFailed(String),

    /// Transient outbound congestion; the write may be retried shortly
    #[error("link buffer full")]
    BufferFull,
}

/// One device found by a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedDevice {
    /// Stable device identifier (address on BLE); also the TOFU pin key
    pub id: String,
    /// Advertised name, if any
    pub name: Option<String>,
    /// Signal strength at scan time, if known
    pub rssi: Option<i16>,
}

/// A connected duplex datagram channel.
///
/// Implementations must preserve write order end to end and must deliver
/// each inbound notification as one complete container frame. There is no
/// loss, reordering, or retransmission handling above this trait.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Current effective ATT MTU. Container sizing subtracts the 3-byte
    /// ATT overhead from this.
    fn mtu(&self) -> u16;

    /// Queue one frame as a single write-without-response.
    async fn write(&self, frame: &[u8]) -> Result<(), ChannelError>;

    /// Receive the next inbound notification, waiting up to `timeout`.
    ///
    /// The notification queue is single-consumer: the session owns reads.
    async fn read_notification(&self, timeout: Duration) -> Result<Bytes, ChannelError>;

    /// Whether the link is still up.
    fn is_connected(&self) -> bool;

    /// Tear down the link. Idempotent.
    async fn disconnect(&self);
}

/// Device discovery and connection establishment.
///
/// BLE drivers implement this over their scanning API; the service filter
/// is the GATT service UUID when applicable.
#[async_trait]
pub trait Scanner: Send + Sync {
    /// Scan for devices for up to `timeout`.
    async fn scan(
        &self,
        timeout: Duration,
        service_filter: Option<&str>,
    ) -> Result<Vec<ScannedDevice>, ChannelError>;

    /// Connect to a scanned device and negotiate the MTU.
    async fn connect(&self, device: &ScannedDevice) -> Result<Arc<dyn Channel>, ChannelError>;
}
