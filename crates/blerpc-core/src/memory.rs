//! In-memory loopback channel.
//!
//! Two [`MemoryChannel`] halves joined by bounded queues, used by the
//! end-to-end tests and by same-process central/peripheral wiring. Frames
//! arrive in write order, whole, exactly once — the same guarantees a
//! GATT link provides.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU32, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{Mutex, mpsc};

use crate::channel::{Channel, ChannelError};

/// Queue depth per direction; deep enough that a split payload never
/// blocks the writer in tests.
const QUEUE_DEPTH: usize = 1024;

/// One half of an in-memory channel pair.
pub struct MemoryChannel {
    mtu: u16,
    tx: mpsc::Sender<Bytes>,
    rx: Mutex<mpsc::Receiver<Bytes>>,
    connected: Arc<AtomicBool>,
    inject_buffer_full: AtomicU32,
}

/// Create a connected channel pair with the given MTU on both halves.
pub fn memory_pair(mtu: u16) -> (Arc<MemoryChannel>, Arc<MemoryChannel>) {
    let (a_tx, b_rx) = mpsc::channel(QUEUE_DEPTH);
    let (b_tx, a_rx) = mpsc::channel(QUEUE_DEPTH);
    let connected = Arc::new(AtomicBool::new(true));

    let a = Arc::new(MemoryChannel {
        mtu,
        tx: a_tx,
        rx: Mutex::new(a_rx),
        connected: Arc::clone(&connected),
        inject_buffer_full: AtomicU32::new(0),
    });
    let b = Arc::new(MemoryChannel {
        mtu,
        tx: b_tx,
        rx: Mutex::new(b_rx),
        connected,
        inject_buffer_full: AtomicU32::new(0),
    });
    (a, b)
}

impl MemoryChannel {
    /// Make the next `count` writes on this half fail with
    /// [`ChannelError::BufferFull`], for exercising retry paths.
    pub fn inject_buffer_full(&self, count: u32) {
        self.inject_buffer_full.store(count, Ordering::SeqCst);
    }
}

#[async_trait]
impl Channel for MemoryChannel {
    fn mtu(&self) -> u16 {
        self.mtu
    }

    async fn write(&self, frame: &[u8]) -> Result<(), ChannelError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(ChannelError::NotConnected);
        }

        let pending = self.inject_buffer_full.load(Ordering::SeqCst);
        if pending > 0 {
            self.inject_buffer_full.store(pending - 1, Ordering::SeqCst);
            return Err(ChannelError::BufferFull);
        }

        self.tx
            .send(Bytes::copy_from_slice(frame))
            .await
            .map_err(|_| ChannelError::NotConnected)
    }

    async fn read_notification(&self, timeout: Duration) -> Result<Bytes, ChannelError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(ChannelError::NotConnected);
        }

        let mut rx = self.rx.lock().await;
        match tokio::time::timeout(timeout, rx.recv()).await {
            Ok(Some(frame)) => Ok(frame),
            Ok(None) => Err(ChannelError::NotConnected),
            Err(_) => Err(ChannelError::Timeout { timeout }),
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn frames_arrive_whole_and_in_order() {
        let (a, b) = memory_pair(23);

        a.write(&[1, 2, 3]).await.unwrap();
        a.write(&[4, 5]).await.unwrap();

        let timeout = Duration::from_millis(100);
        assert_eq!(b.read_notification(timeout).await.unwrap(), Bytes::from_static(&[1, 2, 3]));
        assert_eq!(b.read_notification(timeout).await.unwrap(), Bytes::from_static(&[4, 5]));
    }

    #[tokio::test]
    async fn read_times_out_when_idle() {
        let (_a, b) = memory_pair(23);

        let result = b.read_notification(Duration::from_millis(10)).await;
        assert!(matches!(result, Err(ChannelError::Timeout { .. })));
    }

    #[tokio::test]
    async fn disconnect_fails_both_halves() {
        let (a, b) = memory_pair(23);
        a.disconnect().await;

        assert!(!a.is_connected());
        assert!(!b.is_connected());
        assert_eq!(b.write(&[1]).await, Err(ChannelError::NotConnected));
        assert_eq!(
            a.read_notification(Duration::from_millis(10)).await,
            Err(ChannelError::NotConnected)
        );
    }

    #[tokio::test]
    async fn injected_congestion_clears_after_count() {
        let (a, b) = memory_pair(23);
        a.inject_buffer_full(2);

        assert_eq!(a.write(&[1]).await, Err(ChannelError::BufferFull));
        assert_eq!(a.write(&[1]).await, Err(ChannelError::BufferFull));
        a.write(&[1]).await.unwrap();

        assert!(b.read_notification(Duration::from_millis(100)).await.is_ok());
    }
}
