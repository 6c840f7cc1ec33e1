// ============================================
// File: crates/tunsocks-transport/src/mock.rs
// ============================================
//! # Mock TUN Device
//!
//! ## Creation Reason
//! Provides an in-memory TUN device so the framing codec, packet pump,
//! and tunnel lifecycle can be tested without device privileges.
//!
//! ## Main Functionality
//! - In-memory read/write packet queues
//! - Packet injection and write capture for verification
//! - Real close semantics: `close()` unblocks a pending `read()`
//!
//! ## ⚠️ Important Note for Next Developer
//! - Queues are bounded to catch runaway test loops
//! - Packets travel through unframed; inject framed bytes yourself when
//!   testing `FramedTun`
//! - `read()` creates its `notified()` future BEFORE checking the
//!   closed flag and the queue; `notify_waiters()` only reaches futures
//!   that already exist
//!
//! ## Last Modified
//! v0.1.1 - Close notification race fixed

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::error::{Result, TransportError};
use crate::traits::{TunDevice, DEFAULT_MTU};

// ============================================
// Constants
// ============================================

/// Maximum number of packets to queue per direction.
const MAX_QUEUE_SIZE: usize = 1000;

// ============================================
// MockTun
// ============================================

/// Mock TUN device for testing.
///
/// # Example
/// ```ignore
/// let tun = MockTun::new("mock0");
/// tun.inject_packet(b"packet".to_vec());
///
/// let mut buf = [0u8; 1500];
/// let len = tun.read(&mut buf).await.unwrap();
/// assert_eq!(&buf[..len], b"packet");
/// ```
pub struct MockTun {
    /// Device name.
    name: String,
    /// Link MTU reported to callers.
    mtu: u16,
    /// Packets waiting to be read (injected by the test).
    read_queue: Mutex<VecDeque<Vec<u8>>>,
    /// Packets written to the device (captured for verification).
    write_queue: Mutex<VecDeque<Vec<u8>>>,
    /// Whether the device has been closed.
    closed: AtomicBool,
    /// Wakes readers on packet injection or close.
    read_notify: Notify,
}

impl MockTun {
    /// Creates a new mock device with the default MTU.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mtu: DEFAULT_MTU,
            read_queue: Mutex::new(VecDeque::with_capacity(16)),
            write_queue: Mutex::new(VecDeque::with_capacity(16)),
            closed: AtomicBool::new(false),
            read_notify: Notify::new(),
        }
    }

    /// Queues a packet to be returned by the next `read()` call.
    ///
    /// # Panics
    /// Panics if the queue holds more than `MAX_QUEUE_SIZE` packets.
    pub fn inject_packet(&self, packet: Vec<u8>) {
        let mut queue = self.read_queue.lock();
        assert!(queue.len() < MAX_QUEUE_SIZE, "mock read queue overflow");
        queue.push_back(packet);
        drop(queue);
        self.read_notify.notify_one();
    }

    /// Takes all packets written to the device, clearing the capture.
    #[must_use]
    pub fn take_written_packets(&self) -> Vec<Vec<u8>> {
        self.write_queue.lock().drain(..).collect()
    }

    /// Returns the number of packets waiting to be read.
    #[must_use]
    pub fn pending_read_count(&self) -> usize {
        self.read_queue.lock().len()
    }

    /// Returns the number of packets written so far.
    #[must_use]
    pub fn written_count(&self) -> usize {
        self.write_queue.lock().len()
    }
}

#[async_trait]
impl TunDevice for MockTun {
    async fn read(&self, buf: &mut [u8]) -> Result<usize> {
        loop {
            // Created before the flag and queue checks so a close() or
            // injection landing in between still wakes this waiter.
            let wakeup = self.read_notify.notified();

            if self.closed.load(Ordering::Acquire) {
                return Err(TransportError::DeviceClosed);
            }

            {
                let mut queue = self.read_queue.lock();
                if let Some(packet) = queue.pop_front() {
                    let len = packet.len().min(buf.len());
                    buf[..len].copy_from_slice(&packet[..len]);
                    return Ok(len);
                }
            }

            wakeup.await;
        }
    }

    async fn write(&self, buf: &[u8]) -> Result<usize> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::DeviceClosed);
        }

        let mut queue = self.write_queue.lock();
        if queue.len() >= MAX_QUEUE_SIZE {
            return Err(TransportError::device_write_failed("write queue full"));
        }
        queue.push_back(buf.to_vec());
        Ok(buf.len())
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(TransportError::DeviceClosed);
        }
        self.read_notify.notify_waiters();
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn mtu(&self) -> u16 {
        self.mtu
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for MockTun {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTun")
            .field("name", &self.name)
            .field("closed", &self.is_closed())
            .field("pending_reads", &self.pending_read_count())
            .field("written_packets", &self.written_count())
            .finish()
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_inject_and_read() {
        let tun = MockTun::new("mock0");
        tun.inject_packet(b"one".to_vec());
        tun.inject_packet(b"two".to_vec());

        let mut buf = [0u8; 64];
        let len = tun.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..len], b"one");
        let len = tun.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..len], b"two");
        assert_eq!(tun.pending_read_count(), 0);
    }

    #[tokio::test]
    async fn test_write_capture() {
        let tun = MockTun::new("mock0");
        tun.write(b"packet 1").await.unwrap();
        tun.write(b"packet 2").await.unwrap();

        let captured = tun.take_written_packets();
        assert_eq!(captured.len(), 2);
        assert_eq!(captured[0], b"packet 1");
        assert_eq!(tun.written_count(), 0);
    }

    #[tokio::test]
    async fn test_close_unblocks_pending_read() {
        let tun = Arc::new(MockTun::new("mock0"));
        let reader = Arc::clone(&tun);

        let task = tokio::spawn(async move {
            let mut buf = [0u8; 64];
            reader.read(&mut buf).await
        });

        // Give the reader a moment to block on the empty queue.
        tokio::time::sleep(Duration::from_millis(10)).await;
        tun.close().await.unwrap();

        let result = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("reader did not unblock")
            .unwrap();
        assert!(matches!(result, Err(TransportError::DeviceClosed)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_close_races_with_read_startup() {
        // close() may land between a reader's closed-flag check and its
        // wait on the notify; the reader must still observe the close.
        for _ in 0..50 {
            let tun = Arc::new(MockTun::new("mock0"));
            let reader = Arc::clone(&tun);

            let task = tokio::spawn(async move {
                let mut buf = [0u8; 64];
                reader.read(&mut buf).await
            });

            let _ = tun.close().await;

            let result = tokio::time::timeout(Duration::from_secs(1), task)
                .await
                .expect("reader missed the close notification")
                .unwrap();
            assert!(matches!(result, Err(TransportError::DeviceClosed)));
        }
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let tun = MockTun::new("mock0");
        tun.close().await.unwrap();
        assert!(tun.is_closed());

        // Second close surfaces the already-closed condition.
        assert!(matches!(
            tun.close().await,
            Err(TransportError::DeviceClosed)
        ));
        assert!(tun.is_closed());
    }

    #[tokio::test]
    async fn test_write_after_close_fails() {
        let tun = MockTun::new("mock0");
        tun.close().await.unwrap();
        assert!(tun.write(b"late").await.is_err());
    }
}
