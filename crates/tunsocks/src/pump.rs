// ============================================
// File: crates/tunsocks/src/pump.rs
// ============================================
//! # Packet Pump
//!
//! ## Creation Reason
//! The one task that moves inbound traffic: reads IP packets off the
//! TUN device and injects them into the packet engine until the device
//! closes.
//!
//! ## Main Functionality
//! - Single read loop sized to the device MTU
//! - Malformed frames are dropped, not fatal
//! - Engine rejections are logged and skipped
//!
//! ## ⚠️ Important Note for Next Developer
//! - The pump only exits on a device-level error; closing the device
//!   is how the tunnel stops it
//!
//! ## Last Modified
//! v0.1.0 - Initial pump

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use tunsocks_core::PacketStack;
use tunsocks_transport::TunDevice;

/// Spawns the device-to-engine pump task.
///
/// The task runs until the device reports a non-framing error, which in
/// the normal case is the close triggered by
/// [`Tunnel::disconnect`](crate::tunnel::Tunnel::disconnect).
pub(crate) fn spawn_pump(
    device: Arc<dyn TunDevice>,
    stack: Arc<dyn PacketStack>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut buf = vec![0u8; usize::from(device.mtu())];
        let mut pumped: u64 = 0;
        let mut dropped: u64 = 0;

        loop {
            match device.read(&mut buf).await {
                Ok(0) => continue,
                Ok(len) => match stack.inject(&buf[..len]).await {
                    Ok(_) => pumped += 1,
                    Err(e) => {
                        dropped += 1;
                        warn!(error = %e, len, "engine rejected packet");
                    }
                },
                Err(e) if e.is_framing_error() => {
                    dropped += 1;
                    debug!(error = %e, "dropping malformed frame");
                }
                Err(e) => {
                    if device.is_closed() || e.is_closed() {
                        info!(pumped, dropped, "packet pump stopped");
                    } else {
                        error!(error = %e, pumped, dropped, "packet pump failed");
                    }
                    break;
                }
            }
        }
    })
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tunsocks_core::{CoreError, MockStack, PacketOutput};
    use tunsocks_transport::MockTun;

    use super::*;

    struct NullOutput;

    #[async_trait::async_trait]
    impl PacketOutput for NullOutput {
        async fn write_packet(&self, packet: &[u8]) -> Result<usize, CoreError> {
            Ok(packet.len())
        }
    }

    fn stack_with_output() -> Arc<MockStack> {
        let stack = Arc::new(MockStack::new());
        stack.register_output(Arc::new(NullOutput));
        stack
    }

    #[tokio::test]
    async fn test_pump_moves_packets_in_order() {
        let device = Arc::new(MockTun::new("mock0"));
        let stack = stack_with_output();

        device.inject_packet(b"first".to_vec());
        device.inject_packet(b"second".to_vec());

        let handle = spawn_pump(device.clone(), stack.clone());

        // Give the pump a moment to drain the queue.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(
            stack.injected_packets(),
            vec![b"first".to_vec(), b"second".to_vec()]
        );

        device.close().await.unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("pump did not stop")
            .unwrap();
    }

    #[tokio::test]
    async fn test_pump_exits_on_close() {
        let device = Arc::new(MockTun::new("mock0"));
        let stack = stack_with_output();

        let handle = spawn_pump(device.clone(), stack);
        tokio::time::sleep(Duration::from_millis(10)).await;
        device.close().await.unwrap();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("pump did not stop")
            .unwrap();
    }

    #[tokio::test]
    async fn test_pump_survives_engine_rejection() {
        let device = Arc::new(MockTun::new("mock0"));
        // No output registered: every injection fails.
        let stack = Arc::new(MockStack::new());

        device.inject_packet(b"rejected".to_vec());
        device.inject_packet(b"also rejected".to_vec());

        let handle = spawn_pump(device.clone(), stack.clone());
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Pump is still alive despite the rejections.
        assert!(!handle.is_finished());
        assert!(stack.injected_packets().is_empty());

        device.close().await.unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("pump did not stop")
            .unwrap();
    }
}
