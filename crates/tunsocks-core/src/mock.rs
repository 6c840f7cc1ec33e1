// ============================================
// File: crates/tunsocks-core/src/mock.rs
// ============================================
//! # Mock Packet Stack
//!
//! ## Creation Reason
//! An in-memory [`PacketStack`] so the packet pump and tunnel lifecycle
//! can be tested without a real userspace TCP/IP engine.
//!
//! ## Main Functionality
//! - Records every injected packet for verification
//! - `emit()` pushes a packet through the registered output, the way a
//!   real engine answers traffic
//!
//! ## Last Modified
//! v0.1.0 - Initial mock stack

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{CoreError, Result};
use crate::stack::{PacketOutput, PacketStack, TcpFlowHandler, UdpFlowHandler};

/// Mock packet stack for testing.
#[derive(Default)]
pub struct MockStack {
    injected: Mutex<Vec<Vec<u8>>>,
    output: Mutex<Option<Arc<dyn PacketOutput>>>,
    tcp_handler: Mutex<Option<Arc<dyn TcpFlowHandler>>>,
    udp_handler: Mutex<Option<Arc<dyn UdpFlowHandler>>>,
}

impl MockStack {
    /// Creates an empty mock stack.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all packets injected so far.
    #[must_use]
    pub fn injected_packets(&self) -> Vec<Vec<u8>> {
        self.injected.lock().clone()
    }

    /// Returns `true` once a TCP handler has been registered.
    #[must_use]
    pub fn has_tcp_handler(&self) -> bool {
        self.tcp_handler.lock().is_some()
    }

    /// Returns `true` once a UDP handler has been registered.
    #[must_use]
    pub fn has_udp_handler(&self) -> bool {
        self.udp_handler.lock().is_some()
    }

    /// Pushes a packet through the registered output.
    ///
    /// # Errors
    /// Returns [`CoreError::OutputNotRegistered`] without an output.
    pub async fn emit(&self, packet: &[u8]) -> Result<usize> {
        let output = self
            .output
            .lock()
            .clone()
            .ok_or(CoreError::OutputNotRegistered)?;
        output.write_packet(packet).await
    }
}

#[async_trait]
impl PacketStack for MockStack {
    async fn inject(&self, packet: &[u8]) -> Result<usize> {
        if self.output.lock().is_none() {
            return Err(CoreError::OutputNotRegistered);
        }
        self.injected.lock().push(packet.to_vec());
        Ok(packet.len())
    }

    fn register_output(&self, output: Arc<dyn PacketOutput>) {
        *self.output.lock() = Some(output);
    }

    fn register_tcp_handler(&self, handler: Arc<dyn TcpFlowHandler>) {
        *self.tcp_handler.lock() = Some(handler);
    }

    fn register_udp_handler(&self, handler: Arc<dyn UdpFlowHandler>) {
        *self.udp_handler.lock() = Some(handler);
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    struct CapturingOutput {
        packets: Mutex<Vec<Vec<u8>>>,
    }

    #[async_trait]
    impl PacketOutput for CapturingOutput {
        async fn write_packet(&self, packet: &[u8]) -> Result<usize> {
            self.packets.lock().push(packet.to_vec());
            Ok(packet.len())
        }
    }

    #[tokio::test]
    async fn test_inject_requires_output() {
        let stack = MockStack::new();
        assert!(matches!(
            stack.inject(b"pkt").await,
            Err(CoreError::OutputNotRegistered)
        ));

        stack.register_output(Arc::new(CapturingOutput {
            packets: Mutex::new(Vec::new()),
        }));
        assert_eq!(stack.inject(b"pkt").await.unwrap(), 3);
        assert_eq!(stack.injected_packets(), vec![b"pkt".to_vec()]);
    }

    #[tokio::test]
    async fn test_emit_through_output() {
        let stack = MockStack::new();
        let output = Arc::new(CapturingOutput {
            packets: Mutex::new(Vec::new()),
        });
        stack.register_output(output.clone());

        stack.emit(b"reply").await.unwrap();
        assert_eq!(output.packets.lock().as_slice(), &[b"reply".to_vec()]);
    }

    #[tokio::test]
    async fn test_handler_registration_replaces() {
        struct NoopTcp;
        #[async_trait]
        impl TcpFlowHandler for NoopTcp {
            async fn handle(
                &self,
                _flow: Box<dyn crate::stack::FlowStream>,
                _destination: std::net::SocketAddr,
            ) -> Result<()> {
                Ok(())
            }
        }

        let stack = MockStack::new();
        assert!(!stack.has_tcp_handler());
        stack.register_tcp_handler(Arc::new(NoopTcp));
        stack.register_tcp_handler(Arc::new(NoopTcp));
        assert!(stack.has_tcp_handler());
    }
}
