// ============================================
// File: crates/tunsocks-core/src/stack.rs
// ============================================
//! # Packet Stack Seams
//!
//! ## Creation Reason
//! The userspace TCP/IP engine that reassembles TUN packets into flows
//! is a pluggable component. These traits define the seam between that
//! engine, the device layer feeding it packets, and the proxy handlers
//! consuming its flows.
//!
//! ## Main Functionality
//! - [`PacketStack`]: packet injection plus handler/output registration
//! - [`PacketOutput`]: sink for packets the engine emits toward the
//!   device
//! - [`TcpFlowHandler`] / [`UdpFlowHandler`]: per-flow proxy logic
//!
//! ## Design Philosophy
//! - Registration is explicit and happens before the first packet is
//!   injected; the engine errors rather than dropping silently
//! - Handlers receive an owned flow object and run for its lifetime
//!
//! ## Last Modified
//! v0.1.0 - Initial seam definitions

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::Result;

// ============================================
// Flow Abstractions
// ============================================

/// Byte stream side of a TCP flow handed to a handler.
///
/// Blanket-implemented for anything that is an async read/write stream,
/// so engines can hand out their own stream types and tests can use
/// [`tokio::io::duplex`] halves.
pub trait FlowStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> FlowStream for T {}

/// Datagram side of a UDP flow handed to a handler.
///
/// Methods take `&self` so a handler can wait for inbound datagrams
/// and send replies concurrently; implementations synchronize
/// internally.
#[async_trait]
pub trait DatagramFlow: Send + Sync {
    /// Receives one datagram from the engine.
    ///
    /// # Returns
    /// Payload length and the flow-local source address.
    ///
    /// # Errors
    /// Returns error once the flow is torn down.
    async fn recv(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr)>;

    /// Sends one datagram back into the engine toward `to`.
    ///
    /// # Errors
    /// Returns error once the flow is torn down.
    async fn send(&self, buf: &[u8], to: SocketAddr) -> Result<usize>;
}

// ============================================
// Handler Traits
// ============================================

/// Sink for packets the engine emits toward the device.
#[async_trait]
pub trait PacketOutput: Send + Sync {
    /// Writes one outbound IP packet.
    ///
    /// # Errors
    /// Returns error if the underlying device rejects the packet.
    async fn write_packet(&self, packet: &[u8]) -> Result<usize>;
}

/// Handles one TCP flow surfaced by the engine.
#[async_trait]
pub trait TcpFlowHandler: Send + Sync {
    /// Drives the flow until either side closes.
    ///
    /// `destination` is the address the flow originally targeted before
    /// interception.
    ///
    /// # Errors
    /// Returns error if proxying the flow fails.
    async fn handle(&self, flow: Box<dyn FlowStream>, destination: SocketAddr) -> Result<()>;
}

/// Handles one UDP flow surfaced by the engine.
#[async_trait]
pub trait UdpFlowHandler: Send + Sync {
    /// Relays datagrams until the flow goes idle or is torn down.
    ///
    /// # Errors
    /// Returns error if proxying the flow fails.
    async fn handle(&self, flow: Box<dyn DatagramFlow>, destination: SocketAddr) -> Result<()>;
}

// ============================================
// PacketStack
// ============================================

/// Userspace TCP/IP engine interface.
///
/// # Registration Order
/// An output sink and the handlers must be registered before the first
/// call to [`inject`](Self::inject); injecting without an output fails
/// with [`OutputNotRegistered`](crate::error::CoreError::OutputNotRegistered).
/// Re-registering replaces the previous handler, so restarting a tunnel
/// over a long-lived engine does not leak the old proxy address.
#[async_trait]
pub trait PacketStack: Send + Sync {
    /// Injects one inbound IP packet read from the device.
    ///
    /// # Returns
    /// Number of bytes accepted.
    ///
    /// # Errors
    /// Returns error if no output is registered or the engine rejects
    /// the packet.
    async fn inject(&self, packet: &[u8]) -> Result<usize>;

    /// Registers the sink for packets the engine emits.
    fn register_output(&self, output: Arc<dyn PacketOutput>);

    /// Registers the handler for intercepted TCP flows.
    fn register_tcp_handler(&self, handler: Arc<dyn TcpFlowHandler>);

    /// Registers the handler for intercepted UDP flows.
    fn register_udp_handler(&self, handler: Arc<dyn UdpFlowHandler>);
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};

    use super::*;

    // The blanket impl must accept duplex halves, since that is what
    // handler tests are written against.
    fn assert_flow_stream(_: &dyn FlowStream) {}

    #[tokio::test]
    async fn test_duplex_is_a_flow_stream() {
        let (mut a, mut b) = duplex(64);
        assert_flow_stream(&a);

        a.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        b.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");
    }
}
