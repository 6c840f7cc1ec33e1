// ============================================
// File: crates/tunsocks/src/lib.rs
// ============================================
//! # tunsocks
//!
//! ## Creation Reason
//! Bridges a TUN device to a SOCKS5 proxy: packets read from the
//! device are fed into a userspace TCP/IP engine, the flows the engine
//! intercepts are forwarded through the proxy, and the engine's reply
//! packets are written back to the device.
//!
//! ## Main Functionality
//! - [`connect`] / [`connect_fd`]: wire a device, an engine, and a
//!   proxy into a running [`Tunnel`]
//! - [`TunnelConfig`]: TOML-loadable configuration
//! - [`MemoryReclaimer`](memory::MemoryReclaimer): allocator trimming
//!   for memory-constrained hosts
//!
//! ## Architecture
//! ```text
//! TUN device ──▶ packet pump ──▶ PacketStack (engine)
//!     ▲                               │ intercepted flows
//!     │                               ▼
//!     └── PacketOutput ◀── SOCKS5 TCP/UDP handlers ──▶ proxy
//! ```
//!
//! ## Usage Example
//! ```no_run
//! use std::sync::Arc;
//! use tunsocks::{connect_fd, TunnelConfig};
//! # async fn demo(stack: Arc<dyn tunsocks::PacketStack>, tun_fd: i32) -> Result<(), Box<dyn std::error::Error>> {
//! let config = TunnelConfig::new("socks5://127.0.0.1:1080");
//! let tunnel = connect_fd(stack, tun_fd, &config).await?;
//! // ... traffic flows ...
//! tunnel.disconnect().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Registration order in setup is load-bearing: the output sink goes
//!   in before the pump starts, so the engine never drops a reply
//! - `disconnect()` is the only supported teardown path
//!
//! ## Last Modified
//! v0.1.0 - Initial release

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod connect;
pub mod error;
pub mod memory;
pub mod tunnel;

mod pump;

pub use config::TunnelConfig;
pub use connect::connect;
#[cfg(unix)]
pub use connect::connect_fd;
pub use error::{BridgeError, Result};
pub use tunnel::Tunnel;

// Re-export the layer interfaces host applications implement against.
pub use tunsocks_core::{
    DatagramFlow, FlowStream, PacketOutput, PacketStack, ProxyEndpoint, TcpFlowHandler,
    UdpFlowHandler,
};
pub use tunsocks_transport::{TunDevice, DEFAULT_MTU};
