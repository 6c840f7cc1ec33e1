// ============================================
// File: crates/tunsocks-core/src/lib.rs
// ============================================
//! # Packet Engine Core
//!
//! ## Creation Reason
//! Sits between the TUN transport below and the tunnel orchestration
//! above: defines the packet-stack seams, resolves proxy addresses, and
//! implements the SOCKS5 flow handlers that terminate intercepted
//! traffic.
//!
//! ## Main Functionality
//! - [`PacketStack`] and friends: pluggable engine interface
//! - [`resolve_proxy_addr`]: proxy address string → [`ProxyEndpoint`]
//! - [`Socks5TcpHandler`] / [`Socks5UdpHandler`]: proxy-side flow logic
//! - [`MockStack`]: in-memory engine for tests (feature `mock`)
//!
//! ## Architecture
//! ```text
//! IP packets ──▶ PacketStack::inject
//!                     │ intercepts flows
//!                     ▼
//!        TcpFlowHandler / UdpFlowHandler ──▶ SOCKS5 proxy
//!                     │ return traffic
//!                     ▼
//!               PacketOutput ──▶ device
//! ```
//!
//! ## Last Modified
//! v0.1.0 - Initial core layer

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod proxy;
pub mod socks;
pub mod stack;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use error::{CoreError, Result};
pub use proxy::{resolve_proxy_addr, ProxyEndpoint};
pub use socks::{Socks5TcpHandler, Socks5UdpHandler, DEFAULT_UDP_IDLE_TIMEOUT};
pub use stack::{
    DatagramFlow, FlowStream, PacketOutput, PacketStack, TcpFlowHandler, UdpFlowHandler,
};

#[cfg(any(test, feature = "mock"))]
pub use mock::MockStack;
