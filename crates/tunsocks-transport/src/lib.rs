// ============================================
// File: crates/tunsocks-transport/src/lib.rs
// ============================================
//! # TUN Transport Layer
//!
//! ## Creation Reason
//! Isolates everything that touches a TUN interface (raw descriptors,
//! platform device creation, address-family framing) from the packet
//! engine and tunnel orchestration layers above it.
//!
//! ## Main Functionality
//! - [`TunDevice`]: abstract async read/write/close interface
//! - [`FramedTun`] / [`FrameCodec`]: 4-byte address-family framing used
//!   by Darwin utun devices
//! - [`FdTun`]: device over a caller-supplied raw file descriptor
//! - `DarwinTun`: utun creation and configuration on macOS/iOS
//! - [`MockTun`]: in-memory device for tests (feature `mock`)
//!
//! ## Architecture
//! ```text
//! host fd / utun socket
//!         │
//!     FdTun / DarwinTun      (raw framed bytes)
//!         │
//!      FramedTun             (strips/injects the AF header)
//!         │
//!    plain IP packets
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Raw devices carry the platform wire format; only `FramedTun`
//!   presents plain IP packets
//! - `close()` is the sole way to cancel a blocked `read()`
//!
//! ## Last Modified
//! v0.1.0 - Initial transport layer

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod framing;
pub mod traits;

#[cfg(unix)]
pub mod fd;

#[cfg(any(target_os = "macos", target_os = "ios"))]
pub mod darwin;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use error::{Result, TransportError};
pub use framing::{FrameCodec, FramedTun, AF_HEADER_LEN};
pub use traits::{DeviceAddress, DeviceConfig, TunDevice, DEFAULT_MTU};

#[cfg(unix)]
pub use fd::FdTun;

#[cfg(any(target_os = "macos", target_os = "ios"))]
pub use darwin::DarwinTun;

#[cfg(any(test, feature = "mock"))]
pub use mock::MockTun;
