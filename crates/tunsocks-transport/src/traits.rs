// ============================================
// File: crates/tunsocks-transport/src/traits.rs
// ============================================
//! # Device Traits
//!
//! ## Creation Reason
//! Defines the abstract TUN-device interface the tunnel is built
//! against, so real fd-backed devices and in-memory mocks are
//! interchangeable.
//!
//! ## Main Functionality
//! - `TunDevice`: read/write/close interface over a virtual interface
//! - `DeviceConfig` / `DeviceAddress`: creation-time settings for
//!   platform device construction
//!
//! ## Design Philosophy
//! - Async-first with `async_trait`; implementations are `Send + Sync`
//! - The tunnel owns its device exclusively; `close()` is the only
//!   cancellation mechanism for a blocked read
//! - Buffer management is the caller's responsibility
//!
//! ## Last Modified
//! v0.1.0 - Initial trait definitions

use std::net::{Ipv4Addr, Ipv6Addr};

use async_trait::async_trait;

use crate::error::Result;

/// Default link MTU used when a device does not report its own.
pub const DEFAULT_MTU: u16 = 1500;

// ============================================
// TunDevice Trait
// ============================================

/// Abstract interface for TUN device operations.
///
/// # Data Format
/// Raw devices carry whatever their platform wire format is; the
/// [`FramedTun`](crate::framing::FramedTun) wrapper presents plain IP
/// packets regardless of the underlying framing.
///
/// # Lifecycle
/// `close()` marks the handle unusable and unblocks any task waiting in
/// `read()`, which then observes
/// [`DeviceClosed`](crate::error::TransportError::DeviceClosed). Closing
/// an already-closed device surfaces the same error; callers tearing
/// down may ignore it.
#[async_trait]
pub trait TunDevice: Send + Sync {
    /// Reads one packet from the device.
    ///
    /// # Returns
    /// Number of bytes read into `buf`.
    ///
    /// # Errors
    /// Returns error if the read fails or the device is closed.
    async fn read(&self, buf: &mut [u8]) -> Result<usize>;

    /// Writes one packet to the device.
    ///
    /// # Returns
    /// Number of bytes written.
    ///
    /// # Errors
    /// Returns error if the write fails or the device is closed.
    async fn write(&self, buf: &[u8]) -> Result<usize>;

    /// Closes the device, unblocking pending reads.
    ///
    /// # Errors
    /// Returns [`DeviceClosed`](crate::error::TransportError::DeviceClosed)
    /// if already closed.
    async fn close(&self) -> Result<()>;

    /// Returns the device name (e.g. `utun3`).
    fn name(&self) -> &str;

    /// Returns the link MTU.
    fn mtu(&self) -> u16;

    /// Returns `true` once `close()` has been called.
    fn is_closed(&self) -> bool;
}

// ============================================
// DeviceAddress
// ============================================

/// Address assignment for a newly created device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceAddress {
    /// IPv4 address with netmask and gateway.
    V4 {
        /// Interface address.
        address: Ipv4Addr,
        /// Network mask.
        netmask: Ipv4Addr,
        /// Peer/gateway address.
        gateway: Ipv4Addr,
    },
    /// IPv6 address with prefix length.
    V6 {
        /// Interface address.
        address: Ipv6Addr,
        /// Prefix length in bits.
        prefix_len: u8,
    },
}

// ============================================
// DeviceConfig
// ============================================

/// Configuration for platform TUN device creation.
///
/// # Example
/// ```
/// use std::net::Ipv4Addr;
/// use tunsocks_transport::traits::{DeviceAddress, DeviceConfig};
///
/// let config = DeviceConfig::new(DeviceAddress::V4 {
///     address: Ipv4Addr::new(10, 0, 0, 2),
///     netmask: Ipv4Addr::new(255, 255, 255, 0),
///     gateway: Ipv4Addr::new(10, 0, 0, 1),
/// })
/// .with_mtu(1500);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Address to assign to the device.
    pub address: DeviceAddress,
    /// MTU size.
    pub mtu: u16,
}

impl DeviceConfig {
    /// Creates a device configuration with the default MTU.
    #[must_use]
    pub const fn new(address: DeviceAddress) -> Self {
        Self {
            address,
            mtu: DEFAULT_MTU,
        }
    }

    /// Sets the MTU.
    #[must_use]
    pub const fn with_mtu(mut self, mtu: u16) -> Self {
        self.mtu = mtu;
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    /// Returns error if configuration is invalid.
    pub fn validate(&self) -> Result<()> {
        use crate::error::TransportError;

        if self.mtu < 576 {
            return Err(TransportError::invalid_config(
                "mtu",
                "MTU must be at least 576 bytes",
            ));
        }

        if self.mtu > 9000 {
            return Err(TransportError::invalid_config(
                "mtu",
                "MTU cannot exceed 9000 bytes",
            ));
        }

        if let DeviceAddress::V6 { prefix_len, .. } = self.address {
            if prefix_len > 128 {
                return Err(TransportError::invalid_config(
                    "prefix_len",
                    "IPv6 prefix length cannot exceed 128",
                ));
            }
        }

        Ok(())
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    fn v4_config() -> DeviceConfig {
        DeviceConfig::new(DeviceAddress::V4 {
            address: Ipv4Addr::new(10, 0, 0, 2),
            netmask: Ipv4Addr::new(255, 255, 255, 0),
            gateway: Ipv4Addr::new(10, 0, 0, 1),
        })
    }

    #[test]
    fn test_device_config_defaults() {
        let config = v4_config();
        assert_eq!(config.mtu, DEFAULT_MTU);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_device_config_mtu_bounds() {
        assert!(v4_config().with_mtu(100).validate().is_err());
        assert!(v4_config().with_mtu(10000).validate().is_err());
        assert!(v4_config().with_mtu(1420).validate().is_ok());
    }

    #[test]
    fn test_device_config_v6_prefix() {
        let config = DeviceConfig::new(DeviceAddress::V6 {
            address: Ipv6Addr::LOCALHOST,
            prefix_len: 129,
        });
        assert!(config.validate().is_err());

        let config = DeviceConfig::new(DeviceAddress::V6 {
            address: Ipv6Addr::LOCALHOST,
            prefix_len: 64,
        });
        assert!(config.validate().is_ok());
    }
}
