// ============================================
// File: crates/tunsocks-transport/src/error.rs
// ============================================
//! # Transport Error Types
//!
//! ## Creation Reason
//! Defines error types for device I/O and packet framing, the two
//! failure domains of this crate.
//!
//! ## Main Functionality
//! - `TransportError`: primary error enum for transport operations
//! - Conversion from system I/O errors
//! - Classification of framing errors vs device errors
//!
//! ## Error Categories
//! 1. **Framing Errors**: short reads, bad IP version, empty payload;
//!    these abort a single packet operation, never the whole tunnel
//! 2. **Device Errors**: open/configure/read/write/close failures
//! 3. **Configuration Errors**: invalid device settings
//!
//! ## ⚠️ Important Note for Next Developer
//! - The packet pump relies on `is_framing_error()` to decide whether
//!   to drop one packet or to stop pumping entirely
//! - Device errors usually mean the handle was closed or revoked
//!
//! ## Last Modified
//! v0.1.0 - Initial error definitions

use std::io;

use thiserror::Error;

// ============================================
// Result Type Alias
// ============================================

/// Result type for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

// ============================================
// TransportError
// ============================================

/// Transport layer error types.
///
/// # Categories
/// - **Framing**: per-packet codec failures
/// - **Device**: TUN handle failures
/// - **Config**: invalid device configuration
#[derive(Error, Debug)]
pub enum TransportError {
    // ========================================
    // Framing Errors
    // ========================================

    /// Device delivered fewer bytes than the framing header needs.
    #[error("Short read: got {len} bytes, need at least {min}")]
    ShortRead {
        /// Bytes actually available
        len: usize,
        /// Minimum bytes required
        min: usize,
    },

    /// Outbound packet does not start with a recognizable IP header.
    #[error("Unknown IP version {version} (expected 4 or 6)")]
    UnknownIpVersion {
        /// Value of the version nibble
        version: u8,
    },

    /// Outbound packet was empty; a zero-byte write is rejected outright.
    #[error("Refusing to frame an empty packet")]
    EmptyPacket,

    // ========================================
    // Device Errors
    // ========================================

    /// Failed to open or duplicate a device handle.
    #[error("Failed to open device: {reason}")]
    DeviceOpenFailed {
        /// Why opening failed
        reason: String,
    },

    /// Failed to configure a device (address, MTU, routes).
    #[error("Failed to configure device '{name}': {reason}")]
    DeviceConfigFailed {
        /// Device name
        name: String,
        /// Why configuration failed
        reason: String,
    },

    /// Device read failed.
    #[error("Device read failed: {reason}")]
    DeviceReadFailed {
        /// Why the read failed
        reason: String,
    },

    /// Device write failed.
    #[error("Device write failed: {reason}")]
    DeviceWriteFailed {
        /// Why the write failed
        reason: String,
    },

    /// Operation on a device that has already been closed.
    ///
    /// A second `close()` surfaces this; callers tearing a tunnel down
    /// may ignore it.
    #[error("Device is closed")]
    DeviceClosed,

    /// Permission denied for a privileged device operation.
    #[error("Permission denied: {operation}")]
    PermissionDenied {
        /// What operation was denied
        operation: String,
    },

    // ========================================
    // Configuration Errors
    // ========================================

    /// Invalid device configuration.
    #[error("Invalid configuration: {field} - {reason}")]
    InvalidConfig {
        /// Configuration field name
        field: String,
        /// Why it's invalid
        reason: String,
    },

    // ========================================
    // Wrapped Errors
    // ========================================

    /// I/O error from the system.
    #[error("I/O error: {context}")]
    Io {
        /// What was happening when the error occurred
        context: String,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },
}

impl TransportError {
    // ========================================
    // Convenience Constructors
    // ========================================

    /// Creates a `DeviceOpenFailed` error.
    pub fn device_open_failed(reason: impl Into<String>) -> Self {
        Self::DeviceOpenFailed {
            reason: reason.into(),
        }
    }

    /// Creates a `DeviceConfigFailed` error.
    pub fn device_config_failed(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::DeviceConfigFailed {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Creates a `DeviceReadFailed` error.
    pub fn device_read_failed(reason: impl Into<String>) -> Self {
        Self::DeviceReadFailed {
            reason: reason.into(),
        }
    }

    /// Creates a `DeviceWriteFailed` error.
    pub fn device_write_failed(reason: impl Into<String>) -> Self {
        Self::DeviceWriteFailed {
            reason: reason.into(),
        }
    }

    /// Creates an `Io` error with context.
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Creates an `InvalidConfig` error.
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }

    // ========================================
    // Error Classification
    // ========================================

    /// Returns `true` if this error affects only a single packet.
    ///
    /// The packet pump drops the offending packet and keeps running
    /// when this returns `true`.
    #[must_use]
    pub const fn is_framing_error(&self) -> bool {
        matches!(
            self,
            Self::ShortRead { .. } | Self::UnknownIpVersion { .. } | Self::EmptyPacket
        )
    }

    /// Returns `true` if this error came from the device handle itself.
    #[must_use]
    pub const fn is_device_error(&self) -> bool {
        matches!(
            self,
            Self::DeviceOpenFailed { .. }
                | Self::DeviceConfigFailed { .. }
                | Self::DeviceReadFailed { .. }
                | Self::DeviceWriteFailed { .. }
                | Self::DeviceClosed
        )
    }

    /// Returns `true` if the device was deliberately closed.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        matches!(self, Self::DeviceClosed)
    }
}

// ============================================
// Error Conversions
// ============================================

impl From<io::Error> for TransportError {
    fn from(err: io::Error) -> Self {
        Self::Io {
            context: "unspecified I/O operation".into(),
            source: err,
        }
    }
}

// ============================================
// Tests
// ============================================
