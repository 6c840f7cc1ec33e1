// ============================================
// File: crates/tunsocks/src/error.rs
// ============================================
//! # Tunnel Error Types
//!
//! ## Creation Reason
//! Top-level error taxonomy for tunnel setup and lifecycle, wrapping
//! the transport and core layers underneath.
//!
//! ## Last Modified
//! v0.1.0 - Initial error taxonomy

use thiserror::Error;

/// Errors produced by tunnel setup and lifecycle operations.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Tunnel setup failed before the pump started.
    #[error("tunnel setup failed: {reason}")]
    Setup {
        /// Why setup failed.
        reason: String,
    },

    /// `disconnect()` was called on an already-disconnected tunnel.
    #[error("tunnel already disconnected")]
    AlreadyDisconnected,

    /// Configuration was rejected.
    #[error("invalid configuration for '{field}': {reason}")]
    InvalidConfig {
        /// Offending field.
        field: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Error from the device transport layer.
    #[error("transport error: {0}")]
    Transport(#[from] tunsocks_transport::TransportError),

    /// Error from the packet engine or proxy handlers.
    #[error("core error: {0}")]
    Core(#[from] tunsocks_core::CoreError),

    /// I/O error with context.
    #[error("I/O error during {context}: {source}")]
    Io {
        /// What we were doing when it failed.
        context: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl BridgeError {
    /// Creates a setup error.
    pub fn setup(reason: impl Into<String>) -> Self {
        Self::Setup {
            reason: reason.into(),
        }
    }

    /// Creates an invalid-config error.
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Creates an I/O error with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Returns `true` if the error only signals redundant teardown.
    #[must_use]
    pub fn is_already_disconnected(&self) -> bool {
        matches!(self, Self::AlreadyDisconnected)
    }
}

/// Result type alias for tunnel operations.
pub type Result<T> = std::result::Result<T, BridgeError>;

// ============================================
// Tests
// ============================================
