// ============================================
// File: crates/tunsocks-core/src/error.rs
// ============================================
//! # Core Error Types
//!
//! ## Creation Reason
//! Central error taxonomy for proxy address resolution, handler
//! registration, and the SOCKS5 flow handlers.
//!
//! ## Main Functionality
//! - `CoreError` enum covering resolution, connection, and protocol
//!   failures
//! - Convenience constructors and classification predicates
//!
//! ## Last Modified
//! v0.1.0 - Initial error taxonomy

use thiserror::Error;

/// Errors produced by the packet engine seams and SOCKS5 handlers.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Proxy address string could not be parsed or resolved.
    #[error("invalid proxy address '{addr}': {reason}")]
    InvalidProxyAddress {
        /// The address string as supplied by the caller.
        addr: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Connecting to the proxy endpoint failed.
    #[error("failed to connect to proxy {endpoint}: {reason}")]
    ProxyConnectFailed {
        /// Endpoint we tried to reach.
        endpoint: String,
        /// Underlying failure.
        reason: String,
    },

    /// The SOCKS5 handshake was rejected or malformed.
    #[error("SOCKS5 handshake failed: {reason}")]
    HandshakeFailed {
        /// What went wrong during the exchange.
        reason: String,
    },

    /// A packet was injected before an output sink was registered.
    #[error("no packet output registered")]
    OutputNotRegistered,

    /// The handler cannot serve this kind of proxy endpoint.
    #[error("unsupported proxy endpoint for {operation}: {endpoint}")]
    UnsupportedEndpoint {
        /// Operation that was attempted (e.g. `UDP ASSOCIATE`).
        operation: String,
        /// The offending endpoint.
        endpoint: String,
    },

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

impl CoreError {
    /// Creates an invalid-proxy-address error.
    pub fn invalid_proxy_address(addr: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidProxyAddress {
            addr: addr.into(),
            reason: reason.into(),
        }
    }

    /// Creates a proxy-connect-failed error.
    pub fn proxy_connect_failed(endpoint: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ProxyConnectFailed {
            endpoint: endpoint.into(),
            reason: reason.into(),
        }
    }

    /// Creates a handshake-failed error.
    pub fn handshake_failed(reason: impl Into<String>) -> Self {
        Self::HandshakeFailed {
            reason: reason.into(),
        }
    }

    /// Creates an unsupported-endpoint error.
    pub fn unsupported_endpoint(operation: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self::UnsupportedEndpoint {
            operation: operation.into(),
            endpoint: endpoint.into(),
        }
    }

    /// Creates an I/O error with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Returns `true` for failures worth retrying with the same input.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ProxyConnectFailed { .. } | Self::Io { .. })
    }

    /// Returns `true` for errors caused by caller-supplied input.
    #[must_use]
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidProxyAddress { .. } | Self::UnsupportedEndpoint { .. }
        )
    }
}

impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            context: "operation".to_string(),
            source: err,
        }
    }
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

// ============================================
// Tests
// ============================================
