// ============================================
// File: crates/tunsocks-core/src/proxy.rs
// ============================================
//! # Proxy Address Resolution
//!
//! ## Creation Reason
//! Host applications hand the proxy address over as a single string in
//! several shapes (`host:port`, `socks5://host:port`, a filesystem
//! path). This module normalizes all of them into one resolved
//! endpoint before the tunnel starts.
//!
//! ## Main Functionality
//! - [`ProxyEndpoint`]: resolved TCP or Unix-socket proxy location
//! - [`resolve_proxy_addr`]: string → endpoint, with DNS resolution of
//!   hostnames at call time
//!
//! ## ⚠️ Important Note for Next Developer
//! - Hostnames resolve to the FIRST returned address; re-resolution
//!   requires a reconnect
//! - A string without a scheme is treated as `socks5://<string>`
//!
//! ## Last Modified
//! v0.1.0 - Initial resolver

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use tracing::debug;
use url::Url;

use crate::error::{CoreError, Result};

// ============================================
// ProxyEndpoint
// ============================================

/// A resolved proxy server location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxyEndpoint {
    /// TCP endpoint, hostname already resolved.
    Tcp {
        /// Resolved proxy address.
        host: IpAddr,
        /// Proxy port.
        port: u16,
    },
    /// Unix domain socket endpoint.
    Unix {
        /// Filesystem path of the socket.
        path: PathBuf,
    },
}

impl ProxyEndpoint {
    /// Returns the endpoint as a socket address, if it is TCP.
    #[must_use]
    pub fn socket_addr(&self) -> Option<SocketAddr> {
        match self {
            Self::Tcp { host, port } => Some(SocketAddr::new(*host, *port)),
            Self::Unix { .. } => None,
        }
    }
}

impl std::fmt::Display for ProxyEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tcp { host, port } => write!(f, "{}", SocketAddr::new(*host, *port)),
            Self::Unix { path } => write!(f, "unix:{}", path.display()),
        }
    }
}

// ============================================
// Resolution
// ============================================

/// Resolves a proxy address string into a concrete endpoint.
///
/// Accepted shapes:
/// - `host:port` (scheme defaults to `socks5://`)
/// - `socks5://host:port`
/// - a filesystem path (`/run/proxy.sock`), resolved to a Unix socket
///
/// Hostnames are resolved through the system resolver; the first
/// returned address wins.
///
/// # Errors
/// Returns [`CoreError::InvalidProxyAddress`] for malformed input, a
/// missing port, or a hostname that resolves to nothing.
pub async fn resolve_proxy_addr(addr: &str) -> Result<ProxyEndpoint> {
    if addr.trim().is_empty() {
        return Err(CoreError::invalid_proxy_address(addr, "empty address"));
    }

    let normalized = if addr.contains("://") {
        addr.to_string()
    } else {
        format!("socks5://{}", addr)
    };

    let url = Url::parse(&normalized)
        .map_err(|e| CoreError::invalid_proxy_address(addr, e.to_string()))?;

    // Non-special schemes may report an empty-domain host for a bare
    // path; treat that the same as no host at all.
    let host = match url.host() {
        Some(url::Host::Domain(d)) if d.is_empty() => None,
        other => other,
    };

    let Some(host) = host else {
        // No authority at all: a bare filesystem path.
        let path = url.path();
        if path.is_empty() || path == "/" {
            return Err(CoreError::invalid_proxy_address(
                addr,
                "neither host nor socket path",
            ));
        }
        debug!(path, "resolved proxy address to unix socket");
        return Ok(ProxyEndpoint::Unix {
            path: PathBuf::from(path),
        });
    };

    let Some(port) = url.port() else {
        return Err(CoreError::invalid_proxy_address(addr, "missing port"));
    };

    let endpoint = match host {
        url::Host::Ipv4(ip) => ProxyEndpoint::Tcp {
            host: IpAddr::V4(ip),
            port,
        },
        url::Host::Ipv6(ip) => ProxyEndpoint::Tcp {
            host: IpAddr::V6(ip),
            port,
        },
        url::Host::Domain(domain) => {
            let resolved = tokio::net::lookup_host((domain, port))
                .await
                .map_err(|e| {
                    CoreError::invalid_proxy_address(addr, format!("DNS lookup failed: {}", e))
                })?
                .next()
                .ok_or_else(|| {
                    CoreError::invalid_proxy_address(addr, "hostname resolved to no addresses")
                })?;
            ProxyEndpoint::Tcp {
                host: resolved.ip(),
                port: resolved.port(),
            }
        }
    };

    debug!(%endpoint, input = addr, "resolved proxy address");
    Ok(endpoint)
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;

    #[tokio::test]
    async fn test_bare_host_port() {
        let endpoint = resolve_proxy_addr("127.0.0.1:1080").await.unwrap();
        assert_eq!(
            endpoint,
            ProxyEndpoint::Tcp {
                host: IpAddr::V4(Ipv4Addr::LOCALHOST),
                port: 1080,
            }
        );
    }

    #[tokio::test]
    async fn test_explicit_scheme() {
        let endpoint = resolve_proxy_addr("socks5://127.0.0.1:1080").await.unwrap();
        assert_eq!(
            endpoint.socket_addr(),
            Some("127.0.0.1:1080".parse().unwrap())
        );
    }

    #[tokio::test]
    async fn test_ipv6_host() {
        let endpoint = resolve_proxy_addr("[::1]:1080").await.unwrap();
        assert_eq!(endpoint.socket_addr(), Some("[::1]:1080".parse().unwrap()));
    }

    #[tokio::test]
    async fn test_unix_socket_path() {
        let endpoint = resolve_proxy_addr("/run/proxy.sock").await.unwrap();
        assert_eq!(
            endpoint,
            ProxyEndpoint::Unix {
                path: PathBuf::from("/run/proxy.sock"),
            }
        );
        assert!(endpoint.socket_addr().is_none());
    }

    #[tokio::test]
    async fn test_missing_port_rejected() {
        let err = resolve_proxy_addr("socks5://127.0.0.1").await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidProxyAddress { .. }));
        assert!(err.is_config_error());
    }

    #[tokio::test]
    async fn test_empty_address_rejected() {
        assert!(resolve_proxy_addr("").await.is_err());
        assert!(resolve_proxy_addr("   ").await.is_err());
    }

    #[tokio::test]
    async fn test_display() {
        let endpoint = resolve_proxy_addr("127.0.0.1:9050").await.unwrap();
        assert_eq!(endpoint.to_string(), "127.0.0.1:9050");

        let endpoint = resolve_proxy_addr("/tmp/p.sock").await.unwrap();
        assert_eq!(endpoint.to_string(), "unix:/tmp/p.sock");
    }
}
