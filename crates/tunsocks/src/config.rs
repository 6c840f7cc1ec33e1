// ============================================
// File: crates/tunsocks/src/config.rs
// ============================================
//! # Tunnel Configuration
//!
//! ## Creation Reason
//! One place for everything a tunnel needs at setup time: the proxy
//! address, UDP relay policy, device MTU, and memory reclaim cadence.
//! Loadable from TOML so host applications can ship a config file.
//!
//! ## Main Functionality
//! - `TunnelConfig` with nested sections, all fields defaulted
//! - Async TOML loading and validation
//!
//! ## Last Modified
//! v0.1.0 - Initial configuration

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{BridgeError, Result};

// ============================================
// Sections
// ============================================

/// Proxy server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Proxy address: `host:port`, `socks5://host:port`, or a
    /// filesystem path for a Unix socket.
    pub addr: String,
}

/// UDP relay settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UdpConfig {
    /// Whether intercepted UDP flows are relayed at all.
    pub enabled: bool,
    /// Seconds of silence before an association is torn down.
    pub idle_timeout_secs: u64,
}

impl Default for UdpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            idle_timeout_secs: 30,
        }
    }
}

/// Device settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfigSection {
    /// Link MTU used for pump read buffers.
    pub mtu: u16,
}

impl Default for DeviceConfigSection {
    fn default() -> Self {
        Self { mtu: 1500 }
    }
}

/// Memory reclaim settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Whether the periodic reclaimer runs at all.
    pub enabled: bool,
    /// Seconds between reclaim passes.
    pub reclaim_interval_secs: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            reclaim_interval_secs: 60,
        }
    }
}

// ============================================
// TunnelConfig
// ============================================

/// Complete tunnel configuration.
///
/// # Example
/// ```
/// use tunsocks::config::TunnelConfig;
///
/// let config = TunnelConfig::new("127.0.0.1:1080");
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TunnelConfig {
    /// Proxy server settings.
    pub proxy: ProxyConfig,
    /// UDP relay settings.
    #[serde(default)]
    pub udp: UdpConfig,
    /// Device settings.
    #[serde(default)]
    pub device: DeviceConfigSection,
    /// Memory reclaim settings.
    #[serde(default)]
    pub memory: MemoryConfig,
}

impl TunnelConfig {
    /// Creates a configuration with defaults for everything but the
    /// proxy address.
    #[must_use]
    pub fn new(proxy_addr: impl Into<String>) -> Self {
        Self {
            proxy: ProxyConfig {
                addr: proxy_addr.into(),
            },
            udp: UdpConfig::default(),
            device: DeviceConfigSection::default(),
            memory: MemoryConfig::default(),
        }
    }

    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    /// Returns error if the file cannot be read, parsed, or validated.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| BridgeError::io(format!("reading {}", path.display()), e))?;

        let config: Self = toml::from_str(&contents)
            .map_err(|e| BridgeError::invalid_config("file", e.to_string()))?;

        config.validate()?;
        debug!(path = %path.display(), "loaded tunnel configuration");
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    /// Returns error if any field is out of range.
    pub fn validate(&self) -> Result<()> {
        if self.proxy.addr.trim().is_empty() {
            return Err(BridgeError::invalid_config(
                "proxy.addr",
                "proxy address cannot be empty",
            ));
        }

        if self.device.mtu < 576 {
            return Err(BridgeError::invalid_config(
                "device.mtu",
                "MTU must be at least 576 bytes",
            ));
        }
        if self.device.mtu > 9000 {
            return Err(BridgeError::invalid_config(
                "device.mtu",
                "MTU cannot exceed 9000 bytes",
            ));
        }

        if self.udp.enabled && self.udp.idle_timeout_secs == 0 {
            return Err(BridgeError::invalid_config(
                "udp.idle_timeout_secs",
                "idle timeout must be positive",
            ));
        }

        if self.memory.enabled && self.memory.reclaim_interval_secs == 0 {
            return Err(BridgeError::invalid_config(
                "memory.reclaim_interval_secs",
                "reclaim interval must be positive",
            ));
        }

        Ok(())
    }

    /// UDP idle timeout as a [`Duration`].
    #[must_use]
    pub fn udp_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.udp.idle_timeout_secs)
    }

    /// Memory reclaim interval as a [`Duration`].
    #[must_use]
    pub fn reclaim_interval(&self) -> Duration {
        Duration::from_secs(self.memory.reclaim_interval_secs)
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TunnelConfig::new("127.0.0.1:1080");
        assert!(config.udp.enabled);
        assert_eq!(config.udp.idle_timeout_secs, 30);
        assert_eq!(config.device.mtu, 1500);
        assert_eq!(config.memory.reclaim_interval_secs, 60);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_toml() {
        let config: TunnelConfig = toml::from_str(
            r#"
            [proxy]
            addr = "socks5://10.0.0.1:9050"

            [udp]
            enabled = false
            "#,
        )
        .unwrap();

        assert_eq!(config.proxy.addr, "socks5://10.0.0.1:9050");
        assert!(!config.udp.enabled);
        // Untouched sections keep their defaults.
        assert_eq!(config.device.mtu, 1500);
        assert!(config.memory.enabled);
    }

    #[test]
    fn test_validation_bounds() {
        let mut config = TunnelConfig::new("127.0.0.1:1080");
        config.device.mtu = 100;
        assert!(config.validate().is_err());

        let mut config = TunnelConfig::new("127.0.0.1:1080");
        config.udp.idle_timeout_secs = 0;
        assert!(config.validate().is_err());

        let config = TunnelConfig::new("   ");
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let dir = std::env::temp_dir().join("tunsocks-config-test");
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let path = dir.join("tunnel.toml");
        tokio::fs::write(
            &path,
            r#"
            [proxy]
            addr = "127.0.0.1:1080"

            [memory]
            reclaim_interval_secs = 120
            "#,
        )
        .await
        .unwrap();

        let config = TunnelConfig::load(&path).await.unwrap();
        assert_eq!(config.reclaim_interval(), Duration::from_secs(120));

        tokio::fs::remove_file(&path).await.unwrap();
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let err = TunnelConfig::load("/nonexistent/tunnel.toml")
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::Io { .. }));
    }
}
