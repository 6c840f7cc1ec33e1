// ============================================
// File: crates/tunsocks/src/tunnel.rs
// ============================================
//! # Tunnel Handle
//!
//! ## Creation Reason
//! The host application's handle to a running tunnel: owns the device,
//! the pump task, and the memory reclaimer, and tears all three down in
//! one `disconnect()` call.
//!
//! ## Main Functionality
//! - `disconnect()`: close device → stop reclaimer → join pump
//! - Status accessors for the host application
//!
//! ## ⚠️ Important Note for Next Developer
//! - Disconnecting twice surfaces `AlreadyDisconnected`; callers
//!   tearing down defensively can ignore it via
//!   `is_already_disconnected()`
//!
//! ## Last Modified
//! v0.1.0 - Initial handle

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use tunsocks_core::PacketStack;
use tunsocks_transport::TunDevice;

use crate::error::{BridgeError, Result};
use crate::memory::MemoryReclaimer;

/// How long `disconnect()` waits for the pump task before aborting it.
const PUMP_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================
// Tunnel
// ============================================

/// Handle to a running tunnel.
///
/// Created by [`connect`](crate::connect::connect) or
/// [`connect_fd`](crate::connect::connect_fd); the tunnel runs until
/// [`disconnect`](Self::disconnect) is called or the device dies.
pub struct Tunnel {
    device: Arc<dyn TunDevice>,
    stack: Arc<dyn PacketStack>,
    pump: Mutex<Option<JoinHandle<()>>>,
    reclaimer: Option<MemoryReclaimer>,
    disconnected: AtomicBool,
}

impl Tunnel {
    pub(crate) fn new(
        device: Arc<dyn TunDevice>,
        stack: Arc<dyn PacketStack>,
        pump: JoinHandle<()>,
        reclaimer: Option<MemoryReclaimer>,
    ) -> Self {
        Self {
            device,
            stack,
            pump: Mutex::new(Some(pump)),
            reclaimer,
            disconnected: AtomicBool::new(false),
        }
    }

    /// Tears the tunnel down: closes the device, stops the memory
    /// reclaimer, and waits for the pump task to exit.
    ///
    /// # Errors
    /// Returns [`BridgeError::AlreadyDisconnected`] on the second and
    /// later calls.
    pub async fn disconnect(&self) -> Result<()> {
        if self.disconnected.swap(true, Ordering::AcqRel) {
            return Err(BridgeError::AlreadyDisconnected);
        }

        info!(device = self.device.name(), "disconnecting tunnel");

        // Closing the device is what stops the pump; a device that
        // already died on its own reports closed here, which is fine.
        if let Err(e) = self.device.close().await {
            if !e.is_closed() {
                warn!(error = %e, "device close failed during disconnect");
            }
        }

        if let Some(reclaimer) = &self.reclaimer {
            reclaimer.stop().await;
        }

        let pump = self.pump.lock().take();
        if let Some(mut pump) = pump {
            tokio::select! {
                _ = &mut pump => {}
                _ = tokio::time::sleep(PUMP_JOIN_TIMEOUT) => {
                    warn!("pump task did not exit in time, aborting");
                    pump.abort();
                }
            }
        }

        info!(device = self.device.name(), "tunnel disconnected");
        Ok(())
    }

    /// Returns the underlying device name.
    #[must_use]
    pub fn device_name(&self) -> &str {
        self.device.name()
    }

    /// Returns `true` while the tunnel is up.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        !self.disconnected.load(Ordering::Acquire) && !self.device.is_closed()
    }

    /// Returns the packet stack this tunnel drives.
    #[must_use]
    pub fn stack(&self) -> &Arc<dyn PacketStack> {
        &self.stack
    }
}

impl std::fmt::Debug for Tunnel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tunnel")
            .field("device", &self.device.name())
            .field("connected", &self.is_connected())
            .finish()
    }
}
