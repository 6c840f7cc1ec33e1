// ============================================
// File: crates/tunsocks/src/memory.rs
// ============================================
//! # Memory Pressure Controller
//!
//! ## Creation Reason
//! Tunnels run inside host processes with tight memory ceilings (VPN
//! extensions in particular). This module keeps the allocator from
//! sitting on freed pages by trimming on a fixed cadence.
//!
//! ## Main Functionality
//! - Lowers the allocator trim threshold at startup
//! - Periodic `malloc_trim` task with explicit start/stop
//!
//! ## ⚠️ Important Note for Next Developer
//! - Trimming only exists on glibc targets; elsewhere the controller
//!   is a scheduling no-op and that is fine
//! - `stop()` is graceful; dropping a running controller aborts the
//!   task instead
//!
//! ## Last Modified
//! v0.1.0 - Initial controller

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace};

/// Trim threshold handed to the allocator at startup, in bytes.
#[cfg(all(target_os = "linux", target_env = "gnu"))]
const TRIM_THRESHOLD: nix::libc::c_int = 128 * 1024;

// ============================================
// MemoryReclaimer
// ============================================

/// Periodic allocator trimmer.
///
/// # Example
/// ```no_run
/// use std::time::Duration;
/// use tunsocks::memory::MemoryReclaimer;
///
/// # async fn demo() {
/// let reclaimer = MemoryReclaimer::start(Duration::from_secs(60));
/// // ... tunnel runs ...
/// reclaimer.stop().await;
/// # }
/// ```
pub struct MemoryReclaimer {
    shutdown: Arc<Notify>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl MemoryReclaimer {
    /// Tightens the allocator and starts the reclaim task.
    #[must_use]
    pub fn start(interval: Duration) -> Self {
        tighten_allocator();

        let shutdown = Arc::new(Notify::new());
        let task_shutdown = Arc::clone(&shutdown);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick fires immediately; skip it so the cadence
            // starts one full interval after startup.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = task_shutdown.notified() => break,
                    _ = ticker.tick() => reclaim(),
                }
            }
            debug!("memory reclaimer stopped");
        });

        debug!(interval_secs = interval.as_secs(), "memory reclaimer started");

        Self {
            shutdown,
            task: Mutex::new(Some(task)),
        }
    }

    /// Stops the reclaim task and waits for it to exit.
    ///
    /// Safe to call more than once; later calls are no-ops.
    pub async fn stop(&self) {
        let task = self.task.lock().take();
        if let Some(task) = task {
            // notify_one stores a permit when the task has not polled
            // its notified() yet, so the signal cannot be lost even if
            // stop() runs before the task's first poll.
            self.shutdown.notify_one();
            // The task only blocks on the select, so this is prompt.
            let _ = task.await;
        }
    }

    /// Returns `true` while the reclaim task is scheduled.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.task.lock().as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for MemoryReclaimer {
    fn drop(&mut self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }
}

// ============================================
// Allocator Hooks
// ============================================

/// One reclaim pass: hand freed pages back to the kernel.
fn reclaim() {
    #[cfg(all(target_os = "linux", target_env = "gnu"))]
    {
        let rc = unsafe { nix::libc::malloc_trim(0) };
        trace!(released = rc == 1, "malloc_trim pass");
    }
    #[cfg(not(all(target_os = "linux", target_env = "gnu")))]
    {
        trace!("reclaim pass (no allocator hook on this target)");
    }
}

/// Lowers the allocator trim threshold so freed memory is returned
/// without waiting for the periodic pass.
fn tighten_allocator() {
    #[cfg(all(target_os = "linux", target_env = "gnu"))]
    {
        let rc = unsafe { nix::libc::mallopt(nix::libc::M_TRIM_THRESHOLD, TRIM_THRESHOLD) };
        debug!(ok = rc == 1, threshold = TRIM_THRESHOLD, "set trim threshold");
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_start_and_stop() {
        let reclaimer = MemoryReclaimer::start(Duration::from_millis(10));
        assert!(reclaimer.is_running());

        // Let a few passes happen.
        tokio::time::sleep(Duration::from_millis(50)).await;

        reclaimer.stop().await;
        assert!(!reclaimer.is_running());
    }

    #[tokio::test]
    async fn test_stop_before_first_poll() {
        // stop() immediately after start(), before the spawned task has
        // ever been polled. The shutdown signal must not be lost.
        let reclaimer = MemoryReclaimer::start(Duration::from_secs(60));
        tokio::time::timeout(Duration::from_secs(2), reclaimer.stop())
            .await
            .expect("stop() hung: shutdown notification lost");
        assert!(!reclaimer.is_running());
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let reclaimer = MemoryReclaimer::start(Duration::from_secs(60));
        reclaimer.stop().await;
        reclaimer.stop().await;
        assert!(!reclaimer.is_running());
    }

    #[tokio::test]
    async fn test_drop_aborts_running_task() {
        let reclaimer = MemoryReclaimer::start(Duration::from_secs(60));
        assert!(reclaimer.is_running());
        drop(reclaimer);
        // Nothing to assert beyond not hanging; the abort is fire-and-forget.
    }

    #[test]
    fn test_reclaim_is_safe_to_call_directly() {
        reclaim();
        tighten_allocator();
    }
}
