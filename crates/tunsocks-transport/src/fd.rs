// ============================================
// File: crates/tunsocks-transport/src/fd.rs
// ============================================
//! # File-Descriptor Backed Device
//!
//! ## Creation Reason
//! Host applications (VPN extensions in particular) hand us an
//! already-open TUN file descriptor rather than letting us create the
//! interface. This module turns such a descriptor into a `TunDevice`.
//!
//! ## Main Functionality
//! - Duplicates the caller's descriptor so their fd lifecycle stays
//!   independent of ours
//! - Sets non-blocking mode and drives the fd with Tokio's `AsyncFd`
//! - `close()` unblocks pending reads and releases the duplicate
//!   immediately
//!
//! ## ⚠️ Important Note for Next Developer
//! - The duplicated fd is dropped inside `close()`, not at `Drop` time;
//!   in-flight reads observe the close flag first, then the descriptor
//!   goes away
//! - The `notified()` future must be created BEFORE the closed-flag
//!   check; `notify_waiters()` only reaches futures that already exist,
//!   so the other order can sleep through a concurrent `close()`
//! - A zero-byte read from the kernel is treated as the device going
//!   away, not as an empty packet
//!
//! ## Last Modified
//! v0.1.1 - Close releases the descriptor eagerly
//! v0.1.0 - Initial fd-backed device

#![cfg(unix)]

use std::fs::File;
use std::os::unix::io::{AsRawFd, FromRawFd, RawFd};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use nix::libc;
use tokio::io::unix::AsyncFd;
use tokio::io::Interest;
use tokio::sync::{Notify, RwLock};
use tracing::debug;

use crate::error::{Result, TransportError};
use crate::traits::{TunDevice, DEFAULT_MTU};

// ============================================
// FdTun
// ============================================

/// TUN device over a caller-supplied raw file descriptor.
///
/// # Example
/// ```ignore
/// let tun = FdTun::from_raw_fd(tun_fd)?;
/// let mut buf = [0u8; 1504];
/// let len = tun.read(&mut buf).await?;
/// ```
pub struct FdTun {
    /// Async wrapper around the duplicated descriptor. `close()` takes
    /// it out and drops it; reads and writes hold read locks only, so
    /// the two directions stay concurrent.
    async_fd: RwLock<Option<AsyncFd<File>>>,
    /// Device name; fd-backed devices cannot recover the interface name.
    name: String,
    /// Link MTU reported to callers.
    mtu: u16,
    /// Whether `close()` has been called.
    closed: AtomicBool,
    /// Wakes tasks blocked in `read()` or `write()` when the device
    /// closes.
    close_notify: Notify,
}

impl FdTun {
    /// Creates a device from a raw file descriptor.
    ///
    /// The descriptor is duplicated and the duplicate switched to
    /// non-blocking mode; the caller keeps ownership of the original.
    ///
    /// # Errors
    /// - `DeviceOpenFailed` if duplication or flag manipulation fails
    pub fn from_raw_fd(raw: RawFd) -> Result<Self> {
        let dup = unsafe { libc::dup(raw) };
        if dup < 0 {
            return Err(TransportError::device_open_failed(format!(
                "dup failed: {}",
                std::io::Error::last_os_error()
            )));
        }

        // From here on the duplicate must not leak.
        let file = unsafe { File::from_raw_fd(dup) };

        let flags = unsafe { libc::fcntl(dup, libc::F_GETFL) };
        if flags < 0 {
            return Err(TransportError::device_open_failed(format!(
                "F_GETFL failed: {}",
                std::io::Error::last_os_error()
            )));
        }

        let result = unsafe { libc::fcntl(dup, libc::F_SETFL, flags | libc::O_NONBLOCK) };
        if result < 0 {
            return Err(TransportError::device_open_failed(format!(
                "F_SETFL failed: {}",
                std::io::Error::last_os_error()
            )));
        }

        let async_fd = AsyncFd::new(file).map_err(|e| {
            TransportError::device_open_failed(format!("AsyncFd registration failed: {}", e))
        })?;

        debug!(fd = raw, dup, "opened fd-backed TUN device");

        Ok(Self {
            async_fd: RwLock::new(Some(async_fd)),
            name: "tun".to_string(),
            mtu: DEFAULT_MTU,
            closed: AtomicBool::new(false),
            close_notify: Notify::new(),
        })
    }

    /// Overrides the reported MTU.
    #[must_use]
    pub fn with_mtu(mut self, mtu: u16) -> Self {
        self.mtu = mtu;
        self
    }

    /// Overrides the reported device name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

#[async_trait]
impl TunDevice for FdTun {
    async fn read(&self, buf: &mut [u8]) -> Result<usize> {
        let slot = self.async_fd.read().await;
        let Some(async_fd) = slot.as_ref() else {
            return Err(TransportError::DeviceClosed);
        };

        loop {
            // Created before the flag check so a close() landing in
            // between still wakes this waiter.
            let closed_wait = self.close_notify.notified();
            if self.closed.load(Ordering::Acquire) {
                return Err(TransportError::DeviceClosed);
            }

            tokio::select! {
                _ = closed_wait => {
                    return Err(TransportError::DeviceClosed);
                }
                ready = async_fd.ready(Interest::READABLE) => {
                    let mut guard = ready.map_err(|e| TransportError::DeviceReadFailed {
                        reason: e.to_string(),
                    })?;

                    match guard.try_io(|inner| {
                        let fd = inner.get_ref().as_raw_fd();
                        let result = unsafe {
                            libc::read(fd, buf.as_mut_ptr().cast(), buf.len())
                        };
                        if result < 0 {
                            Err(std::io::Error::last_os_error())
                        } else {
                            Ok(result as usize)
                        }
                    }) {
                        Ok(Ok(0)) => return Err(TransportError::DeviceClosed),
                        Ok(Ok(len)) => return Ok(len),
                        Ok(Err(e)) => {
                            return Err(TransportError::DeviceReadFailed {
                                reason: e.to_string(),
                            })
                        }
                        Err(_would_block) => continue,
                    }
                }
            }
        }
    }

    async fn write(&self, buf: &[u8]) -> Result<usize> {
        let slot = self.async_fd.read().await;
        let Some(async_fd) = slot.as_ref() else {
            return Err(TransportError::DeviceClosed);
        };

        loop {
            let closed_wait = self.close_notify.notified();
            if self.closed.load(Ordering::Acquire) {
                return Err(TransportError::DeviceClosed);
            }

            tokio::select! {
                _ = closed_wait => {
                    return Err(TransportError::DeviceClosed);
                }
                ready = async_fd.ready(Interest::WRITABLE) => {
                    let mut guard = ready.map_err(|e| TransportError::DeviceWriteFailed {
                        reason: e.to_string(),
                    })?;

                    match guard.try_io(|inner| {
                        let fd = inner.get_ref().as_raw_fd();
                        let result =
                            unsafe { libc::write(fd, buf.as_ptr().cast(), buf.len()) };
                        if result < 0 {
                            Err(std::io::Error::last_os_error())
                        } else {
                            Ok(result as usize)
                        }
                    }) {
                        Ok(Ok(len)) => return Ok(len),
                        Ok(Err(e)) => {
                            return Err(TransportError::DeviceWriteFailed {
                                reason: e.to_string(),
                            })
                        }
                        Err(_would_block) => continue,
                    }
                }
            }
        }
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(TransportError::DeviceClosed);
        }
        self.close_notify.notify_waiters();

        // In-flight reads and writes hold read locks; they observe the
        // flag or the wakeup and return, then the descriptor can go.
        self.async_fd.write().await.take();

        debug!(name = %self.name, "closed fd-backed TUN device");
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn mtu(&self) -> u16 {
        self.mtu
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for FdTun {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FdTun")
            .field("name", &self.name)
            .field("closed", &self.is_closed())
            .finish()
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    /// Creates a unix pipe; pipes register with epoll just like TUN fds.
    fn pipe() -> (RawFd, RawFd) {
        let mut fds = [0 as libc::c_int; 2];
        let rc = unsafe { libc::pipe(fds.as_mut_ptr()) };
        assert_eq!(rc, 0, "pipe() failed");
        (fds[0], fds[1])
    }

    fn close_fd(fd: RawFd) {
        unsafe { libc::close(fd) };
    }

    #[tokio::test]
    async fn test_read_from_duplicated_fd() {
        let (read_fd, write_fd) = pipe();
        let tun = FdTun::from_raw_fd(read_fd).unwrap();

        // The caller's descriptor can be closed; ours is a duplicate.
        close_fd(read_fd);

        let payload = b"raw bytes";
        let written =
            unsafe { libc::write(write_fd, payload.as_ptr().cast(), payload.len()) };
        assert_eq!(written, payload.len() as isize);

        let mut buf = [0u8; 64];
        let len = tun.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..len], payload);

        close_fd(write_fd);
    }

    #[tokio::test]
    async fn test_write_through_fd() {
        let (read_fd, write_fd) = pipe();
        let tun = FdTun::from_raw_fd(write_fd).unwrap();
        close_fd(write_fd);

        let len = tun.write(b"out").await.unwrap();
        assert_eq!(len, 3);

        let mut buf = [0u8; 8];
        let n = unsafe { libc::read(read_fd, buf.as_mut_ptr().cast(), buf.len()) };
        assert_eq!(n, 3);
        assert_eq!(&buf[..3], b"out");

        close_fd(read_fd);
    }

    #[tokio::test]
    async fn test_close_unblocks_pending_read() {
        let (read_fd, write_fd) = pipe();
        let tun = Arc::new(FdTun::from_raw_fd(read_fd).unwrap());
        close_fd(read_fd);

        let reader = Arc::clone(&tun);
        let task = tokio::spawn(async move {
            let mut buf = [0u8; 64];
            reader.read(&mut buf).await
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        tun.close().await.unwrap();

        let result = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("reader did not unblock")
            .unwrap();
        assert!(matches!(result, Err(TransportError::DeviceClosed)));

        close_fd(write_fd);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_close_races_with_read_startup() {
        // close() fires while the reader may be anywhere between the
        // closed-flag check and parking on the notification; every
        // iteration must unblock regardless of where it lands.
        for _ in 0..50 {
            let (read_fd, write_fd) = pipe();
            let tun = Arc::new(FdTun::from_raw_fd(read_fd).unwrap());
            close_fd(read_fd);

            let reader = Arc::clone(&tun);
            let task = tokio::spawn(async move {
                let mut buf = [0u8; 16];
                reader.read(&mut buf).await
            });

            tun.close().await.unwrap();

            let result = tokio::time::timeout(Duration::from_secs(1), task)
                .await
                .expect("reader slept through close()")
                .unwrap();
            assert!(matches!(result, Err(TransportError::DeviceClosed)));

            close_fd(write_fd);
        }
    }

    #[tokio::test]
    async fn test_close_releases_descriptor() {
        let (read_fd, write_fd) = pipe();
        let tun = FdTun::from_raw_fd(read_fd).unwrap();
        close_fd(read_fd);

        tun.close().await.unwrap();

        // The duplicate is gone too, so the pipe has no readers left
        // and a write must fail with EPIPE immediately.
        let rc = unsafe { libc::write(write_fd, b"x".as_ptr().cast(), 1) };
        assert_eq!(rc, -1);
        assert_eq!(
            std::io::Error::last_os_error().raw_os_error(),
            Some(libc::EPIPE)
        );

        close_fd(write_fd);
    }

    #[tokio::test]
    async fn test_eof_reported_as_closed() {
        let (read_fd, write_fd) = pipe();
        let tun = FdTun::from_raw_fd(read_fd).unwrap();
        close_fd(read_fd);
        close_fd(write_fd);

        let mut buf = [0u8; 64];
        let err = tun.read(&mut buf).await.unwrap_err();
        assert!(err.is_closed());
    }

    #[tokio::test]
    async fn test_double_close() {
        let (read_fd, write_fd) = pipe();
        let tun = FdTun::from_raw_fd(read_fd).unwrap();
        close_fd(read_fd);
        close_fd(write_fd);

        tun.close().await.unwrap();
        assert!(matches!(
            tun.close().await,
            Err(TransportError::DeviceClosed)
        ));
    }

    #[tokio::test]
    async fn test_read_after_close_fails() {
        let (read_fd, write_fd) = pipe();
        let tun = FdTun::from_raw_fd(read_fd).unwrap();
        close_fd(read_fd);
        close_fd(write_fd);

        tun.close().await.unwrap();
        let mut buf = [0u8; 16];
        assert!(matches!(
            tun.read(&mut buf).await,
            Err(TransportError::DeviceClosed)
        ));
    }

    #[tokio::test]
    async fn test_invalid_fd_rejected() {
        assert!(matches!(
            FdTun::from_raw_fd(-1),
            Err(TransportError::DeviceOpenFailed { .. })
        ));
    }
}
