// ============================================
// File: crates/tunsocks-transport/src/darwin.rs
// ============================================
//! # Darwin utun Device
//!
//! ## Creation Reason
//! macOS has no `/dev/net/tun`; TUN interfaces are created by
//! connecting a PF_SYSTEM control socket to the kernel's
//! `com.apple.net.utun_control` provider. This module creates such a
//! device and assigns its address with `ifconfig`.
//!
//! ## Main Functionality
//! - utun creation via the system-control socket
//! - Interface name recovery via `UTUN_OPT_IFNAME`
//! - IPv4 (address + netmask + gateway) and IPv6 (address/prefix)
//!   configuration by shelling out to `ifconfig`
//!
//! ## Darwin utun Interface
//! 1. `socket(PF_SYSTEM, SOCK_DGRAM, SYSPROTO_CONTROL)`
//! 2. `CTLIOCGINFO` ioctl to look up the utun control id
//! 3. `connect()` with `sc_unit = 0` so the kernel picks a unit
//! 4. `getsockopt(UTUN_OPT_IFNAME)` for the interface name
//! 5. Read/write framed IP packets (4-byte AF header, see `framing`)
//!
//! ## ⚠️ Important Note for Next Developer
//! - utun packets always carry the 4-byte address-family header; wrap
//!   the device in `FramedTun` before handing it to the engine
//! - `ifconfig` needs root; failures surface the command's output
//! - `close()` drops the control socket, destroying the interface; the
//!   `notified()` future is created before the closed-flag check so a
//!   racing `close()` cannot strand a reader (`notify_waiters()` only
//!   reaches futures that already exist)
//!
//! ## Last Modified
//! v0.1.1 - Close releases the control socket eagerly
//! v0.1.0 - Initial Darwin implementation

#![cfg(any(target_os = "macos", target_os = "ios"))]

use std::fs::File;
use std::mem;
use std::os::unix::io::{AsRawFd, FromRawFd};
use std::process::Command;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use nix::libc;
use tokio::io::unix::AsyncFd;
use tokio::io::Interest;
use tokio::sync::{Notify, RwLock};
use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::traits::{DeviceAddress, DeviceConfig, TunDevice};

// ============================================
// Constants
// ============================================

/// Kernel control provider for utun devices.
const UTUN_CONTROL_NAME: &[u8] = b"com.apple.net.utun_control";

/// `getsockopt` option returning the interface name.
const UTUN_OPT_IFNAME: libc::c_int = 2;

/// Address family for system-control socket addresses.
const AF_SYS_CONTROL: u16 = 2;

/// `CTLIOCGINFO` ioctl number.
const CTLIOCGINFO: libc::c_ulong = 0xC064_4E03;

// ============================================
// Control Structures
// ============================================

/// `struct ctl_info` for the `CTLIOCGINFO` ioctl.
#[repr(C)]
struct CtlInfo {
    ctl_id: u32,
    ctl_name: [libc::c_char; 96],
}

impl CtlInfo {
    fn utun() -> Self {
        let mut info = Self {
            ctl_id: 0,
            ctl_name: [0; 96],
        };
        for (i, &byte) in UTUN_CONTROL_NAME.iter().enumerate() {
            info.ctl_name[i] = byte as libc::c_char;
        }
        info
    }
}

/// `struct sockaddr_ctl` used to connect to the utun provider.
#[repr(C)]
struct SockaddrCtl {
    sc_len: u8,
    sc_family: u8,
    ss_sysaddr: u16,
    sc_id: u32,
    sc_unit: u32,
    sc_reserved: [u32; 5],
}

// ============================================
// DarwinTun
// ============================================

/// Darwin utun device.
///
/// Packets read from and written to this device carry the 4-byte
/// address-family header; wrap it in
/// [`FramedTun`](crate::framing::FramedTun) for plain IP packets.
pub struct DarwinTun {
    /// Async wrapper around the control socket. `close()` takes it out
    /// and drops it, destroying the interface; reads and writes hold
    /// read locks only.
    async_fd: RwLock<Option<AsyncFd<File>>>,
    /// Interface name assigned by the kernel (e.g. `utun3`).
    name: String,
    /// Link MTU.
    mtu: u16,
    /// Whether `close()` has been called.
    closed: AtomicBool,
    /// Wakes tasks blocked in `read()` when the device closes.
    close_notify: Notify,
}

impl DarwinTun {
    /// Creates a new utun device, letting the kernel pick the unit.
    ///
    /// # Errors
    /// - `DeviceOpenFailed` if socket creation or control lookup fails
    /// - `PermissionDenied` without the needed entitlements
    pub fn create(config: &DeviceConfig) -> Result<Self> {
        config.validate()?;

        let fd = unsafe {
            libc::socket(libc::PF_SYSTEM, libc::SOCK_DGRAM, libc::SYSPROTO_CONTROL)
        };
        if fd < 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::PermissionDenied {
                return Err(TransportError::PermissionDenied {
                    operation: "open utun control socket".into(),
                });
            }
            return Err(TransportError::device_open_failed(format!(
                "control socket failed: {}",
                err
            )));
        }

        // The File owns the fd from here on.
        let file = unsafe { File::from_raw_fd(fd) };

        let mut info = CtlInfo::utun();
        let rc = unsafe { libc::ioctl(fd, CTLIOCGINFO, &mut info) };
        if rc < 0 {
            return Err(TransportError::device_open_failed(format!(
                "CTLIOCGINFO failed: {}",
                std::io::Error::last_os_error()
            )));
        }

        let addr = SockaddrCtl {
            sc_len: mem::size_of::<SockaddrCtl>() as u8,
            sc_family: libc::AF_SYSTEM as u8,
            ss_sysaddr: AF_SYS_CONTROL,
            sc_id: info.ctl_id,
            // Zero lets the kernel allocate the next free utun unit.
            sc_unit: 0,
            sc_reserved: [0; 5],
        };

        let rc = unsafe {
            libc::connect(
                fd,
                std::ptr::addr_of!(addr).cast(),
                mem::size_of::<SockaddrCtl>() as libc::socklen_t,
            )
        };
        if rc < 0 {
            return Err(TransportError::device_open_failed(format!(
                "utun connect failed: {}",
                std::io::Error::last_os_error()
            )));
        }

        let name = utun_ifname(fd)?;
        debug!(name = %name, "created utun device");

        let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
        if flags < 0 {
            return Err(TransportError::device_open_failed(
                "F_GETFL failed".to_string(),
            ));
        }
        let rc = unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) };
        if rc < 0 {
            return Err(TransportError::device_open_failed(
                "F_SETFL failed".to_string(),
            ));
        }

        let async_fd = AsyncFd::new(file).map_err(|e| {
            TransportError::device_open_failed(format!("AsyncFd registration failed: {}", e))
        })?;

        let tun = Self {
            async_fd: RwLock::new(Some(async_fd)),
            name,
            mtu: config.mtu,
            closed: AtomicBool::new(false),
            close_notify: Notify::new(),
        };

        tun.configure_address(&config.address)?;
        info!(name = %tun.name, mtu = tun.mtu, "utun device configured");

        Ok(tun)
    }

    /// Assigns the interface address with `ifconfig`.
    fn configure_address(&self, address: &DeviceAddress) -> Result<()> {
        let args: Vec<String> = match address {
            DeviceAddress::V4 {
                address,
                netmask,
                gateway,
            } => vec![
                self.name.clone(),
                "inet".into(),
                address.to_string(),
                "netmask".into(),
                netmask.to_string(),
                gateway.to_string(),
            ],
            DeviceAddress::V6 {
                address,
                prefix_len,
            } => vec![
                self.name.clone(),
                "inet6".into(),
                format!("{}/{}", address, prefix_len),
            ],
        };

        debug!(name = %self.name, ?args, "configuring interface address");

        let output = Command::new("ifconfig").args(&args).output().map_err(|e| {
            TransportError::device_config_failed(
                &self.name,
                format!("failed to run ifconfig: {}", e),
            )
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stdout = String::from_utf8_lossy(&output.stdout);
            let detail = if stderr.trim().is_empty() {
                stdout
            } else {
                stderr
            };
            return Err(TransportError::device_config_failed(
                &self.name,
                format!("ifconfig failed ({}): {}", output.status, detail.trim()),
            ));
        }

        Ok(())
    }
}

/// Recovers the interface name of a connected utun socket.
fn utun_ifname(fd: libc::c_int) -> Result<String> {
    let mut name = [0u8; libc::IFNAMSIZ];
    let mut len = name.len() as libc::socklen_t;

    let rc = unsafe {
        libc::getsockopt(
            fd,
            libc::SYSPROTO_CONTROL,
            UTUN_OPT_IFNAME,
            name.as_mut_ptr().cast(),
            &mut len,
        )
    };
    if rc < 0 {
        return Err(TransportError::device_open_failed(format!(
            "UTUN_OPT_IFNAME failed: {}",
            std::io::Error::last_os_error()
        )));
    }

    let end = name.iter().position(|&b| b == 0).unwrap_or(name.len());
    Ok(String::from_utf8_lossy(&name[..end]).into_owned())
}

#[async_trait]
impl TunDevice for DarwinTun {
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

        // In-flight reads and writes hold read locks; once they return
        // the control socket is dropped and the kernel removes the
        // interface.
        self.async_fd.write().await.take();

        debug!(name = %self.name, "closed utun device");
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

impl std::fmt::Debug for DarwinTun {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DarwinTun")
            .field("name", &self.name)
            .field("mtu", &self.mtu)
            .field("closed", &self.is_closed())
            .finish()
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    // Creating a utun device needs entitlements; only the pure pieces
    // are tested here.

    #[test]
    fn test_ctl_info_name() {
        let info = CtlInfo::utun();
        let name: Vec<u8> = info
            .ctl_name
            .iter()
            .take_while(|&&c| c != 0)
            .map(|&c| c as u8)
            .collect();
        assert_eq!(name, UTUN_CONTROL_NAME);
    }

    #[test]
    fn test_sockaddr_ctl_layout() {
        assert_eq!(mem::size_of::<SockaddrCtl>(), 32);
    }
}
