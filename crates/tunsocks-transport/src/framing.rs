// ============================================
// File: crates/tunsocks-transport/src/framing.rs
// ============================================
//! # Address-Family Framing Codec
//!
//! ## Creation Reason
//! Darwin utun devices have no equivalent of IFF_NO_PI: every packet on
//! the wire carries a 4-byte header whose last byte is the address
//! family. The packet engine wants plain IP packets, so this module
//! translates between the two formats.
//!
//! ## Main Functionality
//! - `FrameCodec`: stateless-looking encode/decode with per-direction
//!   scratch arenas and independent locks
//! - `FramedTun`: wraps a raw device so everything downstream reads and
//!   writes plain IP packets
//!
//! ## Wire Format
//! ```text
//! ┌──────┬──────┬──────┬──────┬──────────────────────────┐
//! │  0   │  0   │  0   │  AF  │       IP packet          │
//! └──────┴──────┴──────┴──────┴──────────────────────────┘
//!   4-byte null link-layer header     payload
//! ```
//! AF is the platform `AF_INET`/`AF_INET6` constant, chosen from the
//! version nibble of the payload's first byte.
//!
//! ## ⚠️ Important Note for Next Developer
//! - The encode and decode arenas are guarded by separate locks; a
//!   concurrent inbound read and outbound write never contend
//! - Arenas grow on demand and never shrink; capacity is re-checked on
//!   every call rather than trusted across calls
//!
//! ## Last Modified
//! v0.1.0 - Initial codec implementation

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tracing::trace;

use crate::error::{Result, TransportError};
use crate::traits::TunDevice;

// ============================================
// Constants
// ============================================

/// Length of the address-family header.
pub const AF_HEADER_LEN: usize = 4;

#[cfg(unix)]
const AF_INET_TAG: u8 = nix::libc::AF_INET as u8;
#[cfg(unix)]
const AF_INET6_TAG: u8 = nix::libc::AF_INET6 as u8;

// Darwin values; only utun-style devices use this framing anyway.
#[cfg(not(unix))]
const AF_INET_TAG: u8 = 2;
#[cfg(not(unix))]
const AF_INET6_TAG: u8 = 30;

// ============================================
// FrameCodec
// ============================================

/// Translates between the device wire format and raw IP packets.
///
/// # Thread Safety
/// `decode` and `encode` each serialize on their own internal lock, so
/// concurrent calls in the same direction queue up while opposite
/// directions proceed in parallel.
///
/// # Example
/// ```
/// use tunsocks_transport::framing::FrameCodec;
///
/// let codec = FrameCodec::new();
/// let packet = [0x45, 0x00, 0x00, 0x14];
/// let framed = codec.encode(&packet).unwrap();
/// assert_eq!(codec.decode(&framed).unwrap().as_ref(), &packet);
/// ```
#[derive(Default)]
pub struct FrameCodec {
    /// Scratch arena for the decode (device → engine) direction.
    decode_arena: Mutex<Vec<u8>>,
    /// Scratch arena for the encode (engine → device) direction.
    encode_arena: Mutex<Vec<u8>>,
}

impl FrameCodec {
    /// Creates a codec with empty arenas.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Strips the 4-byte address-family header from a device buffer.
    ///
    /// # Returns
    /// The raw IP packet that followed the header.
    ///
    /// # Errors
    /// [`TransportError::ShortRead`] if fewer than 4 bytes are available.
    pub fn decode(&self, framed: &[u8]) -> Result<Bytes> {
        if framed.len() < AF_HEADER_LEN {
            return Err(TransportError::ShortRead {
                len: framed.len(),
                min: AF_HEADER_LEN,
            });
        }

        let payload_len = framed.len() - AF_HEADER_LEN;
        let mut arena = self.decode_arena.lock();
        grow_to(&mut arena, payload_len);
        arena[..payload_len].copy_from_slice(&framed[AF_HEADER_LEN..]);

        Ok(Bytes::copy_from_slice(&arena[..payload_len]))
    }

    /// Prepends the 4-byte address-family header to an outbound packet.
    ///
    /// The IP version nibble of `packet[0]` selects `AF_INET` or
    /// `AF_INET6`; bytes 0 to 2 of the header are zero (null link-layer
    /// header).
    ///
    /// # Errors
    /// - [`TransportError::EmptyPacket`] for a zero-length payload
    /// - [`TransportError::UnknownIpVersion`] when the version nibble is
    ///   neither 4 nor 6
    pub fn encode(&self, packet: &[u8]) -> Result<Bytes> {
        if packet.is_empty() {
            return Err(TransportError::EmptyPacket);
        }

        let version = packet[0] >> 4;
        let af = match version {
            4 => AF_INET_TAG,
            6 => AF_INET6_TAG,
            _ => return Err(TransportError::UnknownIpVersion { version }),
        };

        let framed_len = packet.len() + AF_HEADER_LEN;
        let mut arena = self.encode_arena.lock();
        grow_to(&mut arena, framed_len);
        arena[..AF_HEADER_LEN - 1].fill(0);
        arena[AF_HEADER_LEN - 1] = af;
        arena[AF_HEADER_LEN..framed_len].copy_from_slice(packet);

        Ok(Bytes::copy_from_slice(&arena[..framed_len]))
    }
}

impl std::fmt::Debug for FrameCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameCodec")
            .field("decode_capacity", &self.decode_arena.lock().len())
            .field("encode_capacity", &self.encode_arena.lock().len())
            .finish()
    }
}

/// Grows an arena to at least `len` bytes. Never shrinks.
fn grow_to(arena: &mut Vec<u8>, len: usize) {
    if arena.len() < len {
        arena.resize(len, 0);
    }
}

// ============================================
// FramedTun
// ============================================

/// Device wrapper that hides the address-family framing.
///
/// Reads return raw IP packets; writes take raw IP packets and report
/// the payload byte count, not counting the 4-byte header that actually
/// went on the wire.
///
/// # Example
/// ```ignore
/// let tun = FramedTun::new(FdTun::from_raw_fd(fd)?);
/// let mut buf = [0u8; 1500];
/// let len = tun.read(&mut buf).await?; // buf[..len] is an IP packet
/// ```
pub struct FramedTun<D> {
    /// Underlying raw device.
    inner: D,
    /// Framing codec shared by both directions.
    codec: FrameCodec,
    /// Staging buffer for device reads; held across the await, so this
    /// is a tokio mutex rather than a parking_lot one.
    read_staging: tokio::sync::Mutex<Vec<u8>>,
}

impl<D: TunDevice> FramedTun<D> {
    /// Wraps a raw device.
    pub fn new(inner: D) -> Self {
        Self {
            inner,
            codec: FrameCodec::new(),
            read_staging: tokio::sync::Mutex::new(Vec::new()),
        }
    }

    /// Returns the framing codec, mainly for inspection in tests.
    pub fn codec(&self) -> &FrameCodec {
        &self.codec
    }

    /// Returns the wrapped device.
    pub fn inner(&self) -> &D {
        &self.inner
    }
}

#[async_trait]
impl<D: TunDevice> TunDevice for FramedTun<D> {
    async fn read(&self, buf: &mut [u8]) -> Result<usize> {
        let mut staging = self.read_staging.lock().await;
        let want = buf.len() + AF_HEADER_LEN;
        grow_to(&mut staging, want);

        let n = self.inner.read(&mut staging[..want]).await?;
        let packet = self.codec.decode(&staging[..n])?;

        let len = packet.len().min(buf.len());
        buf[..len].copy_from_slice(&packet[..len]);
        trace!(len, "decoded inbound packet");
        Ok(len)
    }

    async fn write(&self, buf: &[u8]) -> Result<usize> {
        let framed = self.codec.encode(buf)?;
        let n = self.inner.write(&framed).await?;
        trace!(len = buf.len(), "framed outbound packet");
        Ok(n.saturating_sub(AF_HEADER_LEN))
    }

    async fn close(&self) -> Result<()> {
        self.inner.close().await
    }

    fn name(&self) -> &str {
        self.inner.name()
    }

    fn mtu(&self) -> u16 {
        self.inner.mtu()
    }

    fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

impl<D: TunDevice> std::fmt::Debug for FramedTun<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FramedTun")
            .field("name", &self.inner.name())
            .field("mtu", &self.inner.mtu())
            .finish()
    }
}

// ============================================
// Tests
// ============================================
