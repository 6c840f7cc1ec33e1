// ============================================
// File: crates/tunsocks-core/src/socks/protocol.rs
// ============================================
//! # SOCKS5 Wire Protocol
//!
//! ## Creation Reason
//! RFC 1928 message encoding shared by the TCP and UDP flow handlers:
//! method negotiation, CONNECT / UDP ASSOCIATE requests, and the UDP
//! datagram encapsulation header.
//!
//! ## ⚠️ Important Note for Next Developer
//! - Only the no-authentication method is offered
//! - Fragmented UDP datagrams (FRAG != 0) are rejected, matching
//!   common server behavior
//!
//! ## Last Modified
//! v0.1.0 - Initial protocol support

use std::net::{IpAddr, SocketAddr};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{CoreError, Result};

// ============================================
// Constants
// ============================================

/// Protocol version byte.
pub const SOCKS_VERSION: u8 = 0x05;

/// "No authentication required" method.
pub const METHOD_NO_AUTH: u8 = 0x00;

/// CONNECT command.
pub const CMD_CONNECT: u8 = 0x01;

/// UDP ASSOCIATE command.
pub const CMD_UDP_ASSOCIATE: u8 = 0x03;

/// Address type: IPv4.
pub const ATYP_IPV4: u8 = 0x01;

/// Address type: domain name.
pub const ATYP_DOMAIN: u8 = 0x03;

/// Address type: IPv6.
pub const ATYP_IPV6: u8 = 0x04;

/// Reply code: request granted.
pub const REPLY_SUCCEEDED: u8 = 0x00;

/// Human-readable name for a reply code.
fn reply_name(code: u8) -> &'static str {
    match code {
        0x00 => "succeeded",
        0x01 => "general failure",
        0x02 => "connection not allowed by ruleset",
        0x03 => "network unreachable",
        0x04 => "host unreachable",
        0x05 => "connection refused",
        0x06 => "TTL expired",
        0x07 => "command not supported",
        0x08 => "address type not supported",
        _ => "unknown reply code",
    }
}

// ============================================
// Handshake
// ============================================

/// Performs method negotiation and sends a command request, returning
/// the server's bound address.
///
/// # Errors
/// Returns [`CoreError::HandshakeFailed`] for protocol violations or a
/// non-success reply, [`CoreError::Io`] for transport failures.
pub async fn handshake<S>(stream: &mut S, command: u8, destination: SocketAddr) -> Result<SocketAddr>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    // Greeting: version, one method, no-auth.
    stream
        .write_all(&[SOCKS_VERSION, 0x01, METHOD_NO_AUTH])
        .await
        .map_err(|e| CoreError::io("SOCKS5 greeting", e))?;

    let mut choice = [0u8; 2];
    stream
        .read_exact(&mut choice)
        .await
        .map_err(|e| CoreError::io("SOCKS5 method selection", e))?;

    if choice[0] != SOCKS_VERSION {
        return Err(CoreError::handshake_failed(format!(
            "server spoke version {:#04x}",
            choice[0]
        )));
    }
    if choice[1] != METHOD_NO_AUTH {
        return Err(CoreError::handshake_failed(format!(
            "server rejected no-auth (method {:#04x})",
            choice[1]
        )));
    }

    // Request: VER CMD RSV ATYP DST.ADDR DST.PORT
    let mut request = Vec::with_capacity(22);
    request.extend_from_slice(&[SOCKS_VERSION, command, 0x00]);
    write_addr(&mut request, destination);

    stream
        .write_all(&request)
        .await
        .map_err(|e| CoreError::io("SOCKS5 request", e))?;

    // Reply: VER REP RSV ATYP BND.ADDR BND.PORT
    let mut head = [0u8; 4];
    stream
        .read_exact(&mut head)
        .await
        .map_err(|e| CoreError::io("SOCKS5 reply", e))?;

    if head[0] != SOCKS_VERSION {
        return Err(CoreError::handshake_failed(format!(
            "reply version {:#04x}",
            head[0]
        )));
    }
    if head[1] != REPLY_SUCCEEDED {
        return Err(CoreError::handshake_failed(format!(
            "server replied {:#04x} ({})",
            head[1],
            reply_name(head[1])
        )));
    }

    let bound_ip: IpAddr = match head[3] {
        ATYP_IPV4 => {
            let mut octets = [0u8; 4];
            stream
                .read_exact(&mut octets)
                .await
                .map_err(|e| CoreError::io("SOCKS5 bound address", e))?;
            IpAddr::from(octets)
        }
        ATYP_IPV6 => {
            let mut octets = [0u8; 16];
            stream
                .read_exact(&mut octets)
                .await
                .map_err(|e| CoreError::io("SOCKS5 bound address", e))?;
            IpAddr::from(octets)
        }
        ATYP_DOMAIN => {
            // Bound addresses are rarely domains; skip over it and
            // report the unspecified address.
            let mut len = [0u8; 1];
            stream
                .read_exact(&mut len)
                .await
                .map_err(|e| CoreError::io("SOCKS5 bound address", e))?;
            let mut name = vec![0u8; len[0] as usize];
            stream
                .read_exact(&mut name)
                .await
                .map_err(|e| CoreError::io("SOCKS5 bound address", e))?;
            IpAddr::from([0u8; 4])
        }
        other => {
            return Err(CoreError::handshake_failed(format!(
                "reply address type {:#04x}",
                other
            )));
        }
    };

    let mut port = [0u8; 2];
    stream
        .read_exact(&mut port)
        .await
        .map_err(|e| CoreError::io("SOCKS5 bound port", e))?;

    Ok(SocketAddr::new(bound_ip, u16::from_be_bytes(port)))
}

/// Appends ATYP + address + port in wire order.
fn write_addr(buf: &mut Vec<u8>, addr: SocketAddr) {
    match addr.ip() {
        IpAddr::V4(ip) => {
            buf.push(ATYP_IPV4);
            buf.extend_from_slice(&ip.octets());
        }
        IpAddr::V6(ip) => {
            buf.push(ATYP_IPV6);
            buf.extend_from_slice(&ip.octets());
        }
    }
    buf.extend_from_slice(&addr.port().to_be_bytes());
}

// ============================================
// UDP Encapsulation
// ============================================

/// Wraps a payload in the SOCKS5 UDP request header.
#[must_use]
pub fn encode_udp_datagram(destination: SocketAddr, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(payload.len() + 22);
    // RSV RSV FRAG
    buf.extend_from_slice(&[0x00, 0x00, 0x00]);
    write_addr(&mut buf, destination);
    buf.extend_from_slice(payload);
    buf
}

/// Strips the SOCKS5 UDP header, returning the source address and the
/// payload offset into `datagram`.
///
/// # Errors
/// Returns [`CoreError::HandshakeFailed`] for truncated headers or
/// fragmented datagrams.
pub fn decode_udp_datagram(datagram: &[u8]) -> Result<(SocketAddr, usize)> {
    if datagram.len() < 4 {
        return Err(CoreError::handshake_failed("truncated UDP header"));
    }
    if datagram[2] != 0x00 {
        return Err(CoreError::handshake_failed("fragmented UDP datagram"));
    }

    let (ip, addr_end): (IpAddr, usize) = match datagram[3] {
        ATYP_IPV4 => {
            if datagram.len() < 10 {
                return Err(CoreError::handshake_failed("truncated UDP header"));
            }
            let mut octets = [0u8; 4];
            octets.copy_from_slice(&datagram[4..8]);
            (IpAddr::from(octets), 8)
        }
        ATYP_IPV6 => {
            if datagram.len() < 22 {
                return Err(CoreError::handshake_failed("truncated UDP header"));
            }
            let mut octets = [0u8; 16];
            octets.copy_from_slice(&datagram[4..20]);
            (IpAddr::from(octets), 20)
        }
        other => {
            return Err(CoreError::handshake_failed(format!(
                "UDP address type {:#04x}",
                other
            )));
        }
    };

    let port = u16::from_be_bytes([datagram[addr_end], datagram[addr_end + 1]]);
    Ok((SocketAddr::new(ip, port), addr_end + 2))
}

// ============================================
// Tests
// ============================================
