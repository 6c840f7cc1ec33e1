// ============================================
// File: crates/tunsocks-core/src/socks/mod.rs
// ============================================
//! # SOCKS5 Flow Handlers
//!
//! ## Creation Reason
//! Implements the proxy side of the tunnel: every TCP and UDP flow the
//! packet engine intercepts is forwarded through a SOCKS5 server.
//!
//! ## Main Functionality
//! - [`Socks5TcpHandler`]: CONNECT handshake plus bidirectional copy
//! - [`Socks5UdpHandler`]: UDP ASSOCIATE with an idle-timeout relay
//!
//! ## ⚠️ Important Note for Next Developer
//! - The UDP ASSOCIATE control connection must stay open for the
//!   lifetime of the relay; the server tears the association down when
//!   it closes
//! - Unix-socket proxies support TCP flows only
//!
//! ## Last Modified
//! v0.1.0 - Initial handlers

pub mod protocol;

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::{TcpStream, UdpSocket};
use tracing::{debug, warn};

use crate::error::{CoreError, Result};
use crate::proxy::ProxyEndpoint;
use crate::stack::{DatagramFlow, FlowStream, TcpFlowHandler, UdpFlowHandler};

/// Default idle timeout before a UDP association is torn down.
pub const DEFAULT_UDP_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Receive buffer size for UDP relay datagrams.
const UDP_BUFFER_SIZE: usize = 65535;

// ============================================
// Proxy Dialing
// ============================================

/// Opens a stream to the proxy endpoint.
async fn dial_proxy(endpoint: &ProxyEndpoint) -> Result<Box<dyn FlowStream>> {
    match endpoint {
        ProxyEndpoint::Tcp { host, port } => {
            let stream = TcpStream::connect(SocketAddr::new(*host, *port))
                .await
                .map_err(|e| {
                    CoreError::proxy_connect_failed(endpoint.to_string(), e.to_string())
                })?;
            stream
                .set_nodelay(true)
                .map_err(|e| CoreError::io("set_nodelay", e))?;
            Ok(Box::new(stream))
        }
        #[cfg(unix)]
        ProxyEndpoint::Unix { path } => {
            let stream = tokio::net::UnixStream::connect(path).await.map_err(|e| {
                CoreError::proxy_connect_failed(endpoint.to_string(), e.to_string())
            })?;
            Ok(Box::new(stream))
        }
        #[cfg(not(unix))]
        ProxyEndpoint::Unix { .. } => Err(CoreError::unsupported_endpoint(
            "proxy connection",
            endpoint.to_string(),
        )),
    }
}

// ============================================
// Socks5TcpHandler
// ============================================

/// Forwards intercepted TCP flows through a SOCKS5 CONNECT.
#[derive(Debug, Clone)]
pub struct Socks5TcpHandler {
    proxy: ProxyEndpoint,
}

impl Socks5TcpHandler {
    /// Creates a handler targeting the given proxy.
    #[must_use]
    pub fn new(proxy: ProxyEndpoint) -> Self {
        Self { proxy }
    }
}

#[async_trait]
impl TcpFlowHandler for Socks5TcpHandler {
    async fn handle(&self, mut flow: Box<dyn FlowStream>, destination: SocketAddr) -> Result<()> {
        let mut upstream = dial_proxy(&self.proxy).await?;
        protocol::handshake(&mut upstream, protocol::CMD_CONNECT, destination).await?;

        debug!(%destination, proxy = %self.proxy, "TCP flow established");

        match tokio::io::copy_bidirectional(&mut flow, &mut upstream).await {
            Ok((to_proxy, from_proxy)) => {
                debug!(%destination, to_proxy, from_proxy, "TCP flow finished");
                Ok(())
            }
            Err(e) => {
                // Resets at teardown are routine for intercepted flows.
                debug!(%destination, error = %e, "TCP flow ended with error");
                Ok(())
            }
        }
    }
}

// ============================================
// Socks5UdpHandler
// ============================================

/// Relays intercepted UDP flows through a SOCKS5 UDP ASSOCIATE.
#[derive(Debug, Clone)]
pub struct Socks5UdpHandler {
    proxy: ProxyEndpoint,
    idle_timeout: Duration,
}

impl Socks5UdpHandler {
    /// Creates a handler with the default 30-second idle timeout.
    #[must_use]
    pub fn new(proxy: ProxyEndpoint) -> Self {
        Self {
            proxy,
            idle_timeout: DEFAULT_UDP_IDLE_TIMEOUT,
        }
    }

    /// Overrides the idle timeout.
    #[must_use]
    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }
}

#[async_trait]
impl UdpFlowHandler for Socks5UdpHandler {
    async fn handle(&self, flow: Box<dyn DatagramFlow>, destination: SocketAddr) -> Result<()> {
        let ProxyEndpoint::Tcp { host, port } = &self.proxy else {
            return Err(CoreError::unsupported_endpoint(
                "UDP ASSOCIATE",
                self.proxy.to_string(),
            ));
        };
        let proxy_addr = SocketAddr::new(*host, *port);

        // The control connection pins the association; it must outlive
        // the relay loop.
        let mut control = TcpStream::connect(proxy_addr).await.map_err(|e| {
            CoreError::proxy_connect_failed(self.proxy.to_string(), e.to_string())
        })?;
        let mut relay_addr =
            protocol::handshake(&mut control, protocol::CMD_UDP_ASSOCIATE, destination).await?;

        // Servers behind NAT often report an unspecified bound address;
        // fall back to the proxy's own address.
        if relay_addr.ip().is_unspecified() {
            relay_addr.set_ip(*host);
        }

        let bind_addr: SocketAddr = if relay_addr.is_ipv4() {
            "0.0.0.0:0".parse().unwrap()
        } else {
            "[::]:0".parse().unwrap()
        };
        let relay = UdpSocket::bind(bind_addr)
            .await
            .map_err(|e| CoreError::io("UDP relay bind", e))?;
        relay
            .connect(relay_addr)
            .await
            .map_err(|e| CoreError::io("UDP relay connect", e))?;

        debug!(%destination, %relay_addr, "UDP association established");

        let mut flow_buf = vec![0u8; UDP_BUFFER_SIZE];
        let mut relay_buf = vec![0u8; UDP_BUFFER_SIZE];
        let mut deadline = tokio::time::Instant::now() + self.idle_timeout;

        loop {
            tokio::select! {
                inbound = flow.recv(&mut flow_buf) => {
                    let Ok((len, _src)) = inbound else {
                        // Flow torn down by the engine.
                        break;
                    };
                    let datagram = protocol::encode_udp_datagram(destination, &flow_buf[..len]);
                    relay
                        .send(&datagram)
                        .await
                        .map_err(|e| CoreError::io("UDP relay send", e))?;
                    deadline = tokio::time::Instant::now() + self.idle_timeout;
                }
                outbound = relay.recv(&mut relay_buf) => {
                    let len = outbound.map_err(|e| CoreError::io("UDP relay recv", e))?;
                    match protocol::decode_udp_datagram(&relay_buf[..len]) {
                        Ok((from, offset)) => {
                            flow.send(&relay_buf[offset..len], from).await?;
                            deadline = tokio::time::Instant::now() + self.idle_timeout;
                        }
                        Err(e) => {
                            warn!(error = %e, "discarding malformed relay datagram");
                        }
                    }
                }
                _ = tokio::time::sleep_until(deadline) => {
                    debug!(%destination, "UDP association idle, closing");
                    break;
                }
            }
        }

        drop(control);
        Ok(())
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::{mpsc, Mutex};

    use super::protocol::{
        ATYP_IPV4, CMD_CONNECT, CMD_UDP_ASSOCIATE, METHOD_NO_AUTH, SOCKS_VERSION,
    };
    use super::*;

    /// Serves one SOCKS5 handshake, asserting the expected command,
    /// and replies with success bound to `bound`.
    async fn serve_handshake(stream: &mut TcpStream, expect_cmd: u8, bound: SocketAddr) {
        let mut greeting = [0u8; 3];
        stream.read_exact(&mut greeting).await.unwrap();
        assert_eq!(greeting, [SOCKS_VERSION, 0x01, METHOD_NO_AUTH]);
        stream.write_all(&[SOCKS_VERSION, 0x00]).await.unwrap();

        let mut head = [0u8; 4];
        stream.read_exact(&mut head).await.unwrap();
        assert_eq!(head[1], expect_cmd);
        let addr_len = match head[3] {
            ATYP_IPV4 => 4,
            _ => 16,
        };
        let mut rest = vec![0u8; addr_len + 2];
        stream.read_exact(&mut rest).await.unwrap();

        let mut reply = vec![SOCKS_VERSION, 0x00, 0x00, ATYP_IPV4];
        match bound.ip() {
            std::net::IpAddr::V4(ip) => reply.extend_from_slice(&ip.octets()),
            std::net::IpAddr::V6(_) => unreachable!("tests bind IPv4"),
        }
        reply.extend_from_slice(&bound.port().to_be_bytes());
        stream.write_all(&reply).await.unwrap();
    }

    #[tokio::test]
    async fn test_tcp_handler_relays_both_directions() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let proxy_addr = listener.local_addr().unwrap();

        // Mock proxy: handshake, then echo with a prefix.
        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            serve_handshake(&mut stream, CMD_CONNECT, "0.0.0.0:0".parse().unwrap()).await;

            let mut buf = [0u8; 64];
            let len = stream.read(&mut buf).await.unwrap();
            stream.write_all(b"echo:").await.unwrap();
            stream.write_all(&buf[..len]).await.unwrap();
        });

        let handler = Socks5TcpHandler::new(ProxyEndpoint::Tcp {
            host: proxy_addr.ip(),
            port: proxy_addr.port(),
        });

        let (engine_side, mut test_side) = duplex(256);
        let handle = tokio::spawn(async move {
            handler
                .handle(Box::new(engine_side), "192.0.2.10:80".parse().unwrap())
                .await
        });

        test_side.write_all(b"hello").await.unwrap();
        let mut buf = [0u8; 10];
        test_side.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"echo:hello");

        drop(test_side);
        handle.await.unwrap().unwrap();
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_tcp_handler_surfaces_refused_handshake() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let proxy_addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut greeting = [0u8; 3];
            stream.read_exact(&mut greeting).await.unwrap();
            stream.write_all(&[SOCKS_VERSION, 0x00]).await.unwrap();

            let mut request = [0u8; 10];
            stream.read_exact(&mut request).await.unwrap();
            // Connection refused.
            stream
                .write_all(&[SOCKS_VERSION, 0x05, 0x00, ATYP_IPV4, 0, 0, 0, 0, 0, 0])
                .await
                .unwrap();
        });

        let handler = Socks5TcpHandler::new(ProxyEndpoint::Tcp {
            host: proxy_addr.ip(),
            port: proxy_addr.port(),
        });
        let (engine_side, _test_side) = duplex(256);

        let err = handler
            .handle(Box::new(engine_side), "192.0.2.10:80".parse().unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::HandshakeFailed { .. }));
    }

    #[tokio::test]
    async fn test_tcp_handler_connect_failure_is_retryable() {
        // Port 1 on localhost is almost certainly closed.
        let handler = Socks5TcpHandler::new(ProxyEndpoint::Tcp {
            host: "127.0.0.1".parse().unwrap(),
            port: 1,
        });
        let (engine_side, _test_side) = duplex(64);

        let err = handler
            .handle(Box::new(engine_side), "192.0.2.10:80".parse().unwrap())
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_udp_handler_rejects_unix_proxy() {
        let handler = Socks5UdpHandler::new(ProxyEndpoint::Unix {
            path: "/run/proxy.sock".into(),
        });
        let flow = MockFlow::pair().0;

        let err = handler
            .handle(Box::new(flow), "192.0.2.10:53".parse().unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::UnsupportedEndpoint { .. }));
    }

    /// Engine-side mock of a UDP flow, driven over channels.
    struct MockFlow {
        incoming: Mutex<mpsc::Receiver<(Vec<u8>, SocketAddr)>>,
        outgoing: mpsc::Sender<(Vec<u8>, SocketAddr)>,
    }

    struct MockFlowDriver {
        inject: mpsc::Sender<(Vec<u8>, SocketAddr)>,
        captured: mpsc::Receiver<(Vec<u8>, SocketAddr)>,
    }

    impl MockFlow {
        fn pair() -> (Self, MockFlowDriver) {
            let (inject, incoming) = mpsc::channel(16);
            let (outgoing, captured) = mpsc::channel(16);
            (
                Self {
                    incoming: Mutex::new(incoming),
                    outgoing,
                },
                MockFlowDriver { inject, captured },
            )
        }
    }

    #[async_trait]
    impl DatagramFlow for MockFlow {
        async fn recv(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr)> {
            let mut incoming = self.incoming.lock().await;
            match incoming.recv().await {
                Some((payload, src)) => {
                    let len = payload.len().min(buf.len());
                    buf[..len].copy_from_slice(&payload[..len]);
                    Ok((len, src))
                }
                None => Err(CoreError::io(
                    "flow recv",
                    std::io::Error::new(std::io::ErrorKind::BrokenPipe, "flow closed"),
                )),
            }
        }

        async fn send(&self, buf: &[u8], to: SocketAddr) -> Result<usize> {
            self.outgoing
                .send((buf.to_vec(), to))
                .await
                .map_err(|_| {
                    CoreError::io(
                        "flow send",
                        std::io::Error::new(std::io::ErrorKind::BrokenPipe, "flow closed"),
                    )
                })?;
            Ok(buf.len())
        }
    }

    #[tokio::test]
    async fn test_udp_handler_relays_datagrams() {
        let destination: SocketAddr = "192.0.2.10:53".parse().unwrap();

        // Mock relay: echoes whatever encapsulated datagram arrives.
        let relay = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let relay_addr = relay.local_addr().unwrap();
        tokio::spawn(async move {
            let mut buf = [0u8; 2048];
            let (len, peer) = relay.recv_from(&mut buf).await.unwrap();
            relay.send_to(&buf[..len], peer).await.unwrap();
        });

        // Mock proxy: UDP ASSOCIATE handshake pointing at the relay.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let proxy_addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            serve_handshake(&mut stream, CMD_UDP_ASSOCIATE, relay_addr).await;
            // Hold the control connection open.
            let mut sink = [0u8; 1];
            let _ = stream.read(&mut sink).await;
        });

        let handler = Socks5UdpHandler::new(ProxyEndpoint::Tcp {
            host: proxy_addr.ip(),
            port: proxy_addr.port(),
        })
        .with_idle_timeout(Duration::from_millis(500));

        let (flow, mut driver) = MockFlow::pair();
        let source: SocketAddr = "10.0.0.2:40000".parse().unwrap();

        let handle = tokio::spawn(async move {
            handler.handle(Box::new(flow), destination).await
        });

        driver.inject.send((b"query".to_vec(), source)).await.unwrap();

        let (payload, from) = tokio::time::timeout(Duration::from_secs(2), driver.captured.recv())
            .await
            .expect("no relayed datagram")
            .expect("flow closed early");
        assert_eq!(payload, b"query");
        assert_eq!(from, destination);

        // Closing the engine side ends the relay loop.
        drop(driver);
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("handler did not exit")
            .unwrap()
            .unwrap();
    }
}
