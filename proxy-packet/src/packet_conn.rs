use log::{debug, warn};
use std::{io, net::SocketAddr};

use crate::{
    addr::{PeerAddr, ProxyAddr},
    codec::ProxyProtocolResult,
    config::{PacketConfig, Policy},
    error::ProxyErrorKind,
    header::Header,
    transports::DatagramSocket,
};

type Result<T> = std::result::Result<T, ProxyErrorKind>;

/// A PROXY protocol aware wrapper around a datagram socket
///
/// Every [`recv_from`](Self::recv_from) first receives one datagram and checks
/// whether it is a PROXY header. A header is checked against the configured
/// [`Policy`] and validator, then discarded, and the next datagram from the
/// socket is returned as payload with the client address taken from the
/// header. Anything that is not a header is returned as payload directly.
///
/// A peer that sends headers must send each one as its own datagram, followed
/// by the payload datagram it describes.
pub struct PacketConn<T> {
    inner: T,
    config: PacketConfig,
    /// Header accepted by the last read
    header: Option<Header>,
    /// Whether the last read failed
    read_failed: bool,
}

/// Outcome of the first receive of a read
struct ReadCycle {
    buf: Vec<u8>,
    len: usize,
    peer: SocketAddr,
}

impl ReadCycle {
    async fn receive<T: DatagramSocket>(inner: &T, capacity: usize) -> io::Result<Self> {
        let mut buf = vec![0u8; capacity];
        let (len, peer) = inner.recv_from(&mut buf).await?;
        Ok(ReadCycle { buf, len, peer })
    }

    fn received(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    /// Hand the received datagram to the caller as payload
    fn deliver(self, buf: &mut [u8]) -> (usize, PeerAddr) {
        let n = self.len.min(buf.len());
        if n < self.len {
            debug!(
                "payload from {} truncated from {} to {} bytes",
                self.peer, self.len, n
            );
        }
        buf[..n].copy_from_slice(&self.buf[..n]);
        (n, PeerAddr::Direct(self.peer))
    }
}

impl<T> PacketConn<T>
where
    T: DatagramSocket,
{
    /// Wrap a socket with the default config, headers are used if present
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, PacketConfig::default())
    }

    /// Wrap a socket
    pub fn with_config(inner: T, config: PacketConfig) -> Self {
        PacketConn {
            inner,
            config,
            header: None,
            read_failed: false,
        }
    }

    /// Receive one payload datagram
    ///
    /// Returns the number of bytes copied into `buf` and the source. The source
    /// is [`PeerAddr::Proxied`] when a header declaring a client address
    /// preceded the payload, otherwise the socket address of the sender.
    ///
    /// At most two datagrams are received: the first one, and the payload after
    /// it when the first one is an accepted header. Nothing is retried. When
    /// the first datagram is payload, at most the configured scratch capacity
    /// of it can be returned, see [`PacketConfig::scratch_capacity`].
    ///
    /// Cancel-safe in the sense that dropping the future loses at most the
    /// datagrams already received by it.
    pub async fn recv_from(&mut self, buf: &mut [u8]) -> Result<(usize, PeerAddr)> {
        self.header = None;
        self.read_failed = false;

        let res = self.read_cycle(buf).await;
        self.read_failed = res.is_err();
        res
    }

    async fn read_cycle(&mut self, buf: &mut [u8]) -> Result<(usize, PeerAddr)> {
        let cycle = ReadCycle::receive(&self.inner, self.config.scratch_capacity).await?;

        let header = match self.detect(&cycle)? {
            Some(header) => header,
            None => return Ok(cycle.deliver(buf)),
        };

        let (n, peer) = self.inner.recv_from(buf).await?;
        let addr = match header.source_addr() {
            Some(source) => PeerAddr::Proxied(ProxyAddr::new(source, peer)),
            None => PeerAddr::Direct(peer),
        };
        if cycle.peer != peer {
            debug!(
                "header came from {} but payload from {}, using payload sender for replies",
                cycle.peer, peer
            );
        }
        self.header = Some(header);
        Ok((n, addr))
    }

    /// Decide whether the first datagram is a header this connection accepts
    fn detect(&self, cycle: &ReadCycle) -> Result<Option<Header>> {
        match Header::parse(cycle.received()) {
            ProxyProtocolResult::NotProxyProtocol => {
                if self.config.policy == Policy::Require {
                    warn!("PROXY header required but missing from {}", cycle.peer);
                    return Err(ProxyErrorKind::RequiredHeaderMissing);
                }
                Ok(None)
            }
            ProxyProtocolResult::Error(e) => {
                warn!("PROXY header parse error from {}: {}", cycle.peer, e);
                Err(ProxyErrorKind::MalformedHeader(e))
            }
            ProxyProtocolResult::Success(header, len) => {
                if len < cycle.len {
                    debug!(
                        "discarding {} bytes after PROXY header from {}",
                        cycle.len - len,
                        cycle.peer
                    );
                }
                match self.config.policy {
                    Policy::Reject => {
                        warn!("PROXY header from {} rejected by policy", cycle.peer);
                        Err(ProxyErrorKind::SuperfluousHeader)
                    }
                    Policy::Use | Policy::Require => {
                        if let Some(ref validator) = self.config.validator {
                            if let Err(e) = validator(&header) {
                                warn!("PROXY header from {} rejected: {}", cycle.peer, e);
                                return Err(ProxyErrorKind::ValidatorRejected(e));
                            }
                        }
                        debug!("PROXY header accepted from {}: {:?}", cycle.peer, header);
                        Ok(Some(header))
                    }
                }
            }
        }
    }

    /// Send a datagram
    ///
    /// An address returned by [`recv_from`](Self::recv_from) for a proxied
    /// datagram is unwrapped to the proxy that relayed it. Any other address is
    /// used as given.
    pub async fn send_to(&self, buf: &[u8], target: impl Into<PeerAddr>) -> io::Result<usize> {
        self.inner.send_to(buf, target.into().peer()).await
    }

    /// The address clients sent their datagrams to
    ///
    /// This is the destination declared by the header of the last read, if
    /// that read succeeded with a PROXY command header carrying IP addresses.
    /// Otherwise it is the address the socket is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        if !self.read_failed {
            if let Some(destination) = self
                .header
                .as_ref()
                .filter(|header| !header.command.is_local())
                .and_then(Header::destination_addr)
            {
                return Ok(destination);
            }
        }
        self.inner.local_addr()
    }

    /// Header accepted by the last read, `None` if it had none or failed
    pub fn proxy_header(&self) -> Option<&Header> {
        self.header.as_ref()
    }

    /// Configuration this connection was built with
    pub fn config(&self) -> &PacketConfig {
        &self.config
    }

    /// Gets a reference to the underlying socket
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Gets a mutable reference to the underlying socket
    ///
    /// Receiving from it directly bypasses header detection.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Unwraps this `PacketConn`, returning the underlying socket
    pub fn into_inner(self) -> T {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::HeaderErrorKind,
        header::{TransportProtocol, Version},
        transports::MemorySocket,
    };
    use async_trait::async_trait;
    use futures::executor::block_on;
    use std::{collections::VecDeque, sync::Mutex};

    fn any_port() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    fn udp4_header() -> Header {
        Header::proxy(
            TransportProtocol::UdpV4,
            "10.1.1.1:1000".parse().unwrap(),
            "20.2.2.2:2000".parse().unwrap(),
        )
    }

    /// A proxy side socket and a wrapped server socket
    fn pair(config: PacketConfig) -> (MemorySocket, PacketConn<MemorySocket>) {
        let client = MemorySocket::bind(any_port()).unwrap();
        let server = MemorySocket::bind(any_port()).unwrap();
        (client, PacketConn::with_config(server, config))
    }

    fn send(client: &MemorySocket, conn: &PacketConn<MemorySocket>, data: &[u8]) {
        let target = conn.get_ref().local_addr().unwrap();
        block_on(client.send_to(data, target)).unwrap();
    }

    #[test]
    fn test_plain_payload_passthrough() {
        let (client, mut conn) = pair(PacketConfig::new());
        send(&client, &conn, b"ping");

        let mut buf = [0u8; 16];
        let (n, addr) = block_on(conn.recv_from(&mut buf)).unwrap();
        assert_eq!(&buf[..n], b"ping");
        assert_eq!(addr, PeerAddr::Direct(client.local_addr().unwrap()));
        assert!(conn.proxy_header().is_none());
        assert_eq!(
            conn.local_addr().unwrap(),
            conn.get_ref().local_addr().unwrap()
        );
    }

    #[test]
    fn test_empty_datagram_is_payload() {
        let (client, mut conn) = pair(PacketConfig::new());
        send(&client, &conn, b"");

        let mut buf = [0u8; 16];
        let (n, _) = block_on(conn.recv_from(&mut buf)).unwrap();
        assert_eq!(n, 0);
    }

    #[test]
    fn test_header_then_payload() {
        let (client, mut conn) = pair(PacketConfig::new());
        let header = udp4_header();
        send(&client, &conn, &header.encode().unwrap());
        send(&client, &conn, b"ping");

        let mut buf = [0u8; 4];
        let (n, addr) = block_on(conn.recv_from(&mut buf)).unwrap();
        assert_eq!(&buf[..n], b"ping");
        assert_eq!(addr.to_string(), "10.1.1.1:1000");
        assert_eq!(addr.peer(), client.local_addr().unwrap());
        assert_eq!(conn.proxy_header(), Some(&header));
        assert_eq!(conn.local_addr().unwrap(), "20.2.2.2:2000".parse().unwrap());

        // reply reaches the proxy, not the declared client
        block_on(conn.send_to(b"pong", addr)).unwrap();
        let (n, from) = block_on(client.recv_from(&mut buf)).unwrap();
        assert_eq!(&buf[..n], b"pong");
        assert_eq!(from, conn.get_ref().local_addr().unwrap());
    }

    #[test]
    fn test_next_read_clears_header() {
        let (client, mut conn) = pair(PacketConfig::new());
        send(&client, &conn, &udp4_header().encode().unwrap());
        send(&client, &conn, b"ping");
        send(&client, &conn, b"plain");

        let mut buf = [0u8; 16];
        block_on(conn.recv_from(&mut buf)).unwrap();
        assert!(conn.proxy_header().is_some());

        let (n, addr) = block_on(conn.recv_from(&mut buf)).unwrap();
        assert_eq!(&buf[..n], b"plain");
        assert!(!addr.is_proxied());
        assert!(conn.proxy_header().is_none());
        assert_eq!(
            conn.local_addr().unwrap(),
            conn.get_ref().local_addr().unwrap()
        );
    }

    #[test]
    fn test_v1_header_accepted() {
        let (client, mut conn) = pair(PacketConfig::new());
        send(
            &client,
            &conn,
            b"PROXY TCP4 192.168.0.1 192.168.0.11 56324 443\r\n",
        );
        send(&client, &conn, b"data");

        let mut buf = [0u8; 16];
        let (n, addr) = block_on(conn.recv_from(&mut buf)).unwrap();
        assert_eq!(&buf[..n], b"data");
        assert_eq!(addr.logical(), "192.168.0.1:56324".parse().unwrap());
        assert_eq!(conn.proxy_header().unwrap().version, Version::V1);
    }

    #[test]
    fn test_require_without_header() {
        let (client, mut conn) = pair(PacketConfig::new().policy(Policy::Require));
        send(&client, &conn, b"ping");

        let mut buf = [0u8; 16];
        let err = block_on(conn.recv_from(&mut buf)).unwrap_err();
        assert!(matches!(err, ProxyErrorKind::RequiredHeaderMissing));
        assert_eq!(buf, [0u8; 16]);
        assert!(conn.proxy_header().is_none());
    }

    #[test]
    fn test_require_with_header() {
        let (client, mut conn) = pair(PacketConfig::new().policy(Policy::Require));
        send(&client, &conn, &udp4_header().encode().unwrap());
        send(&client, &conn, b"ping");

        let mut buf = [0u8; 16];
        let (n, addr) = block_on(conn.recv_from(&mut buf)).unwrap();
        assert_eq!(&buf[..n], b"ping");
        assert!(addr.is_proxied());
    }

    #[test]
    fn test_reject_with_header() {
        let (client, mut conn) = pair(
            PacketConfig::new()
                .policy(Policy::Reject)
                .validator(|_| panic!("validator must not run under reject")),
        );
        send(&client, &conn, &udp4_header().encode().unwrap());

        let mut buf = [0u8; 16];
        let err = block_on(conn.recv_from(&mut buf)).unwrap_err();
        assert!(matches!(err, ProxyErrorKind::SuperfluousHeader));
        assert!(conn.proxy_header().is_none());
        assert_eq!(
            conn.local_addr().unwrap(),
            conn.get_ref().local_addr().unwrap()
        );
    }

    #[test]
    fn test_reject_without_header() {
        let (client, mut conn) = pair(PacketConfig::new().policy(Policy::Reject));
        send(&client, &conn, b"ping");

        let mut buf = [0u8; 16];
        let (n, _) = block_on(conn.recv_from(&mut buf)).unwrap();
        assert_eq!(&buf[..n], b"ping");
    }

    #[test]
    fn test_malformed_header_under_every_policy() {
        for policy in [Policy::Use, Policy::Require, Policy::Reject] {
            let (client, mut conn) = pair(PacketConfig::new().policy(policy));
            send(&client, &conn, b"PROXY TCP4 1.2.3.4\r\n");

            let mut buf = [0u8; 16];
            match block_on(conn.recv_from(&mut buf)) {
                Err(ProxyErrorKind::MalformedHeader(HeaderErrorKind::V1Malformed(_))) => {}
                other => panic!("Expected MalformedHeader under {:?}, got {:?}", policy, other),
            }
        }
    }

    #[derive(Debug)]
    struct Untrusted;

    impl std::fmt::Display for Untrusted {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "untrusted source")
        }
    }

    impl std::error::Error for Untrusted {}

    #[test]
    fn test_validator_error_is_returned_verbatim() {
        let (client, mut conn) = pair(PacketConfig::new().validator(|header| {
            match header.source_addr() {
                Some(addr) if addr.ip().is_loopback() => Ok(()),
                _ => Err(Untrusted.into()),
            }
        }));
        send(&client, &conn, &udp4_header().encode().unwrap());
        send(&client, &conn, b"ping");

        let mut buf = [0u8; 16];
        match block_on(conn.recv_from(&mut buf)) {
            Err(ProxyErrorKind::ValidatorRejected(e)) => assert!(e.is::<Untrusted>()),
            other => panic!("Expected ValidatorRejected, got {:?}", other),
        }
        assert!(conn.proxy_header().is_none());

        // The payload datagram was not consumed by the failed read
        let (n, addr) = block_on(conn.recv_from(&mut buf)).unwrap();
        assert_eq!(&buf[..n], b"ping");
        assert!(!addr.is_proxied());
    }

    #[test]
    fn test_validator_accepts() {
        let (client, mut conn) = pair(PacketConfig::new().validator(|header| {
            if header.transport_protocol.is_datagram() {
                Ok(())
            } else {
                Err("stream header on a datagram socket".into())
            }
        }));
        send(&client, &conn, &udp4_header().encode().unwrap());
        send(&client, &conn, b"ping");

        let mut buf = [0u8; 16];
        let (_, addr) = block_on(conn.recv_from(&mut buf)).unwrap();
        assert_eq!(addr.to_string(), "10.1.1.1:1000");
    }

    #[test]
    fn test_local_header_keeps_local_addr() {
        let (client, mut conn) = pair(PacketConfig::new());
        send(&client, &conn, &Header::local().encode().unwrap());
        send(&client, &conn, b"health");

        let mut buf = [0u8; 16];
        let (n, addr) = block_on(conn.recv_from(&mut buf)).unwrap();
        assert_eq!(&buf[..n], b"health");
        assert_eq!(addr, PeerAddr::Direct(client.local_addr().unwrap()));
        assert!(conn.proxy_header().unwrap().command.is_local());
        assert_eq!(
            conn.local_addr().unwrap(),
            conn.get_ref().local_addr().unwrap()
        );
    }

    #[test]
    fn test_payload_truncated_to_caller_buffer() {
        let (client, mut conn) = pair(PacketConfig::new());
        send(&client, &conn, b"0123456789");

        let mut buf = [0u8; 4];
        let (n, _) = block_on(conn.recv_from(&mut buf)).unwrap();
        assert_eq!(n, 4);
        assert_eq!(&buf, b"0123");
    }

    #[test]
    fn test_payload_bounded_by_scratch_capacity() {
        let (client, mut conn) = pair(PacketConfig::new().scratch_capacity(MIN_CAPACITY));
        let payload = vec![7u8; MIN_CAPACITY + 100];
        send(&client, &conn, &payload);

        let mut buf = vec![0u8; payload.len()];
        let (n, _) = block_on(conn.recv_from(&mut buf)).unwrap();
        assert_eq!(n, MIN_CAPACITY);
        assert_eq!(&buf[..n], &payload[..n]);
    }

    const MIN_CAPACITY: usize = crate::config::MIN_SCRATCH_CAPACITY;

    #[test]
    fn test_send_to_plain_address() {
        let (client, conn) = pair(PacketConfig::new());
        block_on(conn.send_to(b"hello", client.local_addr().unwrap())).unwrap();

        let mut buf = [0u8; 16];
        let (n, _) = block_on(client.recv_from(&mut buf)).unwrap();
        assert_eq!(&buf[..n], b"hello");
    }

    /// Replays a fixed sequence of receive results
    struct ScriptedSocket {
        script: Mutex<VecDeque<io::Result<(Vec<u8>, SocketAddr)>>>,
    }

    impl ScriptedSocket {
        fn new(script: Vec<io::Result<(Vec<u8>, SocketAddr)>>) -> Self {
            ScriptedSocket {
                script: Mutex::new(script.into()),
            }
        }
    }

    #[async_trait]
    impl DatagramSocket for ScriptedSocket {
        async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
            let next = self.script.lock().unwrap().pop_front();
            match next {
                Some(Ok((data, from))) => {
                    let n = data.len().min(buf.len());
                    buf[..n].copy_from_slice(&data[..n]);
                    Ok((n, from))
                }
                Some(Err(e)) => Err(e),
                None => Err(io::ErrorKind::WouldBlock.into()),
            }
        }

        async fn send_to(&self, buf: &[u8], _target: SocketAddr) -> io::Result<usize> {
            Ok(buf.len())
        }

        fn local_addr(&self) -> io::Result<SocketAddr> {
            Ok("127.0.0.1:9000".parse().unwrap())
        }
    }

    #[test]
    fn test_transport_error_on_first_receive() {
        let mut conn = PacketConn::new(ScriptedSocket::new(vec![Err(
            io::ErrorKind::ConnectionReset.into(),
        )]));
        let mut buf = [0u8; 16];
        match block_on(conn.recv_from(&mut buf)) {
            Err(ProxyErrorKind::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::ConnectionReset),
            other => panic!("Expected Io, got {:?}", other),
        }
    }

    #[test]
    fn test_transport_error_after_header_clears_state() {
        let proxy: SocketAddr = "127.0.0.1:7000".parse().unwrap();
        let mut conn = PacketConn::new(ScriptedSocket::new(vec![
            Ok((udp4_header().encode().unwrap().to_vec(), proxy)),
            Err(io::ErrorKind::TimedOut.into()),
        ]));
        let mut buf = [0u8; 16];
        match block_on(conn.recv_from(&mut buf)) {
            Err(ProxyErrorKind::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::TimedOut),
            other => panic!("Expected Io, got {:?}", other),
        }
        assert!(conn.proxy_header().is_none());
        assert_eq!(conn.local_addr().unwrap(), "127.0.0.1:9000".parse().unwrap());
    }

    #[test]
    fn test_at_most_two_receives() {
        let proxy: SocketAddr = "127.0.0.1:7000".parse().unwrap();
        let mut conn = PacketConn::new(ScriptedSocket::new(vec![
            Ok((udp4_header().encode().unwrap().to_vec(), proxy)),
            Ok((b"ping".to_vec(), proxy)),
            Ok((b"plain".to_vec(), proxy)),
        ]));
        let mut buf = [0u8; 16];
        let (n, _) = block_on(conn.recv_from(&mut buf)).unwrap();
        assert_eq!(&buf[..n], b"ping");
        assert_eq!(conn.get_ref().script.lock().unwrap().len(), 1);

        let (n, _) = block_on(conn.recv_from(&mut buf)).unwrap();
        assert_eq!(&buf[..n], b"plain");
        assert!(conn.get_ref().script.lock().unwrap().is_empty());
    }

    #[test]
    fn test_header_with_trailing_bytes_discards_them() {
        let proxy: SocketAddr = "127.0.0.1:7000".parse().unwrap();
        let mut first = udp4_header().encode().unwrap().to_vec();
        first.extend_from_slice(b"junk");
        let mut conn = PacketConn::new(ScriptedSocket::new(vec![
            Ok((first, proxy)),
            Ok((b"ping".to_vec(), proxy)),
        ]));
        let mut buf = [0u8; 16];
        let (n, addr) = block_on(conn.recv_from(&mut buf)).unwrap();
        assert_eq!(&buf[..n], b"ping");
        assert!(addr.is_proxied());
    }

    #[test]
    fn test_into_inner() {
        let socket = MemorySocket::bind(any_port()).unwrap();
        let addr = socket.local_addr().unwrap();
        let conn = PacketConn::new(socket);
        assert_eq!(conn.config().get_policy(), Policy::Use);
        assert_eq!(conn.into_inner().local_addr().unwrap(), addr);
    }
}
