use std::{
    fmt,
    net::{IpAddr, SocketAddr},
};

/// Source of a datagram that arrived behind a PROXY header
///
/// Displays as the client address declared by the header. The socket address
/// the datagram actually came from is kept for replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProxyAddr {
    logical: SocketAddr,
    peer: SocketAddr,
}

impl ProxyAddr {
    /// Pair the header's source with the real sender
    pub fn new(logical: SocketAddr, peer: SocketAddr) -> Self {
        ProxyAddr { logical, peer }
    }

    /// Client address declared by the header
    pub fn logical(&self) -> SocketAddr {
        self.logical
    }

    /// Address the datagram was received from, usually the proxy
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }
}

impl fmt::Display for ProxyAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.logical, f)
    }
}

/// Source address returned by [`PacketConn::recv_from`](crate::PacketConn::recv_from),
/// and target accepted by [`PacketConn::send_to`](crate::PacketConn::send_to)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeerAddr {
    /// No header, the sender is the client
    Direct(SocketAddr),
    /// The sender relayed the datagram on behalf of a client
    Proxied(ProxyAddr),
}

impl PeerAddr {
    /// The client address, as declared by the header when there was one
    pub fn logical(&self) -> SocketAddr {
        match self {
            PeerAddr::Direct(addr) => *addr,
            PeerAddr::Proxied(addr) => addr.logical(),
        }
    }

    /// Where replies must be sent
    pub fn peer(&self) -> SocketAddr {
        match self {
            PeerAddr::Direct(addr) => *addr,
            PeerAddr::Proxied(addr) => addr.peer(),
        }
    }

    /// IP of the client
    pub fn ip(&self) -> IpAddr {
        self.logical().ip()
    }

    /// Port of the client
    pub fn port(&self) -> u16 {
        self.logical().port()
    }

    /// Whether the address came from a PROXY header
    pub fn is_proxied(&self) -> bool {
        matches!(self, PeerAddr::Proxied(_))
    }

    /// The pair of addresses, if the datagram was relayed
    pub fn as_proxied(&self) -> Option<&ProxyAddr> {
        match self {
            PeerAddr::Proxied(addr) => Some(addr),
            PeerAddr::Direct(_) => None,
        }
    }
}

impl fmt::Display for PeerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.logical(), f)
    }
}

impl From<SocketAddr> for PeerAddr {
    fn from(addr: SocketAddr) -> Self {
        PeerAddr::Direct(addr)
    }
}

impl From<ProxyAddr> for PeerAddr {
    fn from(addr: ProxyAddr) -> Self {
        PeerAddr::Proxied(addr)
    }
}

impl From<PeerAddr> for SocketAddr {
    fn from(addr: PeerAddr) -> Self {
        addr.logical()
    }
}

impl From<ProxyAddr> for SocketAddr {
    fn from(addr: ProxyAddr) -> Self {
        addr.logical()
    }
}
