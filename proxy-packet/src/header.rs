use bytes::Bytes;
use std::net::SocketAddr;

use crate::{codec, error::HeaderErrorKind};

/// PROXY protocol version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Version {
    /// Human readable text format
    V1,
    /// Binary format
    V2,
}

/// v2 command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Connection was established on purpose by the proxy without being relayed,
    /// such as a health check. Addresses must be ignored.
    Local,
    /// Connection was established on behalf of another node
    Proxy,
}

impl Command {
    /// Whether the header was sent by the proxy for itself
    pub fn is_local(self) -> bool {
        matches!(self, Command::Local)
    }
}

/// Address family and transport protocol carried in the header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportProtocol {
    /// Unknown or unspecified
    Unspec,
    /// TCP over IPv4
    TcpV4,
    /// UDP over IPv4
    UdpV4,
    /// TCP over IPv6
    TcpV6,
    /// UDP over IPv6
    UdpV6,
    /// Unix stream socket
    UnixStream,
    /// Unix datagram socket
    UnixDatagram,
}

impl TransportProtocol {
    pub(crate) fn from_byte(byte: u8) -> Option<Self> {
        let proto = match byte {
            0x00 => TransportProtocol::Unspec,
            0x11 => TransportProtocol::TcpV4,
            0x12 => TransportProtocol::UdpV4,
            0x21 => TransportProtocol::TcpV6,
            0x22 => TransportProtocol::UdpV6,
            0x31 => TransportProtocol::UnixStream,
            0x32 => TransportProtocol::UnixDatagram,
            _ => return None,
        };
        Some(proto)
    }

    pub(crate) fn to_byte(self) -> u8 {
        match self {
            TransportProtocol::Unspec => 0x00,
            TransportProtocol::TcpV4 => 0x11,
            TransportProtocol::UdpV4 => 0x12,
            TransportProtocol::TcpV6 => 0x21,
            TransportProtocol::UdpV6 => 0x22,
            TransportProtocol::UnixStream => 0x31,
            TransportProtocol::UnixDatagram => 0x32,
        }
    }

    /// TCP4 or UDP4
    pub fn is_ipv4(self) -> bool {
        matches!(self, TransportProtocol::TcpV4 | TransportProtocol::UdpV4)
    }

    /// TCP6 or UDP6
    pub fn is_ipv6(self) -> bool {
        matches!(self, TransportProtocol::TcpV6 | TransportProtocol::UdpV6)
    }

    /// Unix stream or datagram
    pub fn is_unix(self) -> bool {
        matches!(
            self,
            TransportProtocol::UnixStream | TransportProtocol::UnixDatagram
        )
    }

    /// UDP or unix datagram
    pub fn is_datagram(self) -> bool {
        matches!(
            self,
            TransportProtocol::UdpV4 | TransportProtocol::UdpV6 | TransportProtocol::UnixDatagram
        )
    }
}

/// Source and destination declared by the header
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Addresses {
    /// LOCAL command, UNSPEC family or v1 UNKNOWN
    None,
    /// IPv4 or IPv6 endpoints
    Inet {
        /// The real client
        source: SocketAddr,
        /// The address the client connected to, usually the proxy
        destination: SocketAddr,
    },
    /// Unix socket paths, trailing NUL bytes are stripped
    Unix {
        /// Source path
        source: Bytes,
        /// Destination path
        destination: Bytes,
    },
}

/// A v2 type-length-value extension, kept as raw bytes
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Tlv {
    /// PP2_TYPE_* value
    pub kind: u8,
    /// Raw value
    pub value: Bytes,
}

/// Parsed PROXY protocol header
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Header {
    /// Wire format version
    pub version: Version,
    /// LOCAL or PROXY
    pub command: Command,
    /// Family and transport protocol
    pub transport_protocol: TransportProtocol,
    /// Declared endpoints
    pub addresses: Addresses,
    /// v2 extensions
    pub tlvs: Vec<Tlv>,
}

impl Header {
    /// A v2 LOCAL header, as sent by health checks
    pub fn local() -> Self {
        Header {
            version: Version::V2,
            command: Command::Local,
            transport_protocol: TransportProtocol::Unspec,
            addresses: Addresses::None,
            tlvs: Vec::new(),
        }
    }

    /// A v2 PROXY header relaying `source` to `destination`
    pub fn proxy(
        transport_protocol: TransportProtocol,
        source: SocketAddr,
        destination: SocketAddr,
    ) -> Self {
        Header {
            version: Version::V2,
            command: Command::Proxy,
            transport_protocol,
            addresses: Addresses::Inet {
                source,
                destination,
            },
            tlvs: Vec::new(),
        }
    }

    /// Change the wire format version
    pub fn with_version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    /// Append a v2 extension
    pub fn with_tlv(mut self, kind: u8, value: impl Into<Bytes>) -> Self {
        self.tlvs.push(Tlv {
            kind,
            value: value.into(),
        });
        self
    }

    /// Client address declared by the header, if it is an IP endpoint
    pub fn source_addr(&self) -> Option<SocketAddr> {
        match self.addresses {
            Addresses::Inet { source, .. } => Some(source),
            _ => None,
        }
    }

    /// Destination address declared by the header, if it is an IP endpoint
    pub fn destination_addr(&self) -> Option<SocketAddr> {
        match self.addresses {
            Addresses::Inet { destination, .. } => Some(destination),
            _ => None,
        }
    }

    /// Try to parse a header from the start of `buf`
    ///
    /// `buf` must hold the whole header: on a datagram socket, one receive is
    /// one message and a header never spans two of them.
    pub fn parse(buf: &[u8]) -> codec::ProxyProtocolResult {
        codec::parse(buf)
    }

    /// Serialize the header in its own version's format
    pub fn encode(&self) -> Result<Bytes, HeaderErrorKind> {
        match self.version {
            Version::V1 => self.encode_v1(),
            Version::V2 => self.encode_v2(),
        }
    }

    /// Serialize as a v1 text line
    pub fn encode_v1(&self) -> Result<Bytes, HeaderErrorKind> {
        codec::v1::encode(self)
    }

    /// Serialize as a v2 binary header
    pub fn encode_v2(&self) -> Result<Bytes, HeaderErrorKind> {
        codec::v2::encode(self)
    }
}
