use bytes::Bytes;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use log::debug;

use super::ProxyProtocolResult;
use crate::{
    error::HeaderErrorKind,
    header::{Addresses, Command, Header, TransportProtocol, Version},
};

/// Maximum length of PROXY protocol v1 header (105 chars + CRLF)
const PROXY_V1_MAX_LENGTH: usize = 107;

/// Parse PROXY protocol version 1 (text format)
///
/// Format: "PROXY <INET_PROTO> <SRC_ADDR> <DST_ADDR> <SRC_PORT> <DST_PORT>\r\n"
/// Example: "PROXY TCP4 192.168.0.1 192.168.0.11 56324 443\r\n"
pub(crate) fn parse(buf: &[u8]) -> ProxyProtocolResult {
    let window = &buf[..buf.len().min(PROXY_V1_MAX_LENGTH)];
    let end = match window.windows(2).position(|w| w == b"\r\n") {
        Some(pos) => pos + 2,
        None if buf.len() >= PROXY_V1_MAX_LENGTH => {
            return ProxyProtocolResult::Error(HeaderErrorKind::V1LineTooLong);
        }
        None => return ProxyProtocolResult::Error(HeaderErrorKind::V1MissingCrlf),
    };

    let line = match std::str::from_utf8(&buf[..end - 2]) {
        Ok(line) => line,
        Err(_) => {
            return ProxyProtocolResult::Error(HeaderErrorKind::V1Malformed(
                "header contains invalid UTF-8".into(),
            ));
        }
    };

    match parse_line(line) {
        Ok(header) => ProxyProtocolResult::Success(header, end),
        Err(e) => ProxyProtocolResult::Error(e),
    }
}

/// Parse a single line without its CRLF terminator
fn parse_line(line: &str) -> Result<Header, HeaderErrorKind> {
    let parts: Vec<&str> = line.split(' ').collect();

    if parts.len() < 2 || parts[0] != "PROXY" {
        return Err(HeaderErrorKind::V1Malformed(
            "expected PROXY followed by a protocol".into(),
        ));
    }

    let transport_protocol = match parts[1] {
        "UNKNOWN" => {
            // Receivers must ignore anything after UNKNOWN
            debug!("PROXY v1 UNKNOWN protocol");
            return Ok(Header {
                version: Version::V1,
                command: Command::Proxy,
                transport_protocol: TransportProtocol::Unspec,
                addresses: Addresses::None,
                tlvs: Vec::new(),
            });
        }
        "TCP4" => TransportProtocol::TcpV4,
        "TCP6" => TransportProtocol::TcpV6,
        proto => return Err(HeaderErrorKind::V1UnsupportedProtocol(proto.to_string())),
    };

    if parts.len() != 6 {
        return Err(HeaderErrorKind::V1Malformed(format!(
            "expected 6 parts, got {}",
            parts.len()
        )));
    }

    let src_ip = parse_ip(parts[2], transport_protocol)?;
    let dst_ip = parse_ip(parts[3], transport_protocol)?;
    let src_port = parse_port(parts[4])?;
    let dst_port = parse_port(parts[5])?;

    let source = SocketAddr::new(src_ip, src_port);
    let destination = SocketAddr::new(dst_ip, dst_port);
    debug!("PROXY v1 parsed: src={}, dst={}", source, destination);

    Ok(Header {
        version: Version::V1,
        command: Command::Proxy,
        transport_protocol,
        addresses: Addresses::Inet {
            source,
            destination,
        },
        tlvs: Vec::new(),
    })
}

fn parse_ip(token: &str, proto: TransportProtocol) -> Result<IpAddr, HeaderErrorKind> {
    let ip = if proto.is_ipv4() {
        token.parse::<Ipv4Addr>().map(IpAddr::V4)
    } else {
        token.parse::<Ipv6Addr>().map(IpAddr::V6)
    };
    ip.map_err(|_| HeaderErrorKind::InvalidAddress(token.to_string()))
}

fn parse_port(token: &str) -> Result<u16, HeaderErrorKind> {
    if token.starts_with('+') {
        return Err(HeaderErrorKind::InvalidPort(token.to_string()));
    }
    token
        .parse()
        .map_err(|_| HeaderErrorKind::InvalidPort(token.to_string()))
}

/// Serialize a header as a v1 line
///
/// v1 only knows TCP over IP. LOCAL and UNSPEC headers become `PROXY UNKNOWN`.
pub(crate) fn encode(header: &Header) -> Result<Bytes, HeaderErrorKind> {
    let proto = header.transport_protocol;
    if header.command.is_local() || proto == TransportProtocol::Unspec {
        return Ok(Bytes::from_static(b"PROXY UNKNOWN\r\n"));
    }

    let token = match proto {
        TransportProtocol::TcpV4 => "TCP4",
        TransportProtocol::TcpV6 => "TCP6",
        other => return Err(HeaderErrorKind::V1UnsupportedProtocol(format!("{:?}", other))),
    };

    match header.addresses {
        Addresses::Inet {
            source,
            destination,
        } if source.is_ipv4() == proto.is_ipv4() && destination.is_ipv4() == proto.is_ipv4() => {
            Ok(Bytes::from(format!(
                "PROXY {} {} {} {} {}\r\n",
                token,
                source.ip(),
                destination.ip(),
                source.port(),
                destination.port()
            )))
        }
        _ => Err(HeaderErrorKind::AddressFamilyMismatch),
    }
}
