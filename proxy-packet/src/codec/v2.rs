use bytes::{BufMut, Bytes, BytesMut};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use log::debug;

use super::{PROXY_V2_SIGNATURE, ProxyProtocolResult};
use crate::{
    error::HeaderErrorKind,
    header::{Addresses, Command, Header, Tlv, TransportProtocol, Version},
};

/// PROXY protocol v2 header size (16 bytes)
const PROXY_V2_HEADER_SIZE: usize = 16;

/// IPv4: 4 + 4 + 2 + 2
const PROXY_V2_INET_LEN: usize = 12;
/// IPv6: 16 + 16 + 2 + 2
const PROXY_V2_INET6_LEN: usize = 36;
/// Unix: 108 + 108
const PROXY_V2_UNIX_LEN: usize = 216;
const UNIX_PATH_LEN: usize = 108;

/// Size of the largest address block a v2 header can carry
pub(crate) const PROXY_V2_MAX_ADDRESSED_SIZE: usize = PROXY_V2_HEADER_SIZE + PROXY_V2_UNIX_LEN;

/// Parse PROXY protocol version 2 (binary format)
///
/// The caller has checked the signature already.
pub(crate) fn parse(buf: &[u8]) -> ProxyProtocolResult {
    match parse_inner(buf) {
        Ok((header, len)) => ProxyProtocolResult::Success(header, len),
        Err(e) => ProxyProtocolResult::Error(e),
    }
}

fn parse_inner(buf: &[u8]) -> Result<(Header, usize), HeaderErrorKind> {
    if buf.len() < PROXY_V2_HEADER_SIZE {
        return Err(HeaderErrorKind::Truncated {
            expected: PROXY_V2_HEADER_SIZE,
            actual: buf.len(),
        });
    }

    let ver_cmd = buf[12];
    let version = (ver_cmd & 0xF0) >> 4;
    if version != 2 {
        return Err(HeaderErrorKind::UnsupportedVersion(version));
    }

    let command = match ver_cmd & 0x0F {
        0x00 => Command::Local,
        0x01 => Command::Proxy,
        other => return Err(HeaderErrorKind::UnsupportedCommand(other)),
    };

    let transport_protocol =
        TransportProtocol::from_byte(buf[13]).ok_or(HeaderErrorKind::UnsupportedFamily(buf[13]))?;

    let addr_len = u16::from_be_bytes([buf[14], buf[15]]) as usize;
    let total = PROXY_V2_HEADER_SIZE + addr_len;
    if buf.len() < total {
        return Err(HeaderErrorKind::Truncated {
            expected: total,
            actual: buf.len(),
        });
    }
    let block = &buf[PROXY_V2_HEADER_SIZE..total];

    if command.is_local() || transport_protocol == TransportProtocol::Unspec {
        // LOCAL: connection was established by proxy itself (health check)
        // Address data is ignored for LOCAL command and AF_UNSPEC
        debug!(
            "PROXY v2 {:?} {:?}, skipping {} bytes of address data",
            command, transport_protocol, addr_len
        );
        return Ok((
            Header {
                version: Version::V2,
                command,
                transport_protocol,
                addresses: Addresses::None,
                tlvs: Vec::new(),
            },
            total,
        ));
    }

    let (addresses, rest) = parse_addresses(transport_protocol, block)?;
    let tlvs = parse_tlvs(rest)?;

    Ok((
        Header {
            version: Version::V2,
            command,
            transport_protocol,
            addresses,
            tlvs,
        },
        total,
    ))
}

/// Parse address from PROXY v2 PROXY command
fn parse_addresses(
    proto: TransportProtocol,
    block: &[u8],
) -> Result<(Addresses, &[u8]), HeaderErrorKind> {
    let need = if proto.is_ipv4() {
        PROXY_V2_INET_LEN
    } else if proto.is_ipv6() {
        PROXY_V2_INET6_LEN
    } else {
        PROXY_V2_UNIX_LEN
    };
    if block.len() < need {
        return Err(HeaderErrorKind::AddressTooShort {
            expected: need,
            actual: block.len(),
        });
    }

    let addresses = if proto.is_ipv4() {
        let src_ip = Ipv4Addr::new(block[0], block[1], block[2], block[3]);
        let dst_ip = Ipv4Addr::new(block[4], block[5], block[6], block[7]);
        let src_port = u16::from_be_bytes([block[8], block[9]]);
        let dst_port = u16::from_be_bytes([block[10], block[11]]);
        Addresses::Inet {
            source: SocketAddr::new(IpAddr::V4(src_ip), src_port),
            destination: SocketAddr::new(IpAddr::V4(dst_ip), dst_port),
        }
    } else if proto.is_ipv6() {
        let mut src_ip = [0u8; 16];
        src_ip.copy_from_slice(&block[0..16]);
        let mut dst_ip = [0u8; 16];
        dst_ip.copy_from_slice(&block[16..32]);
        let src_port = u16::from_be_bytes([block[32], block[33]]);
        let dst_port = u16::from_be_bytes([block[34], block[35]]);
        Addresses::Inet {
            source: SocketAddr::new(IpAddr::V6(Ipv6Addr::from(src_ip)), src_port),
            destination: SocketAddr::new(IpAddr::V6(Ipv6Addr::from(dst_ip)), dst_port),
        }
    } else {
        Addresses::Unix {
            source: unix_path(&block[..UNIX_PATH_LEN]),
            destination: unix_path(&block[UNIX_PATH_LEN..PROXY_V2_UNIX_LEN]),
        }
    };

    debug!("PROXY v2 parsed: {:?}", addresses);
    Ok((addresses, &block[need..]))
}

fn unix_path(raw: &[u8]) -> Bytes {
    let end = raw.iter().position(|b| *b == 0).unwrap_or(raw.len());
    Bytes::copy_from_slice(&raw[..end])
}

fn parse_tlvs(mut rest: &[u8]) -> Result<Vec<Tlv>, HeaderErrorKind> {
    let mut tlvs = Vec::new();
    while !rest.is_empty() {
        if rest.len() < 3 {
            return Err(HeaderErrorKind::InvalidTlv);
        }
        let len = u16::from_be_bytes([rest[1], rest[2]]) as usize;
        if rest.len() < 3 + len {
            return Err(HeaderErrorKind::InvalidTlv);
        }
        tlvs.push(Tlv {
            kind: rest[0],
            value: Bytes::copy_from_slice(&rest[3..3 + len]),
        });
        rest = &rest[3 + len..];
    }
    Ok(tlvs)
}

/// Serialize a header as v2
///
/// LOCAL and UNSPEC headers carry no address block and no TLVs.
pub(crate) fn encode(header: &Header) -> Result<Bytes, HeaderErrorKind> {
    let proto = header.transport_protocol;
    let mut buf = BytesMut::with_capacity(PROXY_V2_MAX_ADDRESSED_SIZE);
    buf.put_slice(&PROXY_V2_SIGNATURE);
    buf.put_u8(match header.command {
        Command::Local => 0x20,
        Command::Proxy => 0x21,
    });
    buf.put_u8(proto.to_byte());
    // length, filled in below
    buf.put_u16(0);

    if !header.command.is_local() && proto != TransportProtocol::Unspec {
        encode_addresses(proto, &header.addresses, &mut buf)?;
        for tlv in &header.tlvs {
            let len = u16::try_from(tlv.value.len())
                .map_err(|_| HeaderErrorKind::LengthOverflow(tlv.value.len()))?;
            buf.put_u8(tlv.kind);
            buf.put_u16(len);
            buf.put_slice(&tlv.value);
        }
    }

    let addr_len = buf.len() - PROXY_V2_HEADER_SIZE;
    let addr_len =
        u16::try_from(addr_len).map_err(|_| HeaderErrorKind::LengthOverflow(addr_len))?;
    buf[14..16].copy_from_slice(&addr_len.to_be_bytes());

    Ok(buf.freeze())
}

fn encode_addresses(
    proto: TransportProtocol,
    addresses: &Addresses,
    buf: &mut BytesMut,
) -> Result<(), HeaderErrorKind> {
    match addresses {
        Addresses::Inet {
            source,
            destination,
        } => match (source.ip(), destination.ip()) {
            (IpAddr::V4(src), IpAddr::V4(dst)) if proto.is_ipv4() => {
                buf.put_slice(&src.octets());
                buf.put_slice(&dst.octets());
            }
            (IpAddr::V6(src), IpAddr::V6(dst)) if proto.is_ipv6() => {
                buf.put_slice(&src.octets());
                buf.put_slice(&dst.octets());
            }
            _ => return Err(HeaderErrorKind::AddressFamilyMismatch),
        },
        Addresses::Unix {
            source,
            destination,
        } if proto.is_unix() => {
            for path in [source, destination] {
                if path.len() > UNIX_PATH_LEN {
                    return Err(HeaderErrorKind::InvalidAddress(
                        String::from_utf8_lossy(path).into_owned(),
                    ));
                }
                buf.put_slice(path);
                buf.put_bytes(0, UNIX_PATH_LEN - path.len());
            }
            return Ok(());
        }
        _ => return Err(HeaderErrorKind::AddressFamilyMismatch),
    }

    if let Addresses::Inet {
        source,
        destination,
    } = addresses
    {
        buf.put_u16(source.port());
        buf.put_u16(destination.port());
    }
    Ok(())
}
