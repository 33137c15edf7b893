//! HAProxy PROXY Protocol v1 and v2 codec
//!
//! Parsing works on a complete in-memory message. On a datagram socket the
//! header arrives as one whole datagram, so there is nothing to peek or rewind:
//! either the bytes form a header or they are payload.
//!
//! Reference: https://www.haproxy.org/download/1.8/doc/proxy-protocol.txt

use log::debug;

use crate::{error::HeaderErrorKind, header::Header};

pub(crate) mod v1;
pub(crate) mod v2;

/// PROXY protocol v1 signature
pub(crate) const PROXY_V1_SIGNATURE: &[u8; 5] = b"PROXY";

/// PROXY protocol v2 signature (12 bytes)
pub(crate) const PROXY_V2_SIGNATURE: [u8; 12] = [
    0x0D, 0x0A, 0x0D, 0x0A, 0x00, 0x0D, 0x0A, 0x51, 0x55, 0x49, 0x54, 0x0A,
];

/// Result of parsing PROXY protocol
#[derive(Debug)]
pub enum ProxyProtocolResult {
    /// Successfully parsed, with the number of bytes the header occupies
    Success(Header, usize),
    /// Not a PROXY protocol header (data should be processed as-is)
    NotProxyProtocol,
    /// The data starts a PROXY header, but it is malformed
    Error(HeaderErrorKind),
}

/// Try to parse PROXY protocol from the start of `buf`
///
/// Data shorter than a signature can't be a header and is reported as
/// `NotProxyProtocol`.
pub(crate) fn parse(buf: &[u8]) -> ProxyProtocolResult {
    if buf.len() >= PROXY_V1_SIGNATURE.len() && buf[..5] == PROXY_V1_SIGNATURE[..] {
        return v1::parse(buf);
    }

    if buf.len() >= PROXY_V2_SIGNATURE.len() && buf[..12] == PROXY_V2_SIGNATURE {
        return v2::parse(buf);
    }

    debug!("no PROXY signature in {} bytes", buf.len());
    ProxyProtocolResult::NotProxyProtocol
}
