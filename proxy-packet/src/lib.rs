//! ## Summary
//!
//! A PROXY protocol aware wrapper for datagram sockets.
//!
//! A load balancer that relays UDP traffic can announce the original client by
//! sending a [PROXY protocol](https://www.haproxy.org/download/1.8/doc/proxy-protocol.txt)
//! header as its own datagram, immediately followed by the payload datagram it
//! describes. [`PacketConn`] receives such pairs and returns the payload with
//! the client address taken from the header, while replies still go back to the
//! proxy that relayed the datagram.
//!
//! ### Concept
//!
//! #### Header
//!
//! Both the text (v1) and the binary (v2) encodings are supported for parsing
//! and encoding, see [`Header`]. Version 2 TLVs are kept as raw type/value pairs.
//!
//! #### Policy
//!
//! [`Policy`] decides what happens with a header:
//! - `Use`: a header is accepted if present, plain datagrams pass through
//! - `Require`: every read must start with a header
//! - `Reject`: a header is an error
//!
//! An optional [`Validator`] sees every header the policy accepts and can refuse
//! it with its own error, which is returned to the caller unchanged.
//!
//! #### Address
//!
//! [`PacketConn::recv_from`] returns a [`PeerAddr`]. When a header declared a
//! client it is a [`ProxyAddr`] that displays as the client but keeps the socket
//! address of the proxy, and [`PacketConn::send_to`] sends to the proxy.
//!
//! ### Use proxy-packet
//!
//! 1. Bind a socket implementing [`DatagramSocket`], such as `tokio::net::UdpSocket`
//! 2. Build a [`PacketConfig`] with the policy and validator you need
//! 3. Wrap the socket with [`PacketConn::with_config`]
//! 4. Call `recv_from`/`send_to` on the wrapper
//!
//! ### Feature flags
//!
//! - `tokio-runtime`: Enable by default, implement [`DatagramSocket`] for `tokio::net::UdpSocket`
//! - `parking_lot`: use `parking_lot` mutex for the in-memory socket hub
//!
//! [`DatagramSocket`]: crate::transports::DatagramSocket

#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

/// Re-pub async trait
pub use async_trait::async_trait;
/// Re-pub bytes crate
pub use bytes;

/// Address types of relayed datagrams
mod addr;
/// PROXY protocol v1 and v2 codec
pub mod codec;
/// Read configuration
mod config;
/// Error
pub mod error;
/// PROXY header data model
mod header;
pub(crate) mod lock;
/// The PROXY aware datagram socket
mod packet_conn;
/// Underlying datagram sockets wrapper
pub mod transports;

pub use addr::{PeerAddr, ProxyAddr};
pub use codec::ProxyProtocolResult;
pub use config::{
    DEFAULT_SCRATCH_CAPACITY, MIN_SCRATCH_CAPACITY, PacketConfig, Policy, Validator,
};
pub use error::{BoxError, HeaderErrorKind, ProxyErrorKind};
pub use header::{Addresses, Command, Header, Tlv, TransportProtocol, Version};
pub use packet_conn::PacketConn;
