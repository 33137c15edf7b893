use std::io::Error as IOError;
use thiserror::Error;

/// Error returned by a user supplied header validator
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
/// Error while reading from a PROXY aware datagram socket
pub enum ProxyErrorKind {
    /// Policy requires a PROXY header, but the datagram did not start with one
    #[error("proxy header required but missing")]
    RequiredHeaderMissing,
    /// The datagram started a PROXY header but it could not be parsed
    #[error("malformed proxy header: `{0}`")]
    MalformedHeader(#[from] HeaderErrorKind),
    /// Policy forbids PROXY headers, but a valid one was received
    #[error("superfluous proxy header")]
    SuperfluousHeader,
    /// The header validator refused a structurally valid header
    #[error("proxy header rejected by validator: `{0}`")]
    ValidatorRejected(#[source] BoxError),
    /// IO error from the underlying socket
    #[error("transport io error: `{0:?}`")]
    Io(#[from] IOError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
/// Detail error kind of PROXY header encoding and decoding
pub enum HeaderErrorKind {
    /// v1 header exceeds 107 bytes without a line terminator
    #[error("v1 header too long")]
    V1LineTooLong,
    /// v1 header is not terminated by CRLF
    #[error("v1 header is not terminated by CRLF")]
    V1MissingCrlf,
    /// v1 header does not have the expected fields
    #[error("invalid v1 header: {0}")]
    V1Malformed(String),
    /// Unknown v1 protocol token, or a protocol that v1 can't express
    #[error("unsupported v1 protocol: {0}")]
    V1UnsupportedProtocol(String),
    /// IP address token can't be parsed for the declared family
    #[error("invalid address: {0}")]
    InvalidAddress(String),
    /// Port token can't be parsed
    #[error("invalid port: {0}")]
    InvalidPort(String),
    /// Addresses don't belong to the declared transport protocol family
    #[error("address family does not match transport protocol")]
    AddressFamilyMismatch,
    /// v2 version nibble is not 2
    #[error("unsupported v2 version: {0}")]
    UnsupportedVersion(u8),
    /// v2 command nibble is neither LOCAL nor PROXY
    #[error("unsupported v2 command: {0:#x}")]
    UnsupportedCommand(u8),
    /// v2 family and protocol byte is not a known combination
    #[error("unsupported v2 address family and protocol: {0:#04x}")]
    UnsupportedFamily(u8),
    /// v2 length field points past the end of the datagram
    #[error("v2 header truncated, need {expected} bytes, got {actual}")]
    Truncated {
        /// Bytes announced by the header
        expected: usize,
        /// Bytes available
        actual: usize,
    },
    /// v2 address block is shorter than the family requires
    #[error("v2 address block too short, need {expected} bytes, got {actual}")]
    AddressTooShort {
        /// Bytes required by the family
        expected: usize,
        /// Bytes announced by the header
        actual: usize,
    },
    /// TLV length overruns the address block
    #[error("invalid v2 tlv")]
    InvalidTlv,
    /// Encoded v2 header does not fit into the 16 bit length field
    #[error("v2 header length {0} exceeds maximum")]
    LengthOverflow(usize),
}
