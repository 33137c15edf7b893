use std::{fmt, sync::Arc};

use crate::{codec::v2::PROXY_V2_MAX_ADDRESSED_SIZE, error::BoxError, header::Header};

/// Default size of the buffer used for the first receive of every read
pub const DEFAULT_SCRATCH_CAPACITY: usize = 512;
/// Smallest scratch buffer that can hold any v2 header with an address block
pub const MIN_SCRATCH_CAPACITY: usize = PROXY_V2_MAX_ADDRESSED_SIZE;

/// Whether a PROXY header must, may or must not appear
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Policy {
    /// Accept a header if present, read plain payload otherwise
    #[default]
    Use,
    /// Every read must start with a header
    Require,
    /// A header is an error
    Reject,
}

/// Check applied to every accepted header
///
/// The returned error aborts the read and is handed to the caller unchanged
/// inside [`ValidatorRejected`](crate::error::ProxyErrorKind::ValidatorRejected).
pub type Validator = Arc<dyn Fn(&Header) -> Result<(), BoxError> + Send + Sync + 'static>;

/// Configuration of a [`PacketConn`](crate::PacketConn)
#[derive(Clone)]
pub struct PacketConfig {
    pub(crate) policy: Policy,
    pub(crate) validator: Option<Validator>,
    pub(crate) scratch_capacity: usize,
}

impl Default for PacketConfig {
    fn default() -> Self {
        PacketConfig {
            policy: Policy::Use,
            validator: None,
            scratch_capacity: DEFAULT_SCRATCH_CAPACITY,
        }
    }
}

impl fmt::Debug for PacketConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PacketConfig")
            .field("policy", &self.policy)
            .field("validator", &self.validator.is_some())
            .field("scratch_capacity", &self.scratch_capacity)
            .finish()
    }
}

impl PacketConfig {
    /// New a default config: `Policy::Use`, no validator, 512 byte scratch buffer
    pub fn new() -> Self {
        Default::default()
    }

    /// Header policy
    ///
    /// Default is `Policy::Use`
    pub fn policy(mut self, policy: Policy) -> Self {
        self.policy = policy;
        self
    }

    /// Validate every header accepted by the policy
    ///
    /// Never called under `Policy::Reject`: a header is refused before its
    /// content is looked at.
    pub fn validator<F>(mut self, validator: F) -> Self
    where
        F: Fn(&Header) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.validator = Some(Arc::new(validator));
        self
    }

    /// Size of the buffer the first datagram of every read lands in
    ///
    /// When the first datagram turns out to be payload, this is the largest
    /// payload that can be delivered: a datagram can't be completed by another
    /// receive, so longer ones are truncated to this size.
    ///
    /// Default is 512 bytes
    ///
    /// Panic when capacity < `MIN_SCRATCH_CAPACITY`
    pub fn scratch_capacity(mut self, capacity: usize) -> Self {
        assert!(
            capacity >= MIN_SCRATCH_CAPACITY,
            "scratch capacity must be able to hold a proxy header"
        );
        self.scratch_capacity = capacity;
        self
    }

    /// Configured policy
    pub fn get_policy(&self) -> Policy {
        self.policy
    }
}
