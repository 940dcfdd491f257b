use core::fmt;

/// The error type for parsing and emitting packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// An incoming packet could not be parsed because it was shorter than assumed.
    ///
    /// The packet may be shorter than the minimum header length, or shorter than the length that
    /// one of its header fields claims.
    Truncated,

    /// An incoming packet had an incorrect checksum and was dropped.
    WrongChecksum,

    /// An incoming packet was recognized but was self-contradictory.
    ///
    /// Examples: an IPv4 packet with a version other than 4; a TCP header whose data offset is
    /// smaller than the fixed header.
    Malformed,

    /// Parsing depends on information derived from a non-implemented feature.
    ///
    /// We know that our implementation is incomplete here. An example is a fragmented IPv4
    /// datagram, reassembly is not something a single raw connection is able to do.
    Unsupported,

    /// A checksum was requested for a header that already had a checksum field filled in.
    ///
    /// The one's complement sum must be computed over a zeroed checksum field. Computing it over
    /// a filled one silently produces a wrong value, so it is refused instead.
    ChecksumPrecondition,
}

/// The result type for the wire module.
pub type Result<T> = core::result::Result<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Truncated     => write!(f, "truncated packet"),
            Error::WrongChecksum => write!(f, "checksum error"),
            Error::Malformed     => write!(f, "malformed packet"),
            Error::Unsupported   => write!(f, "unsupported packet feature"),
            Error::ChecksumPrecondition => write!(f, "checksum field not zeroed before checksumming"),
        }
    }
}

impl std::error::Error for Error {}
