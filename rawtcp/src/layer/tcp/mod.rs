//! The TCP layer: a single active connection without retransmission.
//!
//! A [`Connection`] drives exactly one client connection through its life: the three-way
//! handshake, sending data, and the four-way teardown. It owns the sequence and acknowledgment
//! numbers and mutates them only in response to its own sends and to the segments it waited for.
//!
//! ## Waiting for segments
//!
//! Every exchange follows the same pattern: arm a [`Waiter`] for the answer, send the segment,
//! then block on the waiter. Arming *before* sending matters. The background receive is already
//! pulling datagrams off the socket when the answer arrives, so even a peer on the loopback
//! interface that answers instantaneously can not overtake us. The waiter is one-shot: it starts
//! one receive attempt, delivers one matching segment (or the error that ended the attempt) and is
//! consumed by waiting on it.
//!
//! Datagrams that do not belong to the connection are skipped by the receive attempt. A raw
//! socket sees every TCP datagram of the host, so this is the normal case and not an error.
//!
//! ## Sequence numbers
//!
//! The sequence number of a connection always names the first sequence number not yet sent. A SYN
//! and a FIN each occupy one sequence number, data occupies its length. Consequently the FIN of a
//! connection that only completed its handshake carries `ISN + 1`.
//!
//! ## Deviations
//!
//! Anything unexpected ends the operation with an error. There are no timers, no
//! retransmissions and no RST handling. A connection whose operation failed is not usable anymore
//! but its socket is still released, by a teardown that was started or on drop. Closing a
//! connection that is not established is refused and changes nothing.
//!
//! [`Connection`]: struct.Connection.html
//! [`Waiter`]: struct.Waiter.html
use core::fmt;
use std::io;

use crate::wire::{self, TcpFlags};

mod connection;
mod siphash;
mod waiter;


pub use connection::{
    Connection,
    FourTuple,
    Options,
    State};

pub use waiter::{
    Expect,
    Waiter};

// publically exposed for initialization.
pub use siphash::IsnGenerator;

/// The result type of the tcp layer.
pub type Result<T> = core::result::Result<T, Error>;

/// The ways a connection operation can fail.
#[derive(Debug)]
pub enum Error {
    /// The transport failed to send, receive or close.
    ///
    /// This includes failing to open the raw socket, usually for lack of privileges.
    Socket(io::Error),

    /// A received segment was shorter than a TCP header.
    TruncatedSegment,

    /// A segment belonging to the connection arrived but had different control flags.
    ///
    /// The segment is consumed by the failed wait.
    UnexpectedSegment {
        /// The flags that were waited for.
        expected: TcpFlags,
        /// The flags of the segment that arrived instead.
        actual: TcpFlags,
    },

    /// Data or teardown was requested on a connection that is not established.
    NotEstablished,

    /// A checksum was computed over a header whose checksum field was already filled.
    ChecksumPrecondition,

    /// An outgoing segment could not be encoded.
    ///
    /// Only happens for payloads that do not fit into a single IPv4 datagram.
    Malformed(wire::Error),

    /// `connect` was called on a connection that was already used.
    ///
    /// Connections are never reopened, create a new one instead.
    Reused,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Socket(err) => write!(f, "socket error: {}", err),
            Error::TruncatedSegment => write!(f, "segment shorter than a tcp header"),
            Error::UnexpectedSegment { expected, actual } =>
                write!(f, "expected a segment with {}, received {}", expected, actual),
            Error::NotEstablished => write!(f, "connection is not established"),
            Error::ChecksumPrecondition => write!(f, "checksum field not zeroed before checksumming"),
            Error::Malformed(err) => write!(f, "could not encode segment: {}", err),
            Error::Reused => write!(f, "connection was already used"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Socket(err) => Some(err),
            Error::Malformed(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Socket(err)
    }
}

/// Can convert from a wire error.
///
/// The two codec errors with a tcp layer meaning keep it, everything else is an encoding failure.
impl From<wire::Error> for Error {
    fn from(err: wire::Error) -> Self {
        match err {
            wire::Error::Truncated => Error::TruncatedSegment,
            wire::Error::ChecksumPrecondition => Error::ChecksumPrecondition,
            other => Error::Malformed(other),
        }
    }
}
