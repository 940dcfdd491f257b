//! A minimal user-space TCP client on top of raw IP sockets.
//!
//! ## Table of contents
//!
//! 1. [Design](#design)
//! 2. [The wire module](wire/index.html)
//!    1. [Ip V4](wire/struct.ipv4.html)
//!    1. [Tcp](wire/struct.tcp.html)
//!    1. [Checksums](wire/checksum/index.html)
//! 3. [The transport](nic/index.html)
//! 4. [The tcp layer](layer/tcp/index.html)
//!
//! ## Design
//!
//! The kernel's TCP implementation is not involved at all. Segments are serialized by hand,
//! checksummed over the IPv4 pseudo header, and written into a raw socket. Incoming datagrams are
//! read from the same raw socket, parsed, and filtered down to the ones addressed to the
//! connection.
//!
//! There are four parts that depend on each other quite closely:
//!
//! * The [`wire`] module, which deals with the exact bit-level layout of IPv4 and TCP headers.
//! * The checksum engine in [`wire::checksum`], the 16-bit one's complement sum over pseudo
//!   header, header and payload.
//! * The [`Waiter`], a one-shot rendezvous between one background receive attempt and the thread
//!   driving the connection.
//! * The [`Connection`] state machine itself, which sequences handshake, data and teardown and
//!   does all sequence number bookkeeping.
//!
//! Things that are deliberately missing: retransmission, congestion control, window scaling, TCP
//! options, reassembly of out-of-order segments. A lost or unexpected segment is a terminal error
//! for the operation that was waiting for it.
//!
//! [`wire`]: wire/index.html
//! [`wire::checksum`]: wire/checksum/index.html
//! [`Waiter`]: layer/tcp/struct.Waiter.html
//! [`Connection`]: layer/tcp/struct.Connection.html
#![warn(missing_docs)]
#![warn(unreachable_pub)]

#[macro_use] mod macros;
pub mod layer;
pub mod nic;
pub mod time;
pub mod wire;
