/*! Low-level packet access and construction.

# An overview over packet representations

The `wire` module deals with the packet *representation*. It provides two levels of
functionality.

 * First, it provides functions to extract fields from sequences of octets, and to insert fields
   into sequences of octets. This happens in the lowercase structures [`ipv4_packet`] and
   [`tcp_packet`], dynamically sized wrappers around a byte slice.
 * Second, it provides a compact, high-level representation of header data that can be created
   from parsing and emitted into a sequence of octets. This happens through the `Repr` family of
   structs, [`Ipv4Repr`] and [`TcpRepr`].

[`ipv4_packet`]: struct.ipv4_packet.html
[`tcp_packet`]: struct.tcp_packet.html
[`Ipv4Repr`]: struct.Ipv4Repr.html
[`TcpRepr`]: struct.TcpRepr.html

The `packet` family guarantees that, if `packet::check_len()` returned `Ok(())`, then no field
accessor or setter will panic. The `packet::new_checked` method is a shorthand for combining
`new_unchecked` and `check_len`. When parsing untrusted input, which is everything a raw socket
returns, it is *necessary* to use the checked method.

In the `Repr` family, `Repr::parse()` never panics and `Repr::emit()` never panics as long as
the buffer is at least `Repr::buffer_len()` octets long.

Options are not supported. Emitted TCP headers are always 20 bytes and parsing a header with
options skips over them without interpreting them.

# Examples

To emit a TCP header with a filled checksum and parse it back:

```rust
use rawtcp::wire::*;

let src = Ipv4Address::new(10, 0, 0, 1);
let dst = Ipv4Address::new(10, 0, 0, 2);
let mut repr = TcpRepr {
    src_port:   49152,
    dst_port:   80,
    seq_number: TcpSeqNumber(1000),
    ack_number: TcpSeqNumber(0),
    header_len: 5,
    flags:      TcpFlags::SYN,
    window_len: 65535,
    checksum:   0,
    urgent_at:  0,
};
repr.checksum = checksum::tcp(&repr, &[], src, dst).unwrap();
let bytes = repr.serialize();
assert!(checksum::verify_tcp(&bytes, src, dst));
assert_eq!(TcpRepr::parse(&bytes), Ok(repr));
```
*/
// Copyright (C) 2016 whitequark@whitequark.org
// Copyright (C) 2019 Andreas Molzer <andreas.molzer@tum.de>
//
// in large parts from `smoltcp` originally distributed under 0-clause BSD

// FIXME: Most fields should be self-explanatory, the accessors mirror the header diagrams.
#![allow(missing_docs)]

mod field {
    pub(crate) type Field = ::core::ops::Range<usize>;
}

mod error;
mod ip;
mod ipv4;
mod tcp;

/// Describes how to handle checksums.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Checksum {
    /// Checksum must be computed or checked manually.
    Manual,

    /// The checksum field is filled or checked by someone else.
    ///
    /// For incoming raw datagrams this is usually the kernel which already dropped packets with a
    /// wrong IP header checksum. On the loopback interface the TCP checksum is frequently left
    /// partial due to offloading, so checking it would reject perfectly fine segments.
    Ignored,
}

impl Checksum {
    /// Check if a checksum should be calculated by the library.
    pub fn manual(self) -> bool {
        match self {
            Checksum::Manual => true,
            Checksum::Ignored => false,
        }
    }
}

impl Default for Checksum {
    fn default() -> Self {
        Checksum::Ignored
    }
}

pub use self::error::{
    Error,
    Result};

pub use self::ip::{
    checksum,
    Protocol as IpProtocol};

pub use self::ipv4::{
    ipv4 as ipv4_packet,
    Address as Ipv4Address,
    Repr as Ipv4Repr,
    HEADER_LEN as IPV4_HEADER_LEN};

pub use self::tcp::{
    tcp as tcp_packet,
    Flags as TcpFlags,
    Repr as TcpRepr,
    SeqNumber as TcpSeqNumber,
    HEADER_LEN as TCP_HEADER_LEN};
