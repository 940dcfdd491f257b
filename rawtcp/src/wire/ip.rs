use core::fmt;

enum_with_unknown! {
    /// IP datagram encapsulated protocol.
    pub doc enum Protocol(u8) {
        /// The internet control message protocol.
        Icmp = 0x01,
        /// The transmission control protocol.
        Tcp  = 0x06,
        /// The user datagram protocol.
        Udp  = 0x11,
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Protocol::Icmp => write!(f, "ICMP"),
            Protocol::Tcp  => write!(f, "TCP"),
            Protocol::Udp  => write!(f, "UDP"),
            Protocol::Unknown(id) => write!(f, "0x{:02x}", id),
        }
    }
}

/// The internet checksum, RFC 1071, and its TCP flavour over the IPv4 pseudo header.
///
/// The raw sums ([`data`], [`combine`], [`pseudo_header`]) return the folded one's complement
/// sum *without* the final complement, so that partial sums over separate buffers can be
/// combined. [`internet`] and [`tcp`] return the value that goes into a checksum field.
///
/// [`data`]: fn.data.html
/// [`combine`]: fn.combine.html
/// [`pseudo_header`]: fn.pseudo_header.html
/// [`internet`]: fn.internet.html
/// [`tcp`]: fn.tcp.html
pub mod checksum {
    use byteorder::{ByteOrder, NetworkEndian};

    use super::Protocol;
    use crate::wire::{Error, Ipv4Address, Result, TcpRepr, TCP_HEADER_LEN};

    /// Fold all carries above bit 16 back into the low 16 bits.
    fn propagate_carries(mut word: u32) -> u16 {
        while word >> 16 != 0 {
            word = (word >> 16) + (word & 0xffff);
        }
        word as u16
    }

    /// Compute an RFC 1071 compliant checksum (without the final complement).
    ///
    /// Words are read big endian, an odd trailing byte is padded with a zero byte.
    pub fn data(data: &[u8]) -> u16 {
        let mut words = data.chunks_exact(2);
        let mut accum: u32 = 0;

        for word in &mut words {
            accum += u32::from(NetworkEndian::read_u16(word));
            // Keeps the accumulator from overflowing for arbitrarily long buffers.
            if accum >= 0x8000_0000 {
                accum = u32::from(propagate_carries(accum));
            }
        }

        if let Some(&value) = words.remainder().first() {
            accum += u32::from(value) << 8;
        }

        propagate_carries(accum)
    }

    /// Combine several RFC 1071 compliant checksums.
    pub fn combine(checksums: &[u16]) -> u16 {
        let mut accum: u32 = 0;
        for &word in checksums {
            accum += u32::from(word);
        }
        propagate_carries(accum)
    }

    /// Compute the sum over an IPv4 pseudo header.
    ///
    /// ```text
    /// +--------+--------+--------+--------+
    /// |          Source Address           |
    /// +--------+--------+--------+--------+
    /// |        Destination Address        |
    /// +--------+--------+--------+--------+
    /// |  zero  |  PTCL  |     Length      |
    /// +--------+--------+--------+--------+
    /// ```
    pub fn pseudo_header(
        src_addr: Ipv4Address,
        dst_addr: Ipv4Address,
        protocol: Protocol,
        length: u16,
    ) -> u16 {
        let mut proto_len = [0u8; 4];
        proto_len[1] = protocol.into();
        NetworkEndian::write_u16(&mut proto_len[2..4], length);

        combine(&[
            data(src_addr.as_bytes()),
            data(dst_addr.as_bytes()),
            data(&proto_len[..]),
        ])
    }

    /// The internet checksum of a buffer, ready to be written into a checksum field.
    ///
    /// The checksum field within `bytes` must be zero, otherwise the result is meaningless. Use
    /// [`tcp`] for TCP segments, which checks that precondition.
    ///
    /// [`tcp`]: fn.tcp.html
    pub fn internet(bytes: &[u8]) -> u16 {
        !data(bytes)
    }

    /// Compute the checksum of a TCP segment for the given IPv4 endpoints.
    ///
    /// The sum covers the pseudo header (protocol 6, length of header and payload), the header
    /// with its checksum field zeroed, and the payload. All three parts have even length up to the
    /// payload, so summing them separately and combining is the same as summing their
    /// concatenation.
    ///
    /// Returns `Err(Error::ChecksumPrecondition)` if `header.checksum` is not zero.
    pub fn tcp(
        header: &TcpRepr,
        payload: &[u8],
        src_addr: Ipv4Address,
        dst_addr: Ipv4Address,
    ) -> Result<u16> {
        if header.checksum != 0 {
            return Err(Error::ChecksumPrecondition);
        }

        let length = TCP_HEADER_LEN + payload.len();
        if length > usize::from(u16::max_value()) {
            return Err(Error::Unsupported);
        }

        Ok(!combine(&[
            pseudo_header(src_addr, dst_addr, Protocol::Tcp, length as u16),
            data(&header.serialize()),
            data(payload),
        ]))
    }

    /// Verify the checksum of a TCP segment as transmitted.
    ///
    /// The segment is the complete byte sequence of header and payload, with the filled checksum.
    /// Summing it together with the pseudo header yields all ones exactly if the checksum is
    /// correct.
    pub fn verify_tcp(segment: &[u8], src_addr: Ipv4Address, dst_addr: Ipv4Address) -> bool {
        if segment.len() > usize::from(u16::max_value()) {
            return false;
        }

        combine(&[
            pseudo_header(src_addr, dst_addr, Protocol::Tcp, segment.len() as u16),
            data(segment),
        ]) == !0
    }

    #[cfg(test)]
    mod test {
        use super::*;
        use crate::wire::{TcpFlags, TcpSeqNumber};

        const SRC_ADDR: Ipv4Address = Ipv4Address([192, 168, 1, 1]);
        const DST_ADDR: Ipv4Address = Ipv4Address([192, 168, 1, 2]);

        // A segment with options and payload, checksum 0x01b6.
        static SEGMENT_BYTES: [u8; 28] =
            [0xbf, 0x00, 0x00, 0x50,
             0x01, 0x23, 0x45, 0x67,
             0x89, 0xab, 0xcd, 0xef,
             0x60, 0x35, 0x01, 0x23,
             0x01, 0xb6, 0x02, 0x01,
             0x03, 0x03, 0x0c, 0x01,
             0xaa, 0x00, 0x00, 0xff];

        fn syn() -> TcpRepr {
            TcpRepr {
                src_port: 49152,
                dst_port: 42069,
                seq_number: TcpSeqNumber(1000),
                ack_number: TcpSeqNumber(0),
                header_len: 5,
                flags: TcpFlags::SYN,
                window_len: 65535,
                checksum: 0,
                urgent_at: 0,
            }
        }

        #[test]
        fn rfc1071_example() {
            // The worked example of RFC 1071, section 3.
            let bytes = [0x00, 0x01, 0xf2, 0x03, 0xf4, 0xf5, 0xf6, 0xf7];
            assert_eq!(data(&bytes), 0xddf2);
            assert_eq!(internet(&bytes), 0x220d);
        }

        #[test]
        fn odd_length_is_padded() {
            assert_eq!(data(&[0xab]), 0xab00);
            assert_eq!(data(&[0x12, 0x34, 0x56]), 0x1234 + 0x5600);
        }

        #[test]
        fn carries_fold_repeatedly() {
            // 0xffff + 0xffff + 0x0001 = 0x1ffff, folding once gives 0x10000, needs a second.
            assert_eq!(data(&[0xff, 0xff, 0xff, 0xff, 0x00, 0x01]), 0x0001);
            assert_eq!(combine(&[0xffff, 0xffff, 0x0001]), 0x0001);
        }

        #[test]
        fn empty_buffer() {
            assert_eq!(data(&[]), 0);
            assert_eq!(internet(&[]), 0xffff);
        }

        #[test]
        fn verify_known_segment() {
            assert!(verify_tcp(&SEGMENT_BYTES, SRC_ADDR, DST_ADDR));

            let mut corrupted = SEGMENT_BYTES;
            corrupted[27] ^= 0x01;
            assert!(!verify_tcp(&corrupted, SRC_ADDR, DST_ADDR));
            // The addresses are part of the sum.
            assert!(!verify_tcp(&SEGMENT_BYTES, DST_ADDR, Ipv4Address([192, 168, 1, 3])));
        }

        #[test]
        fn filled_checksum_verifies() {
            let payloads: [&[u8]; 4] = [b"", b"h", b"hi", b"Hello, raw world"];
            for payload in payloads.iter() {
                let mut repr = syn();
                repr.checksum = tcp(&repr, payload, SRC_ADDR, DST_ADDR).unwrap();
                let transmitted = repr.serialize_with_payload(payload);
                assert!(verify_tcp(&transmitted, SRC_ADDR, DST_ADDR), "payload {:?}", payload);
            }
        }

        #[test]
        fn concatenation_agrees() {
            let payload = b"odd";
            let repr = syn();
            let mut buffer = Vec::new();
            buffer.extend_from_slice(SRC_ADDR.as_bytes());
            buffer.extend_from_slice(DST_ADDR.as_bytes());
            buffer.extend_from_slice(&[0, 6, 0, 23]);
            buffer.extend_from_slice(&repr.serialize_with_payload(payload));
            assert_eq!(tcp(&repr, payload, SRC_ADDR, DST_ADDR), Ok(internet(&buffer)));
        }

        #[test]
        fn nonzero_checksum_rejected() {
            let mut repr = syn();
            repr.checksum = 0x1234;
            assert_eq!(tcp(&repr, b"", SRC_ADDR, DST_ADDR), Err(Error::ChecksumPrecondition));
        }
    }
}
