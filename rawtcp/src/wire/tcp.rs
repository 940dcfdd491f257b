use core::{fmt, ops};
use byteorder::{ByteOrder, NetworkEndian};

use super::{Error, Ipv4Address, Result};
use super::ip::checksum;

/// The length of a TCP header without options.
pub const HEADER_LEN: usize = field::URGENT.end;

/// A TCP sequence number.
///
/// A sequence number is a monotonically advancing integer modulo 2<sup>32</sup>. Adding to it
/// wraps around silently, as it does on the wire.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default, Hash)]
pub struct SeqNumber(pub u32);

impl fmt::Display for SeqNumber {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl ops::Add<usize> for SeqNumber {
    type Output = SeqNumber;

    fn add(self, rhs: usize) -> SeqNumber {
        // Only the residue modulo 2^32 matters.
        SeqNumber(self.0.wrapping_add(rhs as u32))
    }
}

impl ops::AddAssign<usize> for SeqNumber {
    fn add_assign(&mut self, rhs: usize) {
        *self = *self + rhs;
    }
}

/// A set of tcp control flags.
///
/// Only the low six bits are represented, the reserved and ECN bits of the wire format are
/// dropped when parsing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Flags(pub u8);

impl Flags {
    pub const FIN: Flags = Flags(0x01);
    pub const SYN: Flags = Flags(0x02);
    pub const RST: Flags = Flags(0x04);
    pub const PSH: Flags = Flags(0x08);
    pub const ACK: Flags = Flags(0x10);
    pub const URG: Flags = Flags(0x20);

    const MASK: u8 = 0x3f;

    /// Construct from a raw flags byte, ignoring bits outside of the known flags.
    pub fn from_bits_truncate(bits: u8) -> Self {
        Flags(bits & Self::MASK)
    }

    /// The raw flags byte.
    pub fn bits(self) -> u8 {
        self.0
    }

    /// Check that all flags of `other` are also set in `self`.
    pub fn contains(self, other: Flags) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub fn fin(self) -> bool {
        self.contains(Flags::FIN)
    }

    #[inline]
    pub fn syn(self) -> bool {
        self.contains(Flags::SYN)
    }

    #[inline]
    pub fn rst(self) -> bool {
        self.contains(Flags::RST)
    }

    #[inline]
    pub fn psh(self) -> bool {
        self.contains(Flags::PSH)
    }

    #[inline]
    pub fn ack(self) -> bool {
        self.contains(Flags::ACK)
    }

    #[inline]
    pub fn urg(self) -> bool {
        self.contains(Flags::URG)
    }

    /// The length of the control flags, in terms of sequence space.
    pub fn sequence_len(self) -> usize {
        usize::from(self.syn()) + usize::from(self.fin())
    }
}

impl ops::BitOr for Flags {
    type Output = Flags;

    fn bitor(self, rhs: Flags) -> Flags {
        Flags(self.0 | rhs.0)
    }
}

impl fmt::Display for Flags {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        const NAMES: [(Flags, &str); 6] = [
            (Flags::FIN, "FIN"),
            (Flags::SYN, "SYN"),
            (Flags::RST, "RST"),
            (Flags::PSH, "PSH"),
            (Flags::ACK, "ACK"),
            (Flags::URG, "URG"),
        ];

        if self.0 == 0 {
            return write!(f, "-");
        }

        let mut first = true;
        for &(flag, name) in NAMES.iter() {
            if self.contains(flag) {
                if !first {
                    write!(f, "|")?;
                }
                write!(f, "{}", name)?;
                first = false;
            }
        }
        Ok(())
    }
}

byte_wrapper! {
    /// A byte sequence representing a TCP segment, header and payload.
    #[derive(Debug, PartialEq, Eq)]
    pub struct tcp([u8]);
}

mod field {
    use crate::wire::field::Field;

    pub(crate) const SRC_PORT: Field = 0..2;
    pub(crate) const DST_PORT: Field = 2..4;
    pub(crate) const SEQ_NUM:  Field = 4..8;
    pub(crate) const ACK_NUM:  Field = 8..12;
    pub(crate) const OFFSET:   usize = 12;
    pub(crate) const FLAGS:    usize = 13;
    pub(crate) const WIN_SIZE: Field = 14..16;
    pub(crate) const CHECKSUM: Field = 16..18;
    pub(crate) const URGENT:   Field = 18..20;
}

impl tcp {
    /// Imbue a raw octet buffer with TCP segment structure.
    pub fn new_unchecked(buffer: &[u8]) -> &tcp {
        Self::__from_macro_new_unchecked(buffer)
    }

    /// Imbue a mutable octet buffer with TCP segment structure.
    pub fn new_unchecked_mut(buffer: &mut [u8]) -> &mut tcp {
        Self::__from_macro_new_unchecked_mut(buffer)
    }

    /// Shorthand for a combination of [new_unchecked] and [check_len].
    ///
    /// [new_unchecked]: #method.new_unchecked
    /// [check_len]: #method.check_len
    pub fn new_checked(data: &[u8]) -> Result<&tcp> {
        let packet = Self::new_unchecked(data);
        packet.check_len()?;
        Ok(packet)
    }

    /// View the segment as a raw byte slice.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Ensure that no accessor method will panic if called.
    ///
    /// Returns `Err(Error::Truncated)` if the buffer is shorter than the fixed header or than the
    /// header length field claims. Returns `Err(Error::Malformed)` if the header length field
    /// is smaller than the fixed header.
    ///
    /// The result of this check is invalidated by calling [set_header_len].
    ///
    /// [set_header_len]: #method.set_header_len
    pub fn check_len(&self) -> Result<()> {
        let len = self.0.len();
        if len < HEADER_LEN {
            Err(Error::Truncated)
        } else {
            let header_len = usize::from(self.header_len());
            if header_len < HEADER_LEN {
                Err(Error::Malformed)
            } else if len < header_len {
                Err(Error::Truncated)
            } else {
                Ok(())
            }
        }
    }

    #[inline]
    pub fn src_port(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::SRC_PORT])
    }

    #[inline]
    pub fn dst_port(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::DST_PORT])
    }

    #[inline]
    pub fn seq_number(&self) -> SeqNumber {
        SeqNumber(NetworkEndian::read_u32(&self.0[field::SEQ_NUM]))
    }

    #[inline]
    pub fn ack_number(&self) -> SeqNumber {
        SeqNumber(NetworkEndian::read_u32(&self.0[field::ACK_NUM]))
    }

    /// Return the header length, in octets.
    #[inline]
    pub fn header_len(&self) -> u8 {
        (self.0[field::OFFSET] >> 4) * 4
    }

    /// Read all flags at once, masked to the known flags.
    #[inline]
    pub fn flags(&self) -> Flags {
        Flags::from_bits_truncate(self.0[field::FLAGS])
    }

    #[inline]
    pub fn window_len(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::WIN_SIZE])
    }

    #[inline]
    pub fn checksum(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::CHECKSUM])
    }

    #[inline]
    pub fn urgent_at(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::URGENT])
    }

    /// Return the options as an uninterpreted byte slice.
    pub fn options(&self) -> &[u8] {
        &self.0[HEADER_LEN..usize::from(self.header_len())]
    }

    /// Return the payload as a byte slice.
    pub fn payload_slice(&self) -> &[u8] {
        &self.0[usize::from(self.header_len())..]
    }

    /// Return the length of the segment, in terms of sequence space.
    pub fn sequence_len(&self) -> usize {
        self.payload_slice().len() + self.flags().sequence_len()
    }

    /// Validate the segment checksum against the IPv4 endpoints.
    pub fn verify_checksum(&self, src_addr: Ipv4Address, dst_addr: Ipv4Address) -> bool {
        checksum::verify_tcp(&self.0, src_addr, dst_addr)
    }

    #[inline]
    pub fn set_src_port(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.0[field::SRC_PORT], value)
    }

    #[inline]
    pub fn set_dst_port(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.0[field::DST_PORT], value)
    }

    #[inline]
    pub fn set_seq_number(&mut self, value: SeqNumber) {
        NetworkEndian::write_u32(&mut self.0[field::SEQ_NUM], value.0)
    }

    #[inline]
    pub fn set_ack_number(&mut self, value: SeqNumber) {
        NetworkEndian::write_u32(&mut self.0[field::ACK_NUM], value.0)
    }

    /// Set the header length, in 32-bit words. The reserved low nibble is cleared.
    #[inline]
    pub fn set_header_len(&mut self, words: u8) {
        self.0[field::OFFSET] = (words & 0x0f) << 4;
    }

    #[inline]
    pub fn set_flags(&mut self, flags: Flags) {
        self.0[field::FLAGS] = flags.bits();
    }

    #[inline]
    pub fn set_window_len(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.0[field::WIN_SIZE], value)
    }

    #[inline]
    pub fn set_checksum(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.0[field::CHECKSUM], value)
    }

    #[inline]
    pub fn set_urgent_at(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.0[field::URGENT], value)
    }

    /// Compute and fill in the segment checksum over header and payload.
    ///
    /// Returns `Err(Error::Unsupported)` if the segment is too long for the 16-bit length of the
    /// pseudo header, the checksum field is left untouched then.
    pub fn fill_checksum(&mut self, src_addr: Ipv4Address, dst_addr: Ipv4Address) -> Result<()> {
        if self.0.len() > usize::from(u16::max_value()) {
            return Err(Error::Unsupported);
        }

        self.set_checksum(0);
        let length = self.0.len() as u16;
        let checksum = !checksum::combine(&[
            checksum::pseudo_header(src_addr, dst_addr, super::IpProtocol::Tcp, length),
            checksum::data(&self.0),
        ]);
        self.set_checksum(checksum);
        Ok(())
    }

    /// Return the payload as a mutable byte slice.
    pub fn payload_mut_slice(&mut self) -> &mut [u8] {
        let start = usize::from(self.header_len());
        &mut self.0[start..]
    }
}

impl AsRef<[u8]> for tcp {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// A high-level representation of a Transmission Control Protocol header.
///
/// All fields are plain values, including the checksum. This makes the representation usable as
/// the input of the checksum computation itself, which requires the checksum field to be zero.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Repr {
    pub src_port:   u16,
    pub dst_port:   u16,
    pub seq_number: SeqNumber,
    pub ack_number: SeqNumber,
    /// The header length in 32-bit words, 5 without options.
    ///
    /// Only informational for parsed segments. Emitting always writes 5, the length of the
    /// header that is actually written.
    pub header_len: u8,
    pub flags:      Flags,
    pub window_len: u16,
    pub checksum:   u16,
    pub urgent_at:  u16,
}

impl Repr {
    /// Parse the header of a TCP segment.
    ///
    /// Options, if any, are skipped without being interpreted. The checksum is not verified, use
    /// [`checksum::verify_tcp`] on the complete segment for that.
    ///
    /// [`checksum::verify_tcp`]: ../checksum/fn.verify_tcp.html
    pub fn parse(bytes: &[u8]) -> Result<Repr> {
        let packet = tcp::new_checked(bytes)?;
        Ok(Repr::from_packet(packet))
    }

    /// Read the header fields of a segment that passed `check_len`.
    pub fn from_packet(packet: &tcp) -> Repr {
        Repr {
            src_port:   packet.src_port(),
            dst_port:   packet.dst_port(),
            seq_number: packet.seq_number(),
            ack_number: packet.ack_number(),
            header_len: packet.header_len() / 4,
            flags:      packet.flags(),
            window_len: packet.window_len(),
            checksum:   packet.checksum(),
            urgent_at:  packet.urgent_at(),
        }
    }

    /// Return the length of a header that will be emitted from this high-level representation.
    ///
    /// This is always the fixed header, we never emit any options.
    pub fn buffer_len(&self) -> usize {
        HEADER_LEN
    }

    /// The length of a segment with this header and `payload_len` bytes, in sequence space.
    pub fn sequence_len(&self, payload_len: usize) -> usize {
        payload_len + self.flags.sequence_len()
    }

    /// Emit the header into the first `HEADER_LEN` bytes of a segment buffer.
    ///
    /// Options are never emitted, so the data offset is always that of the bare header
    /// regardless of `header_len`.
    ///
    /// # Panics
    /// This function panics if the buffer is shorter than `HEADER_LEN`.
    pub fn emit(&self, packet: &mut tcp) {
        packet.set_src_port(self.src_port);
        packet.set_dst_port(self.dst_port);
        packet.set_seq_number(self.seq_number);
        packet.set_ack_number(self.ack_number);
        packet.set_header_len((HEADER_LEN / 4) as u8);
        packet.set_flags(self.flags);
        packet.set_window_len(self.window_len);
        packet.set_checksum(self.checksum);
        packet.set_urgent_at(self.urgent_at);
    }

    /// Serialize the header, big endian and without options.
    pub fn serialize(&self) -> [u8; HEADER_LEN] {
        let mut bytes = [0; HEADER_LEN];
        self.emit(tcp::new_unchecked_mut(&mut bytes));
        bytes
    }

    /// Serialize the header followed verbatim by the payload.
    pub fn serialize_with_payload(&self, payload: &[u8]) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());
        bytes.extend_from_slice(&self.serialize());
        bytes.extend_from_slice(payload);
        bytes
    }
}

impl fmt::Display for Repr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "TCP src={} dst={} seq={} ack={} {} win={}",
               self.src_port, self.dst_port, self.seq_number, self.ack_number,
               self.flags, self.window_len)
    }
}
