use core::fmt;
use byteorder::{ByteOrder, NetworkEndian};

use super::{Checksum, Error, Result};
use super::ip::checksum;
use super::field::Field;

pub(crate) use super::IpProtocol as Protocol;

/// The length of an IPv4 header without options.
pub const HEADER_LEN: usize = field::DST_ADDR.end;

/// A four-octet IPv4 address.
#[derive(Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Default)]
pub struct Address(pub [u8; 4]);

impl Address {
    /// An unspecified address.
    pub const UNSPECIFIED: Address = Address([0x00; 4]);

    /// Construct an IPv4 address from parts.
    pub const fn new(a0: u8, a1: u8, a2: u8, a3: u8) -> Address {
        Address([a0, a1, a2, a3])
    }

    /// Construct an IPv4 address from a sequence of octets, in big-endian.
    ///
    /// # Panics
    /// The function panics if `data` is not four octets long.
    pub fn from_bytes(data: &[u8]) -> Address {
        let mut bytes = [0; 4];
        bytes.copy_from_slice(data);
        Address(bytes)
    }

    /// Return an IPv4 address as a sequence of octets, in big-endian.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Encode the address into a `u32` in network endian byte order.
    pub fn to_network_integer(self) -> u32 {
        u32::from_be_bytes(self.0)
    }

    /// Query whether the address falls into the "unspecified" range.
    pub fn is_unspecified(&self) -> bool {
        self.0[0] == 0
    }

    /// Query whether the address falls into the "loopback" range.
    pub fn is_loopback(&self) -> bool {
        self.0[0] == 127
    }
}

impl From<::std::net::Ipv4Addr> for Address {
    fn from(x: ::std::net::Ipv4Addr) -> Address {
        Address(x.octets())
    }
}

impl From<Address> for ::std::net::Ipv4Addr {
    fn from(Address(x): Address) -> ::std::net::Ipv4Addr {
        x.into()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let bytes = self.0;
        write!(f, "{}.{}.{}.{}", bytes[0], bytes[1], bytes[2], bytes[3])
    }
}

byte_wrapper! {
    /// A byte sequence representing an IPv4 packet.
    #[derive(Debug, PartialEq, Eq)]
    pub struct ipv4([u8]);
}

mod field {
    use crate::wire::field::Field;

    pub(crate) const VER_IHL:  usize = 0;
    pub(crate) const DSCP_ECN: usize = 1;
    pub(crate) const LENGTH:   Field = 2..4;
    pub(crate) const IDENT:    Field = 4..6;
    pub(crate) const FLG_OFF:  Field = 6..8;
    pub(crate) const TTL:      usize = 8;
    pub(crate) const PROTOCOL: usize = 9;
    pub(crate) const CHECKSUM: Field = 10..12;
    pub(crate) const SRC_ADDR: Field = 12..16;
    pub(crate) const DST_ADDR: Field = 16..20;
}

impl ipv4 {
    /// Imbue a raw octet buffer with IPv4 packet structure.
    pub fn new_unchecked(buffer: &[u8]) -> &ipv4 {
        Self::__from_macro_new_unchecked(buffer)
    }

    /// Imbue a mutable octet buffer with IPv4 packet structure.
    pub fn new_unchecked_mut(buffer: &mut [u8]) -> &mut ipv4 {
        Self::__from_macro_new_unchecked_mut(buffer)
    }

    /// Shorthand for a combination of [new_unchecked] and [check_len].
    ///
    /// [new_unchecked]: #method.new_unchecked
    /// [check_len]: #method.check_len
    pub fn new_checked(data: &[u8]) -> Result<&ipv4> {
        let packet = Self::new_unchecked(data);
        packet.check_len()?;
        Ok(packet)
    }

    /// View the packet as a raw byte slice.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Ensure that no accessor method will panic if called.
    ///
    /// Returns `Err(Error::Truncated)` if the buffer is shorter than the fixed header, the header
    /// length field or the total length field. Returns `Err(Error::Malformed)` if the header
    /// length is below the fixed header or greater than the total length.
    pub fn check_len(&self) -> Result<()> {
        let len = self.0.len();
        if len < HEADER_LEN {
            Err(Error::Truncated)
        } else if usize::from(self.header_len()) < HEADER_LEN {
            Err(Error::Malformed)
        } else if len < usize::from(self.header_len()) {
            Err(Error::Truncated)
        } else if u16::from(self.header_len()) > self.total_len() {
            Err(Error::Malformed)
        } else if len < usize::from(self.total_len()) {
            Err(Error::Truncated)
        } else {
            Ok(())
        }
    }

    #[inline]
    pub fn version(&self) -> u8 {
        self.0[field::VER_IHL] >> 4
    }

    /// Return the header length, in octets.
    #[inline]
    pub fn header_len(&self) -> u8 {
        (self.0[field::VER_IHL] & 0x0f) * 4
    }

    #[inline]
    pub fn total_len(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::LENGTH])
    }

    #[inline]
    pub fn ident(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::IDENT])
    }

    #[inline]
    pub fn dont_frag(&self) -> bool {
        NetworkEndian::read_u16(&self.0[field::FLG_OFF]) & 0x4000 != 0
    }

    #[inline]
    pub fn more_frags(&self) -> bool {
        NetworkEndian::read_u16(&self.0[field::FLG_OFF]) & 0x2000 != 0
    }

    /// Return the fragment offset, in octets.
    #[inline]
    pub fn frag_offset(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::FLG_OFF]) << 3
    }

    #[inline]
    pub fn hop_limit(&self) -> u8 {
        self.0[field::TTL]
    }

    #[inline]
    pub fn protocol(&self) -> Protocol {
        Protocol::from(self.0[field::PROTOCOL])
    }

    #[inline]
    pub fn checksum(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::CHECKSUM])
    }

    #[inline]
    pub fn src_addr(&self) -> Address {
        Address::from_bytes(&self.0[field::SRC_ADDR])
    }

    #[inline]
    pub fn dst_addr(&self) -> Address {
        Address::from_bytes(&self.0[field::DST_ADDR])
    }

    /// Validate the header checksum.
    pub fn verify_checksum(&self) -> bool {
        checksum::data(&self.0[..usize::from(self.header_len())]) == !0
    }

    /// Set the version and header length, in octets, at once.
    #[inline]
    pub fn set_version_and_header_len(&mut self, version: u8, header_len: u8) {
        self.0[field::VER_IHL] = (version << 4) | ((header_len / 4) & 0x0f);
    }

    #[inline]
    pub fn set_total_len(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.0[field::LENGTH], value)
    }

    #[inline]
    pub fn set_ident(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.0[field::IDENT], value)
    }

    /// Set the flags and fragment offset so that the packet is a single, unfragmentable unit.
    #[inline]
    pub fn set_unfragmented(&mut self) {
        NetworkEndian::write_u16(&mut self.0[field::FLG_OFF], 0x4000);
    }

    #[inline]
    pub fn set_hop_limit(&mut self, value: u8) {
        self.0[field::TTL] = value
    }

    #[inline]
    pub fn set_protocol(&mut self, value: Protocol) {
        self.0[field::PROTOCOL] = value.into()
    }

    #[inline]
    pub fn set_checksum(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.0[field::CHECKSUM], value)
    }

    #[inline]
    pub fn set_src_addr(&mut self, value: Address) {
        self.0[field::SRC_ADDR].copy_from_slice(value.as_bytes())
    }

    #[inline]
    pub fn set_dst_addr(&mut self, value: Address) {
        self.0[field::DST_ADDR].copy_from_slice(value.as_bytes())
    }

    /// Compute and fill in the header checksum.
    pub fn fill_checksum(&mut self) {
        self.set_checksum(0);
        let checksum = checksum::internet(&self.0[..usize::from(self.header_len())]);
        self.set_checksum(checksum)
    }

    /// Compute the range of the payload without accessing it.
    pub fn payload_range(&self) -> Field {
        usize::from(self.header_len())..usize::from(self.total_len())
    }

    /// Return the payload as a byte slice.
    ///
    /// Trailing bytes after the total length, such as link layer padding, are not included.
    pub fn payload_slice(&self) -> &[u8] {
        let range = self.payload_range();
        &self.0[range]
    }
}

impl AsRef<[u8]> for ipv4 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// A high-level representation of an Internet Protocol version 4 packet header.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Repr {
    /// The source of the packet.
    pub src_addr:    Address,
    /// The destination of the packet.
    pub dst_addr:    Address,
    /// The encapsulated protocol identifier.
    pub protocol:    Protocol,
    /// The length of the payload.
    pub payload_len: usize,
    /// The remaining hop limit of the packet.
    pub hop_limit:   u8,
    /// The identification field, only meaningful for fragments.
    pub ident:       u16,
}

impl Repr {
    /// Parse an Internet Protocol version 4 packet and return a high-level representation.
    pub fn parse(packet: &ipv4, checksum: Checksum) -> Result<Repr> {
        packet.check_len()?;
        if packet.version() != 4 { return Err(Error::Malformed) }
        if checksum.manual() && !packet.verify_checksum() { return Err(Error::WrongChecksum) }
        // A single raw connection can not reassemble fragments.
        if packet.more_frags() || packet.frag_offset() != 0 { return Err(Error::Unsupported) }

        Ok(Repr {
            src_addr:    packet.src_addr(),
            dst_addr:    packet.dst_addr(),
            protocol:    packet.protocol(),
            payload_len: packet.payload_range().len(),
            hop_limit:   packet.hop_limit(),
            ident:       packet.ident(),
        })
    }

    /// Return the length of a header that will be emitted from this high-level representation.
    pub fn buffer_len(&self) -> usize {
        HEADER_LEN
    }

    /// Emit a high-level representation into an Internet Protocol version 4 packet.
    ///
    /// Returns `Err(Error::Unsupported)` if the payload does not fit into a single datagram.
    pub fn emit(&self, packet: &mut ipv4, checksum: Checksum) -> Result<()> {
        let total_len = HEADER_LEN + self.payload_len;
        if total_len > usize::from(u16::max_value()) {
            return Err(Error::Unsupported);
        }

        packet.set_version_and_header_len(4, HEADER_LEN as u8);
        packet.0[field::DSCP_ECN] = 0;
        packet.set_total_len(total_len as u16);
        packet.set_ident(self.ident);
        packet.set_unfragmented();
        packet.set_hop_limit(self.hop_limit);
        packet.set_protocol(self.protocol);
        packet.set_src_addr(self.src_addr);
        packet.set_dst_addr(self.dst_addr);

        if checksum.manual() {
            packet.fill_checksum();
        } else {
            // The kernel fills it in when the header is included with the datagram.
            packet.set_checksum(0);
        }

        Ok(())
    }

    /// Emit the header alone, for a payload of `payload_len` bytes.
    pub fn serialize(&self, checksum: Checksum) -> Result<[u8; HEADER_LEN]> {
        let mut bytes = [0; HEADER_LEN];
        self.emit(ipv4::new_unchecked_mut(&mut bytes), checksum)?;
        Ok(bytes)
    }

    /// Emit a complete datagram carrying `payload`.
    ///
    /// The `payload_len` of `self` is ignored and replaced by the length of `payload`.
    pub fn serialize_with_payload(&self, payload: &[u8], checksum: Checksum) -> Result<Vec<u8>> {
        let repr = Repr { payload_len: payload.len(), ..*self };
        let mut bytes = vec![0; HEADER_LEN + payload.len()];
        repr.emit(ipv4::new_unchecked_mut(&mut bytes), checksum)?;
        bytes[HEADER_LEN..].copy_from_slice(payload);
        Ok(bytes)
    }
}

impl fmt::Display for Repr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "IPv4 src={} dst={} proto={} len={}",
               self.src_addr, self.dst_addr, self.protocol, self.payload_len)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    static PACKET_BYTES: [u8; 24] =
        [0x45, 0x00, 0x00, 0x18,
         0x00, 0x01, 0x40, 0x00,
         0x40, 0x06, 0x26, 0xdd,
         0x0a, 0x00, 0x00, 0x01,
         0x0a, 0x00, 0x00, 0x02,
         0xaa, 0x00, 0x00, 0xff];

    static PAYLOAD_BYTES: [u8; 4] =
        [0xaa, 0x00, 0x00, 0xff];

    fn packet_repr() -> Repr {
        Repr {
            src_addr:    Address([10, 0, 0, 1]),
            dst_addr:    Address([10, 0, 0, 2]),
            protocol:    Protocol::Tcp,
            payload_len: 4,
            hop_limit:   64,
            ident:       1,
        }
    }

    #[test]
    fn test_deconstruct() {
        let packet = ipv4::new_checked(&PACKET_BYTES[..]).unwrap();
        assert_eq!(packet.version(), 4);
        assert_eq!(packet.header_len(), 20);
        assert_eq!(packet.total_len(), 24);
        assert_eq!(packet.ident(), 1);
        assert_eq!(packet.dont_frag(), true);
        assert_eq!(packet.more_frags(), false);
        assert_eq!(packet.frag_offset(), 0);
        assert_eq!(packet.hop_limit(), 64);
        assert_eq!(packet.protocol(), Protocol::Tcp);
        assert_eq!(packet.checksum(), 0x26dd);
        assert_eq!(packet.src_addr(), Address([10, 0, 0, 1]));
        assert_eq!(packet.dst_addr(), Address([10, 0, 0, 2]));
        assert_eq!(packet.verify_checksum(), true);
        assert_eq!(packet.payload_slice(), &PAYLOAD_BYTES[..]);
    }

    #[test]
    fn test_parse() {
        let packet = ipv4::new_unchecked(&PACKET_BYTES[..]);
        assert_eq!(Repr::parse(packet, Checksum::Manual), Ok(packet_repr()));
    }

    #[test]
    fn test_emit() {
        let bytes = packet_repr()
            .serialize_with_payload(&PAYLOAD_BYTES, Checksum::Manual)
            .unwrap();
        assert_eq!(&bytes[..], &PACKET_BYTES[..]);
    }

    #[test]
    fn test_serialize_header() {
        let header = packet_repr().serialize(Checksum::Manual).unwrap();
        assert_eq!(&header[..], &PACKET_BYTES[..HEADER_LEN]);
    }

    #[test]
    fn test_emit_ignored_checksum() {
        let bytes = packet_repr()
            .serialize_with_payload(&PAYLOAD_BYTES, Checksum::Ignored)
            .unwrap();
        assert_eq!(ipv4::new_unchecked(&bytes).checksum(), 0);
        assert_eq!(&bytes[..10], &PACKET_BYTES[..10]);
        assert_eq!(&bytes[12..], &PACKET_BYTES[12..]);
    }

    #[test]
    fn test_overlong() {
        let mut bytes = PACKET_BYTES.to_vec();
        bytes.push(0);
        assert_eq!(ipv4::new_checked(&bytes).unwrap().payload_slice(), &PAYLOAD_BYTES[..]);
    }

    #[test]
    fn test_truncated() {
        assert_eq!(ipv4::new_checked(&PACKET_BYTES[..19]), Err(Error::Truncated));
        assert_eq!(ipv4::new_checked(&PACKET_BYTES[..23]), Err(Error::Truncated));
    }

    #[test]
    fn test_parse_bad_version() {
        let mut bytes = PACKET_BYTES;
        let packet = ipv4::new_unchecked_mut(&mut bytes);
        packet.set_version_and_header_len(6, 20);
        packet.fill_checksum();
        assert_eq!(Repr::parse(packet, Checksum::Manual), Err(Error::Malformed));
    }

    #[test]
    fn test_parse_short_header_len() {
        let mut bytes = PACKET_BYTES;
        bytes[0] = 0x44;
        assert_eq!(ipv4::new_checked(&bytes), Err(Error::Malformed));
    }

    #[test]
    fn test_parse_wrong_checksum() {
        let mut bytes = PACKET_BYTES;
        bytes[8] = 0x3f;
        let packet = ipv4::new_unchecked(&bytes);
        assert_eq!(Repr::parse(packet, Checksum::Manual), Err(Error::WrongChecksum));
        assert!(Repr::parse(packet, Checksum::Ignored).is_ok());
    }

    #[test]
    fn test_parse_fragment() {
        let mut bytes = PACKET_BYTES;
        bytes[6] = 0x20;
        let packet = ipv4::new_unchecked(&bytes);
        assert_eq!(Repr::parse(packet, Checksum::Ignored), Err(Error::Unsupported));
    }

    #[test]
    fn test_address_display() {
        assert_eq!(format!("{}", Address::new(127, 0, 0, 1)), "127.0.0.1");
        assert!(Address::new(127, 0, 0, 1).is_loopback());
        assert!(Address::UNSPECIFIED.is_unspecified());
    }
}
