//! Encapsulates the raw IP transport.
//!
//! Everything the tcp layer needs from the operating system is captured in the [`Socket`] trait:
//! send a datagram to an address, receive one datagram together with its sender, and release the
//! underlying resource. The real implementation is [`RawSocket`], a raw `AF_INET` socket for the
//! TCP protocol. [`External`] is a software emulation whose datagrams come from and go to the
//! caller, which allows driving a connection without any network or privileges.
//!
//! [`Socket`]: trait.Socket.html
//! [`RawSocket`]: struct.RawSocket.html
//! [`External`]: struct.External.html
use std::io;
use std::sync::Arc;
use std::net::{Ipv4Addr, SocketAddrV4, UdpSocket};

use crate::wire::Ipv4Address;

pub mod external;

#[cfg(unix)]
#[path="sys/mod.rs"]
mod sys_internal;

pub use self::external::External;

#[cfg(unix)]
pub use self::sys_internal::exports as sys;
#[cfg(unix)]
pub use self::sys_internal::exports::RawSocket;

/// A datagram transport for TCP segments.
///
/// All methods take `&self` since a connection shares the socket with the background thread that
/// receives on its behalf. Implementations must tolerate a receive running concurrently to sends
/// and to `close`.
pub trait Socket: Send + Sync + 'static {
    /// Send one datagram to the destination address.
    ///
    /// Depending on the [`Framing`] the bytes start with an IPv4 header or with the TCP header.
    ///
    /// [`Framing`]: enum.Framing.html
    fn send_to(&self, bytes: &[u8], dst_addr: Ipv4Address) -> io::Result<usize>;

    /// Receive one datagram, blocking until one arrives.
    ///
    /// The received bytes always begin with the IPv4 header. Returns the length of the datagram
    /// and the address of its sender.
    fn recv_from(&self, buffer: &mut [u8]) -> io::Result<(usize, Ipv4Address)>;

    /// Release the socket.
    ///
    /// Calling it more than once is not an error, only the first call has an effect. Sends
    /// afterwards fail and a blocked receive returns an error.
    fn close(&self) -> io::Result<()>;
}

/// Sharing a socket, for example to inspect an `External` after the connection is gone.
impl<T: Socket + ?Sized> Socket for Arc<T> {
    fn send_to(&self, bytes: &[u8], dst_addr: Ipv4Address) -> io::Result<usize> {
        (**self).send_to(bytes, dst_addr)
    }

    fn recv_from(&self, buffer: &mut [u8]) -> io::Result<(usize, Ipv4Address)> {
        (**self).recv_from(buffer)
    }

    fn close(&self) -> io::Result<()> {
        (**self).close()
    }
}

/// Who builds the IPv4 header of outgoing datagrams.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Framing {
    /// The operating system prepends the IPv4 header, we only write the TCP segment.
    Kernel,

    /// We write the complete IPv4 datagram ourselves (`IP_HDRINCL`).
    Own,
}

impl Default for Framing {
    fn default() -> Self {
        Framing::Kernel
    }
}

/// Find the local address the operating system would use to reach `dst_addr`.
///
/// This connects an unbound UDP socket, which only consults the routing table and does not send
/// anything.
pub fn route_source(dst_addr: Ipv4Address) -> io::Result<Ipv4Address> {
    let probe = UdpSocket::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0))?;
    // The port is irrelevant, it is never used.
    probe.connect(SocketAddrV4::new(dst_addr.into(), 9))?;
    match probe.local_addr()? {
        std::net::SocketAddr::V4(local) => Ok((*local.ip()).into()),
        std::net::SocketAddr::V6(_) => Err(io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            "no IPv4 route to destination")),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn loopback_routes_to_itself() {
        let local = route_source(Ipv4Address::new(127, 0, 0, 1)).unwrap();
        assert!(local.is_loopback());
    }
}
