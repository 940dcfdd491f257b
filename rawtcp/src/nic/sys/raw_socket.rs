// Copyright (C) 2016 whitequark@whitequark.org
// Copyright (C) 2019 Andreas Molzer <andreas.molzer@tum.de>
//
// in large parts from `smoltcp` originally distributed under 0-clause BSD
use core::mem;
use std::io;
use std::os::unix::io::{AsRawFd, RawFd};

use libc;
use parking_lot::RwLock;
use super::{address_of, sockaddr_in, wait, Errno, FdResult, IoLenResult, LibcResult};

use crate::nic::{Framing, Socket};
use crate::time::Duration;
use crate::wire::Ipv4Address;

/// How long a blocked receive sleeps before it checks whether the socket was closed.
const CLOSE_POLL: Duration = Duration::from_millis(100);

/// A raw IPv4 socket for the TCP protocol.
///
/// The kernel delivers a copy of every inbound TCP datagram of the host, including its IPv4
/// header, while its own TCP implementation keeps processing them as usual. Opening such a socket
/// requires `CAP_NET_RAW` (or root).
///
/// Every system call on the descriptor holds a read guard of the lock around it, and releasing
/// takes the write guard. A release therefore waits for a call in progress, and no call ever
/// runs on a closed (and possibly reused) descriptor number. A receive polls with a short
/// timeout, giving up the guard in between, so a release waits at most that interval.
#[derive(Debug)]
pub struct RawSocket {
    /// The descriptor, or `-1` once released.
    lower: RwLock<RawFd>,
    framing: Framing,
}

impl RawSocket {
    /// Open a raw socket.
    ///
    /// With `Framing::Own` the socket is configured with `IP_HDRINCL` so that every sent buffer
    /// must start with a complete IPv4 header.
    pub fn new(framing: Framing) -> Result<Self, Errno> {
        let lower = unsafe {
            libc::socket(libc::AF_INET, libc::SOCK_RAW, libc::IPPROTO_TCP)
        };

        FdResult(lower).errno()?;
        // Owned from here on, closed on drop if the configuration fails.
        let socket = RawSocket::from_fd(lower, framing);

        if framing == Framing::Own {
            socket.set_header_included()?;
        }

        net_debug!("raw socket {} opened, framing {:?}", lower, framing);
        Ok(socket)
    }

    /// Take ownership of an open descriptor.
    fn from_fd(lower: RawFd, framing: Framing) -> Self {
        RawSocket {
            lower: RwLock::new(lower),
            framing,
        }
    }

    /// The framing this socket was opened with.
    pub fn framing(&self) -> Framing {
        self.framing
    }

    fn set_header_included(&self) -> Result<(), Errno> {
        let enable: libc::c_int = 1;
        let fd = self.lower.read();
        let res = unsafe {
            libc::setsockopt(
                *fd,
                libc::IPPROTO_IP,
                libc::IP_HDRINCL,
                &enable as *const libc::c_int as *const libc::c_void,
                mem::size_of::<libc::c_int>() as libc::socklen_t)
        };

        FdResult(res).errno()
    }

    fn open_fd(fd: RawFd) -> Result<RawFd, Errno> {
        match fd {
            -1 => Err(Errno(libc::EBADF)),
            fd => Ok(fd),
        }
    }

    /// Send a single datagram to an address.
    pub fn send(&self, buffer: &[u8], dst_addr: Ipv4Address) -> Result<usize, Errno> {
        let guard = self.lower.read();
        let fd = Self::open_fd(*guard)?;
        let sockaddr = sockaddr_in(dst_addr);
        let len = unsafe {
            libc::sendto(
                fd,
                buffer.as_ptr() as *const libc::c_void,
                buffer.len(),
                0,
                &sockaddr as *const libc::sockaddr_in as *const libc::sockaddr,
                mem::size_of::<libc::sockaddr_in>() as libc::socklen_t)
        };
        IoLenResult(len).errno()?;
        Ok(len as usize)
    }

    /// Receive a single datagram into the buffer, if one is ready.
    ///
    /// Returns `Ok(None)` when no datagram is queued.
    pub fn recv(&self, buffer: &mut [u8]) -> Result<Option<(usize, Ipv4Address)>, Errno> {
        let guard = self.lower.read();
        Self::recv_on(Self::open_fd(*guard)?, buffer)
    }

    fn recv_on(fd: RawFd, buffer: &mut [u8]) -> Result<Option<(usize, Ipv4Address)>, Errno> {
        let mut sockaddr: libc::sockaddr_in = unsafe { mem::zeroed() };
        let mut addr_len = mem::size_of::<libc::sockaddr_in>() as libc::socklen_t;
        let len = unsafe {
            libc::recvfrom(
                fd,
                buffer.as_mut_ptr() as *mut libc::c_void,
                buffer.len(),
                libc::MSG_DONTWAIT,
                &mut sockaddr as *mut libc::sockaddr_in as *mut libc::sockaddr,
                &mut addr_len)
        };
        match IoLenResult(len).errno() {
            Ok(()) => Ok(Some((len as usize, address_of(&sockaddr)))),
            Err(ref err) if err.would_block() => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Close the descriptor, at most once.
    ///
    /// Waits for a system call on the descriptor that is in progress on another thread.
    pub fn release(&self) -> Result<(), Errno> {
        let mut lower = self.lower.write();
        let fd = mem::replace(&mut *lower, -1);
        if fd == -1 {
            return Ok(());
        }

        net_debug!("raw socket {} closed", fd);
        let res = unsafe { libc::close(fd) };
        FdResult(res).errno()
    }
}

impl Socket for RawSocket {
    fn send_to(&self, bytes: &[u8], dst_addr: Ipv4Address) -> io::Result<usize> {
        Ok(self.send(bytes, dst_addr)?)
    }

    fn recv_from(&self, buffer: &mut [u8]) -> io::Result<(usize, Ipv4Address)> {
        loop {
            // Released between two polls at the earliest.
            let guard = self.lower.read();
            let fd = Self::open_fd(*guard)?;
            match wait(fd, Some(CLOSE_POLL)) {
                Ok(true) => (),
                Ok(false) => continue,
                Err(ref err) if err.would_block() => continue,
                Err(err) => return Err(err.into()),
            }

            if let Some(received) = Self::recv_on(fd, buffer)? {
                return Ok(received);
            }
        }
    }

    fn close(&self) -> io::Result<()> {
        Ok(self.release()?)
    }
}

impl AsRawFd for RawSocket {
    fn as_raw_fd(&self) -> RawFd {
        *self.lower.read()
    }
}

impl Drop for RawSocket {
    fn drop(&mut self) {
        let _ = self.release();
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    /// A connected datagram pair, usable without the privileges of a raw socket.
    fn pair() -> [libc::c_int; 2] {
        let mut pair = [0, 0];
        let result = unsafe {
            libc::socketpair(libc::AF_UNIX, libc::SOCK_DGRAM, 0, pair.as_mut_ptr())
        };
        assert_eq!(result, 0, "Opening sockets failed");
        pair
    }

    #[test]
    fn release_ends_blocked_receive() {
        let [ours, theirs] = pair();
        let socket = Arc::new(RawSocket::from_fd(ours, Framing::Kernel));

        let receiver = {
            let socket = Arc::clone(&socket);
            thread::spawn(move || socket.recv_from(&mut [0; 64]).map(|_| ()))
        };

        thread::sleep(Duration::from_millis(50));
        socket.close().unwrap();
        assert_eq!(socket.as_raw_fd(), -1);

        let err = receiver.join().unwrap().unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::EBADF));
        assert!(socket.send_to(&[0], Ipv4Address::new(127, 0, 0, 1)).is_err());
        // Only the first release closes the descriptor.
        socket.close().unwrap();

        unsafe { libc::close(theirs) };
    }
}
