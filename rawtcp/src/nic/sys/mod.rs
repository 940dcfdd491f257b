#![allow(unsafe_code)]
// Copyright (C) 2016 whitequark@whitequark.org
// Copyright (C) 2019 Andreas Molzer <andreas.molzer@tum.de>
//
// in large parts from `smoltcp` originally distributed under 0-clause BSD
//
// Applies to files in this folder unless otherwise noted. These are:
// * `mod.rs`
// * `raw_socket.rs`
use core::{fmt, mem, ptr};
use std::io;
use std::os::unix::io::RawFd;

use libc;
use crate::time::Duration;
use crate::wire::Ipv4Address;

mod raw_socket;

/// Module importing all types that should be exported.
///
/// Allows keeping all the `cfg` bits inside this module by enabling a controlled glob import from
/// the super module.
pub mod exports {
    pub use super::raw_socket::RawSocket;
    pub use super::wait as sys_wait;
    pub use super::Errno;
}

/// Wait until given file descriptor becomes readable, but no longer than given timeout.
///
/// Returns `Ok(true)` if the descriptor is readable and `Ok(false)` on timeout. Without a timeout
/// this blocks until the descriptor is readable.
pub fn wait(fd: RawFd, duration: Option<Duration>) -> Result<bool, Errno> {
    let mut readfds;

    unsafe {
        let mut readfds_init = mem::MaybeUninit::<libc::fd_set>::uninit();
        libc::FD_ZERO(readfds_init.as_mut_ptr());
        libc::FD_SET(fd, readfds_init.as_mut_ptr());
        readfds = readfds_init.assume_init();
    }

    let mut timeout = libc::timeval { tv_sec: 0, tv_usec: 0 };
    let timeout = duration.map(|duration| {
        timeout.tv_sec = duration.as_secs() as libc::time_t;
        timeout.tv_usec = duration.subsec_micros() as libc::suseconds_t;
        &mut timeout
    });

    let timeout_ptr = timeout
        .map(|reference| reference as *mut _)
        .unwrap_or_else(ptr::null_mut);

    let res = unsafe {
        libc::select(
            fd + 1,
            &mut readfds,
            ptr::null_mut(),
            ptr::null_mut(),
            timeout_ptr)
    };

    FdResult(res).errno()?;
    Ok(res > 0)
}

/// An errno value.
///
/// This is used as the error representation of raw libc calls. It converts into a
/// `std::io::Error`, which has much more extensive error information.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct Errno(pub libc::c_int);

#[derive(Clone, Copy)]
struct FdResult(pub libc::c_int);

#[derive(Clone, Copy)]
struct IoLenResult(pub libc::ssize_t);

/// Trait for interpreting integer return values.
///
/// Failure signals may vary between:
/// * `-1`
/// * arbitrary negative values
/// * non-zero
trait LibcResult: Copy {
    fn is_fail(self) -> bool;

    fn errno(self) -> Result<(), Errno> {
        if self.is_fail() {
            Err(Errno::new())
        } else {
            Ok(())
        }
    }
}

impl Errno {
    /// The errno of the last failed libc call on this thread.
    pub fn new() -> Errno {
        Errno(io::Error::last_os_error().raw_os_error().unwrap_or(0))
    }

    /// Check if the error only signals that the call would have blocked.
    pub fn would_block(&self) -> bool {
        self.0 == libc::EWOULDBLOCK || self.0 == libc::EAGAIN || self.0 == libc::EINTR
    }
}

impl LibcResult for FdResult {
    fn is_fail(self) -> bool {
        self.0 == -1
    }
}

impl LibcResult for IoLenResult {
    fn is_fail(self) -> bool {
        self.0 == -1
    }
}

impl From<Errno> for io::Error {
    fn from(err: Errno) -> io::Error {
        io::Error::from_raw_os_error(err.0 as i32)
    }
}

impl fmt::Display for Errno {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", io::Error::from_raw_os_error(self.0 as i32))
    }
}

/// Build the socket address of an IPv4 host, the port is not used by raw sockets.
fn sockaddr_in(addr: Ipv4Address) -> libc::sockaddr_in {
    let mut sockaddr: libc::sockaddr_in = unsafe { mem::zeroed() };
    sockaddr.sin_family = libc::AF_INET as libc::sa_family_t;
    sockaddr.sin_port = 0;
    // `s_addr` is stored in network byte order, exactly the order of the octets.
    sockaddr.sin_addr = libc::in_addr { s_addr: u32::from_ne_bytes(addr.0) };
    sockaddr
}

/// The IPv4 address contained in a socket address filled by the kernel.
fn address_of(sockaddr: &libc::sockaddr_in) -> Ipv4Address {
    Ipv4Address(sockaddr.sin_addr.s_addr.to_ne_bytes())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn sockaddr_keeps_octet_order() {
        let addr = Ipv4Address::new(192, 168, 1, 2);
        let sockaddr = sockaddr_in(addr);
        assert_eq!(sockaddr.sin_family, libc::AF_INET as libc::sa_family_t);
        assert_eq!(address_of(&sockaddr), addr);
        assert_eq!(u32::from_be(sockaddr.sin_addr.s_addr), 0xc0a8_0102);
    }

    #[test]
    fn errno_into_io_error() {
        let err: io::Error = Errno(libc::EPERM).into();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
        assert!(Errno(libc::EAGAIN).would_block());
    }
}
