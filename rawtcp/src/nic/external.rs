//! A software socket whose datagrams come from an external source.
//!
//! Inbound datagrams are queued by the owner, either directly with [`push_inbound`] or by a peer
//! closure that is called with every sent datagram and answers with any number of datagrams. All
//! sent datagrams are recorded and can be inspected afterwards.
//!
//! [`push_inbound`]: struct.External.html#method.push_inbound
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::io;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;

use super::Socket;
use crate::time::Duration;
use crate::wire::Ipv4Address;

/// A datagram together with the address of its peer.
pub type Datagram = (Vec<u8>, Ipv4Address);

/// The answering side of an [`External`] socket.
///
/// Receives each sent datagram with its destination and returns the datagrams to deliver in
/// response, each with its source address.
///
/// [`External`]: struct.External.html
pub type Peer = Box<dyn FnMut(&[u8], Ipv4Address) -> Vec<Datagram> + Send>;

/// How long a blocked receive sleeps before it checks whether the socket was closed.
const CLOSE_POLL: Duration = Duration::from_millis(10);

/// An in-memory socket.
pub struct External {
    inbound_tx: Sender<Datagram>,
    inbound: Receiver<Datagram>,
    sent: Mutex<Vec<Datagram>>,
    peer: Mutex<Option<Peer>>,
    recv_timeout: Option<Duration>,
    closed: AtomicBool,
    close_calls: AtomicUsize,
}

impl External {
    /// A socket without a peer, datagrams are only received when pushed.
    pub fn new() -> Self {
        let (inbound_tx, inbound) = unbounded();
        External {
            inbound_tx,
            inbound,
            sent: Mutex::new(Vec::new()),
            peer: Mutex::new(None),
            recv_timeout: None,
            closed: AtomicBool::new(false),
            close_calls: AtomicUsize::new(0),
        }
    }

    /// A socket whose sent datagrams are answered by `peer`.
    pub fn with_peer<F>(peer: F) -> Self
    where
        F: FnMut(&[u8], Ipv4Address) -> Vec<Datagram> + Send + 'static,
    {
        let socket = External::new();
        *socket.peer.lock() = Some(Box::new(peer));
        socket
    }

    /// Let a receive fail with `TimedOut` after waiting for `timeout` without a datagram.
    ///
    /// Without a timeout a receive blocks until a datagram arrives or the socket is closed.
    pub fn set_recv_timeout(&mut self, timeout: Option<Duration>) {
        self.recv_timeout = timeout;
    }

    /// Queue a datagram to be received, from the given source address.
    pub fn push_inbound(&self, bytes: Vec<u8>, src_addr: Ipv4Address) {
        // We hold the receiver ourselves, the channel is never disconnected.
        let _ = self.inbound_tx.send((bytes, src_addr));
    }

    /// All datagrams sent so far, with their destination address.
    pub fn sent(&self) -> Vec<Datagram> {
        self.sent.lock().clone()
    }

    /// The number of datagrams sent so far.
    pub fn sent_len(&self) -> usize {
        self.sent.lock().len()
    }

    /// How often `close` was called.
    pub fn close_count(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    /// Whether the socket was closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn closed_error() -> io::Error {
        io::Error::new(io::ErrorKind::NotConnected, "socket closed")
    }
}

impl Default for External {
    fn default() -> Self {
        External::new()
    }
}

impl Socket for External {
    fn send_to(&self, bytes: &[u8], dst_addr: Ipv4Address) -> io::Result<usize> {
        if self.is_closed() {
            return Err(Self::closed_error());
        }

        self.sent.lock().push((bytes.to_vec(), dst_addr));

        let responses = match self.peer.lock().as_mut() {
            Some(peer) => peer(bytes, dst_addr),
            None => Vec::new(),
        };

        for (response, src_addr) in responses {
            self.push_inbound(response, src_addr);
        }

        Ok(bytes.len())
    }

    fn recv_from(&self, buffer: &mut [u8]) -> io::Result<(usize, Ipv4Address)> {
        let mut waited = Duration::from_millis(0);
        loop {
            if self.is_closed() {
                return Err(Self::closed_error());
            }

            match self.inbound.recv_timeout(CLOSE_POLL) {
                Ok((bytes, src_addr)) => {
                    // Like a datagram socket, excess bytes are discarded.
                    let len = bytes.len().min(buffer.len());
                    buffer[..len].copy_from_slice(&bytes[..len]);
                    return Ok((len, src_addr));
                },
                Err(RecvTimeoutError::Timeout) => {
                    waited += CLOSE_POLL;
                    match self.recv_timeout {
                        Some(limit) if waited >= limit => return Err(io::Error::new(
                            io::ErrorKind::TimedOut,
                            "no datagram within the receive timeout")),
                        _ => continue,
                    }
                },
                Err(RecvTimeoutError::Disconnected) => return Err(Self::closed_error()),
            }
        }
    }

    fn close(&self) -> io::Result<()> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const HOST: Ipv4Address = Ipv4Address([10, 0, 0, 1]);
    const PEER: Ipv4Address = Ipv4Address([10, 0, 0, 2]);

    #[test]
    fn peer_answers() {
        let socket = External::with_peer(|bytes, dst| {
            assert_eq!(dst, PEER);
            vec![(bytes.iter().rev().cloned().collect(), dst)]
        });

        assert_eq!(socket.send_to(&[1, 2, 3], PEER).unwrap(), 3);
        let mut buffer = [0; 8];
        let (len, src) = socket.recv_from(&mut buffer).unwrap();
        assert_eq!(&buffer[..len], &[3, 2, 1]);
        assert_eq!(src, PEER);
        assert_eq!(socket.sent(), vec![(vec![1, 2, 3], PEER)]);
    }

    #[test]
    fn truncates_to_buffer() {
        let socket = External::new();
        socket.push_inbound(vec![0xaa; 16], HOST);
        let mut buffer = [0; 4];
        assert_eq!(socket.recv_from(&mut buffer).unwrap(), (4, HOST));
    }

    #[test]
    fn timeout() {
        let mut socket = External::new();
        socket.set_recv_timeout(Some(Duration::from_millis(30)));
        let err = socket.recv_from(&mut [0; 4]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }

    #[test]
    fn closed_socket_refuses() {
        let socket = External::new();
        socket.close().unwrap();
        socket.close().unwrap();
        assert_eq!(socket.close_count(), 2);
        assert!(socket.send_to(&[0], PEER).is_err());
        assert!(socket.recv_from(&mut [0; 4]).is_err());
        assert_eq!(socket.sent_len(), 0);
    }
}
