use core::fmt;
use std::{io, thread};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};

use super::{Error, Result};
use crate::time::Duration;
use crate::wire::{TcpFlags, TcpRepr};

/// One logical receive attempt, yielding the next segment of a connection.
type Receive = Box<dyn FnOnce() -> Result<TcpRepr> + Send + 'static>;

/// The kind of segment a connection waits for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Expect {
    /// The second step of the handshake, exactly `SYN|ACK`.
    SynAck,
    /// A pure acknowledgment, exactly `ACK`.
    Ack,
    /// The peer closing its direction: `FIN` without `SYN` or `RST`.
    ///
    /// Peers commonly acknowledge on their FIN, so `FIN|ACK` is accepted as well.
    Fin,
}

impl Expect {
    /// The flags reported when a segment does not match.
    pub fn flags(self) -> TcpFlags {
        match self {
            Expect::SynAck => TcpFlags::SYN | TcpFlags::ACK,
            Expect::Ack => TcpFlags::ACK,
            Expect::Fin => TcpFlags::FIN,
        }
    }

    /// Check if a segment with these flags is the expected one.
    pub fn matches(self, flags: TcpFlags) -> bool {
        match self {
            Expect::SynAck | Expect::Ack => flags == self.flags(),
            Expect::Fin => flags.fin() && !flags.syn() && !flags.rst(),
        }
    }
}

impl fmt::Display for Expect {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.flags())
    }
}

/// A one-shot rendezvous with a single background receive attempt.
///
/// The waiter is created with the receive function but does nothing until [`start`]. Starting
/// spawns one thread that runs the receive function to completion and hands its result over a
/// channel with a single slot. Any of the `wait` methods then blocks the calling thread, and only
/// that thread, until the result is available.
///
/// Waiting consumes the waiter, so that every waiter delivers at most one segment. Waiting on a
/// waiter that was never started fails immediately instead of blocking forever, as does waiting
/// after the receive attempt died without a result.
///
/// [`start`]: #method.start
pub struct Waiter {
    pending: Option<(Receive, Sender<Result<TcpRepr>>)>,
    result: Receiver<Result<TcpRepr>>,
}

impl Waiter {
    /// Bind a waiter to a receive function.
    pub fn new<F>(receive: F) -> Self
    where
        F: FnOnce() -> Result<TcpRepr> + Send + 'static,
    {
        let (sender, result) = bounded(1);
        Waiter {
            pending: Some((Box::new(receive), sender)),
            result,
        }
    }

    /// Begin the receive attempt in the background.
    ///
    /// Only the first call has an effect, a waiter never runs more than one receive attempt.
    pub fn start(&mut self) -> Result<()> {
        let (receive, sender) = match self.pending.take() {
            Some(pending) => pending,
            None => {
                net_debug!("waiter already started, ignoring");
                return Ok(());
            },
        };

        thread::Builder::new()
            .name("rawtcp-waiter".into())
            .spawn(move || {
                // The waiting side may have given up already.
                let _ = sender.send(receive());
            })?;

        Ok(())
    }

    /// Check if the receive attempt is running or has finished.
    pub fn is_started(&self) -> bool {
        self.pending.is_none()
    }

    /// Block until the receive attempt delivers its result.
    pub fn wait(mut self) -> Result<TcpRepr> {
        // Drops the sender of an unstarted attempt, turning the wait into an error.
        self.pending = None;
        match self.result.recv() {
            Ok(result) => result,
            Err(_) => Err(Self::abandoned()),
        }
    }

    /// Like `wait` but give up with a `TimedOut` socket error after `timeout`.
    ///
    /// The receive attempt itself keeps running in the background until it finishes or its socket
    /// is closed. Its result is discarded.
    pub fn wait_timeout(mut self, timeout: Duration) -> Result<TcpRepr> {
        self.pending = None;
        match self.result.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(Error::Socket(io::Error::new(
                io::ErrorKind::TimedOut,
                "no segment arrived in time"))),
            Err(RecvTimeoutError::Disconnected) => Err(Self::abandoned()),
        }
    }

    /// Wait for a segment and check that it is of the expected kind.
    ///
    /// A segment of another kind is consumed and reported as `UnexpectedSegment`.
    pub fn wait_for(self, expect: Expect) -> Result<TcpRepr> {
        let segment = self.wait()?;
        if expect.matches(segment.flags) {
            Ok(segment)
        } else {
            net_debug!("expected {}, received {}", expect, segment);
            Err(Error::UnexpectedSegment {
                expected: expect.flags(),
                actual: segment.flags,
            })
        }
    }

    /// Wait for a pure acknowledgment.
    pub fn wait_for_ack(self) -> Result<TcpRepr> {
        self.wait_for(Expect::Ack)
    }

    /// Wait for the `SYN|ACK` of the handshake.
    pub fn wait_for_syn_ack(self) -> Result<TcpRepr> {
        self.wait_for(Expect::SynAck)
    }

    /// Wait for the peer's FIN.
    pub fn wait_for_fin(self) -> Result<TcpRepr> {
        self.wait_for(Expect::Fin)
    }

    fn abandoned() -> Error {
        Error::Socket(io::Error::new(
            io::ErrorKind::BrokenPipe,
            "receive attempt ended without a result"))
    }
}

impl fmt::Debug for Waiter {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Waiter")
            .field("started", &self.is_started())
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::wire::TcpSeqNumber;

    fn segment(flags: TcpFlags) -> TcpRepr {
        TcpRepr {
            src_port:   42069,
            dst_port:   49152,
            seq_number: TcpSeqNumber(5000),
            ack_number: TcpSeqNumber(1001),
            header_len: 5,
            flags,
            window_len: 1024,
            checksum:   0,
            urgent_at:  0,
        }
    }

    #[test]
    fn delivers_segment() {
        let mut waiter = Waiter::new(|| Ok(segment(TcpFlags::SYN | TcpFlags::ACK)));
        waiter.start().unwrap();
        let received = waiter.wait_for_syn_ack().unwrap();
        assert_eq!(received.seq_number, TcpSeqNumber(5000));
    }

    #[test]
    fn mismatch_is_reported() {
        let mut waiter = Waiter::new(|| Ok(segment(TcpFlags::RST | TcpFlags::ACK)));
        waiter.start().unwrap();
        match waiter.wait_for_syn_ack() {
            Err(Error::UnexpectedSegment { expected, actual }) => {
                assert_eq!(expected, TcpFlags::SYN | TcpFlags::ACK);
                assert_eq!(actual, TcpFlags::RST | TcpFlags::ACK);
            },
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn failure_is_surfaced() {
        let mut waiter = Waiter::new(|| Err(Error::TruncatedSegment));
        waiter.start().unwrap();
        assert!(matches!(waiter.wait(), Err(Error::TruncatedSegment)));
    }

    #[test]
    fn unstarted_does_not_block() {
        let waiter = Waiter::new(|| Ok(segment(TcpFlags::ACK)));
        assert!(!waiter.is_started());
        assert!(matches!(waiter.wait(), Err(Error::Socket(_))));
    }

    #[test]
    fn second_start_is_ignored() {
        let mut waiter = Waiter::new(|| Ok(segment(TcpFlags::ACK)));
        waiter.start().unwrap();
        waiter.start().unwrap();
        assert!(waiter.wait_for_ack().is_ok());
    }

    #[test]
    fn timeout() {
        let (_keep, blocker) = bounded::<()>(0);
        let mut waiter = Waiter::new(move || {
            let _ = blocker.recv();
            Ok(segment(TcpFlags::ACK))
        });
        waiter.start().unwrap();
        let err = waiter.wait_timeout(Duration::from_millis(20)).unwrap_err();
        match err {
            Error::Socket(err) => assert_eq!(err.kind(), io::ErrorKind::TimedOut),
            other => panic!("unexpected error {}", other),
        }
    }

    #[test]
    fn fin_variants() {
        assert!(Expect::Fin.matches(TcpFlags::FIN));
        assert!(Expect::Fin.matches(TcpFlags::FIN | TcpFlags::ACK));
        assert!(Expect::Fin.matches(TcpFlags::FIN | TcpFlags::PSH | TcpFlags::ACK));
        assert!(!Expect::Fin.matches(TcpFlags::FIN | TcpFlags::RST));
        assert!(!Expect::Fin.matches(TcpFlags::SYN | TcpFlags::FIN));
        assert!(!Expect::Ack.matches(TcpFlags::PSH | TcpFlags::ACK));
        assert!(!Expect::SynAck.matches(TcpFlags::SYN));
    }
}
