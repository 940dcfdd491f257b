use core::fmt;
use std::sync::Arc;

use rand::Rng;

use super::{Error, Result, Waiter};
#[cfg(unix)]
use super::IsnGenerator;
use crate::nic::{Framing, Socket};
#[cfg(unix)]
use crate::nic::{self, RawSocket};
#[cfg(unix)]
use crate::time::Instant;
use crate::wire::{checksum, ipv4_packet, Checksum, IpProtocol, Ipv4Address, Ipv4Repr};
use crate::wire::{TcpFlags, TcpRepr, TcpSeqNumber, TCP_HEADER_LEN};

/// The range of ephemeral ports suggested by IANA.
const EPHEMERAL_PORTS: core::ops::RangeInclusive<u16> = 49152..=65535;

/// The addresses and ports identifying a connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FourTuple {
    /// Our address, the source of sent segments.
    pub local: Ipv4Address,
    /// The address of the peer.
    pub remote: Ipv4Address,
    /// Our port.
    pub local_port: u16,
    /// The port of the peer.
    pub remote_port: u16,
}

/// The states a connection passes through.
///
/// A subset of the RFC 793 states. The teardown happens inside a single call to `close` and its
/// intermediate states are never observable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum State {
    /// Not connected yet, or torn down.
    Closed,
    /// The `SYN` is sent, waiting for the peer's answer.
    SynSent,
    /// The handshake completed, data can be sent.
    Established,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            State::Closed => write!(f, "CLOSED"),
            State::SynSent => write!(f, "SYN-SENT"),
            State::Established => write!(f, "ESTABLISHED"),
        }
    }
}

/// Configuration of a connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Options {
    /// The receive window advertised in every segment.
    pub window_len: u16,

    /// The largest payload the caller should pass to a single `send`.
    ///
    /// Only advisory, it is neither negotiated nor enforced.
    pub max_segment_size: usize,

    /// Who frames outgoing datagrams with an IPv4 header.
    pub framing: Framing,

    /// Whether the checksum of received segments is verified.
    ///
    /// With `Checksum::Manual` segments with a wrong checksum are skipped like foreign ones.
    pub checksum: Checksum,

    /// Only accept segments whose IPv4 source is the remote address.
    ///
    /// By default only the port pair is compared.
    pub filter_addresses: bool,

    /// The size of the buffer each receive attempt reads datagrams into.
    pub recv_buffer: usize,

    /// The local address, discovered from the routing table if not set.
    pub source: Option<Ipv4Address>,

    /// The time to live of datagrams with `Framing::Own`.
    pub hop_limit: u8,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            window_len: 65535,
            max_segment_size: 1460,
            framing: Framing::Kernel,
            checksum: Checksum::Ignored,
            filter_addresses: false,
            recv_buffer: 65536,
            source: None,
            hop_limit: 64,
        }
    }
}

/// Decides which received datagrams belong to a connection.
#[derive(Clone, Copy, Debug)]
struct Filter {
    tuple: FourTuple,
    filter_addresses: bool,
    checksum: Checksum,
}

/// A single client connection.
///
/// The connection exclusively owns its socket and releases it exactly once, in `close` or when
/// dropped. The sequence number is the first one not yet sent and the acknowledgment number the
/// next one expected from the peer.
pub struct Connection<S: Socket> {
    tuple: FourTuple,
    seq: TcpSeqNumber,
    ack: TcpSeqNumber,
    state: State,
    socket: Arc<S>,
    /// Set once `connect` was called, connections are never reopened.
    used: bool,
    released: bool,
    /// The identification of the next IPv4 datagram with `Framing::Own`.
    ident: u16,
    options: Options,
}

#[cfg(unix)]
impl Connection<RawSocket> {
    /// Prepare a connection to a remote host over a new raw socket.
    ///
    /// Picks a random ephemeral source port and generates the initial sequence number. Nothing
    /// is sent yet. Requires the privilege to open raw sockets.
    ///
    /// Note that the kernel does not know about the connection. It will answer the peer's `SYN|ACK`
    /// with a reset unless outgoing resets for the source port are dropped, for example by a
    /// firewall rule.
    pub fn open(remote: Ipv4Address, remote_port: u16, options: Options) -> Result<Self> {
        let socket = RawSocket::new(options.framing)
            .map_err(std::io::Error::from)?;
        let local = match options.source {
            Some(local) => local,
            None => nic::route_source(remote)?,
        };

        let tuple = FourTuple {
            local,
            remote,
            local_port: ephemeral_port(),
            remote_port,
        };

        let isn = IsnGenerator::from_std_hash().get_isn(tuple, Instant::now());
        Ok(Connection::with_socket(socket, tuple, isn, options))
    }
}

impl<S: Socket> Connection<S> {
    /// Prepare a connection over any socket, with a given initial sequence number.
    pub fn with_socket(socket: S, tuple: FourTuple, isn: TcpSeqNumber, options: Options) -> Self {
        net_debug!("connection {}:{} -> {}:{} isn {}",
            tuple.local, tuple.local_port, tuple.remote, tuple.remote_port, isn);

        Connection {
            tuple,
            seq: isn,
            ack: TcpSeqNumber(0),
            state: State::Closed,
            socket: Arc::new(socket),
            used: false,
            released: false,
            ident: 1,
            options,
        }
    }

    /// Perform the three-way handshake.
    ///
    /// Sends a `SYN`, waits for exactly `SYN|ACK` and acknowledges it. Any other answer or a
    /// transport failure aborts the handshake, and the connection stays unusable.
    pub fn connect(&mut self) -> Result<()> {
        if self.used || self.state != State::Closed {
            return Err(Error::Reused);
        }
        self.used = true;

        let waiter = self.arm()?;
        self.transmit(TcpFlags::SYN, &[])?;
        self.state = State::SynSent;

        let syn_ack = waiter.wait_for_syn_ack()?;
        self.seq += 1;
        self.ack = syn_ack.seq_number + 1;

        self.transmit(TcpFlags::ACK, &[])?;
        self.state = State::Established;
        net_debug!("connection {} established", self.tuple.local_port);
        Ok(())
    }

    /// Send one segment of data.
    ///
    /// The payload is not fragmented, the caller is responsible for splitting it at the
    /// [`max_segment_size`]. Fails without any I/O if the connection is not established.
    ///
    /// [`max_segment_size`]: #method.max_segment_size
    pub fn send(&mut self, payload: &[u8]) -> Result<()> {
        if self.state != State::Established {
            return Err(Error::NotEstablished);
        }

        self.transmit(TcpFlags::PSH | TcpFlags::ACK, payload)?;
        self.seq += payload.len();
        Ok(())
    }

    /// Tear the connection down and release the socket.
    ///
    /// Sends a `FIN`, waits for the peer's acknowledgment and then for its `FIN`, and acknowledges
    /// that. Fails with `NotEstablished` and without any other effect if the connection is not
    /// established. Once the teardown has started the socket is released even if it fails, and
    /// the connection is closed either way. The teardown error takes precedence over an error
    /// releasing the socket.
    pub fn close(&mut self) -> Result<()> {
        if self.state != State::Established {
            return Err(Error::NotEstablished);
        }

        let teardown = self.teardown();
        let release = self.release();
        self.state = State::Closed;
        teardown?;
        release
    }

    fn teardown(&mut self) -> Result<()> {
        let waiter = self.arm()?;
        self.transmit(TcpFlags::FIN, &[])?;
        waiter.wait_for_ack()?;

        let waiter = self.arm()?;
        let fin = waiter.wait_for_fin()?;
        self.seq += 1;
        self.ack = fin.seq_number + 1;

        self.transmit(TcpFlags::ACK, &[])?;
        net_debug!("connection {} closed", self.tuple.local_port);
        Ok(())
    }

    /// Release the socket, at most once.
    fn release(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }

        self.released = true;
        self.socket.close()?;
        Ok(())
    }

    /// Create and start a waiter for the next segment of this connection.
    fn arm(&self) -> Result<Waiter> {
        let socket = Arc::clone(&self.socket);
        let filter = Filter {
            tuple: self.tuple,
            filter_addresses: self.options.filter_addresses,
            checksum: self.options.checksum,
        };
        let buffer_len = self.options.recv_buffer;

        let mut waiter = Waiter::new(move || filter.receive(&*socket, buffer_len));
        waiter.start()?;
        Ok(waiter)
    }

    /// Build, checksum and send one segment with the current sequence and acknowledgment number.
    fn transmit(&mut self, flags: TcpFlags, payload: &[u8]) -> Result<()> {
        let mut repr = TcpRepr {
            src_port:   self.tuple.local_port,
            dst_port:   self.tuple.remote_port,
            seq_number: self.seq,
            ack_number: self.ack,
            header_len: (TCP_HEADER_LEN / 4) as u8,
            flags,
            window_len: self.options.window_len,
            checksum:   0,
            urgent_at:  0,
        };
        repr.checksum = checksum::tcp(&repr, payload, self.tuple.local, self.tuple.remote)?;
        let segment = repr.serialize_with_payload(payload);

        let datagram = match self.options.framing {
            Framing::Kernel => segment,
            Framing::Own => {
                let ip_repr = Ipv4Repr {
                    src_addr:    self.tuple.local,
                    dst_addr:    self.tuple.remote,
                    protocol:    IpProtocol::Tcp,
                    payload_len: segment.len(),
                    hop_limit:   self.options.hop_limit,
                    ident:       self.ident,
                };
                self.ident = self.ident.wrapping_add(1);
                ip_repr.serialize_with_payload(&segment, Checksum::Manual)?
            },
        };

        self.socket.send_to(&datagram, self.tuple.remote)?;
        net_trace!("send {} len={}", repr, payload.len());
        Ok(())
    }

    /// The current state.
    pub fn state(&self) -> State {
        self.state
    }

    /// The first sequence number not yet sent.
    pub fn seq_number(&self) -> TcpSeqNumber {
        self.seq
    }

    /// The next sequence number expected from the peer.
    pub fn ack_number(&self) -> TcpSeqNumber {
        self.ack
    }

    /// Addresses and ports of both ends.
    pub fn four_tuple(&self) -> FourTuple {
        self.tuple
    }

    /// The largest payload to pass to `send`.
    pub fn max_segment_size(&self) -> usize {
        self.options.max_segment_size
    }

    /// The configuration the connection was created with.
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// The underlying socket.
    pub fn socket(&self) -> &S {
        &self.socket
    }
}

impl<S: Socket> Drop for Connection<S> {
    fn drop(&mut self) {
        let _ = self.release();
    }
}

impl<S: Socket> fmt::Debug for Connection<S> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Connection")
            .field("tuple", &self.tuple)
            .field("state", &self.state)
            .field("seq", &self.seq)
            .field("ack", &self.ack)
            .finish()
    }
}

impl Filter {
    /// Receive datagrams until one carries a segment of the connection.
    ///
    /// Everything else is skipped: datagrams of other protocols or other connections, and those
    /// that fail to parse. Only a transport error ends the attempt.
    fn receive<S: Socket + ?Sized>(self, socket: &S, buffer_len: usize) -> Result<TcpRepr> {
        let mut buffer = vec![0; buffer_len];
        loop {
            let (len, _) = socket.recv_from(&mut buffer)?;
            if let Some(repr) = self.accept(&buffer[..len]) {
                net_trace!("recv {}", repr);
                return Ok(repr);
            }
        }
    }

    fn accept(&self, datagram: &[u8]) -> Option<TcpRepr> {
        // The kernel validated the IPv4 header before handing us the datagram.
        let packet = match ipv4_packet::new_checked(datagram) {
            Ok(packet) => packet,
            Err(err) => {
                net_trace!("skipping datagram: {}", err);
                return None;
            },
        };
        let ip_repr = match Ipv4Repr::parse(packet, Checksum::Ignored) {
            Ok(repr) => repr,
            Err(err) => {
                net_trace!("skipping datagram: {}", err);
                return None;
            },
        };

        if ip_repr.protocol != IpProtocol::Tcp {
            return None;
        }

        let segment = packet.payload_slice();
        let repr = match TcpRepr::parse(segment) {
            Ok(repr) => repr,
            Err(err) => {
                net_trace!("skipping segment from {}: {}", ip_repr.src_addr, err);
                return None;
            },
        };

        if repr.src_port != self.tuple.remote_port || repr.dst_port != self.tuple.local_port {
            return None;
        }

        if self.filter_addresses && ip_repr.src_addr != self.tuple.remote {
            return None;
        }

        if self.checksum.manual()
            && !checksum::verify_tcp(segment, ip_repr.src_addr, ip_repr.dst_addr)
        {
            net_debug!("skipping segment with wrong checksum: {}", repr);
            return None;
        }

        Some(repr)
    }
}

/// Pick a random port from the ephemeral range.
pub(crate) fn ephemeral_port() -> u16 {
    rand::thread_rng().gen_range(EPHEMERAL_PORTS)
}
