use std::sync::Arc;

use parking_lot::Mutex;

use rawtcp::layer::tcp::{Connection, FourTuple, Options, State};
use rawtcp::nic::{External, Framing};
use rawtcp::wire::{checksum, ipv4_packet, Checksum, IpProtocol, Ipv4Address, Ipv4Repr};
use rawtcp::wire::{TcpFlags, TcpRepr, TcpSeqNumber};

const CLIENT: Ipv4Address = Ipv4Address([192, 168, 1, 10]);
const SERVER: Ipv4Address = Ipv4Address([192, 168, 1, 20]);

/// A peer that behaves like a listening socket, collecting the received payload.
struct Listener {
    isn: u32,
    next: u32,
    received: Vec<u8>,
}

impl Listener {
    fn answer(&mut self, datagram: &[u8], framing: Framing) -> Vec<(Vec<u8>, Ipv4Address)> {
        let segment = match framing {
            Framing::Kernel => datagram,
            Framing::Own => ipv4_packet::new_checked(datagram).unwrap().payload_slice(),
        };
        assert!(checksum::verify_tcp(segment, CLIENT, SERVER), "bad checksum");

        let repr = TcpRepr::parse(segment).unwrap();
        let payload = &segment[usize::from(repr.header_len) * 4..];
        let peer_next = repr.seq_number.0
            .wrapping_add(repr.sequence_len(payload.len()) as u32);

        if repr.flags == TcpFlags::SYN {
            self.next = self.isn.wrapping_add(1);
            return vec![self.reply(&repr, TcpFlags::SYN | TcpFlags::ACK, self.isn, peer_next)];
        }

        if repr.flags.fin() {
            let ack = self.reply(&repr, TcpFlags::ACK, self.next, peer_next);
            let fin = self.reply(&repr, TcpFlags::FIN | TcpFlags::ACK, self.next, peer_next);
            return vec![ack, fin];
        }

        self.received.extend_from_slice(payload);
        vec![]
    }

    fn reply(&self, to: &TcpRepr, flags: TcpFlags, seq: u32, ack: u32) -> (Vec<u8>, Ipv4Address) {
        let mut repr = TcpRepr {
            src_port:   to.dst_port,
            dst_port:   to.src_port,
            seq_number: TcpSeqNumber(seq),
            ack_number: TcpSeqNumber(ack),
            header_len: 5,
            flags,
            window_len: 8192,
            checksum:   0,
            urgent_at:  0,
        };
        repr.checksum = checksum::tcp(&repr, &[], SERVER, CLIENT).unwrap();
        let segment = repr.serialize();

        let ip = Ipv4Repr {
            src_addr:    SERVER,
            dst_addr:    CLIENT,
            protocol:    IpProtocol::Tcp,
            payload_len: segment.len(),
            hop_limit:   64,
            ident:       0,
        };
        (ip.serialize_with_payload(&segment, Checksum::Manual).unwrap(), SERVER)
    }
}

fn exchange(framing: Framing, message: &[u8]) {
    let listener = Arc::new(Mutex::new(Listener {
        isn: 0xffff_ffff,
        next: 0,
        received: Vec::new(),
    }));

    let peer = Arc::clone(&listener);
    let socket = Arc::new(External::with_peer(move |datagram, dst| {
        assert_eq!(dst, SERVER);
        peer.lock().answer(datagram, framing)
    }));

    let tuple = FourTuple {
        local: CLIENT,
        remote: SERVER,
        local_port: 50000,
        remote_port: 8080,
    };
    let options = Options {
        framing,
        checksum: Checksum::Manual,
        filter_addresses: true,
        max_segment_size: 4,
        ..Options::default()
    };

    let mut connection = Connection::with_socket(socket.clone(), tuple, TcpSeqNumber(7), options);
    connection.connect().unwrap();
    assert_eq!(connection.state(), State::Established);
    // The peer's sequence numbers wrap around.
    assert_eq!(connection.ack_number(), TcpSeqNumber(0));

    for chunk in message.chunks(connection.max_segment_size()) {
        connection.send(chunk).unwrap();
    }
    assert_eq!(connection.seq_number(), TcpSeqNumber(8) + message.len());

    connection.close().unwrap();
    assert_eq!(connection.state(), State::Closed);
    assert!(socket.is_closed());
    assert_eq!(socket.close_count(), 1);

    let expected = 2 + (message.len() + 3) / 4 + 2;
    assert_eq!(socket.sent_len(), expected);
    assert_eq!(listener.lock().received, message);
}

#[test]
fn hello_kernel_framing() {
    exchange(Framing::Kernel, b"Hello, world");
}

#[test]
fn hello_own_framing() {
    exchange(Framing::Own, b"Hello, world");
}

#[test]
fn no_data() {
    exchange(Framing::Kernel, b"");
}
