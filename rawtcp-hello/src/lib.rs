pub mod config;

use rawtcp::layer::tcp::{Connection, Result};
use rawtcp::nic::Socket;

/// Connect, send the message split at the maximum segment size and close again.
///
/// A maximum segment size of zero is treated as one. Returns the number of segments that carried
/// data.
pub fn hello<S: Socket>(connection: &mut Connection<S>, message: &[u8]) -> Result<usize> {
    connection.connect()?;
    log::info!("connected to {}:{}",
        connection.four_tuple().remote, connection.four_tuple().remote_port);

    let mut segments = 0;
    for chunk in message.chunks(connection.max_segment_size().max(1)) {
        connection.send(chunk)?;
        segments += 1;
    }

    connection.close()?;
    Ok(segments)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rawtcp::layer::tcp::{FourTuple, Options, State};
    use rawtcp::nic::External;
    use rawtcp::wire::{checksum, Checksum, IpProtocol, Ipv4Address, Ipv4Repr};
    use rawtcp::wire::{TcpFlags, TcpRepr, TcpSeqNumber};

    use super::*;

    const LOCAL: Ipv4Address = Ipv4Address([10, 0, 0, 1]);
    const REMOTE: Ipv4Address = Ipv4Address([10, 0, 0, 2]);

    fn answer(to: &TcpRepr, flags: TcpFlags) -> (Vec<u8>, Ipv4Address) {
        let mut repr = TcpRepr {
            src_port:   to.dst_port,
            dst_port:   to.src_port,
            seq_number: TcpSeqNumber(100),
            ack_number: to.seq_number + 1,
            header_len: 5,
            flags,
            window_len: 1024,
            checksum:   0,
            urgent_at:  0,
        };
        repr.checksum = checksum::tcp(&repr, &[], REMOTE, LOCAL).unwrap();
        let segment = repr.serialize();
        let ip = Ipv4Repr {
            src_addr:    REMOTE,
            dst_addr:    LOCAL,
            protocol:    IpProtocol::Tcp,
            payload_len: segment.len(),
            hop_limit:   64,
            ident:       0,
        };
        (ip.serialize_with_payload(&segment, Checksum::Manual).unwrap(), REMOTE)
    }

    fn peer(segment: &[u8], _: Ipv4Address) -> Vec<(Vec<u8>, Ipv4Address)> {
        let repr = TcpRepr::parse(segment).unwrap();
        if repr.flags == TcpFlags::SYN {
            vec![answer(&repr, TcpFlags::SYN | TcpFlags::ACK)]
        } else if repr.flags == TcpFlags::FIN {
            vec![answer(&repr, TcpFlags::ACK), answer(&repr, TcpFlags::FIN)]
        } else {
            vec![]
        }
    }

    #[test]
    fn chunks_by_segment_size() {
        let socket = Arc::new(External::with_peer(peer));

        let tuple = FourTuple {
            local: LOCAL,
            remote: REMOTE,
            local_port: 49200,
            remote_port: 7,
        };
        let options = Options { max_segment_size: 5, ..Options::default() };
        let mut connection = Connection::with_socket(socket.clone(), tuple, TcpSeqNumber(0), options);

        assert_eq!(hello(&mut connection, b"Hello, world!").unwrap(), 3);
        assert_eq!(connection.state(), State::Closed);
        assert_eq!(socket.sent_len(), 2 + 3 + 2);
    }

    #[test]
    fn zero_segment_size() {
        let socket = Arc::new(External::with_peer(peer));

        let tuple = FourTuple {
            local: LOCAL,
            remote: REMOTE,
            local_port: 49201,
            remote_port: 7,
        };
        let options = Options { max_segment_size: 0, ..Options::default() };
        let mut connection = Connection::with_socket(socket.clone(), tuple, TcpSeqNumber(0), options);

        assert_eq!(hello(&mut connection, b"hi").unwrap(), 2);
        assert_eq!(socket.sent_len(), 2 + 2 + 2);
    }
}
