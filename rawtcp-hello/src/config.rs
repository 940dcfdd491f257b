use structopt::StructOpt;
use std::net;

use rawtcp::layer::tcp::Options;
use rawtcp::nic::Framing;
use rawtcp::wire::Checksum;

#[derive(Clone, StructOpt)]
#[structopt(name = "rawtcp-hello", about = "Send one message over a raw tcp connection")]
pub struct Config {
    /// The host to connect to.
    pub host: net::Ipv4Addr,

    /// The port of the listening peer.
    pub port: u16,

    /// The message to send.
    #[structopt(default_value = "Hello, world!\n")]
    pub message: String,

    /// Source address of segments instead of the one chosen by the routing table.
    #[structopt(long = "source")]
    pub source: Option<net::Ipv4Addr>,

    /// Write our own IPv4 header instead of letting the kernel prepend one.
    #[structopt(long = "own-ip-header")]
    pub own_ip_header: bool,

    /// Drop received segments with a wrong tcp checksum.
    #[structopt(long = "verify-checksums")]
    pub verify_checksums: bool,

    /// Only accept segments sent from the host address.
    #[structopt(long = "strict-addresses")]
    pub strict_addresses: bool,

    /// The largest payload of a single segment.
    #[structopt(long = "mss", default_value = "1460")]
    pub mss: usize,
}

impl Config {
    pub fn from_args() -> Self {
        StructOpt::from_args()
    }

    pub fn options(&self) -> Options {
        Options {
            framing: if self.own_ip_header { Framing::Own } else { Framing::Kernel },
            checksum: if self.verify_checksums { Checksum::Manual } else { Checksum::Ignored },
            filter_addresses: self.strict_addresses,
            max_segment_size: self.mss.max(1),
            source: self.source.map(Into::into),
            ..Options::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::from_iter(&["rawtcp-hello", "10.0.0.2", "8080"]);
        assert_eq!(config.host, net::Ipv4Addr::new(10, 0, 0, 2));
        assert_eq!(config.port, 8080);
        assert_eq!(config.message, "Hello, world!\n");
        assert_eq!(config.options(), Options::default());
    }

    #[test]
    fn all_flags() {
        let config = Config::from_iter(&[
            "rawtcp-hello",
            "--own-ip-header",
            "--verify-checksums",
            "--strict-addresses",
            "--mss", "512",
            "--source", "10.0.0.1",
            "10.0.0.2", "8080", "hi",
        ]);
        let options = config.options();
        assert_eq!(config.message, "hi");
        assert_eq!(options.framing, Framing::Own);
        assert_eq!(options.checksum, Checksum::Manual);
        assert!(options.filter_addresses);
        assert_eq!(options.max_segment_size, 512);
        assert_eq!(options.source, Some(rawtcp::wire::Ipv4Address::new(10, 0, 0, 1)));
    }
}
