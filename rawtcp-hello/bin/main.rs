//! A raw tcp client example
//!
//! Connects to a given remote tcp host, sends a single provided message and closes the
//! connection again. Requires the privilege to open raw sockets (`CAP_NET_RAW`).
//!
//! The kernel does not know about the connection and resets it as soon as the peer answers,
//! unless outgoing resets are dropped. Call example:
//!
//! * `iptables -A OUTPUT -p tcp --tcp-flags RST RST -d 10.0.0.2 -j DROP`
//! * `rawtcp-hello 10.0.0.2 8080 'Hello, world!'`
use std::process;

use rawtcp::layer::tcp::Connection;

pub use rawtcp_hello::config;

fn main() {
    env_logger::init();
    let config = config::Config::from_args();

    let mut connection = match Connection::open(config.host.into(), config.port, config.options()) {
        Ok(connection) => connection,
        Err(err) => {
            eprintln!("[-] Couldn't initialize raw socket: {}", err);
            process::exit(1);
        },
    };

    println!("[+] Connecting {}:{} -> {}:{}",
        connection.four_tuple().local, connection.four_tuple().local_port,
        config.host, config.port);

    match rawtcp_hello::hello(&mut connection, config.message.as_bytes()) {
        Ok(segments) => println!("[+] Done, sent {} bytes in {} segments",
            config.message.len(), segments),
        Err(err) => {
            eprintln!("[-] Connection failed in state {}: {}", connection.state(), err);
            process::exit(1);
        },
    }
}
