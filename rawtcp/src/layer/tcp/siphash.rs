//! Initial sequence number generation, as recommended by rfc6528.
//!
//! Uses a keyed cryptographic hash function (SipHash-2-4) instead of appending the secret key to
//! the four tuple for hashing. Hash function SipHash-2-4 from:
//!
//! > SipHash: a fast short-input PRF, Jean-Philippe Aumasson and Daniel J. Bernstein
use super::FourTuple;
use crate::time::Instant;
use crate::wire::TcpSeqNumber;

/// An initial sequence number generator based on SipHash-2-4.
///
/// > ISN = M + SipHash-2-4(secretkey, localip, localport, remoteip, remoteport)
///
/// where `M` is a timer ticking every 4 microseconds. The key setup of the hash function replaces
/// hashing the secret as the last parameter.
pub struct IsnGenerator {
    keys: (u64, u64),
}

// The initial values, as ASCII text.
const IV: [&[u8; 8]; 4] = [
    b"somepseu",
    b"dorandom",
    b"lygenera",
    b"tedbytes"];

struct State {
    v0: u64,
    v1: u64,
    v2: u64,
    v3: u64,
}

impl IsnGenerator {
    /// Create a generator by deriving a key from the standard `RandomState`.
    ///
    /// Hashes the numbers `0u64` and `1u64` with two clones of one hasher from a new
    /// `RandomState`, and uses the two tags as key.
    pub fn from_std_hash() -> Self {
        use std::hash::{Hasher, BuildHasher};
        use std::collections::hash_map::RandomState;

        let hash = RandomState::new().build_hasher();
        let tag = |word: u64| {
            let mut hash = hash.clone();
            hash.write_u64(word);
            hash.finish()
        };

        IsnGenerator {
            keys: (tag(0), tag(1)),
        }
    }

    /// Create a generator with some pre-defined secret key.
    pub fn from_secret_key_bytes(bytes: [u8; 16]) -> Self {
        let mut a = [0; 8];
        let mut b = [0; 8];
        a.copy_from_slice(&bytes[..8]);
        b.copy_from_slice(&bytes[8..]);
        IsnGenerator { keys: (u64::from_le_bytes(a), u64::from_le_bytes(b)), }
    }

    /// Get the initial sequence number for a connection.
    pub fn get_isn(&self, connection: FourTuple, time: Instant) -> TcpSeqNumber {
        let mut state = State::init(self.keys.0, self.keys.1);

        let m = u64::from(connection.local.to_network_integer())
            | u64::from(connection.remote.to_network_integer()) << 32;
        let p = u64::from(connection.local_port)
            | u64::from(connection.remote_port) << 16
            // Message length = 12
            | 12_u64 << 56;
        state.absorb(m);
        state.absorb(p);
        let hash = state.finalize();

        let ticks = time.total_millis().wrapping_mul(250);
        TcpSeqNumber(hash as u32) + (ticks as u32 as usize)
    }
}

impl State {
    const SIP_C: usize = 2;
    const SIP_D: usize = 4;

    fn init(k0: u64, k1: u64) -> Self {
        State {
            v0: u64::from_be_bytes(*IV[0]) ^ k0,
            v1: u64::from_be_bytes(*IV[1]) ^ k1,
            v2: u64::from_be_bytes(*IV[2]) ^ k0,
            v3: u64::from_be_bytes(*IV[3]) ^ k1,
        }
    }

    fn round(&mut self) {
        self.v0 = self.v0.wrapping_add(self.v1);
        self.v1 = self.v1.rotate_left(13);
        self.v1 ^= self.v0;
        self.v0 = self.v0.rotate_left(32);
        self.v2 = self.v2.wrapping_add(self.v3);
        self.v3 = self.v3.rotate_left(16);
        self.v3 ^= self.v2;
        self.v0 = self.v0.wrapping_add(self.v3);
        self.v3 = self.v3.rotate_left(21);
        self.v3 ^= self.v0;
        self.v2 = self.v2.wrapping_add(self.v1);
        self.v1 = self.v1.rotate_left(17);
        self.v1 ^= self.v2;
        self.v2 = self.v2.rotate_left(32);
    }

    /// Process a single 8-byte block of the message.
    ///
    /// The length block is absorbed manually by the caller, as a constant.
    fn absorb(&mut self, m: u64) {
        self.v3 ^= m;
        (0..Self::SIP_C).for_each(|_| self.round());
        self.v0 ^= m;
    }

    fn finalize(mut self) -> u64 {
        self.v2 ^= 0xff;
        (0..Self::SIP_D).for_each(|_| self.round());
        self.v0 ^ self.v1 ^ self.v2 ^ self.v3
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::Ipv4Address;

    fn tuple() -> FourTuple {
        FourTuple {
            local: Ipv4Address::new(10, 0, 0, 1),
            remote: Ipv4Address::new(10, 0, 0, 2),
            local_port: 49152,
            remote_port: 42069,
        }
    }

    /// See the paper, Appendix A.
    #[test]
    fn manual_test_vectors() {
        let k0 = u64::from_le_bytes(0x0001020304050607_u64.to_be_bytes());
        let k1 = u64::from_le_bytes(0x08090a0b0c0d0e0f_u64.to_be_bytes());

        let mut state = State::init(k0, k1);
        let m0 = u64::from_le_bytes(0x0001020304050607_u64.to_be_bytes());
        state.absorb(m0);
        let m1 = u64::from_le_bytes(0x08090a0b0c0d0e0f_u64.to_be_bytes());
        state.absorb(m1);

        assert_eq!(state.finalize(), 0xa129ca6149be45e5);
    }

    #[test]
    fn isn_advances_with_time() {
        let generator = IsnGenerator::from_secret_key_bytes([7; 16]);
        let start = generator.get_isn(tuple(), Instant::from_millis(0));
        let later = generator.get_isn(tuple(), Instant::from_millis(4));
        assert_eq!(later, start + 1000);
    }

    #[test]
    fn isn_depends_on_tuple() {
        let generator = IsnGenerator::from_secret_key_bytes([7; 16]);
        let other = FourTuple { local_port: 49153, ..tuple() };
        let now = Instant::from_millis(0);
        assert_ne!(generator.get_isn(tuple(), now), generator.get_isn(other, now));
    }
}
