use std::fmt;
use std::net::{IpAddr, Ipv6Addr, SocketAddr};

use santitham_primitives::encoding::{DecodeError, Decoder, Encoder};

use crate::error::NetworkError;
use crate::services::Services;

pub const NET_ADDR_SIZE: usize = 30;

const MAX_ADDR_ENTRIES: u64 = 1000;

/// A timestamped peer address as carried in `addr` payloads. The port is
/// big-endian on the wire; every other numeric field is little-endian.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct NetAddr {
    pub time: u32,
    pub services: Services,
    pub ip: [u8; 16],
    pub port: u16,
}

impl NetAddr {
    pub fn ip_addr(&self) -> IpAddr {
        let ip6 = Ipv6Addr::from(self.ip);
        match ip6.to_ipv4_mapped() {
            Some(ip4) => IpAddr::V4(ip4),
            None => IpAddr::V6(ip6),
        }
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip_addr(), self.port)
    }

    pub fn encode_to(&self, encoder: &mut Encoder) {
        encoder.write_u32_le(self.time);
        encoder.write_u64_le(self.services.bits());
        encoder.write_bytes(&self.ip);
        encoder.write_bytes(&self.port.to_be_bytes());
    }

    pub fn decode_from(decoder: &mut Decoder<'_>) -> Result<Self, DecodeError> {
        let time = decoder.read_u32_le()?;
        let services = Services(decoder.read_u64_le()?);
        let ip = decoder.read_fixed::<16>()?;
        let port_bytes = decoder.read_fixed::<2>()?;
        let port = u16::from_be_bytes(port_bytes);
        Ok(Self {
            time,
            services,
            ip,
            port,
        })
    }
}

impl fmt::Display for NetAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.socket_addr())
    }
}

/// Decodes an `addr` payload: varint count followed by count 30-byte
/// entries. A count that disagrees with the payload length is corrupt.
pub fn decode_addr_payload(payload: &[u8]) -> Result<Vec<NetAddr>, NetworkError> {
    let mut decoder = Decoder::new(payload);
    let count = decoder
        .read_varint()
        .map_err(|_| NetworkError::CorruptPayload)?;
    let body_len = decoder.remaining() as u64;
    if count > MAX_ADDR_ENTRIES
        || body_len / NET_ADDR_SIZE as u64 != count
        || body_len % NET_ADDR_SIZE as u64 != 0
    {
        return Err(NetworkError::CorruptPayload);
    }

    let mut addrs = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let addr =
            NetAddr::decode_from(&mut decoder).map_err(|_| NetworkError::CorruptPayload)?;
        addrs.push(addr);
    }
    Ok(addrs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(port: u16) -> NetAddr {
        let ip4 = [10, 0, 0, 1];
        let mut ip = [0u8; 16];
        ip[10] = 0xFF;
        ip[11] = 0xFF;
        ip[12..].copy_from_slice(&ip4);
        NetAddr {
            time: 1_700_000_000,
            services: Services::NODE_NETWORK,
            ip,
            port,
        }
    }

    #[test]
    fn port_is_big_endian_on_the_wire() {
        let addr = sample(8333);
        let mut encoder = Encoder::new();
        addr.encode_to(&mut encoder);
        let bytes = encoder.into_inner();
        assert_eq!(bytes.len(), NET_ADDR_SIZE);
        assert_eq!(&bytes[28..30], &[0x20, 0x8D]); // 8333 big-endian

        let mut decoder = Decoder::new(&bytes);
        let decoded = NetAddr::decode_from(&mut decoder).expect("decode");
        assert_eq!(decoded, addr);
    }

    #[test]
    fn ipv4_mapped_address_round_trip() {
        let addr = sample(8333);
        assert_eq!(addr.socket_addr().to_string(), "10.0.0.1:8333");
    }

    #[test]
    fn addr_payload_round_trip() {
        let addrs = vec![sample(8333), sample(18333)];
        let mut encoder = Encoder::new();
        encoder.write_varint(addrs.len() as u64);
        for addr in &addrs {
            addr.encode_to(&mut encoder);
        }
        let payload = encoder.into_inner();
        assert_eq!(decode_addr_payload(&payload).expect("decode"), addrs);
    }

    #[test]
    fn addr_payload_count_mismatch_is_corrupt() {
        let mut encoder = Encoder::new();
        encoder.write_varint(2);
        sample(8333).encode_to(&mut encoder);
        let payload = encoder.into_inner();
        assert!(matches!(
            decode_addr_payload(&payload),
            Err(NetworkError::CorruptPayload)
        ));
    }
}
