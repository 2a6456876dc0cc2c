use std::net::IpAddr;
use std::time::{SystemTime, UNIX_EPOCH};

use santitham_primitives::encoding::Encoder;

use crate::error::NetworkError;
use crate::services::Services;

pub const PROTOCOL_VERSION: i32 = 70012;
pub const USER_AGENT: &str = "/Santitham:0.0.1/";

/// Builds a `version` payload addressed at the given peer. The receiver
/// address is carried in big-endian IPv6 form; the addr-from field is left
/// zeroed as permitted for outbound-only nodes.
pub fn build_version_payload(
    services: Services,
    peer_ip: IpAddr,
    peer_port: u16,
    peer_services: Services,
    start_height: i32,
    relay: bool,
) -> Vec<u8> {
    let mut encoder = Encoder::new();
    encoder.write_i32_le(PROTOCOL_VERSION);
    encoder.write_u64_le(services.bits());
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_secs() as i64)
        .unwrap_or(0);
    encoder.write_i64_le(timestamp);

    encoder.write_u64_le(peer_services.bits());
    encoder.write_bytes(&ipv6_bytes(peer_ip));
    encoder.write_bytes(&peer_port.to_be_bytes());

    encoder.write_bytes(&[0u8; 26]); // addr-from

    encoder.write_u64_le(rand::random::<u64>());
    encoder.write_var_str(USER_AGENT);
    encoder.write_i32_le(start_height);
    encoder.write_u8(u8::from(relay));
    encoder.into_inner()
}

fn ipv6_bytes(ip: IpAddr) -> [u8; 16] {
    match ip {
        IpAddr::V4(ip4) => ip4.to_ipv6_mapped().octets(),
        IpAddr::V6(ip6) => ip6.octets(),
    }
}

#[derive(Clone, Copy, Debug)]
pub struct VersionInfo {
    pub version: i32,
    pub services: Services,
}

/// Extracts the negotiated protocol version and advertised services from a
/// peer's `version` payload. A version above `i32::MAX` is a protocol
/// violation.
pub fn parse_version(payload: &[u8]) -> Result<VersionInfo, NetworkError> {
    if payload.len() < 12 {
        return Err(NetworkError::CorruptPayload);
    }
    let raw_version = u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]);
    if raw_version > i32::MAX as u32 {
        return Err(NetworkError::InvalidPeerVersion);
    }
    let mut services_bytes = [0u8; 8];
    services_bytes.copy_from_slice(&payload[4..12]);
    Ok(VersionInfo {
        version: raw_version as i32,
        services: Services(u64::from_le_bytes(services_bytes)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn version_payload_layout() {
        let payload = build_version_payload(
            Services::NONE,
            IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)),
            8333,
            Services::NODE_NETWORK,
            0,
            false,
        );

        // version
        assert_eq!(
            i32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]),
            PROTOCOL_VERSION
        );
        // own services
        assert_eq!(u64::from_le_bytes(payload[4..12].try_into().unwrap()), 0);
        // peer services
        assert_eq!(u64::from_le_bytes(payload[20..28].try_into().unwrap()), 1);
        // peer address: ::ffff:127.0.0.1, big-endian
        assert_eq!(&payload[28..44], Ipv4Addr::new(127, 0, 0, 1).to_ipv6_mapped().octets().as_slice());
        // peer port, big-endian
        assert_eq!(&payload[44..46], &8333u16.to_be_bytes());
        // addr-from, zero-filled
        assert!(payload[46..72].iter().all(|byte| *byte == 0));
        // user agent var-str after the nonce
        assert_eq!(payload[80] as usize, USER_AGENT.len());
        assert_eq!(&payload[81..81 + USER_AGENT.len()], USER_AGENT.as_bytes());
        // start height + relay flag close the payload
        let tail = 81 + USER_AGENT.len();
        assert_eq!(&payload[tail..tail + 4], &0i32.to_le_bytes());
        assert_eq!(payload[tail + 4], 0);
        assert_eq!(payload.len(), tail + 5);
    }

    #[test]
    fn parse_version_reads_services() {
        let payload = build_version_payload(
            Services::NODE_NETWORK | Services::NODE_WITNESS,
            IpAddr::V4(Ipv4Addr::LOCALHOST),
            8333,
            Services::NONE,
            0,
            false,
        );
        let info = parse_version(&payload).expect("parse");
        assert_eq!(info.version, PROTOCOL_VERSION);
        assert!(info.services.contains(Services::NODE_NETWORK));
        assert!(info.services.contains(Services::NODE_WITNESS));
    }

    #[test]
    fn oversized_version_is_rejected() {
        let mut payload = vec![0u8; 12];
        payload[..4].copy_from_slice(&u32::MAX.to_le_bytes());
        assert!(matches!(
            parse_version(&payload),
            Err(NetworkError::InvalidPeerVersion)
        ));
    }

    #[test]
    fn short_version_payload_is_corrupt() {
        assert!(matches!(
            parse_version(&[0u8; 4]),
            Err(NetworkError::CorruptPayload)
        ));
    }
}
