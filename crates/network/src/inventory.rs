use std::fmt;

use santitham_primitives::block::BlockHash;
use santitham_primitives::encoding::{Decoder, Encoder};

use crate::error::NetworkError;

pub const INV_VEC_SIZE: usize = 36;

/// Object type carried in an inventory vector.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ObjectType {
    Error,
    Tx,
    Block,
    FilteredBlock,
    CmpctBlock,
    WitnessTx,
    WitnessBlock,
    FilteredWitnessBlock,
    Unknown(u32),
}

impl ObjectType {
    pub fn from_u32(value: u32) -> Self {
        match value {
            0 => ObjectType::Error,
            1 => ObjectType::Tx,
            2 => ObjectType::Block,
            3 => ObjectType::FilteredBlock,
            4 => ObjectType::CmpctBlock,
            0x4000_0001 => ObjectType::WitnessTx,
            0x4000_0002 => ObjectType::WitnessBlock,
            0x4000_0003 => ObjectType::FilteredWitnessBlock,
            other => ObjectType::Unknown(other),
        }
    }

    pub fn to_u32(self) -> u32 {
        match self {
            ObjectType::Error => 0,
            ObjectType::Tx => 1,
            ObjectType::Block => 2,
            ObjectType::FilteredBlock => 3,
            ObjectType::CmpctBlock => 4,
            ObjectType::WitnessTx => 0x4000_0001,
            ObjectType::WitnessBlock => 0x4000_0002,
            ObjectType::FilteredWitnessBlock => 0x4000_0003,
            ObjectType::Unknown(other) => other,
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ObjectType::Error => "ERROR",
            ObjectType::Tx => "MSG_TX",
            ObjectType::Block => "MSG_BLOCK",
            ObjectType::FilteredBlock => "MSG_FILTERED_BLOCK",
            ObjectType::CmpctBlock => "MSG_CMPCT_BLOCK",
            ObjectType::WitnessTx => "MSG_WITNESS_TX",
            ObjectType::WitnessBlock => "MSG_WITNESS_BLOCK",
            ObjectType::FilteredWitnessBlock => "MSG_FILTERED_WITNESS_BLOCK",
            ObjectType::Unknown(_) => "UNKNOWN",
        };
        write!(f, "{name}")
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct InvVec {
    pub inv_type: ObjectType,
    pub hash: BlockHash,
}

/// Decodes an `inv` or `getdata` payload: varint count, count 36-byte
/// vectors, nothing else.
pub fn decode_inv_payload(payload: &[u8]) -> Result<Vec<InvVec>, NetworkError> {
    let mut decoder = Decoder::new(payload);
    let count = decoder
        .read_varint()
        .map_err(|_| NetworkError::InvalidInvMessage)?;
    let body_len = decoder.remaining() as u64;
    if body_len / INV_VEC_SIZE as u64 != count || body_len % INV_VEC_SIZE as u64 != 0 {
        return Err(NetworkError::InvalidInvMessage);
    }

    let mut inventory = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let inv_type = ObjectType::from_u32(
            decoder
                .read_u32_le()
                .map_err(|_| NetworkError::InvalidInvMessage)?,
        );
        let hash = decoder
            .read_fixed::<32>()
            .map_err(|_| NetworkError::InvalidInvMessage)?;
        inventory.push(InvVec { inv_type, hash });
    }
    Ok(inventory)
}

pub fn encode_inv_payload(inventory: &[InvVec]) -> Vec<u8> {
    let mut encoder = Encoder::with_capacity(9 + inventory.len() * INV_VEC_SIZE);
    encoder.write_varint(inventory.len() as u64);
    for item in inventory {
        encoder.write_u32_le(item.inv_type.to_u32());
        encoder.write_bytes(&item.hash);
    }
    encoder.into_inner()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inv_payload_round_trip() {
        let inventory = vec![
            InvVec {
                inv_type: ObjectType::Block,
                hash: [0xAB; 32],
            },
            InvVec {
                inv_type: ObjectType::WitnessBlock,
                hash: [0xCD; 32],
            },
        ];
        let payload = encode_inv_payload(&inventory);
        assert_eq!(payload.len(), 1 + 2 * INV_VEC_SIZE);
        assert_eq!(decode_inv_payload(&payload).expect("decode"), inventory);
    }

    #[test]
    fn count_mismatch_is_invalid() {
        let inventory = vec![InvVec {
            inv_type: ObjectType::Block,
            hash: [0x01; 32],
        }];
        let mut payload = encode_inv_payload(&inventory);
        payload[0] = 2;
        assert!(matches!(
            decode_inv_payload(&payload),
            Err(NetworkError::InvalidInvMessage)
        ));
    }

    #[test]
    fn truncated_vector_is_invalid() {
        let inventory = vec![InvVec {
            inv_type: ObjectType::Block,
            hash: [0x01; 32],
        }];
        let payload = encode_inv_payload(&inventory);
        assert!(matches!(
            decode_inv_payload(&payload[..payload.len() - 1]),
            Err(NetworkError::InvalidInvMessage)
        ));
    }

    #[test]
    fn witness_types_map_to_high_bits() {
        assert_eq!(ObjectType::WitnessBlock.to_u32(), 0x4000_0002);
        assert_eq!(ObjectType::from_u32(0x4000_0001), ObjectType::WitnessTx);
        assert_eq!(ObjectType::from_u32(99), ObjectType::Unknown(99));
    }
}
