use crate::encoding::{DecodeError, Decoder, Encoder};
use crate::hash::Hash256;

/// Reference to a previously created transaction output.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct OutPoint {
    pub hash: Hash256,
    pub index: u32,
}

impl OutPoint {
    pub fn consensus_encode_to(&self, encoder: &mut Encoder) {
        encoder.write_bytes(&self.hash);
        encoder.write_u32_le(self.index);
    }

    pub fn consensus_decode_from(decoder: &mut Decoder<'_>) -> Result<Self, DecodeError> {
        let hash = decoder.read_fixed::<32>()?;
        let index = decoder.read_u32_le()?;
        Ok(Self { hash, index })
    }
}
