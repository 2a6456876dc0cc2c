use std::fmt;

use crate::encoding::{DecodeError, Decoder, Encoder};
use crate::hash::{sha256d, Hash256};
use crate::transaction::{Transaction, TransactionDecodeError};

pub type BlockHash = Hash256;

/// Length of the fixed header prefix the block hash commits to.
pub const HEADER_SIZE: usize = 80;

#[derive(Debug)]
pub enum BlockDecodeError {
    Encoding(DecodeError),
    Transaction(TransactionDecodeError),
}

impl fmt::Display for BlockDecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockDecodeError::Encoding(err) => write!(f, "{err}"),
            BlockDecodeError::Transaction(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for BlockDecodeError {}

impl From<DecodeError> for BlockDecodeError {
    fn from(err: DecodeError) -> Self {
        BlockDecodeError::Encoding(err)
    }
}

impl From<TransactionDecodeError> for BlockDecodeError {
    fn from(err: TransactionDecodeError) -> Self {
        BlockDecodeError::Transaction(err)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BlockHeader {
    pub version: i32,
    pub prev_block: BlockHash,
    pub merkle_root: Hash256,
    pub timestamp: u32,
    pub bits: u32,
    pub nonce: u32,
}

impl BlockHeader {
    pub fn consensus_encode(&self) -> Vec<u8> {
        let mut encoder = Encoder::with_capacity(HEADER_SIZE);
        self.consensus_encode_to(&mut encoder);
        encoder.into_inner()
    }

    pub fn consensus_encode_to(&self, encoder: &mut Encoder) {
        encoder.write_i32_le(self.version);
        encoder.write_bytes(&self.prev_block);
        encoder.write_bytes(&self.merkle_root);
        encoder.write_u32_le(self.timestamp);
        encoder.write_u32_le(self.bits);
        encoder.write_u32_le(self.nonce);
    }

    pub fn consensus_decode_from(decoder: &mut Decoder<'_>) -> Result<Self, DecodeError> {
        let version = decoder.read_i32_le()?;
        let prev_block = decoder.read_fixed::<32>()?;
        let merkle_root = decoder.read_fixed::<32>()?;
        let timestamp = decoder.read_u32_le()?;
        let bits = decoder.read_u32_le()?;
        let nonce = decoder.read_u32_le()?;
        Ok(Self {
            version,
            prev_block,
            merkle_root,
            timestamp,
            bits,
            nonce,
        })
    }

    /// Double-SHA256 over the 80-byte header prefix.
    pub fn hash(&self) -> BlockHash {
        sha256d(&self.consensus_encode())
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
}

impl Block {
    pub fn hash(&self) -> BlockHash {
        self.header.hash()
    }

    /// Header, transaction-count varint, transactions. The count varint is
    /// always included so the encoding round-trips both on the wire and on
    /// disk.
    pub fn consensus_encode(&self) -> Vec<u8> {
        let mut encoder = Encoder::new();
        self.consensus_encode_to(&mut encoder);
        encoder.into_inner()
    }

    pub fn consensus_encode_to(&self, encoder: &mut Encoder) {
        self.header.consensus_encode_to(encoder);
        encoder.write_varint(self.transactions.len() as u64);
        for tx in &self.transactions {
            tx.consensus_encode_to(encoder);
        }
    }

    pub fn consensus_decode(bytes: &[u8]) -> Result<Self, BlockDecodeError> {
        let mut decoder = Decoder::new(bytes);
        Self::consensus_decode_from(&mut decoder)
    }

    pub fn consensus_decode_from(decoder: &mut Decoder<'_>) -> Result<Self, BlockDecodeError> {
        let header = BlockHeader::consensus_decode_from(decoder)?;
        let tx_count = decoder.read_varint()?;
        let tx_count = usize::try_from(tx_count).map_err(|_| DecodeError::UnexpectedEof)?;
        let mut transactions = Vec::with_capacity(tx_count.min(4096));
        for _ in 0..tx_count {
            transactions.push(Transaction::consensus_decode_from(decoder)?);
        }
        Ok(Self {
            header,
            transactions,
        })
    }
}
