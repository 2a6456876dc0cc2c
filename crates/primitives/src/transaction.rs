use std::fmt;

use crate::encoding::{DecodeError, Decoder, Encoder};
use crate::hash::Hash256;
use crate::outpoint::OutPoint;

pub type TxHash = Hash256;

/// Witness stack for one input: zero or more stack items.
pub type Witness = Vec<Vec<u8>>;

const SEGWIT_MARKER: u8 = 0x00;
const SEGWIT_FLAG: u8 = 0x01;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TransactionDecodeError {
    InvalidTransaction,
    InvalidTxInput,
    InvalidTxOutput,
    InvalidTxWitnesses,
}

impl fmt::Display for TransactionDecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionDecodeError::InvalidTransaction => write!(f, "invalid transaction"),
            TransactionDecodeError::InvalidTxInput => write!(f, "invalid tx input"),
            TransactionDecodeError::InvalidTxOutput => write!(f, "invalid tx output"),
            TransactionDecodeError::InvalidTxWitnesses => write!(f, "invalid tx witnesses"),
        }
    }
}

impl std::error::Error for TransactionDecodeError {}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TxIn {
    pub previous_output: OutPoint,
    pub script_sig: Vec<u8>,
    pub sequence: u32,
}

impl TxIn {
    pub fn consensus_encode_to(&self, encoder: &mut Encoder) {
        self.previous_output.consensus_encode_to(encoder);
        encoder.write_var_bytes(&self.script_sig);
        encoder.write_u32_le(self.sequence);
    }

    pub fn consensus_decode_from(
        decoder: &mut Decoder<'_>,
    ) -> Result<Self, TransactionDecodeError> {
        let previous_output = OutPoint::consensus_decode_from(decoder)
            .map_err(|_| TransactionDecodeError::InvalidTxInput)?;
        let script_sig = decoder
            .read_var_bytes()
            .map_err(|_| TransactionDecodeError::InvalidTxInput)?;
        let sequence = decoder
            .read_u32_le()
            .map_err(|_| TransactionDecodeError::InvalidTxInput)?;
        Ok(Self {
            previous_output,
            script_sig,
            sequence,
        })
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TxOut {
    pub value: i64,
    pub script_pubkey: Vec<u8>,
}

impl TxOut {
    pub fn consensus_encode_to(&self, encoder: &mut Encoder) {
        encoder.write_i64_le(self.value);
        encoder.write_var_bytes(&self.script_pubkey);
    }

    pub fn consensus_decode_from(
        decoder: &mut Decoder<'_>,
    ) -> Result<Self, TransactionDecodeError> {
        let value = decoder
            .read_i64_le()
            .map_err(|_| TransactionDecodeError::InvalidTxOutput)?;
        let script_pubkey = decoder
            .read_var_bytes()
            .map_err(|_| TransactionDecodeError::InvalidTxOutput)?;
        Ok(Self {
            value,
            script_pubkey,
        })
    }
}

/// A transaction in either the legacy or the segregated-witness layout.
///
/// `witnesses` is empty for a legacy transaction; when the witness
/// marker/flag pair is present on the wire there is exactly one stack per
/// input, in input order.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Transaction {
    pub version: u32,
    pub vin: Vec<TxIn>,
    pub vout: Vec<TxOut>,
    pub witnesses: Vec<Witness>,
    pub lock_time: u32,
}

impl Transaction {
    pub fn has_witness(&self) -> bool {
        !self.witnesses.is_empty()
    }

    pub fn consensus_encode(&self) -> Vec<u8> {
        let mut encoder = Encoder::new();
        self.consensus_encode_to(&mut encoder);
        encoder.into_inner()
    }

    pub fn consensus_encode_to(&self, encoder: &mut Encoder) {
        encoder.write_u32_le(self.version);
        if self.has_witness() {
            encoder.write_u8(SEGWIT_MARKER);
            encoder.write_u8(SEGWIT_FLAG);
        }
        encoder.write_varint(self.vin.len() as u64);
        for input in &self.vin {
            input.consensus_encode_to(encoder);
        }
        encoder.write_varint(self.vout.len() as u64);
        for output in &self.vout {
            output.consensus_encode_to(encoder);
        }
        if self.has_witness() {
            for index in 0..self.vin.len() {
                let stack = self.witnesses.get(index).map(Vec::as_slice).unwrap_or(&[]);
                encoder.write_varint(stack.len() as u64);
                for item in stack {
                    encoder.write_var_bytes(item);
                }
            }
        }
        encoder.write_u32_le(self.lock_time);
    }

    pub fn consensus_decode(bytes: &[u8]) -> Result<Self, TransactionDecodeError> {
        let mut decoder = Decoder::new(bytes);
        let tx = Self::consensus_decode_from(&mut decoder)?;
        if !decoder.is_empty() {
            return Err(TransactionDecodeError::InvalidTransaction);
        }
        Ok(tx)
    }

    pub fn consensus_decode_from(
        decoder: &mut Decoder<'_>,
    ) -> Result<Self, TransactionDecodeError> {
        let version = decoder
            .read_u32_le()
            .map_err(|_| TransactionDecodeError::InvalidTransaction)?;

        // A 0x00 after the version can only be the segwit marker: legacy
        // transactions never have zero inputs. The flag byte must be 0x01.
        let segwit = match decoder.peek_u8() {
            Some(SEGWIT_MARKER) => {
                if decoder.peek_at(1) != Some(SEGWIT_FLAG) {
                    return Err(TransactionDecodeError::InvalidTransaction);
                }
                decoder
                    .read_bytes(2)
                    .map_err(|_| TransactionDecodeError::InvalidTransaction)?;
                true
            }
            Some(_) => false,
            None => return Err(TransactionDecodeError::InvalidTransaction),
        };

        let input_count = decoder
            .read_varint()
            .map_err(|_| TransactionDecodeError::InvalidTransaction)?;
        let input_count = usize::try_from(input_count)
            .map_err(|_| TransactionDecodeError::InvalidTransaction)?;
        let mut vin = Vec::with_capacity(input_count.min(1024));
        for _ in 0..input_count {
            vin.push(TxIn::consensus_decode_from(decoder)?);
        }

        let output_count = decoder
            .read_varint()
            .map_err(|_| TransactionDecodeError::InvalidTransaction)?;
        let output_count = usize::try_from(output_count)
            .map_err(|_| TransactionDecodeError::InvalidTransaction)?;
        let mut vout = Vec::with_capacity(output_count.min(1024));
        for _ in 0..output_count {
            vout.push(TxOut::consensus_decode_from(decoder)?);
        }

        let mut witnesses = Vec::new();
        if segwit {
            witnesses.reserve(vin.len());
            for _ in 0..vin.len() {
                let item_count = decoder
                    .read_varint()
                    .map_err(|_| TransactionDecodeError::InvalidTxWitnesses)?;
                let item_count = usize::try_from(item_count)
                    .map_err(|_| TransactionDecodeError::InvalidTxWitnesses)?;
                let mut stack = Vec::with_capacity(item_count.min(1024));
                for _ in 0..item_count {
                    stack.push(
                        decoder
                            .read_var_bytes()
                            .map_err(|_| TransactionDecodeError::InvalidTxWitnesses)?,
                    );
                }
                witnesses.push(stack);
            }
        }

        let lock_time = decoder
            .read_u32_le()
            .map_err(|_| TransactionDecodeError::InvalidTransaction)?;

        Ok(Self {
            version,
            vin,
            vout,
            witnesses,
            lock_time,
        })
    }
}
