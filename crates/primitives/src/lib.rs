//! Core block/transaction types and consensus serialization.

pub mod block;
pub mod encoding;
pub mod hash;
pub mod outpoint;
pub mod transaction;

pub use block::{Block, BlockDecodeError, BlockHash, BlockHeader};
pub use encoding::{DecodeError, Decoder, Encoder, VarInt};
pub use hash::{hash_to_hex, sha256, sha256d, Hash256};
pub use outpoint::OutPoint;
pub use transaction::{Transaction, TransactionDecodeError, TxHash, TxIn, TxOut, Witness};
