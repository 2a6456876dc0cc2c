//! Bitcoin P2P wire protocol: message envelope, handshake and peer
//! sessions for outbound connections.

pub mod command;
pub mod error;
pub mod handshake;
pub mod inventory;
pub mod message;
pub mod net_addr;
pub mod services;
pub mod session;
pub mod version;

pub use command::Command;
pub use error::NetworkError;
pub use handshake::handshake;
pub use inventory::{decode_inv_payload, encode_inv_payload, InvVec, ObjectType};
pub use message::{Message, MessageHeader, MAGIC};
pub use net_addr::{decode_addr_payload, NetAddr};
pub use services::Services;
pub use session::{InvWithSource, Session};
pub use version::{build_version_payload, parse_version, VersionInfo, PROTOCOL_VERSION, USER_AGENT};
