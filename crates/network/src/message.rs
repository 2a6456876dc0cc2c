use std::fmt;

use santitham_primitives::hash::sha256d;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::command::{Command, COMMAND_SIZE};
use crate::error::NetworkError;

/// Mainnet network magic, as laid out on the wire.
pub const MAGIC: [u8; 4] = [0xF9, 0xBE, 0xB4, 0xD9];

pub const HEADER_SIZE: usize = 24;
pub const CHECKSUM_SIZE: usize = 4;

/// Upper bound on a single message payload, per protocol.
const MAX_PAYLOAD_SIZE: u32 = 32 * 1024 * 1024;

pub fn checksum(payload: &[u8]) -> [u8; CHECKSUM_SIZE] {
    let digest = sha256d(payload);
    [digest[0], digest[1], digest[2], digest[3]]
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct MessageHeader {
    pub magic: [u8; 4],
    pub command: Command,
    pub size: u32,
    pub checksum: [u8; CHECKSUM_SIZE],
}

impl MessageHeader {
    pub fn new(command: Command, payload: &[u8]) -> Self {
        Self {
            magic: MAGIC,
            command,
            size: payload.len() as u32,
            checksum: checksum(payload),
        }
    }

    pub fn encode_to(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.magic);
        buf.extend_from_slice(&self.command.0);
        buf.extend_from_slice(&self.size.to_le_bytes());
        buf.extend_from_slice(&self.checksum);
    }

    pub fn decode(bytes: &[u8; HEADER_SIZE]) -> Result<Self, NetworkError> {
        if bytes[..4] != MAGIC {
            return Err(NetworkError::InvalidHeader);
        }
        let mut command = [0u8; COMMAND_SIZE];
        command.copy_from_slice(&bytes[4..16]);
        let size = u32::from_le_bytes([bytes[16], bytes[17], bytes[18], bytes[19]]);
        let mut checksum = [0u8; CHECKSUM_SIZE];
        checksum.copy_from_slice(&bytes[20..24]);
        Ok(Self {
            magic: MAGIC,
            command: Command(command),
            size,
            checksum,
        })
    }
}

impl fmt::Display for MessageHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "command={} size={} checksum={:02x}{:02x}{:02x}{:02x}",
            self.command,
            self.size,
            self.checksum[0],
            self.checksum[1],
            self.checksum[2],
            self.checksum[3]
        )
    }
}

/// A framed protocol message: header plus payload bytes. Payload contents
/// are interpreted by the session layer, not here.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Message {
    pub header: MessageHeader,
    pub payload: Vec<u8>,
}

impl Message {
    pub fn new(command: Command, payload: Vec<u8>) -> Self {
        Self {
            header: MessageHeader::new(command, &payload),
            payload,
        }
    }

    pub fn verack() -> Self {
        Self::new(Command::VERACK, Vec::new())
    }

    pub fn getaddr() -> Self {
        Self::new(Command::GETADDR, Vec::new())
    }

    pub fn command(&self) -> Command {
        self.header.command
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_SIZE + self.payload.len());
        self.header.encode_to(&mut buf);
        buf.extend_from_slice(&self.payload);
        buf
    }

    /// Reads one framed message. Rejects a foreign magic and a checksum
    /// that does not match the payload; unknown commands pass through.
    pub async fn read_from<R>(reader: &mut R) -> Result<Message, NetworkError>
    where
        R: AsyncRead + Unpin,
    {
        let mut header_bytes = [0u8; HEADER_SIZE];
        reader.read_exact(&mut header_bytes).await?;
        let header = MessageHeader::decode(&header_bytes)?;
        if header.size > MAX_PAYLOAD_SIZE {
            return Err(NetworkError::CorruptPayload);
        }

        let mut payload = vec![0u8; header.size as usize];
        reader.read_exact(&mut payload).await?;
        if header.checksum != checksum(&payload) {
            return Err(NetworkError::InvalidChecksum);
        }

        Ok(Message { header, payload })
    }

    pub async fn write_to<W>(&self, writer: &mut W) -> Result<(), NetworkError>
    where
        W: AsyncWrite + Unpin,
    {
        writer.write_all(&self.encode()).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::ErrorKind;

    #[tokio::test]
    async fn reads_verack_message() {
        let bytes: Vec<u8> = vec![
            0xF9, 0xBE, 0xB4, 0xD9, //
            b'v', b'e', b'r', b'a', b'c', b'k', 0, 0, 0, 0, 0, 0, //
            0, 0, 0, 0, //
            0x5D, 0xF6, 0xE0, 0xE2,
        ];
        let mut reader = bytes.as_slice();
        let message = Message::read_from(&mut reader).await.expect("read");
        assert_eq!(message, Message::verack());
    }

    #[tokio::test]
    async fn rejects_invalid_magic() {
        let bytes: Vec<u8> = vec![
            0x12, 0x23, 0x56, 0x78, //
            b'v', b'e', b'r', b'a', b'c', b'k', 0, 0, 0, 0, 0, 0, //
            0, 0, 0, 0, //
            0x5D, 0xF6, 0xE0, 0xE2,
        ];
        let mut reader = bytes.as_slice();
        let err = Message::read_from(&mut reader).await.unwrap_err();
        assert!(matches!(err, NetworkError::InvalidHeader));
    }

    #[tokio::test]
    async fn rejects_invalid_checksum() {
        let bytes: Vec<u8> = vec![
            0xF9, 0xBE, 0xB4, 0xD9, //
            b'v', b'e', b'r', b's', b'i', b'o', b'n', 0, 0, 0, 0, 0, //
            5, 0, 0, 0, //
            0x5D, 0xF6, 0xE0, 0xE2, //
            0xBA, 0xDC, 0x0F, 0xFE, 0xE0,
        ];
        let mut reader = bytes.as_slice();
        let err = Message::read_from(&mut reader).await.unwrap_err();
        assert!(matches!(err, NetworkError::InvalidChecksum));
    }

    #[tokio::test]
    async fn short_payload_is_unexpected_eof() {
        let bytes: Vec<u8> = vec![
            0xF9, 0xBE, 0xB4, 0xD9, //
            b'v', b'e', b'r', b's', b'i', b'o', b'n', 0, 0, 0, 0, 0, //
            0x42, 0, 0, 0, //
            0x27, 0x42, 0x89, 0x52, //
            0xBA, 0xDC, 0x0F, 0xFE, 0xE0, 0xDE, 0xCA, 0xF0,
        ];
        let mut reader = bytes.as_slice();
        let err = Message::read_from(&mut reader).await.unwrap_err();
        match err {
            NetworkError::Io(err) => assert_eq!(err.kind(), ErrorKind::UnexpectedEof),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn envelope_round_trip() {
        let payload = vec![0x01, 0x02, 0x03, 0xFF];
        let message = Message::new(Command::INV, payload.clone());
        let encoded = message.encode();
        assert_eq!(encoded.len(), HEADER_SIZE + payload.len());
        assert_eq!(&encoded[..4], &MAGIC);

        let mut reader = encoded.as_slice();
        let decoded = Message::read_from(&mut reader).await.expect("read");
        assert_eq!(decoded.command(), Command::INV);
        assert_eq!(decoded.payload, payload);
    }

    #[test]
    fn empty_payload_checksum() {
        assert_eq!(checksum(&[]), [0x5D, 0xF6, 0xE0, 0xE2]);
        assert_eq!(Message::verack().header.checksum, [0x5D, 0xF6, 0xE0, 0xE2]);
    }

    #[test]
    fn unknown_commands_pass_through() {
        let bytes = Message::new(Command(*b"sendcmpct\0\0\0"), vec![]).encode();
        let header: [u8; HEADER_SIZE] = bytes[..HEADER_SIZE].try_into().expect("header");
        let decoded = MessageHeader::decode(&header).expect("decode");
        assert_eq!(decoded.command.as_str(), "sendcmpct");
    }
}
