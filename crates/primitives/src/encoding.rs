//! Byte-level consensus serialization helpers.

use std::fmt;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DecodeError {
    UnexpectedEof,
    TrailingBytes,
    InvalidString,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::UnexpectedEof => write!(f, "unexpected end of input"),
            DecodeError::TrailingBytes => write!(f, "trailing bytes after decode"),
            DecodeError::InvalidString => write!(f, "invalid utf-8 string"),
        }
    }
}

impl std::error::Error for DecodeError {}

/// A CompactSize integer together with the length of its canonical encoding.
///
/// Values below 0xFD occupy one byte; larger values carry a tag byte
/// (0xFD/0xFE/0xFF) followed by 2, 4 or 8 little-endian bytes.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct VarInt {
    pub value: u64,
    pub size: usize,
}

impl VarInt {
    pub fn new(value: u64) -> Self {
        Self {
            value,
            size: varint_size(value),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut encoder = Encoder::new();
        encoder.write_varint(self.value);
        encoder.into_inner()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut decoder = Decoder::new(bytes);
        let varint = decoder.read_varint_full()?;
        Ok(varint)
    }
}

pub fn varint_size(value: u64) -> usize {
    if value < 0xFD {
        1
    } else if value <= 0xFFFF {
        3
    } else if value <= 0xFFFF_FFFF {
        5
    } else {
        9
    }
}

#[derive(Debug, Default)]
pub struct Encoder {
    buf: Vec<u8>,
}

impl Encoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn write_u32_le(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_i32_le(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_u64_le(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_i64_le(&mut self, value: i64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn write_varint(&mut self, value: u64) {
        if value < 0xFD {
            self.buf.push(value as u8);
        } else if value <= 0xFFFF {
            self.buf.push(0xFD);
            self.buf.extend_from_slice(&(value as u16).to_le_bytes());
        } else if value <= 0xFFFF_FFFF {
            self.buf.push(0xFE);
            self.buf.extend_from_slice(&(value as u32).to_le_bytes());
        } else {
            self.buf.push(0xFF);
            self.buf.extend_from_slice(&value.to_le_bytes());
        }
    }

    pub fn write_var_bytes(&mut self, bytes: &[u8]) {
        self.write_varint(bytes.len() as u64);
        self.write_bytes(bytes);
    }

    pub fn write_var_str(&mut self, value: &str) {
        self.write_var_bytes(value.as_bytes());
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

#[derive(Debug)]
pub struct Decoder<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        if self.remaining() < len {
            return Err(DecodeError::UnexpectedEof);
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u32_le(&mut self) -> Result<u32, DecodeError> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn read_i32_le(&mut self) -> Result<i32, DecodeError> {
        Ok(self.read_u32_le()? as i32)
    }

    pub fn read_u64_le(&mut self) -> Result<u64, DecodeError> {
        let bytes = self.take(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(bytes);
        Ok(u64::from_le_bytes(raw))
    }

    pub fn read_i64_le(&mut self) -> Result<i64, DecodeError> {
        Ok(self.read_u64_le()? as i64)
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        self.take(len)
    }

    pub fn read_fixed<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let bytes = self.take(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    pub fn read_varint(&mut self) -> Result<u64, DecodeError> {
        Ok(self.read_varint_full()?.value)
    }

    pub fn read_varint_full(&mut self) -> Result<VarInt, DecodeError> {
        let tag = self.read_u8()?;
        let varint = match tag {
            0xFD => VarInt {
                value: u64::from(u16::from_le_bytes(self.read_fixed::<2>()?)),
                size: 3,
            },
            0xFE => VarInt {
                value: u64::from(u32::from_le_bytes(self.read_fixed::<4>()?)),
                size: 5,
            },
            0xFF => VarInt {
                value: u64::from_le_bytes(self.read_fixed::<8>()?),
                size: 9,
            },
            value => VarInt {
                value: u64::from(value),
                size: 1,
            },
        };
        Ok(varint)
    }

    pub fn read_var_bytes(&mut self) -> Result<Vec<u8>, DecodeError> {
        let len = self.read_varint()?;
        let len = usize::try_from(len).map_err(|_| DecodeError::UnexpectedEof)?;
        Ok(self.take(len)?.to_vec())
    }

    pub fn read_var_str(&mut self) -> Result<String, DecodeError> {
        let bytes = self.read_var_bytes()?;
        String::from_utf8(bytes).map_err(|_| DecodeError::InvalidString)
    }

    pub fn peek_u8(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    pub fn peek_at(&self, offset: usize) -> Option<u8> {
        self.data.get(self.pos + offset).copied()
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn varint_size_bands() {
        let cases: [(u64, usize); 7] = [
            (0x00, 1),
            (0xFC, 1),
            (0xFD, 3),
            (0xFFFF, 3),
            (0x10000, 5),
            (0xFFFF_FFFF, 5),
            (0x1_0000_0000, 9),
        ];
        for (value, size) in cases {
            let varint = VarInt::new(value);
            assert_eq!(varint.size, size, "size band for {value:#x}");
            let encoded = varint.encode();
            assert_eq!(encoded.len(), size, "encoded length for {value:#x}");
            let decoded = VarInt::decode(&encoded).expect("round trip");
            assert_eq!(decoded.value, value);
            assert_eq!(decoded.size, size);
        }
    }

    #[test]
    fn varint_short_buffers_fail() {
        assert_eq!(VarInt::decode(&[]), Err(DecodeError::UnexpectedEof));
        assert_eq!(VarInt::decode(&[0xFD, 0x01]), Err(DecodeError::UnexpectedEof));
        assert_eq!(
            VarInt::decode(&[0xFE, 0x01, 0x02, 0x03]),
            Err(DecodeError::UnexpectedEof)
        );
        assert_eq!(VarInt::decode(&[0xFF; 8]), Err(DecodeError::UnexpectedEof));
    }

    #[test]
    fn varint_multibyte_is_little_endian() {
        let encoded = VarInt::new(0x1234).encode();
        assert_eq!(encoded, vec![0xFD, 0x34, 0x12]);
    }

    #[test]
    fn var_bytes_round_trip() {
        let mut encoder = Encoder::new();
        encoder.write_var_bytes(b"abc");
        let bytes = encoder.into_inner();
        assert_eq!(bytes, vec![3, b'a', b'b', b'c']);

        let mut decoder = Decoder::new(&bytes);
        assert_eq!(decoder.read_var_bytes().expect("var bytes"), b"abc");
        assert!(decoder.is_empty());
    }

    #[test]
    fn var_str_round_trip() {
        let mut encoder = Encoder::new();
        encoder.write_var_str("/Santitham:0.0.1/");
        let bytes = encoder.into_inner();

        let mut decoder = Decoder::new(&bytes);
        assert_eq!(decoder.read_var_str().expect("var str"), "/Santitham:0.0.1/");

        let mut decoder = Decoder::new(&[2, 0xFF, 0xFE]);
        assert_eq!(decoder.read_var_str(), Err(DecodeError::InvalidString));
    }

    #[test]
    fn decoder_tracks_position() {
        let bytes = [0x01, 0x00, 0x00, 0x00, 0xAA];
        let mut decoder = Decoder::new(&bytes);
        assert_eq!(decoder.read_u32_le().expect("u32"), 1);
        assert_eq!(decoder.remaining(), 1);
        assert_eq!(decoder.peek_u8(), Some(0xAA));
        assert_eq!(decoder.read_u8().expect("u8"), 0xAA);
        assert!(decoder.is_empty());
        assert_eq!(decoder.read_u8(), Err(DecodeError::UnexpectedEof));
    }
}
