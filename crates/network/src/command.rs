use std::fmt;

pub const COMMAND_SIZE: usize = 12;

/// A message command: 12 ASCII bytes padded with zeroes.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct Command(pub [u8; COMMAND_SIZE]);

impl Command {
    pub const VERSION: Command = Command(*b"version\0\0\0\0\0");
    pub const VERACK: Command = Command(*b"verack\0\0\0\0\0\0");
    pub const PING: Command = Command(*b"ping\0\0\0\0\0\0\0\0");
    pub const PONG: Command = Command(*b"pong\0\0\0\0\0\0\0\0");
    pub const GETADDR: Command = Command(*b"getaddr\0\0\0\0\0");
    pub const ADDR: Command = Command(*b"addr\0\0\0\0\0\0\0\0");
    pub const INV: Command = Command(*b"inv\0\0\0\0\0\0\0\0\0");
    pub const GETDATA: Command = Command(*b"getdata\0\0\0\0\0");
    pub const BLOCK: Command = Command(*b"block\0\0\0\0\0\0\0");

    pub fn as_str(&self) -> &str {
        let end = self.0.iter().position(|byte| *byte == 0).unwrap_or(COMMAND_SIZE);
        std::str::from_utf8(&self.0[..end]).unwrap_or("<invalid>")
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
