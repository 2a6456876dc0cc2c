use std::fmt;
use std::io;

#[derive(Debug)]
pub enum NetworkError {
    InvalidHeader,
    InvalidChecksum,
    UnexpectedMessage,
    InvalidPeerVersion,
    ServicesUnavailable,
    InvalidInvMessage,
    CorruptPayload,
    ConnectionClosed,
    Io(io::Error),
}

impl fmt::Display for NetworkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkError::InvalidHeader => write!(f, "invalid header"),
            NetworkError::InvalidChecksum => write!(f, "invalid checksum"),
            NetworkError::UnexpectedMessage => write!(f, "received unexpected message"),
            NetworkError::InvalidPeerVersion => write!(f, "invalid peer version"),
            NetworkError::ServicesUnavailable => write!(f, "requested services unavailable"),
            NetworkError::InvalidInvMessage => write!(f, "invalid inv message"),
            NetworkError::CorruptPayload => write!(f, "corrupt payload"),
            NetworkError::ConnectionClosed => write!(f, "connection closed"),
            NetworkError::Io(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for NetworkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            NetworkError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for NetworkError {
    fn from(err: io::Error) -> Self {
        NetworkError::Io(err)
    }
}
