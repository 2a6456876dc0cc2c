use std::net::IpAddr;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::command::Command;
use crate::error::NetworkError;
use crate::message::Message;
use crate::services::Services;
use crate::version::build_version_payload;

/// Runs the initiator side of the version/verack exchange and returns the
/// peer's `version` message. The exchange is strict: the peer must answer
/// with exactly one `version` followed by a `verack`.
pub async fn handshake<S>(
    stream: &mut S,
    peer_ip: IpAddr,
    peer_port: u16,
    requested_services: Services,
) -> Result<Message, NetworkError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let payload = build_version_payload(
        Services::NONE,
        peer_ip,
        peer_port,
        requested_services,
        0,
        false,
    );
    Message::new(Command::VERSION, payload)
        .write_to(stream)
        .await?;

    let peer_version = Message::read_from(stream).await?;
    if peer_version.command() != Command::VERSION {
        return Err(NetworkError::UnexpectedMessage);
    }

    let ack = Message::read_from(stream).await?;
    if ack != Message::verack() {
        return Err(NetworkError::UnexpectedMessage);
    }

    Message::verack().write_to(stream).await?;
    Ok(peer_version)
}
