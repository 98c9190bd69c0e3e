//! Server discovery
//!
//! The probe is a bare 8-byte `Discover` request header broadcast over UDP;
//! servers answer with their name and TCP port. Best effort: whoever answers
//! within the timeout is reported.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::UdpSocket;

use traintastic_core::{
    Command, FrameHeader, Message, RequestId, DEFAULT_PORT, DISCOVERY_TTL, HEADER_SIZE,
};

use crate::error::{ClientError, Result};

/// One discovered server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInfo {
    pub name: String,
    pub addr: SocketAddr,
}

fn probe_frame() -> Vec<u8> {
    Message::new_request(Command::Discover, RequestId::new(1)).to_bytes()
}

fn parse_reply(bytes: &[u8], peer: SocketAddr) -> Result<ServerInfo> {
    let message = Message::from_bytes(bytes)?;
    if message.command() != Command::Discover || !message.is_response() || message.is_error() {
        return Err(ClientError::Protocol("not a discovery reply"));
    }
    let mut reader = message.reader();
    let name = reader.read_string()?;
    let tcp_port = reader.read_u16()?;
    Ok(ServerInfo {
        name,
        addr: SocketAddr::new(peer.ip(), tcp_port),
    })
}

/// Broadcast a probe and collect every reply within `timeout`.
pub async fn discover(timeout: Duration) -> Result<Vec<ServerInfo>> {
    let socket = UdpSocket::bind(("0.0.0.0", 0)).await?;
    socket.set_broadcast(true)?;
    socket.set_ttl(DISCOVERY_TTL)?;
    socket
        .send_to(&probe_frame(), ("255.255.255.255", DEFAULT_PORT))
        .await?;

    let mut servers = Vec::new();
    let mut buffer = [0u8; 512];
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let Ok(received) =
            tokio::time::timeout_at(deadline, socket.recv_from(&mut buffer)).await
        else {
            break;
        };
        let (len, peer) = received?;
        if len < HEADER_SIZE || FrameHeader::from_bytes(&buffer[..HEADER_SIZE]).is_err() {
            continue;
        }
        if let Ok(info) = parse_reply(&buffer[..len], peer) {
            if !servers.contains(&info) {
                servers.push(info);
            }
        }
    }
    Ok(servers)
}

/// Probe one known responder address directly.
pub async fn probe(addr: SocketAddr, timeout: Duration) -> Result<ServerInfo> {
    let socket = UdpSocket::bind(("0.0.0.0", 0)).await?;
    socket.set_ttl(DISCOVERY_TTL)?;
    socket.send_to(&probe_frame(), addr).await?;

    let mut buffer = [0u8; 512];
    let (len, peer) = tokio::time::timeout(timeout, socket.recv_from(&mut buffer))
        .await
        .map_err(|_| ClientError::Protocol("discovery timeout"))??;
    parse_reply(&buffer[..len], peer)
}
