//! Connection plumbing
//!
//! Tokio tasks that move frames between sockets and the main loop: the TCP
//! acceptor, the per-client reader/writer pair, and the UDP discovery
//! responder. No domain state lives here; everything is posted onto the
//! main loop as soon as a frame is complete.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use tracing::{debug, warn};

use traintastic_core::{
    Command, FrameHeader, Message, HEADER_SIZE,
};

use crate::core::event_loop::EventLoopHandle;
use crate::core::server::Server;
use crate::core::session::SessionId;

/// Frame bytes or a close request, queued towards one client.
#[derive(Debug)]
pub enum Outgoing {
    Frame(Vec<u8>),
    Close,
}

// ----------------------------------------------------------------------------
// Acceptor
// ----------------------------------------------------------------------------

/// Accept clients until the listener is dropped.
pub async fn run_acceptor(listener: TcpListener, events: EventLoopHandle<Server>) {
    let mut next_id: SessionId = 0;
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                next_id += 1;
                debug!(client = next_id, %peer, "client connected");
                spawn_client(stream, next_id, events.clone());
            }
            Err(err) => {
                warn!("accept failed: {err}");
                return;
            }
        }
    }
}

fn spawn_client(stream: TcpStream, id: SessionId, events: EventLoopHandle<Server>) {
    if let Err(err) = stream.set_nodelay(true) {
        debug!(client = id, "set_nodelay failed: {err}");
    }
    let (read_half, write_half) = stream.into_split();
    let (tx, rx) = unbounded_channel();

    events.post(move |server| server.client_connected(id, tx));

    tokio::spawn(write_loop(write_half, rx, id));
    tokio::spawn(read_loop(read_half, events, id));
}

// ----------------------------------------------------------------------------
// Reader / Writer
// ----------------------------------------------------------------------------

async fn write_loop(mut socket: OwnedWriteHalf, mut rx: UnboundedReceiver<Outgoing>, id: SessionId) {
    while let Some(outgoing) = rx.recv().await {
        match outgoing {
            Outgoing::Frame(bytes) => {
                if socket.write_all(&bytes).await.is_err() {
                    break;
                }
            }
            Outgoing::Close => break,
        }
    }
    let _ = socket.shutdown().await;
    debug!(client = id, "writer stopped");
}

async fn read_loop(mut socket: OwnedReadHalf, events: EventLoopHandle<Server>, id: SessionId) {
    loop {
        let mut header_bytes = [0u8; HEADER_SIZE];
        if socket.read_exact(&mut header_bytes).await.is_err() {
            break;
        }
        let header = match FrameHeader::from_bytes(&header_bytes) {
            Ok(header) => header,
            Err(err) => {
                warn!(client = id, "malformed frame header: {err}");
                events.post(move |server| server.client_protocol_error(id));
                return;
            }
        };
        let mut data = vec![0u8; header.data_size as usize];
        if socket.read_exact(&mut data).await.is_err() {
            break;
        }
        match Message::from_parts(header, data) {
            Ok(message) => {
                events.post(move |server| server.process_message(id, message));
            }
            Err(err) => {
                warn!(client = id, "malformed frame: {err}");
                events.post(move |server| server.client_protocol_error(id));
                return;
            }
        }
    }
    events.post(move |server| server.client_gone(id));
}

// ----------------------------------------------------------------------------
// Discovery Responder
// ----------------------------------------------------------------------------

/// Answer discovery probes: an 8-byte `Discover` request header yields a
/// response carrying the server name and TCP port. Best effort, no
/// retransmission.
pub async fn run_discovery(socket: UdpSocket, server_name: String, tcp_port: u16) {
    let mut buffer = [0u8; 64];
    loop {
        let Ok((received, peer)) = socket.recv_from(&mut buffer).await else {
            return;
        };
        if received != HEADER_SIZE {
            continue;
        }
        let Ok(header) = FrameHeader::from_bytes(&buffer[..HEADER_SIZE]) else {
            continue;
        };
        if header.command != Command::Discover || !header.flags.is_request() || header.data_size != 0
        {
            continue;
        }
        let mut reply = Message::new_response(Command::Discover, header.request_id);
        reply.write_string(&server_name);
        reply.write_u16(tcp_port);
        if let Err(err) = socket.send_to(&reply.to_bytes(), peer).await {
            debug!("discovery reply to {peer} failed: {err}");
        }
    }
}
