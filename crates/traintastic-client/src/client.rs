//! Client connection
//!
//! Owns the TCP connection to a server: the login/new-session handshake, the
//! request-id callback table, and the dispatch of server events onto the
//! mirror objects. One tokio task reads frames, one writes them; the public
//! API is plain async calls.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use sha2::{Digest, Sha256};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;
use tracing::{debug, warn};
use uuid::Uuid;

use traintastic_core::{
    AttributeName, Command, FrameHeader, Handle, Message, PropertyType, RequestId, Value,
    HEADER_SIZE,
};

use crate::error::{ClientError, Result};
use crate::object::{read_object, ObjectMirror};
use crate::table_model::TableModelMirror;

// ----------------------------------------------------------------------------
// Shared State
// ----------------------------------------------------------------------------

#[derive(Default)]
struct Shared {
    next_request_id: RequestId,
    callbacks: HashMap<RequestId, oneshot::Sender<Message>>,
    objects: HashMap<Handle, ObjectMirror>,
    tables: HashMap<Handle, TableModelMirror>,
}

// ----------------------------------------------------------------------------
// Client
// ----------------------------------------------------------------------------

/// A connected, logged-in session.
pub struct Client {
    tx: UnboundedSender<Vec<u8>>,
    shared: Arc<Mutex<Shared>>,
    session_uuid: Uuid,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("session_uuid", &self.session_uuid)
            .finish()
    }
}

impl Client {
    /// Connect, log in and open a session.
    ///
    /// An empty password travels as zero bytes; anything else as its SHA-256
    /// digest.
    pub async fn connect(addr: SocketAddr, username: &str, password: &str) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        let (read_half, write_half) = stream.into_split();

        let (tx, rx) = unbounded_channel();
        let shared = Arc::new(Mutex::new(Shared::default()));

        tokio::spawn(write_loop(write_half, rx));
        tokio::spawn(read_loop(read_half, shared.clone()));

        let client = ClientCore {
            tx: tx.clone(),
            shared: shared.clone(),
        };

        let mut login = Message::new_request(Command::Login, RequestId::NONE);
        login.write_string(username);
        if password.is_empty() {
            login.write_bytes(&[]);
        } else {
            let digest = Sha256::digest(password.as_bytes());
            login.write_bytes(&digest);
        }
        client.request(login).response().await?;

        let new_session = Message::new_request(Command::NewSession, RequestId::NONE);
        let response = client.request(new_session).response().await?;
        let session_uuid = response.reader().read_uuid()?;

        Ok(Self {
            tx,
            shared,
            session_uuid,
        })
    }

    pub fn session_uuid(&self) -> Uuid {
        self.session_uuid
    }

    fn core(&self) -> ClientCore {
        ClientCore {
            tx: self.tx.clone(),
            shared: self.shared.clone(),
        }
    }

    // ------------------------------------------------------------------
    // Requests
    // ------------------------------------------------------------------

    /// Start a `GetObject` request; cancellable through its request id.
    pub fn request_object(&self, object_id: &str) -> ObjectRequest {
        let mut request = Message::new_request(Command::GetObject, RequestId::NONE);
        request.write_string(object_id);
        ObjectRequest {
            pending: self.core().request(request),
            client: self.core(),
        }
    }

    /// Lease an object and build its mirror.
    pub async fn get_object(&self, object_id: &str) -> Result<ObjectMirror> {
        self.request_object(object_id).finish().await
    }

    /// Start a `GetTableModel` request; cancellable through its request id.
    pub fn request_table_model(&self, object_id: &str) -> TableModelRequest {
        let mut request = Message::new_request(Command::GetTableModel, RequestId::NONE);
        request.write_string(object_id);
        TableModelRequest {
            pending: self.core().request(request),
            client: self.core(),
        }
    }

    /// Lease a table model and build its mirror.
    pub async fn get_table_model(&self, object_id: &str) -> Result<TableModelMirror> {
        self.request_table_model(object_id).finish().await
    }

    /// Invoke a zero-argument method on a leased object.
    pub async fn call_method(&self, object: &ObjectMirror, name: &str) -> Result<()> {
        let mut request = Message::new_request(Command::ObjectCallMethod, RequestId::NONE);
        request.write_u32(object.handle().value());
        request.write_string(name);
        self.core().request(request).response().await?;
        Ok(())
    }

    /// Remove the callback of an outstanding request. The server side is not
    /// cancelled; its response will be ignored.
    pub fn cancel_request(&self, request_id: RequestId) {
        self.shared.lock().unwrap().callbacks.remove(&request_id);
    }

    // ------------------------------------------------------------------
    // Releases
    // ------------------------------------------------------------------

    /// Revoke the object's handle; the mirror stops receiving events.
    pub fn release_object(&self, object: &ObjectMirror) {
        let handle = object.handle();
        if !handle.is_valid() {
            return;
        }
        self.shared.lock().unwrap().objects.remove(&handle);
        let mut event = Message::new_event(Command::ReleaseObject);
        event.write_u32(handle.value());
        let _ = self.tx.send(event.to_bytes());
        object.invalidate();
    }

    /// Revoke the table model's handle.
    pub fn release_table_model(&self, table: &TableModelMirror) {
        let handle = table.handle();
        if !handle.is_valid() {
            return;
        }
        self.shared.lock().unwrap().tables.remove(&handle);
        let mut event = Message::new_event(Command::ReleaseTableModel);
        event.write_u32(handle.value());
        let _ = self.tx.send(event.to_bytes());
        table.invalidate();
    }
}

// ----------------------------------------------------------------------------
// Request Plumbing
// ----------------------------------------------------------------------------

#[derive(Clone)]
struct ClientCore {
    tx: UnboundedSender<Vec<u8>>,
    shared: Arc<Mutex<Shared>>,
}

impl ClientCore {
    /// Allocate a request id, register the callback and transmit.
    fn request(&self, mut message: Message) -> PendingRequest {
        let (sender, receiver) = oneshot::channel();
        let request_id = {
            let mut shared = self.shared.lock().unwrap();
            // 16-bit wraparound; zero belongs to events, ids still in flight
            // are skipped.
            let mut id = shared.next_request_id.next();
            while id == RequestId::NONE || shared.callbacks.contains_key(&id) {
                id = id.next();
            }
            shared.next_request_id = id;
            shared.callbacks.insert(id, sender);
            id
        };
        message = message.with_request_id(request_id);
        let _ = self.tx.send(message.to_bytes());
        PendingRequest {
            request_id,
            receiver,
        }
    }
}

/// An in-flight request.
pub struct PendingRequest {
    request_id: RequestId,
    receiver: oneshot::Receiver<Message>,
}

impl PendingRequest {
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Wait for the response; resolves to [`ClientError::Cancelled`] when the
    /// callback was removed or the connection went away.
    pub async fn response(self) -> Result<Message> {
        let message = self
            .receiver
            .await
            .map_err(|_| ClientError::Cancelled)?;
        if message.is_error() {
            Err(ClientError::ErrorResponse(message.error_code()?))
        } else {
            Ok(message)
        }
    }
}

/// In-flight `GetObject`.
pub struct ObjectRequest {
    pending: PendingRequest,
    client: ClientCore,
}

impl ObjectRequest {
    pub fn request_id(&self) -> RequestId {
        self.pending.request_id()
    }

    pub async fn finish(self) -> Result<ObjectMirror> {
        let response = self.pending.response().await?;
        let (handle, mirror) = read_object(&response, self.client.tx.clone())?;
        self.client
            .shared
            .lock()
            .unwrap()
            .objects
            .insert(handle, mirror.clone());
        Ok(mirror)
    }
}

/// In-flight `GetTableModel`.
pub struct TableModelRequest {
    pending: PendingRequest,
    client: ClientCore,
}

impl TableModelRequest {
    pub fn request_id(&self) -> RequestId {
        self.pending.request_id()
    }

    pub async fn finish(self) -> Result<TableModelMirror> {
        let response = self.pending.response().await?;
        let mut reader = response.reader();
        reader.read_block()?;
        let handle = Handle::new(reader.read_u32()?);
        let class_id = reader.read_string()?;
        let column_count = reader.read_u32()?;
        let mut headers = Vec::with_capacity(column_count as usize);
        for _ in 0..column_count {
            headers.push(reader.read_string()?);
        }
        let row_count = reader.read_u32()?;
        reader.read_block_end()?;

        let mirror =
            TableModelMirror::new(handle, class_id, headers, row_count, self.client.tx.clone());
        self.client
            .shared
            .lock()
            .unwrap()
            .tables
            .insert(handle, mirror.clone());
        Ok(mirror)
    }
}

// ----------------------------------------------------------------------------
// Connection Tasks
// ----------------------------------------------------------------------------

async fn write_loop(
    mut socket: tokio::net::tcp::OwnedWriteHalf,
    mut rx: UnboundedReceiver<Vec<u8>>,
) {
    while let Some(bytes) = rx.recv().await {
        if socket.write_all(&bytes).await.is_err() {
            break;
        }
    }
    let _ = socket.shutdown().await;
}

async fn read_loop(mut socket: tokio::net::tcp::OwnedReadHalf, shared: Arc<Mutex<Shared>>) {
    loop {
        let mut header_bytes = [0u8; HEADER_SIZE];
        if socket.read_exact(&mut header_bytes).await.is_err() {
            break;
        }
        let Ok(header) = FrameHeader::from_bytes(&header_bytes) else {
            warn!("malformed frame from server");
            break;
        };
        let mut data = vec![0u8; header.data_size as usize];
        if socket.read_exact(&mut data).await.is_err() {
            break;
        }
        let Ok(message) = Message::from_parts(header, data) else {
            break;
        };
        dispatch(&shared, message);
    }
    // Connection gone: drop all outstanding callbacks without invocation.
    shared.lock().unwrap().callbacks.clear();
}

fn dispatch(shared: &Arc<Mutex<Shared>>, message: Message) {
    if message.is_response() {
        let callback = shared
            .lock()
            .unwrap()
            .callbacks
            .remove(&message.request_id());
        match callback {
            Some(callback) => {
                let _ = callback.send(message);
            }
            None => debug!(
                request = %message.request_id(),
                "response without callback (cancelled?)"
            ),
        }
    } else if message.is_event() {
        if let Err(err) = dispatch_event(shared, &message) {
            debug!("event dropped: {err}");
        }
    } else {
        debug!("unexpected request from server");
    }
}

fn dispatch_event(
    shared: &Arc<Mutex<Shared>>,
    message: &Message,
) -> traintastic_core::Result<()> {
    let mut reader = message.reader();
    match message.command() {
        Command::ObjectPropertyChanged => {
            let handle = Handle::new(reader.read_u32()?);
            let name = reader.read_string()?;
            let property_type = PropertyType::from_u8(reader.read_u8()?)?;
            let value = Value::read_from(&mut reader, property_type)?;
            let mirror = shared.lock().unwrap().objects.get(&handle).cloned();
            if let Some(mirror) = mirror {
                mirror.apply_value_changed(&name, value);
            }
        }
        Command::ObjectAttributeChanged => {
            let handle = Handle::new(reader.read_u32()?);
            let name = reader.read_string()?;
            let attribute = AttributeName::from_u8(reader.read_u8()?)?;
            let value_type = PropertyType::from_u8(reader.read_u8()?)?;
            let value = Value::read_from(&mut reader, value_type)?;
            let mirror = shared.lock().unwrap().objects.get(&handle).cloned();
            if let Some(mirror) = mirror {
                mirror.apply_attribute_changed(&name, attribute, value);
            }
        }
        Command::TableModelColumnHeadersChanged => {
            let handle = Handle::new(reader.read_u32()?);
            let count = reader.read_u32()?;
            let mut headers = Vec::with_capacity(count as usize);
            for _ in 0..count {
                headers.push(reader.read_string()?);
            }
            let mirror = shared.lock().unwrap().tables.get(&handle).cloned();
            if let Some(mirror) = mirror {
                mirror.apply_column_headers(headers);
            }
        }
        Command::TableModelRowCountChanged => {
            let handle = Handle::new(reader.read_u32()?);
            let row_count = reader.read_u32()?;
            let mirror = shared.lock().unwrap().tables.get(&handle).cloned();
            if let Some(mirror) = mirror {
                mirror.apply_row_count(row_count);
            }
        }
        Command::TableModelUpdateRegion => {
            let handle = Handle::new(reader.read_u32()?);
            let column_min = reader.read_u32()?;
            let column_max = reader.read_u32()?;
            let row_min = reader.read_u32()?;
            let row_max = reader.read_u32()?;
            let mut cells = Vec::new();
            for row in row_min..=row_max {
                for column in column_min..=column_max {
                    cells.push(((column, row), reader.read_string()?));
                }
            }
            let mirror = shared.lock().unwrap().tables.get(&handle).cloned();
            if let Some(mirror) = mirror {
                mirror.apply_region_update(cells);
            }
        }
        _ => debug!(command = ?message.command(), "unhandled event"),
    }
    Ok(())
}
