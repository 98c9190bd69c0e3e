//! Table model mirrors
//!
//! A windowed projection of a server-side list. The mirror asks for a region
//! matching the visible viewport and keeps only cells inside it; scrolling
//! requests a new region and discards the rest.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc::UnboundedSender;

use traintastic_core::{Command, Handle, Message};

use crate::object::SignalToken;

/// Inclusive cell region subscribed by this mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellRegion {
    pub column_min: u32,
    pub column_max: u32,
    pub row_min: u32,
    pub row_max: u32,
}

impl CellRegion {
    fn contains(&self, column: u32, row: u32) -> bool {
        (self.column_min..=self.column_max).contains(&column)
            && (self.row_min..=self.row_max).contains(&row)
    }
}

// ----------------------------------------------------------------------------
// Mirror
// ----------------------------------------------------------------------------

struct TableState {
    column_headers: Vec<String>,
    row_count: u32,
    region: Option<CellRegion>,
    cells: HashMap<(u32, u32), String>,
}

#[derive(Default)]
struct Handlers {
    next_token: u64,
    updated: Vec<(SignalToken, Box<dyn Fn() + Send>)>,
}

struct TableModelInner {
    handle: Mutex<Handle>,
    class_id: String,
    state: Mutex<TableState>,
    handlers: Mutex<Handlers>,
    tx: UnboundedSender<Vec<u8>>,
}

/// Client-side shadow of one leased table model.
#[derive(Clone)]
pub struct TableModelMirror {
    inner: Arc<TableModelInner>,
}

impl TableModelMirror {
    pub(crate) fn new(
        handle: Handle,
        class_id: String,
        column_headers: Vec<String>,
        row_count: u32,
        tx: UnboundedSender<Vec<u8>>,
    ) -> Self {
        Self {
            inner: Arc::new(TableModelInner {
                handle: Mutex::new(handle),
                class_id,
                state: Mutex::new(TableState {
                    column_headers,
                    row_count,
                    region: None,
                    cells: HashMap::new(),
                }),
                handlers: Mutex::new(Handlers::default()),
                tx,
            }),
        }
    }

    pub fn handle(&self) -> Handle {
        *self.inner.handle.lock().unwrap()
    }

    pub(crate) fn invalidate(&self) {
        *self.inner.handle.lock().unwrap() = Handle::INVALID;
    }

    pub fn class_id(&self) -> &str {
        &self.inner.class_id
    }

    pub fn column_headers(&self) -> Vec<String> {
        self.inner.state.lock().unwrap().column_headers.clone()
    }

    pub fn row_count(&self) -> u32 {
        self.inner.state.lock().unwrap().row_count
    }

    pub fn region(&self) -> Option<CellRegion> {
        self.inner.state.lock().unwrap().region
    }

    /// Cell text, if the cell is inside the subscribed region and received.
    pub fn text(&self, column: u32, row: u32) -> Option<String> {
        self.inner
            .state
            .lock()
            .unwrap()
            .cells
            .get(&(column, row))
            .cloned()
    }

    /// Subscribe to a new region (the visible viewport); cells outside it
    /// are discarded immediately.
    pub fn set_region(&self, column_min: u32, column_max: u32, row_min: u32, row_max: u32) {
        let handle = self.handle();
        if !handle.is_valid() {
            return;
        }
        let region = CellRegion {
            column_min,
            column_max,
            row_min,
            row_max,
        };
        {
            let mut state = self.inner.state.lock().unwrap();
            state.region = Some(region);
            state.cells.retain(|&(c, r), _| region.contains(c, r));
        }
        let mut event = Message::new_event(Command::TableModelSetRegion);
        event.write_u32(handle.value());
        event.write_u32(column_min);
        event.write_u32(column_max);
        event.write_u32(row_min);
        event.write_u32(row_max);
        let _ = self.inner.tx.send(event.to_bytes());
    }

    /// Connect a handler fired after any server push touched this model.
    pub fn on_updated(&self, handler: impl Fn() + Send + 'static) -> SignalToken {
        let mut handlers = self.inner.handlers.lock().unwrap();
        handlers.next_token += 1;
        let token = SignalToken(handlers.next_token);
        handlers.updated.push((token, Box::new(handler)));
        token
    }

    pub fn disconnect(&self, token: SignalToken) {
        let mut handlers = self.inner.handlers.lock().unwrap();
        handlers.updated.retain(|(t, _)| *t != token);
    }

    fn notify_updated(&self) {
        let handlers = self.inner.handlers.lock().unwrap();
        for (_, handler) in &handlers.updated {
            handler();
        }
    }

    // ------------------------------------------------------------------
    // Event application (called by the connection task)
    // ------------------------------------------------------------------

    pub(crate) fn apply_column_headers(&self, headers: Vec<String>) {
        self.inner.state.lock().unwrap().column_headers = headers;
        self.notify_updated();
    }

    pub(crate) fn apply_row_count(&self, row_count: u32) {
        {
            let mut state = self.inner.state.lock().unwrap();
            state.row_count = row_count;
            state.cells.retain(|&(_, row), _| row < row_count);
        }
        self.notify_updated();
    }

    pub(crate) fn apply_region_update(&self, cells: Vec<((u32, u32), String)>) {
        {
            let mut state = self.inner.state.lock().unwrap();
            let region = state.region;
            for ((column, row), text) in cells {
                // Only cells inside the subscribed window are maintained.
                let keep = match region {
                    Some(region) => region.contains(column, row),
                    None => true,
                };
                if keep {
                    state.cells.insert((column, row), text);
                }
            }
        }
        self.notify_updated();
    }
}
