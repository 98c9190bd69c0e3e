//! Traintastic client library
//!
//! Connects to a Traintastic server, mirrors leased objects and table models
//! on the client side, and keeps them current from the server's change
//! events. UIs subscribe to mirrors through token-based signals; nothing in
//! this crate renders anything.
//!
//! ```rust,no_run
//! use traintastic_client::Client;
//!
//! # async fn example() -> Result<(), traintastic_client::ClientError> {
//! let addr = "127.0.0.1:5740".parse().unwrap();
//! let client = Client::connect(addr, "admin", "").await?;
//!
//! let clock = client.get_object("world.clock").await?;
//! println!("hour = {:?}", clock.value("hour"));
//!
//! let trains = client.get_table_model("trains").await?;
//! trains.set_region(0, 1, 0, trains.row_count().saturating_sub(1));
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod discovery;
pub mod error;
pub mod object;
pub mod table_model;

pub use client::{Client, ObjectRequest, PendingRequest, TableModelRequest};
pub use discovery::{discover, probe, ServerInfo};
pub use error::{ClientError, Result};
pub use object::{MirrorItem, MirrorProperty, ObjectMirror, SignalToken};
pub use table_model::{CellRegion, TableModelMirror};
