//! Traintastic server
//!
//! The server side of the Traintastic model-railway control system: a
//! reflective object tree (the world), per-client sessions over the framed
//! TCP protocol, UDP discovery, and hardware kernels driving command
//! stations on dedicated threads.
//!
//! ## Execution domains
//!
//! - The **main loop** ([`core::event_loop`]) runs on one thread and owns the
//!   world; sessions and kernels reach it only through posted tasks.
//! - **Connection tasks** (tokio) move frames between sockets and the main
//!   loop without touching domain state.
//! - Each **kernel** ([`hardware::protocol`]) runs its protocol on its own
//!   thread behind a pluggable IO handler.
//!
//! [`core::server::ServerRuntime`] assembles all of it; the binary in
//! `main.rs` is a thin CLI wrapper around it.

pub mod cli;
pub mod core;
pub mod hardware;
pub mod utils;
pub mod world;

pub use crate::core::server::{Server, ServerError, ServerRuntime};
pub use crate::core::settings::Settings;
