//! Kernel configuration snapshot
//!
//! The kernel reads a consistent config between messages: replacements are
//! posted onto the kernel loop and swapped in whole.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct DiyConfig {
    /// Idle time after which the kernel transmits a heartbeat. Any received
    /// frame counts as liveness and rearms the timer.
    pub heartbeat_timeout: Duration,
    /// Log every transmitted and received message.
    pub debug_log_rx_tx: bool,
    /// Also log heartbeats when RX/TX logging is on.
    pub debug_log_heartbeat: bool,
}

impl Default for DiyConfig {
    fn default() -> Self {
        Self {
            heartbeat_timeout: Duration::from_secs(15),
            debug_log_rx_tx: false,
            debug_log_heartbeat: false,
        }
    }
}
