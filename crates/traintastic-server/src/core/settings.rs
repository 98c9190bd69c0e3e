//! Server settings
//!
//! Loaded from `settings.json` in the data directory; a missing file yields
//! defaults. The stored password is a SHA-256 digest, hex-encoded in the
//! settings document, never plaintext.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use traintastic_core::DEFAULT_PORT;

// ----------------------------------------------------------------------------
// Settings
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Name announced by the discovery responder.
    pub server_name: String,
    pub tcp_port: u16,
    pub discovery_enabled: bool,
    pub username: String,
    /// Hex-encoded SHA-256 of the password; unset means an empty password.
    pub password_sha256: Option<String>,
    pub world_name: String,
    pub diy_interface: Option<DiyInterfaceSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiyInterfaceSettings {
    pub hostname: String,
    pub simulation: bool,
    pub heartbeat_timeout_ms: u64,
    pub debug_log_rx_tx: bool,
    pub debug_log_heartbeat: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_name: "traintastic".to_owned(),
            tcp_port: DEFAULT_PORT,
            discovery_enabled: true,
            username: "admin".to_owned(),
            password_sha256: None,
            world_name: "New world".to_owned(),
            diy_interface: Some(DiyInterfaceSettings::default()),
        }
    }
}

impl Default for DiyInterfaceSettings {
    fn default() -> Self {
        Self {
            hostname: "localhost".to_owned(),
            simulation: true,
            heartbeat_timeout_ms: 15_000,
            debug_log_rx_tx: false,
            debug_log_heartbeat: false,
        }
    }
}

impl Settings {
    /// Load from `<datadir>/settings.json`; unreadable or absent files fall
    /// back to defaults with a warning.
    pub fn load(datadir: &Path) -> Self {
        let path = datadir.join("settings.json");
        match std::fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str(&text) {
                Ok(settings) => settings,
                Err(err) => {
                    warn!("ignoring invalid {}: {err}", path.display());
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    /// Decoded credential digest; `None` means an empty password matches.
    pub fn password_digest(&self) -> Option<[u8; 32]> {
        let hex_digest = self.password_sha256.as_deref()?;
        let bytes = hex::decode(hex_digest).ok()?;
        bytes.try_into().ok()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.tcp_port, DEFAULT_PORT);
        assert!(settings.password_digest().is_none());
        assert!(settings.diy_interface.unwrap().simulation);
    }

    #[test]
    fn test_password_digest_decodes_hex() {
        let digest = [0xABu8; 32];
        let settings = Settings {
            password_sha256: Some(hex::encode(digest)),
            ..Settings::default()
        };
        assert_eq!(settings.password_digest(), Some(digest));
    }

    #[test]
    fn test_partial_document_fills_defaults() {
        let settings: Settings = serde_json::from_str(r#"{"server_name":"shed"}"#).unwrap();
        assert_eq!(settings.server_name, "shed");
        assert_eq!(settings.tcp_port, DEFAULT_PORT);
    }
}
