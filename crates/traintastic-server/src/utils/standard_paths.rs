//! Standard path lookup
//!
//! Platform defaults for the data directory and the locale directory, with
//! the usual environment overrides.

use std::path::PathBuf;

/// Environment variable overriding the locale directory.
pub const LOCALE_PATH_ENV: &str = "TRAINTASTIC_LOCALE_PATH";

/// Default data directory: `$XDG_DATA_HOME/traintastic` or
/// `~/.local/share/traintastic` on unix, `%APPDATA%\traintastic` on windows.
pub fn default_data_dir() -> PathBuf {
    #[cfg(windows)]
    {
        if let Some(appdata) = std::env::var_os("APPDATA") {
            return PathBuf::from(appdata).join("traintastic");
        }
    }
    if let Some(xdg) = std::env::var_os("XDG_DATA_HOME") {
        return PathBuf::from(xdg).join("traintastic");
    }
    if let Some(home) = std::env::var_os("HOME") {
        return PathBuf::from(home)
            .join(".local")
            .join("share")
            .join("traintastic");
    }
    PathBuf::from(".").join("traintastic")
}

/// Locale directory: `TRAINTASTIC_LOCALE_PATH` when set, otherwise the
/// `translations` directory next to the data directory.
pub fn locale_dir(datadir: &std::path::Path) -> PathBuf {
    match std::env::var_os(LOCALE_PATH_ENV) {
        Some(path) => PathBuf::from(path),
        None => datadir.join("translations"),
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locale_dir_defaults_under_datadir() {
        // Only checks the fallback shape; the env override is process-global
        // and not toggled from tests.
        if std::env::var_os(LOCALE_PATH_ENV).is_none() {
            let dir = locale_dir(std::path::Path::new("/data"));
            assert!(dir.ends_with("translations"));
        }
    }
}
