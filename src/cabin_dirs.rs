//! Application directory paths for cabin.
//!
//! | Purpose | Linux | Override |
//! |---------|-------|----------|
//! | Config | `~/.config/cabin/` | `CABIN_CONFIG_DIR` |
//! | Data | `~/.local/share/cabin/` | `CABIN_DATA_DIR` |

use std::path::PathBuf;

/// Application data root directory (wake word references live here).
#[must_use]
pub fn data_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("CABIN_DATA_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::data_dir()
        .map(|d| d.join("cabin"))
        .unwrap_or_else(|| PathBuf::from("/tmp/cabin-data"))
}

/// Application config directory.
#[must_use]
pub fn config_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("CABIN_CONFIG_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::config_dir()
        .map(|d| d.join("cabin"))
        .unwrap_or_else(|| PathBuf::from("/tmp/cabin-config"))
}

/// Main config file path (`config_dir()/config.toml`).
#[must_use]
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}

/// Wake word reference recordings (`data_dir()/wakeword/`).
#[must_use]
pub fn wakeword_dir() -> PathBuf {
    data_dir().join("wakeword")
}
