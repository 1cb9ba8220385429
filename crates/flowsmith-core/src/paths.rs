//! Centralized path utilities
//!
//! All application paths in one place for consistency

use std::path::PathBuf;

use crate::constants::app;

/// Get the flowsmith config directory (~/.flowsmith)
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(app::CONFIG_DIR_NAME)
}

/// Get the default settings file (~/.flowsmith/config.toml)
pub fn config_file() -> PathBuf {
    config_dir().join(app::CONFIG_FILE_NAME)
}

/// Get the default catalog database (~/.flowsmith/catalog.db)
pub fn default_catalog_db() -> PathBuf {
    config_dir().join(app::CATALOG_DB_NAME)
}
