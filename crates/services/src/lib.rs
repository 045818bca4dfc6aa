pub mod credentials;
pub mod export;
pub mod knowledge;
pub mod markdown;

use std::path::PathBuf;

/// Platform config directory for persisted state.
pub fn default_store_dir() -> PathBuf {
    directories::ProjectDirs::from("com.local", "Inkwell Studio", "InkwellStudio")
        .map(|p| p.config_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("./inkwell-studio"))
}
