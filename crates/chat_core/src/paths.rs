use std::path::{Path, PathBuf};

/// Per-user config directory (~/.streamchat)
pub fn streamchat_dir() -> PathBuf {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(std::env::temp_dir)
        .join(".streamchat")
}

/// Path of the per-user config.json
pub fn config_json_path() -> PathBuf {
    streamchat_dir().join("config.json")
}

/// Load a JSON config file.
pub fn load_config_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, String> {
    if !path.exists() {
        return Err(format!("Config file not found: {}", path.display()));
    }
    let content =
        std::fs::read_to_string(path).map_err(|e| format!("Failed to read config: {e}"))?;
    serde_json::from_str(&content).map_err(|e| format!("Failed to parse config: {e}"))
}

/// Load a TOML config file.
pub fn load_config_toml<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, String> {
    if !path.exists() {
        return Err(format!("Config file not found: {}", path.display()));
    }
    let content =
        std::fs::read_to_string(path).map_err(|e| format!("Failed to read config: {e}"))?;
    toml::from_str(&content).map_err(|e| format!("Failed to parse config: {e}"))
}
