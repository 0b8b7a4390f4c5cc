use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::paths::{config_json_path, load_config_json, load_config_toml};

pub const DEFAULT_API_BASE: &str = "http://localhost:8080/api";

const CONFIG_FILE_PATH: &str = "config.toml";

/// What the stream controller does with `data:` lines it cannot decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MalformedFramePolicy {
    /// Log and drop the frame.
    #[default]
    Skip,
    /// Log the frame and hand it to the observer as a recoverable warning.
    Report,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base: String,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub http_proxy: String,
    pub https_proxy: String,
    pub stream: bool,
    pub malformed_frames: MalformedFramePolicy,
    pub request_timeout_secs: Option<u64>,
}

fn parse_bool_env(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "y" | "on"
    )
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            provider: None,
            model: None,
            http_proxy: String::new(),
            https_proxy: String::new(),
            stream: true,
            malformed_frames: MalformedFramePolicy::Skip,
            request_timeout_secs: None,
        }
    }
}

impl Config {
    /// Load from `~/.streamchat/config.json`, falling back to `./config.toml`, then apply
    /// environment overrides.
    pub fn new() -> Self {
        let mut config = Self::from_files(&config_json_path(), Path::new(CONFIG_FILE_PATH));
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config
    }

    fn from_files(json_path: &Path, toml_path: &Path) -> Self {
        if json_path.exists() {
            match load_config_json::<Config>(json_path) {
                Ok(config) => return config,
                Err(err) => log::warn!("Ignoring {}: {}", json_path.display(), err),
            }
        }

        if toml_path.exists() {
            match load_config_toml::<Config>(toml_path) {
                Ok(config) => return config,
                Err(err) => log::warn!("Ignoring {}: {}", toml_path.display(), err),
            }
        }

        Self::default()
    }

    /// Load a single config file, picking the format from its extension.
    pub fn from_file(path: &Path) -> Result<Self, String> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => load_config_json(path),
            _ => load_config_toml(path),
        }
    }

    pub fn apply_env_overrides<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(api_base) = var("STREAMCHAT_API_BASE") {
            self.api_base = api_base;
        }
        if let Some(provider) = var("STREAMCHAT_PROVIDER") {
            self.provider = Some(provider);
        }
        if let Some(model) = var("STREAMCHAT_MODEL") {
            self.model = Some(model);
        }
        if let Some(http_proxy) = var("HTTP_PROXY") {
            self.http_proxy = http_proxy;
        }
        if let Some(https_proxy) = var("HTTPS_PROXY") {
            self.https_proxy = https_proxy;
        }
        if let Some(stream) = var("STREAMCHAT_STREAM") {
            self.stream = parse_bool_env(&stream);
        }
        if let Some(report) = var("STREAMCHAT_REPORT_MALFORMED") {
            self.malformed_frames = if parse_bool_env(&report) {
                MalformedFramePolicy::Report
            } else {
                MalformedFramePolicy::Skip
            };
        }
    }

    /// Base URL without a trailing slash, ready for path concatenation.
    pub fn api_base(&self) -> &str {
        self.api_base.trim_end_matches('/')
    }
}
