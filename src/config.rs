use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

use crate::http::file::Dotfiles;

/// Environment variable naming an optional YAML config file.
pub const CONFIG_ENV: &str = "OUTFLOW_CONFIG";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub listen_addr: String,
    /// Directory the demo server serves files from.
    pub static_root: PathBuf,
    pub response: ResponseConfig,
    pub files: FileConfig,
}

/// Defaults applied to every response.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResponseConfig {
    /// Generate weak ETags for `send` bodies.
    pub etag: bool,
    /// Indentation for JSON bodies; compact when unset.
    pub json_spaces: Option<usize>,
    /// Escape `<`, `>` and `&` in JSON bodies.
    pub json_escape: bool,
    /// Query parameter holding the JSONP callback name.
    pub jsonp_callback_name: String,
    /// Secret for signed cookies.
    pub cookie_secret: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    /// Files smaller than this are read whole, off-thread.
    pub small_file_threshold: u64,
    /// Use the off-thread reader at all.
    pub offload_reads: bool,
    pub read_queue_depth: usize,
    pub stream_chunk_size: usize,
    pub max_age_secs: u64,
    pub last_modified: bool,
    pub etag: bool,
    pub dotfiles: Dotfiles,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8080".to_string(),
            static_root: PathBuf::from("public"),
            response: ResponseConfig::default(),
            files: FileConfig::default(),
        }
    }
}

impl Default for ResponseConfig {
    fn default() -> Self {
        Self {
            etag: true,
            json_spaces: None,
            json_escape: false,
            jsonp_callback_name: "callback".to_string(),
            cookie_secret: None,
        }
    }
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            small_file_threshold: 64 * 1024,
            offload_reads: true,
            read_queue_depth: crate::http::reader::DEFAULT_QUEUE_DEPTH,
            stream_chunk_size: 64 * 1024,
            max_age_secs: 0,
            last_modified: true,
            etag: true,
            dotfiles: Dotfiles::Ignore,
        }
    }
}

impl Config {
    /// Loads the config file named by `OUTFLOW_CONFIG`, if any, then applies
    /// the `LISTEN` override. A broken file is logged and ignored.
    pub fn load() -> Self {
        let mut cfg = match std::env::var(CONFIG_ENV) {
            Ok(path) => Self::from_file(Path::new(&path)).unwrap_or_else(|e| {
                tracing::warn!(path = %path, error = %e, "ignoring unreadable config file");
                Self::default()
            }),
            Err(_) => Self::default(),
        };

        if let Ok(listen_addr) = std::env::var("LISTEN") {
            cfg.listen_addr = listen_addr;
        }
        cfg
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_yaml(&text).with_context(|| format!("invalid config in {}", path.display()))
    }

    pub fn from_yaml(text: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }
}
