//! Application configuration types.
//!
//! The top-level [`Config`] struct is deserialized from JSON. Every section
//! defaults sensibly so a completely empty `{}` file is valid, and a handful
//! of environment variables override the file for container deployments.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::Error;

/// Default upload limit: 10 MiB.
pub const DEFAULT_MAX_IMAGE_BYTES: u64 = 10 * 1024 * 1024;

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
}

impl Config {
    /// Deserialize a `Config` from a JSON string.
    pub fn from_json(json_str: &str) -> Result<Self> {
        serde_json::from_str(json_str)
            .map_err(|e| Error::Validation(format!("config parse error: {e}")))
    }

    /// Load configuration from a file path, falling back to defaults if the
    /// path is `None` or the file does not exist.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_json(&contents).unwrap_or_else(|e| {
                tracing::warn!("Failed to parse config file {}: {e}", path.display());
                Self::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No config file at {}; using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                tracing::warn!("Failed to read config file {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_vars(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable lookup.
    ///
    /// Empty values are ignored, matching how unset variables behave.
    pub fn apply_vars(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(v) = get("BASE_URL") {
            self.server.base_url = v;
        }
        if let Some(v) = get("BIND_ADDR") {
            self.server.bind_addr = v;
        }
        if let Some(v) = get("IMAGESTORE_DB_PATH") {
            self.storage.db_path = PathBuf::from(v);
        }
        if let Some(v) = get("IMAGESTORE_IMAGES_DIR") {
            self.storage.images_dir = PathBuf::from(v);
        }
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.server.rpc_port != 0 && self.server.rpc_port == self.server.http_port {
            warnings.push(format!(
                "server.rpc_port and server.http_port are both {}",
                self.server.rpc_port
            ));
        }

        let base = &self.server.base_url;
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            warnings.push(format!(
                "server.base_url '{base}' has no http(s) scheme; image URLs may not resolve"
            ));
        }

        if self.storage.pool_size == 0 {
            warnings.push("storage.pool_size is 0; using 1".into());
        }

        if self.storage.max_image_bytes == 0 {
            warnings.push("storage.max_image_bytes is 0; every upload will be rejected".into());
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// Listener and URL settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub rpc_port: u16,
    pub http_port: u16,
    /// Prefix for the `url` field of every returned image.
    pub base_url: String,
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1".into(),
            rpc_port: 50051,
            http_port: 8087,
            base_url: "http://localhost:8087".into(),
            request_timeout_secs: 15,
        }
    }
}

impl ServerConfig {
    pub fn rpc_addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.rpc_port)
    }

    pub fn http_addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.http_port)
    }
}

/// Durable storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: PathBuf,
    pub images_dir: PathBuf,
    pub pool_size: u32,
    pub max_image_bytes: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./imagestore.db"),
            images_dir: PathBuf::from("./images"),
            pool_size: 4,
            max_image_bytes: DEFAULT_MAX_IMAGE_BYTES,
        }
    }
}
