use crate::error::{Result, SibimError};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transport {
    AppsScript,
    SheetsApi,
}

impl std::str::FromStr for Transport {
    type Err = SibimError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "apps_script" | "apps-script" | "gas" => Ok(Transport::AppsScript),
            "sheets_api" | "sheets-api" | "sheets" => Ok(Transport::SheetsApi),
            other => Err(SibimError::Config(format!("unknown transport: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    pub name: String,
    pub version: String,
    pub debug_mode: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub transport: Transport,
    /// Apps Script Web App URL (`.../exec`).
    pub script_url: Option<String>,
    pub spreadsheet_id: Option<String>,
    pub api_key: Option<String>,
    pub access_token: Option<String>,
    pub sheets_base_url: String,
    /// Unset means no client-side timeout.
    pub request_timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_seconds: u64,
    pub write_settle_ms: u64,
    pub max_rows_per_fetch: usize,
    pub use_sample_data: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub inactivity_timeout_seconds: u64,
    pub master_username: Option<String>,
    pub master_password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub application: ApplicationConfig,
    pub remote: RemoteConfig,
    pub cache: CacheConfig,
    pub session: SessionConfig,
    pub storage: StorageConfig,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        ApplicationConfig {
            name: "SIBIM TZOMPANTEPEC".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            debug_mode: false,
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        RemoteConfig {
            transport: Transport::AppsScript,
            script_url: None,
            spreadsheet_id: None,
            api_key: None,
            access_token: None,
            sheets_base_url: "https://sheets.googleapis.com".to_string(),
            request_timeout_seconds: None,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            ttl_seconds: 300,
            write_settle_ms: 2000,
            max_rows_per_fetch: 5000,
            use_sample_data: false,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            inactivity_timeout_seconds: 600,
            master_username: None,
            master_password: None,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            path: PathBuf::from(".sibim/storage.redb"),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }

    pub fn write_settle(&self) -> Duration {
        Duration::from_millis(self.write_settle_ms)
    }
}

impl SessionConfig {
    pub fn inactivity_timeout(&self) -> Duration {
        Duration::from_secs(self.inactivity_timeout_seconds)
    }
}

impl Config {
    /// Load configuration from `path` (or `config.toml`) with environment overrides.
    /// A missing file is not an error: defaults are used instead.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.unwrap_or_else(|| Path::new("config.toml"));

        let mut config = if path.exists() {
            Self::load_from_file(path)?
        } else {
            tracing::warn!("⚠️ {} not found, using default configuration", path.display());
            Config::default()
        };

        config.apply_env_overrides(|key| env::var(key).ok())?;
        Ok(config)
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            SibimError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| SibimError::Config(format!("failed to parse config: {}", e)))
    }

    /// Apply `SIBIM_*` overrides read through `lookup`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(transport) = lookup("SIBIM_TRANSPORT") {
            self.remote.transport = transport.parse()?;
        }
        if let Some(url) = lookup("SIBIM_SCRIPT_URL") {
            self.remote.script_url = Some(url);
        }
        if let Some(id) = lookup("SIBIM_SPREADSHEET_ID") {
            self.remote.spreadsheet_id = Some(id);
        }
        if let Some(key) = lookup("SIBIM_API_KEY") {
            self.remote.api_key = Some(key);
        }
        if let Some(token) = lookup("SIBIM_ACCESS_TOKEN") {
            self.remote.access_token = Some(token);
        }
        if let Some(ttl) = lookup("SIBIM_CACHE_TTL") {
            self.cache.ttl_seconds = ttl
                .parse()
                .map_err(|_| SibimError::Config(format!("SIBIM_CACHE_TTL is not a number: {}", ttl)))?;
        }
        if let Some(path) = lookup("SIBIM_STORAGE_PATH") {
            self.storage.path = PathBuf::from(path);
        }
        if let Some(debug) = lookup("SIBIM_DEBUG") {
            self.application.debug_mode = debug.to_lowercase() == "true" || debug == "1";
        }
        Ok(())
    }

    /// Check that the selected transport has what it needs.
    pub fn validate(&self) -> Result<()> {
        match self.remote.transport {
            Transport::AppsScript => {
                if self.remote.script_url.as_deref().map_or(true, str::is_empty) {
                    return Err(SibimError::Config(
                        "remote.script_url is required for the apps_script transport".to_string(),
                    ));
                }
            }
            Transport::SheetsApi => {
                if self.remote.spreadsheet_id.as_deref().map_or(true, str::is_empty) {
                    return Err(SibimError::Config(
                        "remote.spreadsheet_id is required for the sheets_api transport".to_string(),
                    ));
                }
                if self.remote.api_key.is_none() && self.remote.access_token.is_none() {
                    return Err(SibimError::Config(
                        "remote.api_key or remote.access_token is required for the sheets_api transport".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| SibimError::Config(format!("failed to serialize config: {}", e)))?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, content)?;
        Ok(())
    }
}
