//! Configuration: an optional TOML file, then `NATURALE_*` environment
//! overrides.
//!
//! ```toml
//! [cache]
//! ttl_secs = 3600
//! db_path = "/var/cache/naturale/metadata.db"
//!
//! [backend]
//! api_version = "6.0"
//! timeout_ms = 15000
//!
//! [ai]
//! endpoint = "https://example.openai.azure.com"
//! api_key = "..."
//! deployment = "gpt-4"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::{NaturaleError, NaturaleResult};
use crate::query::guards;

pub const DEFAULT_API_VERSION: &str = "6.0";
pub const DEFAULT_BACKEND_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_AI_DEPLOYMENT: &str = "gpt-4";
pub const DEFAULT_AI_API_VERSION: &str = "2024-02-15-preview";
pub const DEFAULT_AI_MAX_TOKENS: u32 = 1000;
pub const DEFAULT_AI_TEMPERATURE: f32 = 0.1;
pub const DEFAULT_AI_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Clamped to 30 minutes .. 24 hours when read through [`CacheConfig::ttl`].
    pub ttl_secs: i64,
    /// SQLite file for persisted snapshots. `None` keeps the cache in memory.
    pub db_path: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: guards::DEFAULT_CACHE_TTL_SECS,
            db_path: None,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(guards::clamp_cache_ttl(self.ttl_secs))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub api_version: String,
    pub timeout_ms: u64,
    /// Replaces the hosted roots with `{endpoint_override}/{org}/...`.
    pub endpoint_override: Option<String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            api_version: DEFAULT_API_VERSION.to_string(),
            timeout_ms: DEFAULT_BACKEND_TIMEOUT_MS,
            endpoint_override: None,
        }
    }
}

impl BackendConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    pub endpoint: String,
    pub api_key: String,
    pub deployment: String,
    pub api_version: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_ms: u64,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            api_key: String::new(),
            deployment: DEFAULT_AI_DEPLOYMENT.to_string(),
            api_version: DEFAULT_AI_API_VERSION.to_string(),
            max_tokens: DEFAULT_AI_MAX_TOKENS,
            temperature: DEFAULT_AI_TEMPERATURE,
            timeout_ms: DEFAULT_AI_TIMEOUT_MS,
        }
    }
}

impl AiConfig {
    /// Endpoint and key are both present.
    pub fn is_configured(&self) -> bool {
        !self.endpoint.trim().is_empty() && !self.api_key.trim().is_empty()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NaturaleConfig {
    pub cache: CacheConfig,
    pub backend: BackendConfig,
    pub ai: Option<AiConfig>,
}

/// `NATURALE_AI` switches the AI strategy off without touching the config
/// file. Enabled unless set to a false-like value.
pub fn ai_enabled() -> bool {
    flag_enabled(std::env::var("NATURALE_AI").ok().as_deref())
}

fn flag_enabled(value: Option<&str>) -> bool {
    match value {
        Some(val) => {
            let v = val.trim().to_lowercase();
            !matches!(v.as_str(), "0" | "false" | "no" | "off")
        }
        None => true,
    }
}

impl NaturaleConfig {
    pub fn from_toml_str(content: &str) -> NaturaleResult<Self> {
        toml::from_str(content).map_err(|e| NaturaleError::Config(format!("Failed to parse TOML: {e}")))
    }

    /// Read `path` when given (it must exist), apply environment overrides.
    pub fn load(path: Option<&Path>) -> NaturaleResult<Self> {
        let mut config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path).map_err(|e| {
                    NaturaleError::Config(format!("Failed to read {}: {e}", path.display()))
                })?;
                debug!(path = %path.display(), "loaded config file");
                Self::from_toml_str(&content)?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply `NATURALE_*` overrides read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(value) = get("NATURALE_CACHE_TTL_SECS") {
            match value.parse::<i64>() {
                Ok(ttl) => self.cache.ttl_secs = ttl,
                Err(_) => warn!(value = %value, "ignoring invalid NATURALE_CACHE_TTL_SECS"),
            }
        }
        if let Some(value) = get("NATURALE_CACHE_DB") {
            self.cache.db_path = Some(PathBuf::from(value));
        }
        if let Some(value) = get("NATURALE_API_VERSION") {
            self.backend.api_version = value;
        }
        if let Some(value) = get("NATURALE_BACKEND_TIMEOUT_MS") {
            match value.parse::<u64>() {
                Ok(ms) => self.backend.timeout_ms = ms,
                Err(_) => warn!(value = %value, "ignoring invalid NATURALE_BACKEND_TIMEOUT_MS"),
            }
        }
        if let Some(value) = get("NATURALE_BACKEND_ENDPOINT") {
            self.backend.endpoint_override = Some(value);
        }

        let endpoint = get("NATURALE_AI_ENDPOINT");
        let api_key = get("NATURALE_AI_API_KEY");
        let deployment = get("NATURALE_AI_DEPLOYMENT");
        if endpoint.is_some() || api_key.is_some() || deployment.is_some() {
            let ai = self.ai.get_or_insert_with(AiConfig::default);
            if let Some(endpoint) = endpoint {
                ai.endpoint = endpoint;
            }
            if let Some(api_key) = api_key {
                ai.api_key = api_key;
            }
            if let Some(deployment) = deployment {
                ai.deployment = deployment;
            }
        }
    }

    /// The AI section when it is complete and not switched off.
    pub fn active_ai(&self) -> Option<&AiConfig> {
        self.ai.as_ref().filter(|ai| ai.is_configured() && ai_enabled())
    }
}
