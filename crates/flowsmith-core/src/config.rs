//! Settings
//!
//! Loaded from `~/.flowsmith/config.toml` (or an explicit path). Every field
//! has a default, so a missing file or a partial file is fine. A handful of
//! environment variables override the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::constants::{ai, limits};
use crate::paths;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub model: ModelSettings,
    pub catalog: CatalogSettings,
    pub semantic: SemanticSettings,
    pub limits: LimitSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    pub base_url: String,
    pub model: String,
    /// Name of the environment variable holding the API key
    pub api_key_env: String,
    /// Lower reasoning effort for analysis and simple guides
    pub fast_mode: bool,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            base_url: ai::DEFAULT_BASE_URL.to_string(),
            model: ai::DEFAULT_MODEL.to_string(),
            api_key_env: ai::DEFAULT_API_KEY_ENV.to_string(),
            fast_mode: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogSettings {
    pub db_path: PathBuf,
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            db_path: paths::default_catalog_db(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SemanticSettings {
    /// Similarity search endpoint; semantic search is disabled when unset
    pub endpoint: Option<String>,
    pub top_k: usize,
}

impl Default for SemanticSettings {
    fn default() -> Self {
        Self {
            endpoint: None,
            top_k: limits::SEMANTIC_TOP_K,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitSettings {
    pub worker_pool_size: usize,
    pub collaborator_timeout_ms: u64,
    /// Per-call limit for blocking language model calls
    pub model_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub iteration_ceiling: usize,
    pub stream_emit_interval_ms: u64,
    pub stream_idle_timeout_secs: u64,
    pub history_turns: usize,
    pub max_failed_lookups_per_term: usize,
}

impl Default for LimitSettings {
    fn default() -> Self {
        Self {
            worker_pool_size: limits::WORKER_POOL_SIZE,
            collaborator_timeout_ms: limits::COLLABORATOR_TIMEOUT_MS,
            model_timeout_secs: limits::MODEL_TIMEOUT_SECS,
            request_timeout_secs: limits::REQUEST_TIMEOUT_SECS,
            iteration_ceiling: limits::ITERATION_CEILING,
            stream_emit_interval_ms: limits::STREAM_EMIT_INTERVAL_MS,
            stream_idle_timeout_secs: limits::STREAM_IDLE_TIMEOUT_SECS,
            history_turns: limits::HISTORY_TURNS,
            max_failed_lookups_per_term: limits::MAX_FAILED_LOOKUPS_PER_TERM,
        }
    }
}

impl LimitSettings {
    pub fn collaborator_timeout(&self) -> Duration {
        Duration::from_millis(self.collaborator_timeout_ms)
    }

    pub fn model_timeout(&self) -> Duration {
        Duration::from_secs(self.model_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn stream_emit_interval(&self) -> Duration {
        Duration::from_millis(self.stream_emit_interval_ms)
    }

    pub fn stream_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.stream_idle_timeout_secs)
    }
}

impl Settings {
    /// Load settings from `path`, or from the default location when `None`.
    ///
    /// An explicit path must exist; the default path may be absent.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (file, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (paths::config_file(), false),
        };

        let mut settings = if file.exists() {
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            Self::from_toml(&raw).with_context(|| format!("Invalid config {}", file.display()))?
        } else if required {
            bail!("Config file not found: {}", file.display());
        } else {
            tracing::debug!(path = %file.display(), "No config file, using defaults");
            Self::default()
        };

        settings.apply_env_overrides(|key| std::env::var(key).ok());
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Apply `FLOWSMITH_*` overrides. `lookup` is injectable for tests.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(model) = lookup("FLOWSMITH_MODEL").filter(|v| !v.is_empty()) {
            self.model.model = model;
        }
        if let Some(url) = lookup("FLOWSMITH_BASE_URL").filter(|v| !v.is_empty()) {
            self.model.base_url = url;
        }
        if let Some(db) = lookup("FLOWSMITH_CATALOG_DB").filter(|v| !v.is_empty()) {
            self.catalog.db_path = PathBuf::from(db);
        }
    }

    pub fn validate(&self) -> Result<()> {
        let l = &self.limits;
        if l.worker_pool_size == 0 {
            bail!("limits.worker_pool_size must be at least 1");
        }
        if l.iteration_ceiling == 0 {
            bail!("limits.iteration_ceiling must be at least 1");
        }
        if l.collaborator_timeout() >= l.request_timeout() {
            bail!(
                "limits.collaborator_timeout_ms ({}) must be shorter than limits.request_timeout_secs ({}s)",
                l.collaborator_timeout_ms,
                l.request_timeout_secs
            );
        }
        if l.model_timeout() >= l.request_timeout() {
            bail!(
                "limits.model_timeout_secs ({}) must be shorter than limits.request_timeout_secs ({})",
                l.model_timeout_secs,
                l.request_timeout_secs
            );
        }
        Ok(())
    }

    /// Resolve the model API key from the configured environment variable.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.model.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
    }
}
