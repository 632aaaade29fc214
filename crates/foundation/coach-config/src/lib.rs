//! Coach configuration.
//!
//! Loaded from `~/.config/coach/config.yaml` (or an explicit path), then
//! overridden from the environment. A missing default file means defaults.

use coach_core::{CostPolicy, Credits, Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

pub const ENV_AI_KEY: &str = "CLOUDFLARE_AI_KEY";
pub const ENV_AI_BASE_URL: &str = "CLOUDFLARE_AI_BASE_URL";
pub const ENV_AI_MODEL: &str = "CLOUDFLARE_AI_MODEL";
pub const ENV_MONGODB_URI: &str = "COACH_MONGODB_URI";
pub const ENV_COST_POLICY: &str = "COACH_COST_POLICY";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoachConfig {
    pub store: StoreConfig,
    pub credits: CreditsConfig,
    pub xp: XpConfig,
    pub ai: AiConfig,
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Process-local maps; state is lost on exit
    #[default]
    Memory,
    Mongodb,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub mongodb_uri: Option<String>,
    pub database: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            mongodb_uri: None,
            database: "coach".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CreditsConfig {
    /// Balance granted to a newly created account
    pub default_credits: f64,
    pub cost_policy: CostPolicy,
}

impl Default for CreditsConfig {
    fn default() -> Self {
        Self {
            default_credits: 10.0,
            cost_policy: CostPolicy::Fractional,
        }
    }
}

/// XP earned per qualifying activity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct XpConfig {
    pub weight_log: u64,
    pub workout_completed: u64,
}

impl Default for XpConfig {
    fn default() -> Self {
        Self {
            weight_log: 10,
            workout_completed: 20,
        }
    }
}

#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_secs: u64,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: None,
            model: "gpt-4o-mini".to_string(),
            max_tokens: 450,
            temperature: 0.7,
            timeout_secs: 30,
        }
    }
}

impl AiConfig {
    /// Both the key and the base URL are present
    pub fn is_configured(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.is_empty())
            && self.base_url.as_deref().is_some_and(|u| !u.is_empty())
    }
}

impl fmt::Debug for AiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AiConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub window_secs: u64,
    pub max_requests: u32,
    /// Upper bound on tracked identifiers before expired windows are swept
    pub max_tracked_keys: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window_secs: 60,
            max_requests: 10,
            max_tracked_keys: 10_000,
        }
    }
}

impl CoachConfig {
    /// Default config file location
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("coach").join("config.yaml"))
    }

    /// Load from `path`, or from the default location if `None`, then apply
    /// environment overrides and validate.
    ///
    /// An explicit path must exist; a missing default file yields defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => {
                    tracing::debug!("no config file found, using defaults");
                    Self::default()
                }
            },
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
        let config = Self::from_yaml(&raw)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        tracing::debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw).map_err(|e| Error::Config(format!("invalid YAML: {}", e)))
    }

    /// Apply environment overrides through `lookup`
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup(ENV_AI_KEY) {
            self.ai.api_key = Some(key);
        }
        if let Some(url) = lookup(ENV_AI_BASE_URL) {
            self.ai.base_url = Some(url);
        }
        if let Some(model) = lookup(ENV_AI_MODEL) {
            self.ai.model = model;
        }
        if let Some(uri) = lookup(ENV_MONGODB_URI) {
            self.store.mongodb_uri = Some(uri);
            self.store.backend = StoreBackend::Mongodb;
        }
        if let Some(policy) = lookup(ENV_COST_POLICY) {
            self.credits.cost_policy = policy
                .parse()
                .map_err(|e: Error| Error::Config(format!("{}: {}", ENV_COST_POLICY, e)))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.default_credits()?;

        if self.store.backend == StoreBackend::Mongodb && self.store.mongodb_uri.is_none() {
            return Err(Error::Config("mongodb backend requires store.mongodb_uri".to_string()));
        }
        if self.store.database.trim().is_empty() {
            return Err(Error::Config("store.database must not be empty".to_string()));
        }
        if self.rate_limit.enabled {
            if self.rate_limit.window_secs == 0 {
                return Err(Error::Config("rate_limit.window_secs must be > 0".to_string()));
            }
            if self.rate_limit.max_requests == 0 {
                return Err(Error::Config("rate_limit.max_requests must be > 0".to_string()));
            }
            if self.rate_limit.max_tracked_keys == 0 {
                return Err(Error::Config("rate_limit.max_tracked_keys must be > 0".to_string()));
            }
        }
        if !(0.0..=2.0).contains(&self.ai.temperature) {
            return Err(Error::Config(format!(
                "ai.temperature must be within 0.0..=2.0, got {}",
                self.ai.temperature
            )));
        }
        Ok(())
    }

    /// Starting balance for new accounts
    pub fn default_credits(&self) -> Result<Credits> {
        Credits::from_decimal(self.credits.default_credits)
            .map_err(|e| Error::Config(format!("credits.default_credits: {}", e)))
    }
}
