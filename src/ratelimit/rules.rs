//! Rate limit configuration and the endpoint category catalog.
//!
//! Limits are configured per endpoint category. The catalog maps category
//! names to their settings and can be loaded from YAML or JSON; every
//! entry is validated at load time so misconfiguration fails fast instead
//! of surfacing during a check.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

use crate::error::{Result, WeirError};

/// Limit settings for one endpoint category.
///
/// Immutable for the lifetime of a check: callers look the config up once
/// and pass it through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Maximum requests allowed in the window.
    pub limit: u32,
    /// Window length in seconds.
    pub window_secs: u64,
    /// Count requests per authenticated user.
    #[serde(default = "default_true")]
    pub track_by_user: bool,
    /// Count requests per client address.
    #[serde(default = "default_true")]
    pub track_by_ip: bool,
}

fn default_true() -> bool {
    true
}

impl RateLimitConfig {
    /// Create a config tracking both user and IP dimensions.
    pub fn new(limit: u32, window_secs: u64) -> Self {
        Self {
            limit,
            window_secs,
            track_by_user: true,
            track_by_ip: true,
        }
    }

    /// Enable or disable the user dimension.
    pub fn with_user_tracking(mut self, enabled: bool) -> Self {
        self.track_by_user = enabled;
        self
    }

    /// Enable or disable the IP dimension.
    pub fn with_ip_tracking(mut self, enabled: bool) -> Self {
        self.track_by_ip = enabled;
        self
    }

    /// Reject configurations that can never admit a request correctly.
    ///
    /// A zero limit or zero window is a programming error and fails here,
    /// at configuration time; it is never reported during a check.
    pub fn validate(&self) -> Result<()> {
        self.check().map_err(WeirError::Config)
    }

    fn check(&self) -> std::result::Result<(), String> {
        if self.limit == 0 {
            return Err("limit must be at least 1".to_string());
        }
        if self.window_secs == 0 {
            return Err("window_secs must be at least 1".to_string());
        }
        Ok(())
    }

    /// Window length in milliseconds.
    pub(crate) fn window_millis(&self) -> i64 {
        self.window_secs as i64 * 1000
    }
}

/// Maps endpoint categories to their limit settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RateLimitCatalog {
    /// Category name -> limit settings.
    #[serde(default)]
    pub categories: HashMap<String, RateLimitConfig>,
}

impl RateLimitCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Built-in limits for the endpoint categories the substrate was built
    /// to protect, so a backend can start without a config file.
    pub fn builtin() -> Self {
        let mut categories = HashMap::new();
        categories.insert("ai-generate".to_string(), RateLimitConfig::new(5, 60));
        categories.insert("voice-call".to_string(), RateLimitConfig::new(3, 300));
        categories.insert("file-upload".to_string(), RateLimitConfig::new(20, 3600));
        categories.insert("bulk-export".to_string(), RateLimitConfig::new(2, 3600));
        // Failed logins have no user yet; limit them by address only.
        categories.insert(
            "auth-attempt".to_string(),
            RateLimitConfig::new(10, 900).with_user_tracking(false),
        );
        Self { categories }
    }

    /// Load a catalog from a file, dispatching on the extension.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading rate limit catalog");

        let contents = std::fs::read_to_string(path)?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json(&contents),
            _ => Self::from_yaml(&contents),
        }
    }

    /// Load a catalog from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let catalog: Self = serde_yaml::from_str(yaml)
            .map_err(|e| WeirError::Config(format!("Failed to parse rate limit catalog: {}", e)))?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Load a catalog from a JSON string.
    pub fn from_json(json: &str) -> Result<Self> {
        let catalog: Self = serde_json::from_str(json)
            .map_err(|e| WeirError::Config(format!("Failed to parse rate limit catalog: {}", e)))?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Look up the configuration for a category.
    pub fn get(&self, category: &str) -> Option<&RateLimitConfig> {
        self.categories.get(category)
    }

    /// Register or replace a category's configuration.
    pub fn insert(&mut self, category: impl Into<String>, config: RateLimitConfig) -> Result<()> {
        config.validate()?;
        self.categories.insert(category.into(), config);
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        for (category, config) in &self.categories {
            config
                .check()
                .map_err(|e| WeirError::Config(format!("category {:?}: {}", category, e)))?;
        }
        Ok(())
    }
}
