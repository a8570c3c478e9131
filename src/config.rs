// src/config.rs
//! Engine configuration.
//!
//! Load order:
//! 1) $FEEDRANK_CONFIG (must exist when set)
//! 2) config/feedrank.toml
//! 3) config/feedrank.json
//! 4) built-in defaults
//!
//! Environment overrides are applied on top, then everything is sanitized.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::scoring::DEFAULT_EXTERNAL_WEIGHT;

pub const ENV_CONFIG_PATH: &str = "FEEDRANK_CONFIG";
pub const DEFAULT_TOML_PATH: &str = "config/feedrank.toml";
pub const DEFAULT_JSON_PATH: &str = "config/feedrank.json";

fn default_sync_interval_secs() -> u64 {
    1800
}
fn default_workers() -> usize {
    4
}
fn default_fetch_timeout_secs() -> u64 {
    15
}
fn default_external_weight() -> f64 {
    DEFAULT_EXTERNAL_WEIGHT
}
fn default_max_consecutive_failures() -> u32 {
    5
}
fn default_rate_limit_ms() -> u64 {
    1000
}
fn default_cache_ttl_secs() -> u64 {
    300
}
fn default_cache_capacity() -> usize {
    256
}
fn default_store_path() -> PathBuf {
    PathBuf::from("state/feedrank.jsonl")
}
fn default_bind_addr() -> String {
    "127.0.0.1:8080".to_string()
}

/// Upstream API tokens. Never serialized back out.
#[derive(Clone, Default, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub model_hub_token: Option<String>,
    #[serde(default)]
    pub repository_hub_token: Option<String>,
    #[serde(default)]
    pub microblog_token: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mask = |t: &Option<String>| if t.is_some() { "<set>" } else { "<unset>" };
        f.debug_struct("Credentials")
            .field("model_hub_token", &mask(&self.model_hub_token))
            .field("repository_hub_token", &mask(&self.repository_hub_token))
            .field("microblog_token", &mask(&self.microblog_token))
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_sync_interval_secs")]
    pub sync_interval_secs: u64,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    /// Weight of the external score in the final blend, [0, 1].
    #[serde(default = "default_external_weight")]
    pub external_weight: f64,
    /// Consecutive failed runs before a source is disabled.
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,
    /// Minimum spacing between requests to one host.
    #[serde(default = "default_rate_limit_ms")]
    pub rate_limit_ms: u64,
    /// Per-host overrides of `rate_limit_ms`, keyed by host name.
    #[serde(default)]
    pub host_rate_limits_ms: BTreeMap<String, u64>,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default)]
    pub credentials: Credentials,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sync_interval_secs: default_sync_interval_secs(),
            workers: default_workers(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            external_weight: default_external_weight(),
            max_consecutive_failures: default_max_consecutive_failures(),
            rate_limit_ms: default_rate_limit_ms(),
            host_rate_limits_ms: BTreeMap::new(),
            cache_ttl_secs: default_cache_ttl_secs(),
            cache_capacity: default_cache_capacity(),
            store_path: default_store_path(),
            bind_addr: default_bind_addr(),
            credentials: Credentials::default(),
        }
    }
}

/// Snapshot safe to expose over the ops endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigSummary {
    pub sync_interval_secs: u64,
    pub workers: usize,
    pub fetch_timeout_secs: u64,
    pub external_weight: f64,
    pub max_consecutive_failures: u32,
}

impl EngineConfig {
    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn summary(&self) -> ConfigSummary {
        ConfigSummary {
            sync_interval_secs: self.sync_interval_secs,
            workers: self.workers,
            fetch_timeout_secs: self.fetch_timeout_secs,
            external_weight: self.external_weight,
            max_consecutive_failures: self.max_consecutive_failures,
        }
    }

    /// Load from an explicit path. TOML or JSON, picked by extension with a
    /// fallback to the other format.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let mut cfg = parse_config(&content, ext.as_str())
            .with_context(|| format!("parsing config {}", path.display()))?;
        cfg.sanitize();
        Ok(cfg)
    }

    /// Files, then env overrides, then sanitizing.
    pub fn load_default() -> Result<Self> {
        let mut cfg = if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
            }
            Self::load_from(&pb)?
        } else if Path::new(DEFAULT_TOML_PATH).exists() {
            Self::load_from(Path::new(DEFAULT_TOML_PATH))?
        } else if Path::new(DEFAULT_JSON_PATH).exists() {
            Self::load_from(Path::new(DEFAULT_JSON_PATH))?
        } else {
            Self::default()
        };
        cfg.apply_env();
        cfg.sanitize();
        Ok(cfg)
    }

    fn apply_env(&mut self) {
        if let Some(v) = env_parse("SYNC_INTERVAL_SECS") {
            self.sync_interval_secs = v;
        }
        if let Some(v) = env_parse("SYNC_WORKERS") {
            self.workers = v;
        }
        if let Some(v) = env_parse("FETCH_TIMEOUT_SECS") {
            self.fetch_timeout_secs = v;
        }
        if let Some(v) = env_parse("EXTERNAL_WEIGHT") {
            self.external_weight = v;
        }
        if let Some(v) = env_string("STORE_PATH") {
            self.store_path = PathBuf::from(v);
        }
        if let Some(v) = env_string("BIND_ADDR") {
            self.bind_addr = v;
        }
        if let Some(v) = env_string("MODEL_HUB_TOKEN") {
            self.credentials.model_hub_token = Some(v);
        }
        if let Some(v) = env_string("REPO_HUB_TOKEN") {
            self.credentials.repository_hub_token = Some(v);
        }
        if let Some(v) = env_string("MICROBLOG_TOKEN") {
            self.credentials.microblog_token = Some(v);
        }
    }

    fn sanitize(&mut self) {
        if !self.external_weight.is_finite() {
            self.external_weight = default_external_weight();
        }
        self.external_weight = self.external_weight.clamp(0.0, 1.0);
        self.workers = self.workers.max(1);
        if self.sync_interval_secs == 0 {
            self.sync_interval_secs = default_sync_interval_secs();
        }
        if self.fetch_timeout_secs == 0 {
            self.fetch_timeout_secs = default_fetch_timeout_secs();
        }
        self.max_consecutive_failures = self.max_consecutive_failures.max(1);
        self.cache_capacity = self.cache_capacity.max(1);

        let creds = &mut self.credentials;
        for t in [
            &mut creds.model_hub_token,
            &mut creds.repository_hub_token,
            &mut creds.microblog_token,
        ] {
            if t.as_deref().map(str::trim).unwrap_or_default().is_empty() {
                *t = None;
            }
        }
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = env_string(key)?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(target: "config", key, value = %raw, "ignoring unparseable env override");
            None
        }
    }
}

fn parse_config(s: &str, hint_ext: &str) -> Result<EngineConfig> {
    if hint_ext == "json" {
        if let Ok(v) = serde_json::from_str(s) {
            return Ok(v);
        }
        return toml::from_str(s).map_err(|e| anyhow!("unsupported config format: {e}"));
    }
    match toml::from_str(s) {
        Ok(v) => Ok(v),
        Err(toml_err) => serde_json::from_str(s)
            .map_err(|_| anyhow!("unsupported config format: {toml_err}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toml_and_json_parse_with_defaults() {
        let t = parse_config("workers = 8\nexternal_weight = 0.5\n", "toml").unwrap();
        assert_eq!(t.workers, 8);
        assert_eq!(t.external_weight, 0.5);
        assert_eq!(t.sync_interval_secs, 1800);

        let j = parse_config(r#"{"fetch_timeout_secs": 3}"#, "json").unwrap();
        assert_eq!(j.fetch_timeout_secs, 3);
        assert_eq!(j.workers, 4);
    }

    #[test]
    fn sanitize_clamps_and_floors() {
        let mut c = EngineConfig {
            external_weight: 1.7,
            workers: 0,
            sync_interval_secs: 0,
            ..EngineConfig::default()
        };
        c.credentials.microblog_token = Some("   ".into());
        c.sanitize();
        assert_eq!(c.external_weight, 1.0);
        assert_eq!(c.workers, 1);
        assert_eq!(c.sync_interval_secs, 1800);
        assert!(c.credentials.microblog_token.is_none());
    }

    #[test]
    fn credentials_debug_is_masked() {
        let c = Credentials {
            microblog_token: Some("secret".into()),
            ..Credentials::default()
        };
        let out = format!("{c:?}");
        assert!(!out.contains("secret"));
        assert!(out.contains("<set>"));
    }
}
