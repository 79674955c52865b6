/*!
common/src/lib.rs

Shared configuration types and helpers for pfasnews.

This file provides:
- Config data structures (deserialized from TOML), each with built-in defaults
- An async loader that merges a default file with an optional override file
- Environment overrides (`PORT`) and validation of the scope registry
*/

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use url::Url;

/// Environment variable that overrides `server.port`.
pub const PORT_ENV: &str = "PORT";

/// Default configuration file, resolved against the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config.default.toml";

/// Upper bound for `cache.ttl_seconds` (one year).
pub const MAX_TTL_SECONDS: u64 = 365 * 24 * 60 * 60;

/// HTTP server section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind (e.g. "0.0.0.0")
    pub bind: String,
    pub port: u16,
    /// Directory holding index.html and the browser assets
    pub static_dir: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 5000,
            static_dir: "pfasnews/public".to_string(),
        }
    }
}

/// Upstream fetching configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub timeout_seconds: u64,
    pub user_agent: String,
    /// Fetch all sources of a scope concurrently instead of one after another
    pub parallel: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 10,
            user_agent: "pfasnews/0.1.0".to_string(),
            parallel: false,
        }
    }
}

/// Aggregation cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_seconds: u64,
    /// Maximum number of items returned per scope
    pub max_items: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: 600,
            max_items: 25,
        }
    }
}

/// Scope name -> ordered list of feed URLs.
pub type ScopesConfig = BTreeMap<String, Vec<String>>;

/// Top-level application configuration (deserialized from config.toml)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub fetch: FetchConfig,
    pub cache: CacheConfig,
    pub scopes: ScopesConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            fetch: FetchConfig::default(),
            cache: CacheConfig::default(),
            scopes: default_scopes(),
        }
    }
}

fn google_news(query: &str) -> String {
    format!(
        "https://news.google.com/rss/search?q={}&hl=en-GB&gl=GB&ceid=GB:en",
        query
    )
}

/// Built-in PFAS scope registry used when no `[scopes]` table is configured.
pub fn default_scopes() -> ScopesConfig {
    let table: [(&str, &[&str]); 4] = [
        (
            "global",
            &[
                "PFAS%20OR%20%22forever%20chemicals%22",
                "PFAS%20water%20OR%20drinking%20water%20OR%20health",
            ],
        ),
        (
            "jersey",
            &[
                "PFAS%20Jersey%20%22Channel%20Islands%22",
                "pfas%20site%3Ajerseyeveningpost.com",
                "pfas%20site%3Abailiwickexpress.com",
                "pfas%20site%3Aitv.com%20%22Channel%20Islands%22",
                "pfas%20site%3Agov.je",
                "pfas%20site%3Astatesassembly.gov.je",
            ],
        ),
        (
            "official",
            &[
                "pfas%20site%3Aepa.gov",
                "pfas%20site%3Aecha.europa.eu",
                "pfas%20site%3Aeuropa.eu",
                "pfas%20site%3Awho.int",
            ],
        ),
        (
            "science",
            &[
                "PFAS%20site%3Anature.com",
                "PFAS%20site%3Asciencedaily.com",
                "PFAS%20site%3Athelancet.com",
            ],
        ),
    ];

    table
        .iter()
        .map(|(scope, queries)| {
            (
                scope.to_string(),
                queries.iter().map(|q| google_news(q)).collect(),
            )
        })
        .collect()
}

impl Config {
    /// Load configuration with an optional default file and an optional override file.
    /// If both are present, they are merged (override takes precedence). Missing
    /// sections fall back to the built-in defaults. Environment overrides are applied last.
    pub async fn load_with_defaults(default_path: Option<&Path>, override_path: Option<&Path>) -> Result<Self> {
        let mut config_value = toml::Value::Table(toml::map::Map::new());

        for (label, path) in [("default", default_path), ("override", override_path)] {
            let Some(path) = path else { continue };
            if !path.exists() {
                continue;
            }
            let data = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read {} config: {}", label, path.display()))?;
            let val: toml::Value = toml::from_str(&data)
                .with_context(|| format!("Failed to parse {} configuration", label))?;
            merge_toml(&mut config_value, val);
        }

        let mut cfg: Config = config_value.try_into().context("Failed to parse merged configuration")?;
        cfg.apply_env_overrides(|key| std::env::var(key).ok())?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Apply overrides from the environment. `lookup` is `std::env::var` in production.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(PORT_ENV) {
            self.server.port = raw
                .trim()
                .parse()
                .with_context(|| format!("{} is not a valid port: {:?}", PORT_ENV, raw))?;
        }
        Ok(())
    }

    /// Reject configurations the service cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.scopes.is_empty() {
            bail!("configuration defines no scopes");
        }
        if self.cache.max_items == 0 {
            bail!("cache.max_items must be at least 1");
        }
        if self.cache.ttl_seconds > MAX_TTL_SECONDS {
            bail!(
                "cache.ttl_seconds must be at most {} (got {})",
                MAX_TTL_SECONDS,
                self.cache.ttl_seconds
            );
        }
        for (scope, sources) in &self.scopes {
            if sources.is_empty() {
                bail!("scope '{}' has no feed sources", scope);
            }
            for source in sources {
                let url = Url::parse(source)
                    .with_context(|| format!("scope '{}': invalid feed URL {}", scope, source))?;
                if !matches!(url.scheme(), "http" | "https") {
                    bail!("scope '{}': unsupported URL scheme in {}", scope, source);
                }
            }
        }
        Ok(())
    }
}

fn merge_toml(a: &mut toml::Value, b: toml::Value) {
    match (a, b) {
        (toml::Value::Table(a_map), toml::Value::Table(b_map)) => {
            for (k, v) in b_map {
                if let Some(a_val) = a_map.get_mut(&k) {
                    merge_toml(a_val, v);
                } else {
                    a_map.insert(k, v);
                }
            }
        }
        (a_val, b_val) => *a_val = b_val,
    }
}
