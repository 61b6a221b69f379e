//! Global eventmap configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono_tz::Tz;
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::constants::{
    DEFAULT_CACHE_NAMESPACE, DEFAULT_CACHE_TTL_SECS, DEFAULT_FETCH_CONCURRENCY,
    DEFAULT_GEOCODE_CONCURRENCY, DEFAULT_GEOCODE_TIMEOUT, GEOCODE_FAILURE_TTL_SECS,
    GEOCODE_NOT_FOUND_TTL_SECS, GEOCODE_RESOLVED_TTL_SECS,
};
use crate::error::{EventMapError, EventMapResult};

/// Environment overrides look like `EVENTMAP__GEOCODER__API_KEY`.
const ENV_PREFIX: &str = "EVENTMAP";

/// Configuration at ~/.config/eventmap/config.toml, overridable from the environment.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// IANA zone that human-written listing times are interpreted in
    pub timezone: Option<String>,
    pub cache: CacheConfig,
    pub geocoder: GeocoderConfig,
    pub aggregator: AggregatorConfig,
    pub google: GoogleConfig,
    /// Names of `eventmap-provider-<name>` binaries to register as sources
    pub external_providers: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheKind {
    /// REST backend when url and token are present, otherwise disabled
    #[default]
    Auto,
    Rest,
    Memory,
    Disabled,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub kind: CacheKind,
    pub url: Option<String>,
    pub token: Option<String>,
    pub namespace: String,
    pub default_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            kind: CacheKind::Auto,
            url: None,
            token: None,
            namespace: DEFAULT_CACHE_NAMESPACE.to_string(),
            default_ttl_secs: DEFAULT_CACHE_TTL_SECS,
        }
    }
}

impl CacheConfig {
    /// `(url, token)` when both are set and non-empty.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        let url = self.url.as_deref().filter(|s| !s.trim().is_empty())?;
        let token = self.token.as_deref().filter(|s| !s.trim().is_empty())?;
        Some((url, token))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeocoderConfig {
    pub api_key: Option<String>,
    /// Override for the geocoding endpoint (tests, proxies)
    pub endpoint: Option<String>,
    pub timeout_secs: u64,
    pub concurrency: usize,
    pub resolved_ttl_secs: u64,
    pub not_found_ttl_secs: u64,
    pub failure_ttl_secs: u64,
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        GeocoderConfig {
            api_key: None,
            endpoint: None,
            timeout_secs: DEFAULT_GEOCODE_TIMEOUT.as_secs(),
            concurrency: DEFAULT_GEOCODE_CONCURRENCY,
            resolved_ttl_secs: GEOCODE_RESOLVED_TTL_SECS,
            not_found_ttl_secs: GEOCODE_NOT_FOUND_TTL_SECS,
            failure_ttl_secs: GEOCODE_FAILURE_TTL_SECS,
        }
    }
}

impl GeocoderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    /// Maximum number of composite-source pieces fetched at once
    pub concurrency: usize,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        AggregatorConfig {
            concurrency: DEFAULT_FETCH_CONCURRENCY,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GoogleConfig {
    pub api_key: Option<String>,
}

impl AppConfig {
    pub fn config_path() -> EventMapResult<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| EventMapError::Config("Could not determine config directory".into()))?
            .join("eventmap");

        Ok(config_dir.join("config.toml"))
    }

    /// Load from the default config path and the environment.
    pub fn load() -> EventMapResult<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load from a specific file (which may be missing) and the environment.
    pub fn load_from(path: &Path) -> EventMapResult<Self> {
        let expanded = shellexpand::tilde(&path.to_string_lossy()).into_owned();

        Config::builder()
            .add_source(File::from(PathBuf::from(expanded)).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()
            .map_err(|e| EventMapError::Config(e.to_string()))?
            .try_deserialize()
            .map_err(|e| EventMapError::Config(e.to_string()))
    }

    /// The configured zone, or UTC when unset or unknown.
    pub fn tz(&self) -> Tz {
        match self.timezone.as_deref() {
            None => Tz::UTC,
            Some(name) => name.parse().unwrap_or_else(|_| {
                tracing::warn!(timezone = name, "unknown timezone, using UTC");
                Tz::UTC
            }),
        }
    }

    /// Create a default config file with all options commented out.
    pub fn create_default_config(path: &Path) -> EventMapResult<()> {
        let contents = format!(
            "\
# eventmap configuration
# Every value can also be set from the environment, e.g. EVENTMAP__GEOCODER__API_KEY

# Zone that human-written listing times are read in:
# timezone = \"America/New_York\"

# Extra source types served by eventmap-provider-<name> binaries on PATH:
# external_providers = [\"meetup\"]

[cache]
# kind = \"auto\"            # auto | rest | memory | disabled
# url = \"https://your-db.upstash.io\"
# token = \"...\"
# namespace = \"{DEFAULT_CACHE_NAMESPACE}\"
# default_ttl_secs = {DEFAULT_CACHE_TTL_SECS}

[geocoder]
# api_key = \"...\"
# timeout_secs = {}
# concurrency = {DEFAULT_GEOCODE_CONCURRENCY}

[aggregator]
# concurrency = {DEFAULT_FETCH_CONCURRENCY}

[google]
# api_key = \"...\"
",
            DEFAULT_GEOCODE_TIMEOUT.as_secs()
        );

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                EventMapError::Config(format!("Could not create config directory: {e}"))
            })?;
        }

        std::fs::write(path, contents)
            .map_err(|e| EventMapError::Config(format!("Could not write config file: {e}")))?;

        Ok(())
    }
}
