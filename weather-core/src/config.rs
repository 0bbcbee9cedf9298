use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, path::PathBuf, time::Duration};

use crate::{
    model::{Coordinates, TARGET_LOCATION},
    provider::ProviderId,
};

/// Environment variable holding the monitoring project id.
pub const PROJECT_ID_ENV: &str = "GOOGLE_CLOUD_PROJECT";

/// API keys baked in at build time.
///
/// Set `OWM_API_KEY` and `DARK_SKY_API_KEY` in the environment of `cargo build`.
#[derive(Clone, Default)]
pub struct ApiKeys {
    pub openweathermap: Option<String>,
    pub darksky: Option<String>,
}

impl ApiKeys {
    pub fn from_build() -> Self {
        Self {
            openweathermap: non_empty(option_env!("OWM_API_KEY")),
            darksky: non_empty(option_env!("DARK_SKY_API_KEY")),
        }
    }
}

// Keys must never end up in logs.
impl std::fmt::Debug for ApiKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKeys")
            .field("openweathermap", &self.openweathermap.as_ref().map(|_| "<redacted>"))
            .field("darksky", &self.darksky.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty()).map(|v| v.trim().to_string())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenWeatherConfig {
    pub base_url: String,
    pub poll_interval_secs: u64,
}

impl Default for OpenWeatherConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openweathermap.org/data/2.5".to_string(),
            // The free tier refreshes its data far less often, but polling is cheap.
            poll_interval_secs: 15,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DarkSkyConfig {
    pub base_url: String,
    pub poll_interval_secs: u64,
}

impl Default for DarkSkyConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.darksky.net".to_string(),
            // Free tier allows 1000 calls per day.
            poll_interval_secs: 90,
        }
    }
}

/// Monitoring backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Cloud project receiving the time series. Usually taken from `GOOGLE_CLOUD_PROJECT`.
    pub project_id: Option<String>,
    /// OTLP collector endpoint (gRPC).
    pub endpoint: String,
    pub location: String,
    pub namespace: String,
    pub node_id: String,
    pub metric_prefix: String,
    /// Must not be shorter than 60 seconds.
    pub reporting_period_secs: u64,
    pub export_timeout_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            project_id: None,
            endpoint: "http://localhost:4317".to_string(),
            location: "asia-northeast1-a".to_string(),
            namespace: "weather-exporter".to_string(),
            node_id: "public-data".to_string(),
            metric_prefix: "custom.googleapis.com".to_string(),
            reporting_period_secs: 60,
            export_timeout_secs: 30,
        }
    }
}

impl MetricsConfig {
    pub fn reporting_period(&self) -> Duration {
        Duration::from_secs(self.reporting_period_secs)
    }

    pub fn export_timeout(&self) -> Duration {
        Duration::from_secs(self.export_timeout_secs)
    }
}

/// Top-level configuration, built once at startup and passed by reference.
///
/// Example TOML (every key is optional):
/// ```toml
/// request_timeout_secs = 10
///
/// [darksky]
/// poll_interval_secs = 120
///
/// [metrics]
/// endpoint = "http://otel-collector:4317"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Fixed polling target; not read from the file.
    #[serde(skip)]
    pub target: Coordinates,

    #[serde(skip)]
    pub api_keys: ApiKeys,

    /// Upper bound for every outbound provider request.
    pub request_timeout_secs: u64,

    /// Fallback tracing filter when `RUST_LOG` is unset.
    pub log_filter: String,

    pub openweathermap: OpenWeatherConfig,
    pub darksky: DarkSkyConfig,
    pub metrics: MetricsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            target: TARGET_LOCATION,
            api_keys: ApiKeys::default(),
            request_timeout_secs: 10,
            log_filter: "info,weather_core=debug,weather_exporter=debug".to_string(),
            openweathermap: OpenWeatherConfig::default(),
            darksky: DarkSkyConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Config {
    /// Load config from disk (or defaults when no file exists yet), then apply
    /// build-time API keys and environment overrides.
    pub fn load() -> Result<Self> {
        let path = Self::config_file_path()?;
        let mut cfg = Self::load_from(&path)?;
        cfg.api_keys = ApiKeys::from_build();
        cfg.apply_env(|key| std::env::var(key).ok());
        Ok(cfg)
    }

    /// Parse a config file, returning defaults if it doesn't exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let cfg: Config = toml::from_str(contents)?;
        Ok(cfg)
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "weather-task", "weather-exporter")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Override file values from the environment. `lookup` is `std::env::var` in production.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(project) = lookup(PROJECT_ID_ENV).filter(|p| !p.trim().is_empty()) {
            self.metrics.project_id = Some(project);
        }
    }

    /// Returns API key for a provider, if present.
    pub fn provider_api_key(&self, provider_id: ProviderId) -> Option<&str> {
        match provider_id {
            ProviderId::OpenWeatherMap => self.api_keys.openweathermap.as_deref(),
            ProviderId::DarkSky => self.api_keys.darksky.as_deref(),
        }
    }

    pub fn poll_interval(&self, provider_id: ProviderId) -> Duration {
        let secs = match provider_id {
            ProviderId::OpenWeatherMap => self.openweathermap.poll_interval_secs,
            ProviderId::DarkSky => self.darksky.poll_interval_secs,
        };
        // tokio intervals panic on a zero period
        Duration::from_secs(secs.max(1))
    }

    pub fn base_url(&self, provider_id: ProviderId) -> &str {
        let url = match provider_id {
            ProviderId::OpenWeatherMap => &self.openweathermap.base_url,
            ProviderId::DarkSky => &self.darksky.base_url,
        };
        url.trim_end_matches('/')
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
