use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

use crate::{
    config::Config,
    error::ProviderError,
    model::{Coordinates, WeatherRecord},
    provider::{ProviderId, build_http_client, decode_json, require_api_key, unix_to_utc},
};

use super::WeatherProvider;

/// OpenWeatherMap keys are 32 hex characters.
const API_KEY_LEN: usize = 32;

const ID: ProviderId = ProviderId::OpenWeatherMap;

#[derive(Debug, Clone)]
pub struct OpenWeatherProvider {
    api_key: String,
    base_url: String,
    target: Coordinates,
    http: Client,
    /// Fetched once at startup and reused for every tick.
    uv_index: f64,
}

impl OpenWeatherProvider {
    /// Build the client and take the initial UV reading.
    ///
    /// A failed UV request only logs a warning; key and client problems are returned.
    pub async fn connect(config: &Config) -> Result<Self, ProviderError> {
        let api_key = require_api_key(ID, config)?;
        if api_key.len() != API_KEY_LEN {
            return Err(ProviderError::InvalidApiKey {
                provider: ID,
                expected: API_KEY_LEN,
                actual: api_key.len(),
            });
        }

        let mut provider = Self {
            api_key,
            base_url: config.base_url(ID).to_string(),
            target: config.target,
            http: build_http_client(ID, config)?,
            uv_index: 0.0,
        };

        match provider.fetch_uv().await {
            Ok(uv) => {
                info!(uv_index = uv.value, "Fetched initial UV index from OpenWeatherMap");
                provider.uv_index = uv.value;
            }
            Err(e) => warn!(error = %e, "Failed to fetch UV index; reporting 0 until restart"),
        }

        Ok(provider)
    }

    pub fn uv_index(&self) -> f64 {
        self.uv_index
    }

    fn coordinate_query(&self) -> [(&'static str, String); 3] {
        [
            ("lat", self.target.latitude.to_string()),
            ("lon", self.target.longitude.to_string()),
            ("appid", self.api_key.clone()),
        ]
    }

    #[instrument(skip(self), fields(provider = %ID))]
    async fn fetch_current(&self) -> Result<OwCurrentResponse, ProviderError> {
        let url = format!("{}/weather", self.base_url);

        let res = self
            .http
            .get(url)
            .query(&self.coordinate_query())
            .query(&[("units", "metric"), ("lang", "en")])
            .send()
            .await
            .map_err(|source| ProviderError::Fetch { provider: ID, endpoint: "weather", source })?;

        decode_json(ID, "weather", res).await
    }

    #[instrument(skip(self), fields(provider = %ID))]
    async fn fetch_uv(&self) -> Result<OwUvResponse, ProviderError> {
        let url = format!("{}/uvi", self.base_url);

        let res = self
            .http
            .get(url)
            .query(&self.coordinate_query())
            .send()
            .await
            .map_err(|source| ProviderError::Fetch { provider: ID, endpoint: "uvi", source })?;

        decode_json(ID, "uvi", res).await
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct OwMain {
    pub temp: f64,
    pub pressure: f64,
    pub humidity: u8,
}

#[derive(Debug, Deserialize)]
pub struct OwWeather {
    pub main: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct OwWind {
    #[serde(default)]
    pub speed: f64,
    #[serde(default)]
    pub deg: f64,
}

#[derive(Debug, Default, Deserialize)]
pub struct OwClouds {
    #[serde(default)]
    pub all: u8,
}

#[derive(Debug, Default, Deserialize)]
pub struct OwRain {
    /// Accumulated rainfall over the last three hours, in mm.
    #[serde(rename = "3h", default)]
    pub three_h: f64,
}

/// Subset of `/data/2.5/weather` used for mapping.
#[derive(Debug, Deserialize)]
pub struct OwCurrentResponse {
    #[serde(default)]
    pub dt: Option<i64>,
    pub main: OwMain,
    #[serde(default)]
    pub weather: Vec<OwWeather>,
    #[serde(default)]
    pub wind: OwWind,
    #[serde(default)]
    pub clouds: OwClouds,
    #[serde(default)]
    pub rain: Option<OwRain>,
}

#[derive(Debug, Deserialize)]
pub struct OwUvResponse {
    pub value: f64,
}

/// Map a current-conditions response plus the UV reading into a record.
///
/// Rainfall is reported as a three-hour total; dividing by three yields an hourly rate.
pub fn map_current(current: &OwCurrentResponse, uv_index: f64) -> WeatherRecord {
    let condition = current
        .weather
        .first()
        .map(|w| w.main.clone())
        .unwrap_or_else(|| "Unknown".to_string());

    WeatherRecord {
        temperature_c: current.main.temp,
        pressure_hpa: current.main.pressure,
        humidity_pct: current.main.humidity,
        condition,
        wind_speed_mps: current.wind.speed,
        wind_deg: current.wind.deg,
        cloudiness_pct: current.clouds.all,
        rainfall_mmph: current.rain.as_ref().map_or(0.0, |r| r.three_h / 3.0),
        snowfall_mmph: 0.0,
        uv_index,
    }
}

#[async_trait]
impl WeatherProvider for OpenWeatherProvider {
    fn id(&self) -> ProviderId {
        ID
    }

    async fn fetch(&self) -> Result<WeatherRecord, ProviderError> {
        let current = self.fetch_current().await?;

        if let Some(observed_at) = current.dt.and_then(unix_to_utc) {
            debug!(%observed_at, "OpenWeatherMap observation");
        }

        Ok(map_current(&current, self.uv_index))
    }
}
