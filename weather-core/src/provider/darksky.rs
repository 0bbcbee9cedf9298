use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::{
    config::Config,
    error::ProviderError,
    model::{Coordinates, WeatherRecord},
    provider::{ProviderId, build_http_client, decode_json, require_api_key, unix_to_utc},
};

use super::WeatherProvider;

const ID: ProviderId = ProviderId::DarkSky;

/// Only the `currently` block is requested, in SI units.
const FORECAST_QUERY: [(&str, &str); 3] =
    [("exclude", "minutely,hourly,daily,alerts"), ("lang", "en"), ("units", "si")];

#[derive(Debug, Clone)]
pub struct DarkSkyProvider {
    api_key: String,
    base_url: String,
    target: Coordinates,
    http: Client,
}

impl DarkSkyProvider {
    pub fn connect(config: &Config) -> Result<Self, ProviderError> {
        Ok(Self {
            api_key: require_api_key(ID, config)?,
            base_url: config.base_url(ID).to_string(),
            target: config.target,
            http: build_http_client(ID, config)?,
        })
    }

    /// `{base}/forecast/{key}/{lat},{lon}` with six-decimal coordinates.
    pub fn forecast_url(&self) -> String {
        format!(
            "{}/forecast/{}/{:.6},{:.6}",
            self.base_url, self.api_key, self.target.latitude, self.target.longitude
        )
    }

    #[instrument(skip(self), fields(provider = %ID))]
    async fn fetch_forecast(&self) -> Result<ForecastResponse, ProviderError> {
        let res = self
            .http
            .get(self.forecast_url())
            .query(&FORECAST_QUERY)
            .send()
            .await
            .map_err(|source| ProviderError::Fetch { provider: ID, endpoint: "forecast", source })?;

        decode_json(ID, "forecast", res).await
    }
}

/// Conditions at request time. Absent fields read as zero.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Currently {
    pub time: i64,
    pub summary: String,
    pub icon: String,
    pub temperature: f64,
    pub pressure: f64,
    /// Fraction in 0.0..=1.0.
    pub humidity: f64,
    pub wind_speed: f64,
    pub wind_bearing: i32,
    pub precip_intensity: f64,
    /// Fraction in 0.0..=1.0.
    pub cloud_cover: f64,
    pub uv_index: f64,
}

#[derive(Debug, Deserialize)]
pub struct ForecastResponse {
    #[serde(default)]
    pub latitude: f64,
    #[serde(default)]
    pub longitude: f64,
    #[serde(default)]
    pub timezone: String,
    pub currently: Currently,
}

/// Scale a 0.0..=1.0 fraction to a whole percentage, truncating.
fn fraction_to_pct(fraction: f64) -> u8 {
    (fraction * 100.0) as u8
}

/// Map a forecast response into a record.
///
/// `precipIntensity` is passed through as-is, without the rate conversion applied
/// to OpenWeatherMap rainfall. UV is left at zero.
pub fn map_forecast(forecast: &ForecastResponse) -> WeatherRecord {
    let c = &forecast.currently;

    WeatherRecord {
        temperature_c: c.temperature,
        pressure_hpa: c.pressure,
        humidity_pct: fraction_to_pct(c.humidity),
        condition: c.summary.clone(),
        wind_speed_mps: c.wind_speed,
        wind_deg: f64::from(c.wind_bearing),
        cloudiness_pct: fraction_to_pct(c.cloud_cover),
        rainfall_mmph: c.precip_intensity,
        snowfall_mmph: 0.0,
        uv_index: 0.0,
    }
}

#[async_trait]
impl WeatherProvider for DarkSkyProvider {
    fn id(&self) -> ProviderId {
        ID
    }

    async fn fetch(&self) -> Result<WeatherRecord, ProviderError> {
        let forecast = self.fetch_forecast().await?;

        if let Some(observed_at) = unix_to_utc(forecast.currently.time) {
            debug!(%observed_at, timezone = %forecast.timezone, "Dark Sky observation");
        }

        Ok(map_forecast(&forecast))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: serde_json::Value) -> ForecastResponse {
        serde_json::from_value(json).expect("fixture should decode")
    }

    #[test]
    fn maps_reference_scenario() {
        let forecast = parse(serde_json::json!({
            "latitude": 35.662,
            "longitude": 139.7038,
            "timezone": "Asia/Tokyo",
            "currently": {
                "temperature": 10.0,
                "pressure": 1000,
                "humidity": 0.55,
                "summary": "Rain",
                "windSpeed": 2.0,
                "windBearing": 90,
                "precipIntensity": 0.3,
                "cloudCover": 0.9
            }
        }));

        assert_eq!(
            map_forecast(&forecast),
            WeatherRecord {
                temperature_c: 10.0,
                pressure_hpa: 1000.0,
                humidity_pct: 55,
                condition: "Rain".to_string(),
                wind_speed_mps: 2.0,
                wind_deg: 90.0,
                cloudiness_pct: 90,
                rainfall_mmph: 0.3,
                snowfall_mmph: 0.0,
                uv_index: 0.0,
            }
        );
    }

    #[test]
    fn fractions_scale_to_floor_of_percentage() {
        for fraction in [0.0, 0.01, 0.29, 0.5, 0.999, 1.0] {
            let expected = (fraction * 100.0f64).floor() as u8;
            assert_eq!(fraction_to_pct(fraction), expected, "fraction {fraction}");
        }
    }

    #[test]
    fn uv_index_from_response_is_not_carried_over() {
        let forecast = parse(serde_json::json!({
            "currently": { "summary": "Clear", "uvIndex": 7.0 }
        }));

        let record = map_forecast(&forecast);
        assert_eq!(record.uv_index, 0.0);
        assert_eq!(record.snowfall_mmph, 0.0);
    }

    #[test]
    fn missing_currently_is_a_decode_error() {
        let res: Result<ForecastResponse, _> = serde_json::from_str(
            r#"{"latitude": 35.662, "longitude": 139.7038, "timezone": "Asia/Tokyo"}"#,
        );
        assert!(res.is_err());
    }

    #[test]
    fn forecast_url_uses_six_decimal_coordinates() {
        let mut cfg = Config::default();
        cfg.api_keys.darksky = Some("KEY".to_string());
        cfg.darksky.base_url = "https://api.darksky.net/".to_string();

        let provider = DarkSkyProvider::connect(&cfg).expect("provider should build");
        assert_eq!(
            provider.forecast_url(),
            "https://api.darksky.net/forecast/KEY/35.662000,139.703800"
        );
    }
}
