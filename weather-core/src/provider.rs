use crate::{
    Config, WeatherRecord,
    error::ProviderError,
    provider::{darksky::DarkSkyProvider, openweather::OpenWeatherProvider},
};
use async_trait::async_trait;
use reqwest::{Client, Response};
use std::{fmt::Debug, sync::Arc};

pub mod darksky;
pub mod openweather;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderId {
    OpenWeatherMap,
    DarkSky,
}

impl ProviderId {
    /// Identifier used in logs and as the `node_id` tag of recorded measurements.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::OpenWeatherMap => "openweathermap",
            ProviderId::DarkSky => "darksky",
        }
    }

    pub const fn all() -> &'static [ProviderId] {
        &[ProviderId::OpenWeatherMap, ProviderId::DarkSky]
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One upstream source of current conditions.
///
/// `fetch` performs a single request cycle and maps the result; it never retries.
#[async_trait]
pub trait WeatherProvider: Send + Sync + Debug {
    fn id(&self) -> ProviderId;

    async fn fetch(&self) -> Result<WeatherRecord, ProviderError>;
}

/// Construct and initialize a provider. Errors here are fatal at startup.
pub async fn provider_from_config(
    id: ProviderId,
    config: &Config,
) -> Result<Arc<dyn WeatherProvider>, ProviderError> {
    let provider: Arc<dyn WeatherProvider> = match id {
        ProviderId::OpenWeatherMap => Arc::new(OpenWeatherProvider::connect(config).await?),
        ProviderId::DarkSky => Arc::new(DarkSkyProvider::connect(config)?),
    };

    Ok(provider)
}

fn require_api_key(id: ProviderId, config: &Config) -> Result<String, ProviderError> {
    config
        .provider_api_key(id)
        .map(str::to_owned)
        .ok_or(ProviderError::MissingApiKey { provider: id })
}

fn build_http_client(id: ProviderId, config: &Config) -> Result<Client, ProviderError> {
    Client::builder()
        .timeout(config.request_timeout())
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|source| ProviderError::Client { provider: id, source })
}

/// Read a response body and decode it, classifying every failure.
async fn decode_json<T: serde::de::DeserializeOwned>(
    provider: ProviderId,
    endpoint: &'static str,
    res: Response,
) -> Result<T, ProviderError> {
    let status = res.status();
    let body = res
        .text()
        .await
        .map_err(|source| ProviderError::Fetch { provider, endpoint, source })?;

    if !status.is_success() {
        return Err(ProviderError::Status {
            provider,
            endpoint,
            status,
            body: truncate_body(&body),
        });
    }

    serde_json::from_str(&body).map_err(|source| ProviderError::Decode { provider, endpoint, source })
}

fn unix_to_utc(ts: i64) -> Option<chrono::DateTime<chrono::Utc>> {
    chrono::DateTime::from_timestamp(ts, 0)
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    if body.len() > MAX {
        let mut end = MAX;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &body[..end])
    } else {
        body.to_string()
    }
}
