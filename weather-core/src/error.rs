use reqwest::StatusCode;
use thiserror::Error;

use crate::provider::ProviderId;

/// Coarse classification used when logging and in tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Provider could not be set up. Fatal at startup.
    Init,
    /// The HTTP exchange failed or returned a non-success status.
    Fetch,
    /// The response body did not match the expected schema.
    Decode,
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error(
        "No API key configured for provider '{provider}'.\n\
         Hint: rebuild with the provider's API key exported in the build environment."
    )]
    MissingApiKey { provider: ProviderId },

    #[error("API key for provider '{provider}' is malformed: expected {expected} characters, got {actual}")]
    InvalidApiKey { provider: ProviderId, expected: usize, actual: usize },

    #[error("Failed to build HTTP client for {provider}")]
    Client {
        provider: ProviderId,
        #[source]
        source: reqwest::Error,
    },

    #[error("Failed to send request to {provider} ({endpoint})")]
    Fetch {
        provider: ProviderId,
        endpoint: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{provider} {endpoint} request failed with status {status}: {body}")]
    Status { provider: ProviderId, endpoint: &'static str, status: StatusCode, body: String },

    #[error("Failed to parse {provider} {endpoint} JSON")]
    Decode {
        provider: ProviderId,
        endpoint: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl ProviderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProviderError::MissingApiKey { .. }
            | ProviderError::InvalidApiKey { .. }
            | ProviderError::Client { .. } => ErrorKind::Init,
            ProviderError::Fetch { .. } | ProviderError::Status { .. } => ErrorKind::Fetch,
            ProviderError::Decode { .. } => ErrorKind::Decode,
        }
    }

    pub fn provider(&self) -> ProviderId {
        match self {
            ProviderError::MissingApiKey { provider }
            | ProviderError::InvalidApiKey { provider, .. }
            | ProviderError::Client { provider, .. }
            | ProviderError::Fetch { provider, .. }
            | ProviderError::Status { provider, .. }
            | ProviderError::Decode { provider, .. } => *provider,
        }
    }
}

/// Render an error and its sources as `outer: inner: root`.
pub fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut msg = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        msg.push_str(": ");
        msg.push_str(&cause.to_string());
        source = cause.source();
    }
    msg
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("invalid tag value {value:?} for key '{key}': {reason}")]
    InvalidTag { key: &'static str, value: String, reason: &'static str },
}

#[derive(Debug, Error)]
pub enum ExporterError {
    #[error(
        "No monitoring project configured.\n\
         Hint: export GOOGLE_CLOUD_PROJECT or set `metrics.project_id` in the config file."
    )]
    MissingProjectId,

    #[error("reporting period must be at least {min}s, got {actual}s")]
    ReportingPeriodTooShort { min: u64, actual: u64 },

    #[error("Failed to build OTLP metric exporter: {0}")]
    Build(String),
}
