//! Core library for the `weather-exporter` daemon.
//!
//! This crate defines:
//! - Configuration (config file, build-time API keys, environment overrides)
//! - Provider adapters that normalize OpenWeatherMap and Dark Sky responses
//! - The measurement recorder and its OpenTelemetry exporter
//! - The polling loop tying providers and recorder together
//!
//! It is used by `weather-exporter`, but the adapters and mapping functions can
//! be reused on their own.

pub mod config;
pub mod error;
pub mod metrics;
pub mod model;
pub mod poller;
pub mod provider;

pub use config::{Config, MetricsConfig};
pub use error::{ErrorKind, ExporterError, ProviderError, RecordError};
pub use metrics::{MeasurementSink, Recorder};
pub use model::{Coordinates, WeatherRecord};
pub use poller::{PollSchedule, PollSummary};
pub use provider::{ProviderId, WeatherProvider, provider_from_config};
