//! OpenTelemetry metrics pipeline: OTLP exporter, resource labels and the
//! gauge-backed [`MeasurementSink`].
//!
//! The pipeline pushes to an OTLP collector on a fixed reporting period; the
//! collector forwards the series to Cloud Monitoring under
//! `custom.googleapis.com/<measure>`.

use std::{collections::HashMap, time::Duration};

use opentelemetry::{
    KeyValue,
    metrics::{Gauge, Meter, MeterProvider as _},
};
use opentelemetry_otlp::{MetricExporter, WithExportConfig};
use opentelemetry_sdk::{
    Resource,
    metrics::{PeriodicReader, SdkMeterProvider},
};
use tracing::{error, info, trace};

use crate::{
    config::MetricsConfig,
    error::ExporterError,
    metrics::{Measure, MeasureValue, Measurement, MeasurementSink, REGISTERED_VIEWS, Tag, ValueKind},
};

/// The backend rejects writes to one series more often than once a minute.
pub const MIN_REPORTING_PERIOD: Duration = Duration::from_secs(60);

const SERVICE_NAME: &str = "weather-exporter";

/// Label attached to every exported series.
const DEFAULT_LABEL: (&str, &str) = ("source", "weather-api");

/// Fully-qualified metric type for a measure, e.g. `custom.googleapis.com/temperature`.
pub fn metric_type(prefix: &str, measure: Measure) -> String {
    format!("{}/{}", prefix.trim_end_matches('/'), measure.name())
}

/// Labels of the monitored resource all series are written against.
pub fn resource_labels(config: &MetricsConfig) -> Vec<KeyValue> {
    vec![
        KeyValue::new("location", config.location.clone()),
        KeyValue::new("namespace", config.namespace.clone()),
        KeyValue::new("node_id", config.node_id.clone()),
    ]
}

/// Check the settings the backend insists on and return the project id.
fn validate(config: &MetricsConfig) -> Result<String, ExporterError> {
    let project_id = config
        .project_id
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .ok_or(ExporterError::MissingProjectId)?;

    if config.reporting_period() < MIN_REPORTING_PERIOD {
        return Err(ExporterError::ReportingPeriodTooShort {
            min: MIN_REPORTING_PERIOD.as_secs(),
            actual: config.reporting_period_secs,
        });
    }

    Ok(project_id.to_string())
}

/// Build the exporter pipeline and register the export views.
///
/// Keep the returned guard alive for the lifetime of the process; shutting it
/// down flushes whatever is still buffered.
pub fn init_exporter(config: &MetricsConfig) -> Result<(ExporterGuard, OtelSink), ExporterError> {
    let project_id = validate(config)?;

    let exporter = MetricExporter::builder()
        .with_tonic()
        .with_endpoint(&config.endpoint)
        .with_timeout(config.export_timeout())
        .build()
        .map_err(|e| ExporterError::Build(e.to_string()))?;

    let reader = PeriodicReader::builder(exporter)
        .with_interval(config.reporting_period())
        .build();

    let resource = Resource::builder()
        .with_service_name(SERVICE_NAME)
        .with_attributes(resource_labels(config))
        .with_attribute(KeyValue::new("gcp.project_id", project_id.clone()))
        .build();

    let provider = SdkMeterProvider::builder()
        .with_reader(reader)
        .with_resource(resource)
        .build();

    let sink = OtelSink::new(&provider.meter(SERVICE_NAME), &config.metric_prefix);

    info!(
        project_id = %project_id,
        endpoint = %config.endpoint,
        reporting_period_secs = config.reporting_period_secs,
        views = ?sink.views(),
        "Metrics exporter initialized"
    );

    Ok((ExporterGuard { provider: Some(provider) }, sink))
}

/// Flushes and shuts the meter provider down exactly once, on `shutdown` or drop.
pub struct ExporterGuard {
    provider: Option<SdkMeterProvider>,
}

impl std::fmt::Debug for ExporterGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExporterGuard")
            .field("active", &self.provider.is_some())
            .finish_non_exhaustive()
    }
}

impl ExporterGuard {
    /// Blocks until the final export completes; call from a blocking context.
    pub fn shutdown(mut self) {
        self.flush_and_close();
    }

    fn flush_and_close(&mut self) {
        if let Some(provider) = self.provider.take() {
            match provider.shutdown() {
                Ok(()) => info!("Metrics exporter flushed and shut down"),
                Err(e) => error!(error = %e, "Failed to flush metrics exporter"),
            }
        }
    }
}

impl Drop for ExporterGuard {
    fn drop(&mut self) {
        self.flush_and_close();
    }
}

enum Instrument {
    F64(Gauge<f64>),
    I64(Gauge<i64>),
}

/// Last-value gauges, one per registered view.
pub struct OtelSink {
    instruments: HashMap<Measure, Instrument>,
    default_labels: Vec<KeyValue>,
}

impl std::fmt::Debug for OtelSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OtelSink").field("views", &self.views()).finish_non_exhaustive()
    }
}

impl OtelSink {
    pub fn new(meter: &Meter, prefix: &str) -> Self {
        let instruments = REGISTERED_VIEWS
            .iter()
            .map(|&measure| {
                let name = metric_type(prefix, measure);
                let instrument = match measure.kind() {
                    ValueKind::F64 => Instrument::F64(
                        meter
                            .f64_gauge(name)
                            .with_description(measure.description())
                            .with_unit(measure.unit())
                            .build(),
                    ),
                    ValueKind::I64 => Instrument::I64(
                        meter
                            .i64_gauge(name)
                            .with_description(measure.description())
                            .with_unit(measure.unit())
                            .build(),
                    ),
                };
                (measure, instrument)
            })
            .collect();

        Self {
            instruments,
            default_labels: vec![KeyValue::new(DEFAULT_LABEL.0, DEFAULT_LABEL.1)],
        }
    }

    /// Short names of the registered views, in registration order.
    pub fn views(&self) -> Vec<&'static str> {
        REGISTERED_VIEWS
            .iter()
            .filter(|m| self.instruments.contains_key(*m))
            .map(Measure::name)
            .collect()
    }
}

impl MeasurementSink for OtelSink {
    fn submit(&self, tags: &[Tag], batch: &[Measurement]) {
        let mut attributes = self.default_labels.clone();
        attributes.extend(tags.iter().map(|t| KeyValue::new(t.key, t.value.as_str().to_string())));

        for m in batch {
            match (self.instruments.get(&m.measure), m.value) {
                (Some(Instrument::F64(gauge)), MeasureValue::F64(v)) => gauge.record(v, &attributes),
                (Some(Instrument::I64(gauge)), MeasureValue::I64(v)) => gauge.record(v, &attributes),
                (Some(_), _) => error!(measure = m.measure.name(), "Value type does not match view"),
                (None, _) => trace!(measure = m.measure.name(), "No view registered; dropping"),
            }
        }
    }
}
