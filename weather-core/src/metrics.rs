//! Measurement definitions and the recorder that turns a [`WeatherRecord`]
//! into a batch of tagged measurements.
//!
//! The recorder only knows about the [`MeasurementSink`] trait. The
//! OpenTelemetry-backed sink lives in [`exporter`].

use std::{fmt::Debug, sync::Arc};

use tracing::{debug, error};

use crate::{error::RecordError, model::WeatherRecord};

pub mod exporter;

/// Tag key carrying the polling source on every recording.
pub const KEY_NODE_ID: &str = "node_id";

/// Longest tag value the backend accepts.
const MAX_TAG_VALUE_LEN: usize = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    F64,
    I64,
}

/// A named, unit-tagged measurement channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Measure {
    Temperature,
    Pressure,
    Humidity,
    WindSpeed,
    WindDeg,
}

impl Measure {
    pub const ALL: [Measure; 5] = [
        Measure::Temperature,
        Measure::Pressure,
        Measure::Humidity,
        Measure::WindSpeed,
        Measure::WindDeg,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Measure::Temperature => "temperature",
            Measure::Pressure => "pressure",
            Measure::Humidity => "humidity",
            Measure::WindSpeed => "windspeed",
            Measure::WindDeg => "winddeg",
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            Measure::Temperature => "C",
            Measure::Pressure => "hPa",
            Measure::Humidity => "%",
            Measure::WindSpeed => "mps",
            Measure::WindDeg => "degree",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Measure::Temperature => "air temperature",
            Measure::Pressure => "barometric pressure",
            Measure::Humidity => "air humidity",
            Measure::WindSpeed => "wind speed",
            Measure::WindDeg => "wind degree from North",
        }
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            Measure::Humidity => ValueKind::I64,
            _ => ValueKind::F64,
        }
    }

    pub fn f64(self, value: f64) -> Measurement {
        Measurement { measure: self, value: MeasureValue::F64(value) }
    }

    pub fn i64(self, value: i64) -> Measurement {
        Measurement { measure: self, value: MeasureValue::I64(value) }
    }
}

/// Measures with an export view. The humidity view is disabled and wind
/// direction is declared without one.
pub const REGISTERED_VIEWS: [Measure; 3] = [Measure::Temperature, Measure::Pressure, Measure::WindSpeed];

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MeasureValue {
    F64(f64),
    I64(i64),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    pub measure: Measure,
    pub value: MeasureValue,
}

/// A validated tag value: non-empty printable ASCII, at most 255 bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagValue(String);

impl TagValue {
    pub fn new(key: &'static str, value: &str) -> Result<Self, RecordError> {
        let reason = if value.is_empty() {
            Some("value is empty")
        } else if value.len() > MAX_TAG_VALUE_LEN {
            Some("value is longer than 255 bytes")
        } else if !value.bytes().all(|b| b.is_ascii_graphic() || b == b' ') {
            Some("value contains non-printable or non-ASCII characters")
        } else {
            None
        };

        match reason {
            Some(reason) => Err(RecordError::InvalidTag { key, value: value.to_string(), reason }),
            None => Ok(Self(value.to_string())),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub key: &'static str,
    pub value: TagValue,
}

/// Destination for recorded measurements.
///
/// `submit` must not block: implementations buffer and export on their own schedule.
pub trait MeasurementSink: Send + Sync + Debug {
    fn submit(&self, tags: &[Tag], batch: &[Measurement]);
}

/// Records the exported subset of a [`WeatherRecord`].
#[derive(Debug, Clone)]
pub struct Recorder {
    sink: Arc<dyn MeasurementSink>,
}

impl Recorder {
    pub fn new(sink: Arc<dyn MeasurementSink>) -> Self {
        Self { sink }
    }

    /// Submit temperature, pressure, humidity and wind speed tagged with `source`.
    ///
    /// Wind direction, cloudiness, rainfall, snowfall and UV are never recorded.
    pub fn record(&self, source: &str, record: &WeatherRecord) -> Result<(), RecordError> {
        let value = TagValue::new(KEY_NODE_ID, source).inspect_err(|e| {
            error!(source, error = %e, "Failed to insert tag");
        })?;
        let tags = [Tag { key: KEY_NODE_ID, value }];

        let batch = [
            Measure::Temperature.f64(record.temperature_c),
            Measure::Pressure.f64(record.pressure_hpa),
            Measure::Humidity.i64(i64::from(record.humidity_pct)),
            Measure::WindSpeed.f64(record.wind_speed_mps),
        ];

        self.sink.submit(&tags, &batch);
        debug!(source, measurements = batch.len(), "Recorded weather measurements");
        Ok(())
    }
}
