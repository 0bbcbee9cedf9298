/// A latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// Shibuya, Tokyo, Japan.
pub const TARGET_LOCATION: Coordinates = Coordinates { latitude: 35.6620, longitude: 139.7038 };

/// Provider-independent reading built once per poll tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WeatherRecord {
    pub temperature_c: f64,
    pub pressure_hpa: f64,
    pub humidity_pct: u8,
    pub condition: String,
    pub wind_speed_mps: f64,
    /// Degrees clockwise from north.
    pub wind_deg: f64,
    pub cloudiness_pct: u8,
    pub rainfall_mmph: f64,
    /// Neither provider mapping fills this in.
    pub snowfall_mmph: f64,
    /// Only reported by OpenWeatherMap.
    pub uv_index: f64,
}
