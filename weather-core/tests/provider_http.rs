//! Provider adapters against a mock HTTP server.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use weather_core::{
    Config, ErrorKind, MeasurementSink, ProviderId, Recorder, WeatherProvider, WeatherRecord,
    metrics::{Measure, Measurement, Tag},
    provider::{darksky::DarkSkyProvider, openweather::OpenWeatherProvider},
    provider_from_config,
};
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path, query_param},
};

const OWM_KEY: &str = "0123456789abcdef0123456789abcdef";
const DARK_SKY_KEY: &str = "darkskytestkey";
const FORECAST_PATH: &str = "/forecast/darkskytestkey/35.662000,139.703800";

fn config_for(server: &MockServer) -> Config {
    let mut cfg = Config::default();
    cfg.api_keys.openweathermap = Some(OWM_KEY.to_string());
    cfg.api_keys.darksky = Some(DARK_SKY_KEY.to_string());
    cfg.openweathermap.base_url = server.uri();
    cfg.darksky.base_url = server.uri();
    cfg.request_timeout_secs = 1;
    cfg
}

fn owm_current_body() -> serde_json::Value {
    serde_json::json!({
        "coord": { "lon": 139.7038, "lat": 35.662 },
        "weather": [{ "id": 803, "main": "Clouds", "description": "broken clouds", "icon": "04d" }],
        "main": { "temp": 15.2, "feels_like": 14.6, "pressure": 1013, "humidity": 60 },
        "wind": { "speed": 3.1, "deg": 180 },
        "clouds": { "all": 80 },
        "rain": { "3h": 1.5 },
        "dt": 1_560_350_645,
        "name": "Shibuya"
    })
}

fn uv_body(value: f64) -> serde_json::Value {
    serde_json::json!({
        "lat": 35.662,
        "lon": 139.7038,
        "date_iso": "2019-06-12T12:00:00Z",
        "date": 1_560_340_800,
        "value": value
    })
}

fn forecast_body() -> serde_json::Value {
    serde_json::json!({
        "latitude": 35.662,
        "longitude": 139.7038,
        "timezone": "Asia/Tokyo",
        "currently": {
            "time": 1_560_350_645,
            "summary": "Rain",
            "icon": "rain",
            "temperature": 10.0,
            "pressure": 1000,
            "humidity": 0.55,
            "windSpeed": 2.0,
            "windBearing": 90,
            "precipIntensity": 0.3,
            "cloudCover": 0.9,
            "uvIndex": 3
        }
    })
}

async fn mount_uv(server: &MockServer, response: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path("/uvi"))
        .and(query_param("lat", "35.662"))
        .and(query_param("lon", "139.7038"))
        .and(query_param("appid", OWM_KEY))
        .respond_with(response)
        .mount(server)
        .await;
}

async fn mount_current(server: &MockServer, response: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path("/weather"))
        .and(query_param("lat", "35.662"))
        .and(query_param("lon", "139.7038"))
        .and(query_param("units", "metric"))
        .and(query_param("appid", OWM_KEY))
        .respond_with(response)
        .mount(server)
        .await;
}

async fn mount_forecast(server: &MockServer, response: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path(FORECAST_PATH))
        .and(query_param("exclude", "minutely,hourly,daily,alerts"))
        .and(query_param("lang", "en"))
        .and(query_param("units", "si"))
        .respond_with(response)
        .mount(server)
        .await;
}

#[derive(Debug, Default)]
struct CaptureSink {
    batches: Mutex<Vec<(Vec<Tag>, Vec<Measurement>)>>,
}

impl MeasurementSink for CaptureSink {
    fn submit(&self, tags: &[Tag], batch: &[Measurement]) {
        self.batches.lock().unwrap().push((tags.to_vec(), batch.to_vec()));
    }
}

// ============================================================================
// OpenWeatherMap
// ============================================================================

#[tokio::test]
async fn owm_fetch_maps_current_conditions_and_initial_uv() {
    let server = MockServer::start().await;
    mount_uv(&server, ResponseTemplate::new(200).set_body_json(uv_body(4.2))).await;
    mount_current(&server, ResponseTemplate::new(200).set_body_json(owm_current_body())).await;

    let provider = OpenWeatherProvider::connect(&config_for(&server))
        .await
        .expect("connect should succeed");
    assert_eq!(provider.uv_index(), 4.2);

    let record = provider.fetch().await.expect("fetch should succeed");
    assert_eq!(
        record,
        WeatherRecord {
            temperature_c: 15.2,
            pressure_hpa: 1013.0,
            humidity_pct: 60,
            condition: "Clouds".to_string(),
            wind_speed_mps: 3.1,
            wind_deg: 180.0,
            cloudiness_pct: 80,
            rainfall_mmph: 0.5,
            snowfall_mmph: 0.0,
            uv_index: 4.2,
        }
    );
}

#[tokio::test]
async fn owm_connect_survives_uv_failure() {
    let server = MockServer::start().await;
    mount_uv(&server, ResponseTemplate::new(500).set_body_string("upstream down")).await;

    let provider = OpenWeatherProvider::connect(&config_for(&server))
        .await
        .expect("UV failure is not fatal");
    assert_eq!(provider.uv_index(), 0.0);
}

#[tokio::test]
async fn owm_unauthorized_is_a_fetch_error() {
    let server = MockServer::start().await;
    mount_uv(&server, ResponseTemplate::new(200).set_body_json(uv_body(1.0))).await;
    mount_current(
        &server,
        ResponseTemplate::new(401).set_body_json(serde_json::json!({ "cod": 401, "message": "Invalid API key" })),
    )
    .await;

    let provider = provider_from_config(ProviderId::OpenWeatherMap, &config_for(&server))
        .await
        .expect("connect should succeed");

    let err = provider.fetch().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Fetch);
    assert!(err.to_string().contains("401"));
}

#[tokio::test]
async fn owm_garbage_body_is_a_decode_error() {
    let server = MockServer::start().await;
    mount_uv(&server, ResponseTemplate::new(200).set_body_json(uv_body(1.0))).await;
    mount_current(&server, ResponseTemplate::new(200).set_body_string("<html>oops</html>")).await;

    let provider = OpenWeatherProvider::connect(&config_for(&server)).await.unwrap();
    let err = provider.fetch().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Decode);
}

// ============================================================================
// Dark Sky
// ============================================================================

#[tokio::test]
async fn dark_sky_fetch_maps_currently_block() {
    let server = MockServer::start().await;
    mount_forecast(&server, ResponseTemplate::new(200).set_body_json(forecast_body())).await;

    let provider = provider_from_config(ProviderId::DarkSky, &config_for(&server))
        .await
        .expect("provider should build");
    assert_eq!(provider.id(), ProviderId::DarkSky);

    let record = provider.fetch().await.expect("fetch should succeed");
    assert_eq!(
        record,
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

#[tokio::test]
async fn dark_sky_missing_currently_is_a_decode_error() {
    let server = MockServer::start().await;
    mount_forecast(
        &server,
        ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "latitude": 35.662,
            "longitude": 139.7038,
            "timezone": "Asia/Tokyo"
        })),
    )
    .await;

    let provider = DarkSkyProvider::connect(&config_for(&server)).unwrap();
    let err = provider.fetch().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Decode);
    assert_eq!(err.provider(), ProviderId::DarkSky);
}

#[tokio::test]
async fn dark_sky_server_error_is_a_fetch_error() {
    let server = MockServer::start().await;
    mount_forecast(
        &server,
        ResponseTemplate::new(403).set_body_json(serde_json::json!({
            "code": 403,
            "error": "daily usage limit exceeded"
        })),
    )
    .await;

    let provider = DarkSkyProvider::connect(&config_for(&server)).unwrap();
    let err = provider.fetch().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Fetch);
    assert!(err.to_string().contains("daily usage limit exceeded"));
}

#[tokio::test]
async fn dark_sky_slow_response_times_out() {
    let server = MockServer::start().await;
    mount_forecast(
        &server,
        ResponseTemplate::new(200)
            .set_body_json(forecast_body())
            .set_delay(Duration::from_secs(3)),
    )
    .await;

    let provider = DarkSkyProvider::connect(&config_for(&server)).unwrap();
    let err = provider.fetch().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Fetch);
}

// ============================================================================
// Fetch → record
// ============================================================================

#[tokio::test]
async fn fetched_record_is_recorded_with_source_tag() {
    let server = MockServer::start().await;
    mount_forecast(&server, ResponseTemplate::new(200).set_body_json(forecast_body())).await;

    let provider = provider_from_config(ProviderId::DarkSky, &config_for(&server)).await.unwrap();
    let sink = Arc::new(CaptureSink::default());
    let recorder = Recorder::new(sink.clone());

    let record = provider.fetch().await.unwrap();
    recorder.record(provider.id().as_str(), &record).unwrap();

    let batches = sink.batches.lock().unwrap();
    assert_eq!(batches.len(), 1);
    let (tags, batch) = &batches[0];
    assert_eq!(tags[0].value.as_str(), "darksky");

    let measures: Vec<_> = batch.iter().map(|m| m.measure).collect();
    assert_eq!(
        measures,
        vec![Measure::Temperature, Measure::Pressure, Measure::Humidity, Measure::WindSpeed]
    );
    assert_eq!(batch[2], Measure::Humidity.i64(55));
}
