//! Integration tests for the OpenWeather provider against a mock HTTP server.

use std::{
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use tempfile::TempDir;
use weatherbot_core::{
    Config, Lookup, NetworkCause, WeatherError, classify_air_quality,
    config::{Endpoints, RetrySettings},
    provider_from_config,
};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// Config pointing at the mock server with fast retries and a private cache file.
fn test_config(server: &MockServer, dir: &TempDir) -> Config {
    let mut cfg = Config::default();
    cfg.set_api_key("TEST_KEY".into());
    cfg.endpoints = Endpoints::single(server.uri());
    cfg.retry = RetrySettings {
        max_attempts: 3,
        base_delay_ms: 50,
        timeout_secs: 5,
    };
    cfg.cache.path = Some(dir.path().join("weather_cache.json"));
    cfg
}

/// Always answers 500 and remembers when each request arrived.
#[derive(Clone, Default)]
struct FailingServer {
    arrivals: Arc<Mutex<Vec<Instant>>>,
}

impl FailingServer {
    fn gaps(&self) -> Vec<Duration> {
        let arrivals = self.arrivals.lock().unwrap();
        arrivals.windows(2).map(|w| w[1] - w[0]).collect()
    }
}

impl Respond for FailingServer {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        self.arrivals.lock().unwrap().push(Instant::now());
        ResponseTemplate::new(500)
    }
}

fn current_weather_body(name: &str, lat: f64, lon: f64) -> serde_json::Value {
    serde_json::json!({
        "coord": { "lon": lon, "lat": lat },
        "weather": [{ "id": 500, "main": "Rain", "description": "light rain", "icon": "10d" }],
        "base": "stations",
        "main": {
            "temp": 7.4, "feels_like": 5.1, "temp_min": 6.0, "temp_max": 8.0,
            "pressure": 1009, "humidity": 87
        },
        "visibility": 10000,
        "wind": { "speed": 4.0, "deg": 230 },
        "clouds": { "all": 75 },
        "dt": 1_714_560_000,
        "sys": { "country": "RU", "sunrise": 1_714_530_000, "sunset": 1_714_585_000 },
        "timezone": 10800,
        "id": 524901,
        "name": name,
        "cod": 200
    })
}

fn forecast_body() -> serde_json::Value {
    let slice = |dt: i64, temp: f64| {
        serde_json::json!({
            "dt": dt,
            "main": { "temp": temp, "feels_like": temp - 1.0, "pressure": 1010, "humidity": 60 },
            "weather": [{ "id": 800, "main": "Clear", "description": "clear sky" }],
            "dt_txt": "ignored"
        })
    };

    serde_json::json!({
        "cod": "200",
        "cnt": 3,
        "list": [slice(1_714_564_800, 10.0), slice(1_714_575_600, 12.5), slice(1_714_586_400, 9.0)],
        "city": {
            "id": 551487,
            "name": "Kazan",
            "coord": { "lat": 55.7887, "lon": 49.1221 },
            "country": "RU",
            "timezone": 10800,
            "sunrise": 1_714_528_000,
            "sunset": 1_714_583_000
        }
    })
}

#[tokio::test]
async fn test_resolve_coordinates_success() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/geo/1.0/direct"))
        .and(query_param("q", "Kazan"))
        .and(query_param("limit", "1"))
        .and(query_param("appid", "TEST_KEY"))
        .and(query_param("lang", "ru"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            { "name": "Kazan", "lat": 55.7887, "lon": 49.1221, "country": "RU" }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let provider = provider_from_config(&test_config(&server, &dir)).unwrap();
    let coords = provider.resolve_coordinates("Kazan").await.unwrap();

    assert_eq!(coords.lat, 55.7887);
    assert_eq!(coords.lon, 49.1221);
}

#[tokio::test]
async fn test_resolve_coordinates_no_matches_is_not_found() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/geo/1.0/direct"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .mount(&server)
        .await;

    let provider = provider_from_config(&test_config(&server, &dir)).unwrap();
    let err = provider.resolve_coordinates("Xyzzy").await.unwrap_err();

    assert!(matches!(err, WeatherError::NotFound { .. }), "unexpected error: {err:?}");
    assert_eq!(err.lookup(), Some(&Lookup::city("Xyzzy")));
    assert!(!err.is_network());
}

#[tokio::test]
async fn test_empty_city_fails_without_network() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let provider = provider_from_config(&test_config(&server, &dir)).unwrap();

    let err = provider.resolve_coordinates("   ").await.unwrap_err();
    assert!(matches!(err, WeatherError::Validation(_)));

    let err = provider.current_weather_by_city("").await.unwrap_err();
    assert!(matches!(err, WeatherError::Validation(_)));
}

#[tokio::test]
async fn test_current_weather_by_city_is_cached_under_both_keys() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/data/2.5/weather"))
        .and(query_param("q", "Moscow"))
        .and(query_param("units", "metric"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(current_weather_body("Moscow", 55.7522, 37.6156)),
        )
        .mount(&server)
        .await;

    let provider = provider_from_config(&test_config(&server, &dir)).unwrap();
    let record = provider.current_weather_by_city("Moscow").await.unwrap();

    assert_eq!(record.location_name, "Moscow");
    assert_eq!(record.country.as_deref(), Some("RU"));
    assert_eq!(record.temperature_c, 7.4);
    assert_eq!(record.humidity_pct, 87);
    assert_eq!(record.pressure_hpa, 1009.0);
    assert_eq!(record.wind_direction_deg, Some(230.0));
    assert_eq!(record.visibility_m, Some(10000.0));
    assert_eq!(record.cloud_cover_pct, Some(75));
    assert_eq!(record.condition.code, 500);
    assert_eq!(record.condition.description, "light rain");
    assert!(record.sunrise.is_some() && record.sunset.is_some());

    assert_eq!(
        provider.cached_weather_by_city("moscow"),
        Some(record.clone())
    );
    assert_eq!(
        provider.cached_weather_by_coordinates(55.75, 37.62),
        Some(record)
    );
}

#[tokio::test]
async fn test_current_weather_by_coordinates_is_cached() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/data/2.5/weather"))
        .and(query_param("lat", "59.93"))
        .and(query_param("lon", "30.33"))
        .respond_with(ResponseTemplate::new(200).set_body_json(current_weather_body(
            "Saint Petersburg",
            59.9386,
            30.3141,
        )))
        .mount(&server)
        .await;

    let provider = provider_from_config(&test_config(&server, &dir)).unwrap();
    let record = provider
        .current_weather(&Lookup::coordinates(59.93, 30.33))
        .await
        .unwrap();

    assert_eq!(record.location_name, "Saint Petersburg");
    assert_eq!(
        provider.cached_weather_by_coordinates(59.93, 30.33),
        Some(record)
    );
    assert!(provider.cached_weather_by_city("Saint Petersburg").is_none());
}

#[tokio::test]
async fn test_unknown_city_maps_to_not_found() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/data/2.5/weather"))
        .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
            "cod": "404",
            "message": "city not found"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = provider_from_config(&test_config(&server, &dir)).unwrap();
    let err = provider
        .current_weather_by_city("Atlantis")
        .await
        .unwrap_err();

    assert!(matches!(err, WeatherError::NotFound { .. }), "unexpected error: {err:?}");
    assert!(provider.cache().load().is_empty());
}

#[tokio::test]
async fn test_client_error_is_not_retried() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/data/2.5/weather"))
        .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
            "cod": 401,
            "message": "Invalid API key. Please see \
                        https://openweathermap.org/faq#error401 for more info."
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = provider_from_config(&test_config(&server, &dir)).unwrap();
    let err = provider
        .current_weather_by_coordinates(1.0, 2.0)
        .await
        .unwrap_err();

    match err {
        WeatherError::Api { status, message, .. } => {
            assert_eq!(status.as_u16(), 401);
            assert!(message.starts_with("Invalid API key"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_malformed_payload_is_api_error() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/data/2.5/weather"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "name": "Nowhere" })),
        )
        .mount(&server)
        .await;

    let provider = provider_from_config(&test_config(&server, &dir)).unwrap();
    let err = provider.current_weather_by_city("Nowhere").await.unwrap_err();

    assert!(matches!(err, WeatherError::Api { .. }), "unexpected error: {err:?}");
    assert!(err.to_string().contains("malformed response"));
}

#[tokio::test]
async fn test_missing_required_field_is_api_error() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    let mut body = current_weather_body("Perm", 58.01, 56.25);
    body["main"].as_object_mut().unwrap().remove("pressure");

    Mock::given(method("GET"))
        .and(path("/data/2.5/weather"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(&server)
        .await;

    let provider = provider_from_config(&test_config(&server, &dir)).unwrap();
    let err = provider.current_weather_by_city("Perm").await.unwrap_err();

    assert!(matches!(err, WeatherError::Api { .. }), "unexpected error: {err:?}");
    assert!(err.to_string().contains("malformed response"));
    assert!(err.to_string().contains("pressure"));
    assert!(provider.cache().load().is_empty());
}

#[tokio::test]
async fn test_retry_recovers_after_rate_limit_and_server_error() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/data/2.5/weather"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/data/2.5/weather"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/data/2.5/weather"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(current_weather_body("Omsk", 54.99, 73.37)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let provider = provider_from_config(&test_config(&server, &dir)).unwrap();
    let record = provider.current_weather_by_city("Omsk").await.unwrap();

    assert_eq!(record.location_name, "Omsk");
    server.verify().await;
}

#[tokio::test]
async fn test_retries_exhausted_on_server_errors() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    let responder = FailingServer::default();

    Mock::given(method("GET"))
        .and(path("/data/2.5/forecast"))
        .respond_with(responder.clone())
        .expect(3)
        .mount(&server)
        .await;

    let mut cfg = test_config(&server, &dir);
    cfg.retry.base_delay_ms = 100;

    let provider = provider_from_config(&cfg).unwrap();
    let err = provider.forecast(55.79, 49.12).await.unwrap_err();

    match &err {
        WeatherError::Network {
            attempts,
            source: NetworkCause::Status(status),
            lookup,
        } => {
            assert_eq!(*attempts, 3);
            assert_eq!(status.as_u16(), 500);
            assert_eq!(lookup, &Lookup::coordinates(55.79, 49.12));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(err.is_network());
    server.verify().await;

    // one base delay after the first failure, two after the second
    let gaps = responder.gaps();
    assert_eq!(gaps.len(), 2);
    assert!(gaps[0] >= Duration::from_millis(100), "first gap: {gaps:?}");
    assert!(gaps[0] < Duration::from_millis(200), "first gap: {gaps:?}");
    assert!(gaps[1] >= Duration::from_millis(200), "second gap: {gaps:?}");
}

#[tokio::test]
async fn test_connection_failure_is_network_error() {
    let dir = TempDir::new().unwrap();
    let mut cfg = Config::default();
    cfg.set_api_key("TEST_KEY".into());
    // nothing listens on port 1
    cfg.endpoints = Endpoints::single("http://127.0.0.1:1");
    cfg.retry = RetrySettings {
        max_attempts: 2,
        base_delay_ms: 10,
        timeout_secs: 2,
    };
    cfg.cache.path = Some(dir.path().join("weather_cache.json"));

    let provider = provider_from_config(&cfg).unwrap();
    let err = provider.current_weather_by_city("Tomsk").await.unwrap_err();

    assert!(
        matches!(
            err,
            WeatherError::Network {
                attempts: 2,
                source: NetworkCause::Transport(_),
                ..
            }
        ),
        "unexpected error: {err:?}"
    );
    assert_eq!(err.lookup(), Some(&Lookup::city("Tomsk")));
}

#[tokio::test]
async fn test_forecast_points_share_city_metadata() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/data/2.5/forecast"))
        .and(query_param("lat", "55.79"))
        .and(query_param("lon", "49.12"))
        .respond_with(ResponseTemplate::new(200).set_body_json(forecast_body()))
        .mount(&server)
        .await;

    let provider = provider_from_config(&test_config(&server, &dir)).unwrap();
    let points = provider.forecast(55.79, 49.12).await.unwrap();

    assert_eq!(points.len(), 3);
    assert!(points.windows(2).all(|w| w[0].time < w[1].time));
    assert_eq!(points[1].temperature_c, 12.5);
    assert_eq!(points[0].city.name, "Kazan");
    assert_eq!(points[2].city.country.as_deref(), Some("RU"));
    assert_eq!(points[0].city.timezone_offset_secs, 10800);
    assert!(std::sync::Arc::ptr_eq(&points[0].city, &points[2].city));

    // forecasts never touch the cache
    assert!(provider.cache().load().is_empty());
}

#[tokio::test]
async fn test_air_quality_fetch_and_classify() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/data/2.5/air_pollution"))
        .and(query_param("appid", "TEST_KEY"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "coord": { "lon": 37.61, "lat": 55.75 },
            "list": [
                {
                    "main": { "aqi": 3 },
                    "components": {
                        "co": 300.4, "no": 0.1, "no2": 45.0, "o3": 30.0,
                        "so2": 5.0, "pm2_5": 12.0, "pm10": 60.0, "nh3": 1.2
                    },
                    "dt": 1_714_560_000
                },
                {
                    "main": { "aqi": 5 },
                    "components": { "co": 20000.0 },
                    "dt": 1_714_563_600
                }
            ]
        })))
        .mount(&server)
        .await;

    let provider = provider_from_config(&test_config(&server, &dir)).unwrap();
    let components = provider.fetch_air_quality(55.75, 37.61).await.unwrap();

    assert_eq!(components.get("pm10"), Some(60.0));
    assert_eq!(components.get("co"), Some(300.4));

    let analysis = classify_air_quality(&components, true);
    assert_eq!(analysis.overall_index(), 3);
    assert_eq!(analysis.overall_status(), "Moderate");
    assert_eq!(
        analysis.worst_exceeded().unwrap().pollutant.name(),
        "PM10"
    );
}

#[tokio::test]
async fn test_air_quality_without_timesteps_is_not_found() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/data/2.5/air_pollution"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "coord": { "lon": 0.0, "lat": 0.0 },
            "list": []
        })))
        .mount(&server)
        .await;

    let provider = provider_from_config(&test_config(&server, &dir)).unwrap();
    let err = provider.fetch_air_quality(0.0, 0.0).await.unwrap_err();

    assert!(matches!(err, WeatherError::NotFound { .. }), "unexpected error: {err:?}");
}

#[tokio::test]
async fn test_cache_write_failure_does_not_fail_the_fetch() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, "plain file").unwrap();

    Mock::given(method("GET"))
        .and(path("/data/2.5/weather"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(current_weather_body("Ufa", 54.73, 55.94)),
        )
        .mount(&server)
        .await;

    let mut cfg = test_config(&server, &dir);
    cfg.cache.path = Some(blocker.join("weather_cache.json"));

    let provider = provider_from_config(&cfg).unwrap();
    let record = provider.current_weather_by_city("Ufa").await.unwrap();

    assert_eq!(record.location_name, "Ufa");
    assert!(provider.cached_weather_by_city("Ufa").is_none());
}
