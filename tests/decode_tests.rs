//! End-to-end decode tests against a mock OWServer over HTTP

use owserver_poller::client::{poll_server, DetailsFetcher, OwServerHttpClient, PollOutcome};
use owserver_poller::config::PollerConfig;
use owserver_poller::error::ErrorCode;
use owserver_poller::services::{StateImage, StateValue, TemperatureUnit};
use owserver_poller::{OwServerError, PollingScheduler};
use pretty_assertions::assert_eq;
use rstest::*;
use std::time::Duration;

mod common;
use common::{details_document, sensor_definition, server_definition, static_config, MockOwServer};

#[rstest]
#[tokio::test]
async fn test_single_ds18b20_end_to_end(mut static_config: PollerConfig) {
    let xml = details_document(&[(
        "DS18B20",
        "5D000003C74F4528",
        &[("Temperature", "20.0"), ("UserByte1", "0"), ("UserByte2", "0")],
    )]);
    let mock = MockOwServer::with_details(xml).await;

    static_config.servers.addresses = mock.address();
    static_config.devices = vec![sensor_definition(
        "attic",
        "DS18B20",
        &mock.address(),
        "5D000003C74F4528",
    )];

    let mut scheduler = PollingScheduler::from_config(static_config).unwrap();
    let report = scheduler.run_cycle().await;

    assert_eq!(report.servers_polled, 1);
    assert_eq!(report.sensors_updated, 1);
    assert!(report.servers_failed.is_empty());

    let device = scheduler.store().get("attic").unwrap();
    assert!(device.online);
    assert_eq!(device.state("owsTemperature"), Some(&StateValue::text("68.0")));
    assert_eq!(device.primary_value, Some(StateValue::text("68.0")));
    assert_eq!(device.image, Some(StateImage::TemperatureSensor));
    assert_eq!(device.props.address.as_deref(), Some("5D000003C74F4528"));
    assert_eq!(mock.request_count().await, 1);
}

#[rstest]
#[tokio::test]
async fn test_combo_sensor_and_server_device(mut static_config: PollerConfig) {
    let xml = details_document(&[(
        "EDS0068",
        "7E00000000123456",
        &[
            ("Temperature", "22.25"),
            ("Humidity", "41.26"),
            ("BarometricPressureMb", "1013.2"),
            ("Light", "330"),
            ("LEDFunction", "2"),
            ("TemperatureHighAlarmValue", "30"),
        ],
    )]);
    let mock = MockOwServer::with_details(xml).await;

    static_config.servers.addresses = mock.address();
    static_config.units.temperature = TemperatureUnit::Celsius;
    let mut combo = sensor_definition("porch", "EDS0068", &mock.address(), "7E00000000123456");
    combo.primary_selector = Some("HY".to_string());
    combo.temp_compensation = 0.75;
    static_config.devices = vec![combo, server_definition("owserver", &mock.address())];

    let mut scheduler = PollingScheduler::from_config(static_config).unwrap();
    let report = scheduler.run_cycle().await;
    assert_eq!(report.sensors_updated, 1);

    let porch = scheduler.store().get("porch").unwrap();
    assert_eq!(porch.state("owsTemperature"), Some(&StateValue::text("23.0")));
    assert_eq!(porch.state("owsHumidity"), Some(&StateValue::text("41.26")));
    assert_eq!(porch.state("owsDewPoint"), Some(&StateValue::Unsupported));
    assert_eq!(porch.primary_value, Some(StateValue::text("41.3")));
    assert_eq!(porch.props.mirror.get("LEDFunction").map(String::as_str), Some("2"));
    assert!(!porch.props.mirror.contains_key("RelayFunction"));

    let server = scheduler.store().get("owserver").unwrap();
    assert!(server.online);
    assert_eq!(server.primary_value, Some(StateValue::text("1 sensor")));
    assert_eq!(server.state("owsRomID"), Some(&StateValue::text("EDSOWSERVER2")));
    assert_eq!(server.props.address.as_deref(), Some("00:04:A3:B8:0F:12"));
}

#[tokio::test]
async fn test_http_error_is_failure() {
    let mock = MockOwServer::start().await;
    mock.serve_status(500).await;

    let client = OwServerHttpClient::new(Duration::from_secs(5)).unwrap();
    let err = client.fetch_raw(&mock.address()).await.unwrap_err();
    assert!(matches!(err, OwServerError::Fetch(_)));
    match poll_server(&client, &mock.address()).await {
        PollOutcome::Failure(failure) => {
            assert_eq!(failure.code, ErrorCode::ConnectionRefused);
            assert!(failure.retryable);
        }
        PollOutcome::Success(_) => panic!("HTTP 500 parsed as success"),
    }
}

#[tokio::test]
async fn test_slow_server_times_out() {
    let mock = MockOwServer::start().await;
    mock.serve_slowly(details_document(&[]), Duration::from_secs(3)).await;

    let client = OwServerHttpClient::new(Duration::from_millis(200)).unwrap();
    let err = client.fetch_raw(&mock.address()).await.unwrap_err();
    assert!(err.is_fetch_failure(), "unexpected error {err:?}");
}

#[tokio::test]
async fn test_malformed_xml_is_failure() {
    let mock = MockOwServer::with_details("<Devices-Detail-Response><PollCount>".to_string()).await;
    let client = OwServerHttpClient::new(Duration::from_secs(5)).unwrap();

    match poll_server(&client, &mock.address()).await {
        PollOutcome::Failure(failure) => assert!(failure.reason.contains("Parsing error")),
        PollOutcome::Success(_) => panic!("malformed document parsed"),
    }
}

#[rstest]
#[tokio::test]
async fn test_sensor_list(mut static_config: PollerConfig) {
    let xml = details_document(&[
        ("DS18B20", "B000000000000028", &[]),
        ("DS2423", "A00000000000001D", &[("Counter_A", "12")]),
    ]);
    let mock = MockOwServer::with_details(xml).await;
    static_config.servers.addresses = mock.address();

    let scheduler = PollingScheduler::from_config(static_config).unwrap();
    let listing = scheduler.sensor_list().await;
    assert_eq!(
        listing,
        vec![(
            mock.address(),
            vec!["A00000000000001D".to_string(), "B000000000000028".to_string()]
        )]
    );
}
