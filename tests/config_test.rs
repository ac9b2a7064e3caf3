//! Integration tests for configuration loading

use geofence_trigger::infra::Config;
use std::io::Write;
use tempfile::NamedTempFile;

#[test]
fn test_load_config_from_file() {
    let mut temp_file = NamedTempFile::new().unwrap();

    let config_content = r#"
[service]
id = "geo-test"

[mqtt]
host = "test-host"
port = 1884
events_topic = "orders/events"
client_id = "geo-test-client"

[orders]
default_status = "pending"

[trigger]
topic = "orders/geofence-trigger"

[repository]
seed_file = "fixtures/stores.json"
event_log = ""

[pipeline]
channel_capacity = 256
max_in_flight = 8
max_write_attempts = 5

[metrics]
interval_secs = 15
prometheus_port = 9091

[broker]
enabled = true
bind_address = "127.0.0.1"
port = 18830
"#;

    temp_file.write_all(config_content.as_bytes()).unwrap();
    temp_file.flush().unwrap();

    let config = Config::from_file(temp_file.path()).unwrap();

    assert_eq!(config.service_id(), "geo-test");
    assert_eq!(config.mqtt_host(), "test-host");
    assert_eq!(config.mqtt_port(), 1884);
    assert_eq!(config.mqtt_events_topic(), "orders/events");
    assert_eq!(config.mqtt_client_id(), "geo-test-client");
    assert_eq!(config.default_order_status(), "pending");
    assert_eq!(config.trigger_topic(), "orders/geofence-trigger");
    assert_eq!(config.seed_file(), "fixtures/stores.json");
    assert_eq!(config.event_log(), None);
    assert_eq!(config.channel_capacity(), 256);
    assert_eq!(config.max_in_flight(), 8);
    assert_eq!(config.max_write_attempts(), 5);
    assert_eq!(config.metrics_interval_secs(), 15);
    assert_eq!(config.prometheus_port(), 9091);
    assert!(config.broker_enabled());
    assert_eq!(config.broker_bind_address(), "127.0.0.1");
    assert_eq!(config.broker_port(), 18830);
    assert_eq!(config.config_file(), temp_file.path().display().to_string());
}

#[test]
fn test_minimal_config_uses_defaults() {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(b"[mqtt]\nhost = \"broker\"\nport = 1883\n").unwrap();
    temp_file.flush().unwrap();

    let config = Config::from_file(temp_file.path()).unwrap();
    assert_eq!(config.mqtt_host(), "broker");
    assert_eq!(config.default_order_status(), "open");
    assert_eq!(config.trigger_topic(), "geoawareness-geofence-trigger");
    assert!(!config.broker_enabled());
}

#[test]
fn test_invalid_config_reports_path() {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(b"[mqtt\nhost = ").unwrap();
    temp_file.flush().unwrap();

    let err = Config::from_file(temp_file.path()).unwrap_err();
    assert!(format!("{err:#}").contains(&temp_file.path().display().to_string()));
}

#[test]
fn test_file_values_then_env_overrides() {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file
        .write_all(b"[mqtt]\nhost = \"broker\"\nport = 1883\n\n[orders]\ndefault_status = \"pending\"\n")
        .unwrap();
    temp_file.flush().unwrap();

    let config = Config::from_file(temp_file.path())
        .unwrap()
        .with_env_overrides(|key| (key == "GEOFENCE_TRIGGER_TOPIC_NAME").then(|| "t".to_string()));
    assert_eq!(config.default_order_status(), "pending");
    assert_eq!(config.trigger_topic(), "t");
}

#[test]
fn test_load_from_path_fallback() {
    let config = Config::load_from_path("/nonexistent/config.toml");
    assert_eq!(config.mqtt_host(), "localhost");
    assert_eq!(config.mqtt_port(), 1883);
    assert_eq!(config.config_file(), "default");
}
