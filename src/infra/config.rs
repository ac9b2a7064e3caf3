//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml
//!
//! After the file is loaded, `NEW_EVENT_STATUS` and
//! `GEOFENCE_TRIGGER_TOPIC_NAME` override the default order status and the
//! trigger topic.

use anyhow::Context;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

/// Environment variable overriding the status assigned to new orders
pub const ENV_NEW_EVENT_STATUS: &str = "NEW_EVENT_STATUS";
/// Environment variable overriding the trigger topic
pub const ENV_TRIGGER_TOPIC: &str = "GEOFENCE_TRIGGER_TOPIC_NAME";

#[derive(Debug, Clone, Deserialize)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    /// Topic carrying inbound location events
    #[serde(default = "default_events_topic")]
    pub events_topic: String,
    #[serde(default = "default_client_id")]
    pub client_id: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

fn default_events_topic() -> String {
    "geoawareness/events".to_string()
}

fn default_client_id() -> String {
    "geofence-trigger".to_string()
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ServiceConfig {
    /// Service instance identifier, used as the metrics label
    #[serde(default = "default_service_id")]
    pub id: String,
}

fn default_service_id() -> String {
    "geofence-trigger".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrdersConfig {
    /// Status assigned to orders created on their first event
    #[serde(default = "default_order_status")]
    pub default_status: String,
}

impl Default for OrdersConfig {
    fn default() -> Self {
        Self { default_status: default_order_status() }
    }
}

fn default_order_status() -> String {
    "open".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct TriggerConfig {
    /// Destination for trigger notifications
    #[serde(default = "default_trigger_topic")]
    pub topic: String,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self { topic: default_trigger_topic() }
    }
}

fn default_trigger_topic() -> String {
    "geoawareness-geofence-trigger".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct RepositoryConfig {
    /// JSON seed document with stores, geofences and orders
    #[serde(default = "default_seed_file")]
    pub seed_file: String,
    /// JSONL audit log for raw events (empty to disable)
    #[serde(default = "default_event_log")]
    pub event_log: String,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self { seed_file: default_seed_file(), event_log: default_event_log() }
    }
}

fn default_seed_file() -> String {
    "config/stores.json".to_string()
}

fn default_event_log() -> String {
    "events.jsonl".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Bounded capacity of the inbound event channel
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    /// Maximum events processed concurrently
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
    /// Order write attempts before giving up on revision conflicts
    #[serde(default = "default_max_write_attempts")]
    pub max_write_attempts: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
            max_in_flight: default_max_in_flight(),
            max_write_attempts: default_max_write_attempts(),
        }
    }
}

fn default_channel_capacity() -> usize {
    1000
}

fn default_max_in_flight() -> usize {
    64
}

fn default_max_write_attempts() -> u32 {
    3
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub interval_secs: u64,
    /// Prometheus metrics HTTP port (0 to disable)
    #[serde(default = "default_prometheus_port")]
    pub prometheus_port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: 10, prometheus_port: default_prometheus_port() }
    }
}

fn default_prometheus_port() -> u16 {
    9090
}

#[derive(Debug, Clone, Deserialize)]
pub struct BrokerConfig {
    /// Run an embedded MQTT broker (local development)
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_broker_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_broker_port")]
    pub port: u16,
}

fn default_broker_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_broker_port() -> u16 {
    1883
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind_address: default_broker_bind_address(),
            port: default_broker_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    pub mqtt: MqttConfig,
    #[serde(default)]
    pub orders: OrdersConfig,
    #[serde(default)]
    pub trigger: TriggerConfig,
    #[serde(default)]
    pub repository: RepositoryConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub broker: BrokerConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    service_id: String,
    mqtt_host: String,
    mqtt_port: u16,
    mqtt_events_topic: String,
    mqtt_client_id: String,
    mqtt_username: Option<String>,
    mqtt_password: Option<String>,
    default_order_status: String,
    trigger_topic: String,
    seed_file: String,
    event_log: String,
    channel_capacity: usize,
    max_in_flight: usize,
    max_write_attempts: u32,
    metrics_interval_secs: u64,
    prometheus_port: u16,
    broker_enabled: bool,
    broker_bind_address: String,
    broker_port: u16,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_id: default_service_id(),
            mqtt_host: "localhost".to_string(),
            mqtt_port: 1883,
            mqtt_events_topic: default_events_topic(),
            mqtt_client_id: default_client_id(),
            mqtt_username: None,
            mqtt_password: None,
            default_order_status: default_order_status(),
            trigger_topic: default_trigger_topic(),
            seed_file: default_seed_file(),
            event_log: default_event_log(),
            channel_capacity: default_channel_capacity(),
            max_in_flight: default_max_in_flight(),
            max_write_attempts: default_max_write_attempts(),
            metrics_interval_secs: 10,
            prometheus_port: default_prometheus_port(),
            broker_enabled: false,
            broker_bind_address: default_broker_bind_address(),
            broker_port: default_broker_port(),
            config_file: "default".to_string(),
        }
    }
}

impl Config {
    /// Pick the config file: an explicit path wins, then `CONFIG_FILE`,
    /// then `config/dev.toml`
    pub fn resolve_config_path(explicit: Option<String>) -> String {
        explicit
            .or_else(|| env::var("CONFIG_FILE").ok())
            .unwrap_or_else(|| "config/dev.toml".to_string())
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(Self {
            service_id: toml_config.service.id,
            mqtt_host: toml_config.mqtt.host,
            mqtt_port: toml_config.mqtt.port,
            mqtt_events_topic: toml_config.mqtt.events_topic,
            mqtt_client_id: toml_config.mqtt.client_id,
            mqtt_username: toml_config.mqtt.username,
            mqtt_password: toml_config.mqtt.password,
            default_order_status: toml_config.orders.default_status,
            trigger_topic: toml_config.trigger.topic,
            seed_file: toml_config.repository.seed_file,
            event_log: toml_config.repository.event_log,
            channel_capacity: toml_config.pipeline.channel_capacity,
            max_in_flight: toml_config.pipeline.max_in_flight,
            max_write_attempts: toml_config.pipeline.max_write_attempts,
            metrics_interval_secs: toml_config.metrics.interval_secs,
            prometheus_port: toml_config.metrics.prometheus_port,
            broker_enabled: toml_config.broker.enabled,
            broker_bind_address: toml_config.broker.bind_address,
            broker_port: toml_config.broker.port,
            config_file: path.display().to_string(),
        })
    }

    /// Load configuration from a path, falling back to defaults, then apply
    /// environment overrides
    pub fn load_from_path(path: &str) -> Self {
        let config = match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Warning: {:#}. Using defaults.", e);
                Self::default()
            }
        };
        config.with_env_overrides(|key| env::var(key).ok())
    }

    /// Apply environment-style overrides through `lookup`
    ///
    /// Empty values are ignored.
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(status) = lookup(ENV_NEW_EVENT_STATUS) {
            self.default_order_status = status;
        }
        if let Some(topic) = lookup(ENV_TRIGGER_TOPIC) {
            self.trigger_topic = topic;
        }
        self
    }

    // Getters for all config fields
    pub fn service_id(&self) -> &str {
        &self.service_id
    }

    pub fn mqtt_host(&self) -> &str {
        &self.mqtt_host
    }

    pub fn mqtt_port(&self) -> u16 {
        self.mqtt_port
    }

    pub fn mqtt_events_topic(&self) -> &str {
        &self.mqtt_events_topic
    }

    pub fn mqtt_client_id(&self) -> &str {
        &self.mqtt_client_id
    }

    pub fn mqtt_username(&self) -> Option<&str> {
        self.mqtt_username.as_deref()
    }

    pub fn mqtt_password(&self) -> Option<&str> {
        self.mqtt_password.as_deref()
    }

    pub fn default_order_status(&self) -> &str {
        &self.default_order_status
    }

    pub fn trigger_topic(&self) -> &str {
        &self.trigger_topic
    }

    pub fn seed_file(&self) -> &str {
        &self.seed_file
    }

    /// Audit log path, `None` when disabled
    pub fn event_log(&self) -> Option<&str> {
        Some(self.event_log.as_str()).filter(|p| !p.is_empty())
    }

    pub fn channel_capacity(&self) -> usize {
        self.channel_capacity
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight
    }

    pub fn max_write_attempts(&self) -> u32 {
        self.max_write_attempts
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn prometheus_port(&self) -> u16 {
        self.prometheus_port
    }

    pub fn broker_enabled(&self) -> bool {
        self.broker_enabled
    }

    pub fn broker_bind_address(&self) -> &str {
        &self.broker_bind_address
    }

    pub fn broker_port(&self) -> u16 {
        self.broker_port
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method for tests to set the default order status
    pub fn with_default_order_status(mut self, status: &str) -> Self {
        self.default_order_status = status.to_string();
        self
    }

    /// Builder method for tests to set max write attempts
    pub fn with_max_write_attempts(mut self, attempts: u32) -> Self {
        self.max_write_attempts = attempts;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.mqtt_host(), "localhost");
        assert_eq!(config.mqtt_port(), 1883);
        assert_eq!(config.default_order_status(), "open");
        assert_eq!(config.trigger_topic(), "geoawareness-geofence-trigger");
        assert_eq!(config.max_write_attempts(), 3);
        assert_eq!(config.event_log(), Some("events.jsonl"));
        assert!(!config.broker_enabled());
    }

    #[test]
    fn test_env_overrides() {
        let env = HashMap::from([
            (ENV_NEW_EVENT_STATUS, "received".to_string()),
            (ENV_TRIGGER_TOPIC, "orders-geofence".to_string()),
        ]);
        let config = Config::default().with_env_overrides(|key| env.get(key).cloned());
        assert_eq!(config.default_order_status(), "received");
        assert_eq!(config.trigger_topic(), "orders-geofence");
    }

    #[test]
    fn test_blank_env_override_ignored() {
        let config = Config::default()
            .with_env_overrides(|key| (key == ENV_NEW_EVENT_STATUS).then(|| "  ".to_string()));
        assert_eq!(config.default_order_status(), "open");
    }

    #[test]
    fn test_resolve_config_path_default() {
        if env::var("CONFIG_FILE").is_err() {
            assert_eq!(Config::resolve_config_path(None), "config/dev.toml");
        }
    }

    #[test]
    fn test_resolve_config_path_explicit_wins() {
        let path = Config::resolve_config_path(Some("config/prod.toml".to_string()));
        assert_eq!(path, "config/prod.toml");
    }

    #[test]
    fn test_empty_event_log_disables_audit() {
        let toml_str = r#"
[mqtt]
host = "localhost"
port = 1883

[repository]
event_log = ""
"#;
        let parsed: TomlConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(parsed.repository.event_log, "");
        assert_eq!(parsed.repository.seed_file, "config/stores.json");
        assert_eq!(parsed.pipeline.max_in_flight, 64);
    }
}
