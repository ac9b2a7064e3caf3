//! Embedded MQTT broker using rumqttd
//!
//! Lets a single host run the service, its event producers and trigger
//! consumers without an external broker. Off by default.

use crate::infra::config::Config as AppConfig;
use anyhow::Context;
use rumqttd::{Broker, Config, ConnectionSettings, RouterConfig, ServerSettings};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

/// Largest accepted MQTT payload; a batch of events fits comfortably
const MAX_PAYLOAD_BYTES: usize = 1024 * 1024;

fn listen_address(app_config: &AppConfig) -> anyhow::Result<SocketAddr> {
    let addr = format!("{}:{}", app_config.broker_bind_address(), app_config.broker_port());
    addr.parse().with_context(|| format!("Invalid broker bind address {addr}"))
}

fn broker_config(listen: SocketAddr) -> Config {
    let router = RouterConfig {
        max_segment_size: 104857600,
        max_segment_count: 10,
        max_connections: 1000,
        max_outgoing_packet_count: 200,
        initialized_filters: None,
        ..Default::default()
    };

    let v4 = ServerSettings {
        name: "v4".to_string(),
        listen,
        tls: None,
        next_connection_delay_ms: 1,
        connections: ConnectionSettings {
            connection_timeout_ms: 5000,
            max_payload_size: MAX_PAYLOAD_BYTES,
            max_inflight_count: 200,
            auth: None,
            dynamic_filters: true,
            external_auth: None,
        },
    };

    Config {
        id: 0,
        router,
        v4: Some(HashMap::from([("v4".to_string(), v4)])),
        v5: None,
        ws: None,
        prometheus: None,
        metrics: None,
        bridge: None,
        console: None,
        cluster: None,
    }
}

/// Start the embedded broker on a dedicated thread
///
/// Returns the address it listens on. `Broker::start` blocks for the life of
/// the process, so failures after startup are only logged.
pub fn start_embedded_broker(app_config: &AppConfig) -> anyhow::Result<SocketAddr> {
    let listen = listen_address(app_config)?;
    let config = broker_config(listen);

    thread::Builder::new()
        .name("mqtt-broker".to_string())
        .spawn(move || {
            let mut broker = Broker::new(config);
            if let Err(e) = broker.start() {
                warn!(error = %e, "broker_start_failed");
            }
        })
        .context("Failed to spawn broker thread")?;

    // Give the listener time to bind before clients connect
    thread::sleep(Duration::from_millis(100));
    info!(listen = %listen, "broker_started");
    Ok(listen)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listen_address_from_config() {
        let config = AppConfig::default();
        let addr = listen_address(&config).unwrap();
        assert_eq!(addr.port(), config.broker_port());
    }

    #[test]
    fn test_broker_config_has_single_v4_listener() {
        let listen: SocketAddr = "127.0.0.1:18830".parse().unwrap();
        let config = broker_config(listen);
        let servers = config.v4.unwrap();
        assert_eq!(servers.len(), 1);
        assert_eq!(servers["v4"].listen, listen);
        assert!(config.v5.is_none());
    }
}
