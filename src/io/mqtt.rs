//! MQTT ingest for order location events
//!
//! Subscribes to the events topic and forwards each parsed event to the
//! pipeline. A payload is either one event object or an array of them.

use crate::domain::types::IncomingEvent;
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// Events decoded from one payload
#[derive(Debug, Default)]
pub struct ParsedPayload {
    pub events: Vec<IncomingEvent>,
    /// Entries that were not valid events
    pub invalid: usize,
}

/// Parse an ingest payload
///
/// Malformed entries in an array are counted and skipped; the remaining
/// entries are still returned.
pub fn parse_incoming_events(json_str: &str) -> ParsedPayload {
    let value: Value = match serde_json::from_str(json_str) {
        Ok(v) => v,
        Err(e) => {
            debug!(error = %e, "event_payload_not_json");
            return ParsedPayload { events: Vec::new(), invalid: 1 };
        }
    };

    let entries = match value {
        Value::Array(items) => items,
        other => vec![other],
    };

    let mut parsed = ParsedPayload { events: Vec::with_capacity(entries.len()), invalid: 0 };
    for entry in entries {
        match serde_json::from_value::<IncomingEvent>(entry) {
            Ok(event) => parsed.events.push(event),
            Err(e) => {
                debug!(error = %e, "event_entry_invalid");
                parsed.invalid += 1;
            }
        }
    }
    parsed
}

/// Start the MQTT ingest client and send parsed events to the channel
///
/// Events are sent via try_send so a slow pipeline never stalls the MQTT
/// eventloop. Dropped events are counted in metrics and logged (rate-limited).
/// Returns when shutdown is signalled or the channel closes; dropping
/// `event_tx` on return lets the pipeline drain.
pub async fn start_mqtt_ingest(
    config: &Config,
    event_tx: mpsc::Sender<IncomingEvent>,
    metrics: Arc<Metrics>,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let client_id = format!("{}-ingest-{}", config.mqtt_client_id(), std::process::id());
    let mut mqttoptions = MqttOptions::new(client_id, config.mqtt_host(), config.mqtt_port());
    mqttoptions.set_keep_alive(Duration::from_secs(30));
    mqttoptions.set_max_packet_size(1024 * 1024, 1024 * 1024);

    // Set credentials if configured
    if let (Some(username), Some(password)) = (config.mqtt_username(), config.mqtt_password()) {
        mqttoptions.set_credentials(username, password);
    }

    let (client, mut eventloop) = AsyncClient::new(mqttoptions, 100);
    let topic = config.mqtt_events_topic().to_string();

    info!(topic = %topic, host = %config.mqtt_host(), port = %config.mqtt_port(), "mqtt_ingest_starting");

    // Rate-limit drop warnings to 1 per second
    let mut last_drop_warn = Instant::now() - Duration::from_secs(2);

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("mqtt_ingest_shutdown");
                    let _ = client.disconnect().await;
                    return Ok(());
                }
            }
            result = eventloop.poll() => {
                match result {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        let Ok(json_str) = std::str::from_utf8(&publish.payload) else {
                            metrics.record_invalid_payload();
                            warn!(topic = %publish.topic, "mqtt_payload_not_utf8");
                            continue;
                        };

                        let parsed = parse_incoming_events(json_str);
                        for _ in 0..parsed.invalid {
                            metrics.record_invalid_payload();
                        }
                        if parsed.invalid > 0 {
                            warn!(topic = %publish.topic, invalid = %parsed.invalid, "mqtt_payload_invalid");
                        }

                        for event in parsed.events {
                            metrics.record_event_received();
                            debug!(
                                order_id = %event.order_id,
                                store = %event.store_name,
                                event_timestamp = %event.event_timestamp,
                                "event_received"
                            );
                            match event_tx.try_send(event) {
                                Ok(()) => {}
                                Err(TrySendError::Full(event)) => {
                                    metrics.record_event_dropped();
                                    if last_drop_warn.elapsed() > Duration::from_secs(1) {
                                        warn!(order_id = %event.order_id, "mqtt_event_dropped: channel full");
                                        last_drop_warn = Instant::now();
                                    }
                                }
                                Err(TrySendError::Closed(_)) => {
                                    warn!("event_channel_closed");
                                    return Ok(());
                                }
                            }
                        }
                    }
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        // Subscriptions do not survive a clean-session reconnect
                        info!("mqtt_ingest_connected");
                        if let Err(e) = client.subscribe(topic.as_str(), QoS::AtLeastOnce).await {
                            error!(error = %e, topic = %topic, "mqtt_subscribe_failed");
                        }
                    }
                    Ok(Event::Incoming(Packet::SubAck(_))) => {
                        info!(topic = %topic, "mqtt_ingest_subscribed");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!(error = %e, "mqtt_ingest_error");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        }
    }
}
