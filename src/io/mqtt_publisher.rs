//! MQTT publisher for geofence trigger notifications
//!
//! Notifications are published as JSON to the configured trigger topic with
//! QoS 1 (at-least-once). The message id is a UUIDv7 generated here and
//! logged with the publish.

use crate::domain::types::TriggerNotification;
use crate::infra::config::Config;
use crate::io::publisher::{new_message_id, MessageId, PublishError, TriggerPublisher};
use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::time::Duration;
use tracing::{debug, info, warn};

pub struct MqttTriggerPublisher {
    client: AsyncClient,
    topic: String,
}

impl MqttTriggerPublisher {
    /// Create a new MQTT publisher
    ///
    /// Connects to the broker at the configured MQTT host/port. Must be called
    /// from within a tokio runtime; the client eventloop is spawned here.
    pub fn new(config: &Config) -> Self {
        let client_id = format!("{}-trigger-{}", config.mqtt_client_id(), std::process::id());
        let mut mqttoptions = MqttOptions::new(client_id, config.mqtt_host(), config.mqtt_port());
        mqttoptions.set_keep_alive(Duration::from_secs(30));
        mqttoptions.set_clean_session(true);

        // Set credentials if configured
        if let (Some(username), Some(password)) = (config.mqtt_username(), config.mqtt_password()) {
            mqttoptions.set_credentials(username, password);
        }

        let (client, eventloop) = AsyncClient::new(mqttoptions, 100);

        tokio::spawn(async move {
            let mut eventloop = eventloop;
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("mqtt_trigger_connected");
                    }
                    Ok(Event::Incoming(Packet::PubAck(ack))) => {
                        debug!(pkid = %ack.pkid, "mqtt_trigger_puback");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "mqtt_trigger_error");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });

        let topic = config.trigger_topic().to_string();
        info!(topic = %topic, "mqtt_trigger_publisher_started");
        Self { client, topic }
    }

    /// Disconnect from the broker, flushing queued publishes
    pub async fn disconnect(&self) {
        if let Err(e) = self.client.disconnect().await {
            debug!(error = %e, "mqtt_trigger_disconnect_failed");
        }
    }
}

#[async_trait]
impl TriggerPublisher for MqttTriggerPublisher {
    fn channel(&self) -> &str {
        &self.topic
    }

    async fn publish_message(
        &self,
        notification: &TriggerNotification,
    ) -> Result<MessageId, PublishError> {
        let payload = serde_json::to_vec(notification)?;
        let message_id = new_message_id();

        self.client
            .publish(&self.topic, QoS::AtLeastOnce, false, payload)
            .await
            .map_err(|e| PublishError::Transport(e.to_string()))?;

        info!(
            message_id = %message_id,
            topic = %self.topic,
            order_id = %notification.order.order_id,
            "trigger_published"
        );
        Ok(message_id)
    }
}
