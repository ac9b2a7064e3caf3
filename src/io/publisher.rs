//! Trigger publisher interface
//!
//! A publisher delivers one `TriggerNotification` to a downstream channel
//! and returns the id it assigned to the message.

use crate::domain::types::TriggerNotification;
use crate::io::jsonl::{JsonlError, JsonlWriter};
use async_trait::async_trait;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

pub type MessageId = String;

/// Generate a new UUIDv7 (time-sortable) message id
pub fn new_message_id() -> MessageId {
    Uuid::now_v7().to_string()
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("payload serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("transport error: {0}")]
    Transport(String),

    #[error(transparent)]
    File(#[from] JsonlError),
}

#[async_trait]
pub trait TriggerPublisher: Send + Sync {
    /// Destination identifier (topic or file) for logging
    fn channel(&self) -> &str;

    async fn publish_message(
        &self,
        notification: &TriggerNotification,
    ) -> Result<MessageId, PublishError>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PublishedRecord<'a> {
    message_id: &'a str,
    #[serde(flatten)]
    notification: &'a TriggerNotification,
}

/// Publisher that appends notifications to a JSONL file
///
/// Each line is the notification document plus its `messageId`.
pub struct JsonlTriggerPublisher {
    writer: JsonlWriter,
    channel: String,
}

impl JsonlTriggerPublisher {
    pub fn new(writer: JsonlWriter) -> Self {
        let channel = writer.path().display().to_string();
        Self { writer, channel }
    }
}

#[async_trait]
impl TriggerPublisher for JsonlTriggerPublisher {
    fn channel(&self) -> &str {
        &self.channel
    }

    async fn publish_message(
        &self,
        notification: &TriggerNotification,
    ) -> Result<MessageId, PublishError> {
        let message_id = new_message_id();
        self.writer.append(&PublishedRecord { message_id: &message_id, notification })?;
        info!(message_id = %message_id, channel = %self.channel, "trigger_published");
        Ok(message_id)
    }
}
