//! IO modules - external system interfaces
//!
//! - `repository` - Storage interface for stores, geofences, orders and events
//! - `memory_repository` - In-memory repository seeded from JSON
//! - `publisher` - Trigger publisher interface and JSONL publisher
//! - `mqtt_publisher` - MQTT trigger publisher
//! - `mqtt` - MQTT ingest for location events
//! - `jsonl` - Append-only JSON lines writer
//! - `prometheus` - Prometheus metrics HTTP endpoint

pub mod jsonl;
pub mod memory_repository;
pub mod mqtt;
pub mod mqtt_publisher;
pub mod prometheus;
pub mod publisher;
pub mod repository;

// Re-export commonly used types
pub use jsonl::JsonlWriter;
pub use memory_repository::{MemoryRepository, SeedData};
pub use mqtt_publisher::MqttTriggerPublisher;
pub use publisher::{JsonlTriggerPublisher, MessageId, PublishError, TriggerPublisher};
pub use repository::{Repository, RepositoryError};
