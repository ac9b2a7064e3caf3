//! Services - geofence evaluation, trigger detection and event orchestration
//!
//! - `evaluator` - Point-in-geofence evaluation and innermost selection
//! - `trigger` - Containment change detection between snapshots
//! - `orchestrator` - Per-event pipeline (guard, persist, audit, publish)
//! - `pipeline` - Bounded concurrent dispatch from ingest into the orchestrator
//! - `error` - Per-event failure taxonomy

pub mod error;
pub mod evaluator;
pub mod orchestrator;
pub mod pipeline;
pub mod trigger;

// Re-export commonly used types
pub use error::ProcessError;
pub use evaluator::{evaluate, evaluate_store, select_innermost, EvaluatedGeofence};
pub use orchestrator::{EventOutcome, Orchestrator};
pub use pipeline::{create_event_pipeline, EventPipeline, PipelineStats};
pub use trigger::is_triggered;
