//! Per-event geofence pipeline
//!
//! For each incoming event the orchestrator:
//! 1. Evaluates the store's geofences and loads the order concurrently
//! 2. Rejects events older than the order's recorded latest event
//! 3. Replaces the order's latest snapshot and writes it back with
//!    compare-and-save, retrying on revision conflicts
//! 4. Records the raw event (best effort)
//! 5. Publishes a trigger notification if geofence containment changed
//!
//! Failures are contained per event: `handle_event` logs them and returns an
//! outcome instead of an error.


use crate::domain::types::{EventSnapshot, IncomingEvent, Order, TriggerNotification};
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::io::publisher::{MessageId, TriggerPublisher};
use crate::io::repository::Repository;
use crate::services::error::ProcessError;
use crate::services::evaluator::evaluate_store;
use crate::services::trigger::is_triggered;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Terminal state of one event
#[derive(Debug)]
pub enum EventOutcome {
    /// Order state was written; `message_id` is set when a trigger was published
    Applied { triggered: bool, message_id: Option<MessageId> },
    /// Event was older than the recorded state and was dropped untouched
    RejectedStale { event_timestamp: i64, latest_timestamp: i64 },
    /// Processing aborted; nothing after the failing step ran
    Failed(ProcessError),
}

impl EventOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, EventOutcome::Applied { .. })
    }

    pub fn triggered(&self) -> bool {
        matches!(self, EventOutcome::Applied { triggered: true, .. })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventOutcome::Applied { .. } => "applied",
            EventOutcome::RejectedStale { .. } => "stale",
            EventOutcome::Failed(_) => "failed",
        }
    }
}

/// Order state after a successful write
struct AppliedEvent {
    order: Order,
    prior: Option<EventSnapshot>,
    triggered: bool,
}

/// Geofence event orchestrator
pub struct Orchestrator<R: ?Sized, P: ?Sized> {
    repository: Arc<R>,
    publisher: Arc<P>,
    metrics: Arc<Metrics>,
    /// Status assigned to orders created by their first event
    default_status: String,
    /// Compare-and-save attempts per event
    max_write_attempts: u32,
}

impl<R, P> Orchestrator<R, P>
where
    R: Repository + ?Sized,
    P: TriggerPublisher + ?Sized,
{
    pub fn new(config: &Config, repository: Arc<R>, publisher: Arc<P>, metrics: Arc<Metrics>) -> Self {
        Self {
            repository,
            publisher,
            metrics,
            default_status: config.default_order_status().to_string(),
            max_write_attempts: config.max_write_attempts().max(1),
        }
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Process one event to a terminal outcome
    ///
    /// Never returns an error; failures are logged and reported as
    /// `EventOutcome::Failed` so one bad event cannot stop a stream.
    pub async fn handle_event(&self, event: &IncomingEvent) -> EventOutcome {
        let start = Instant::now();

        let outcome = match self.apply_event(event).await {
            Ok(applied) => {
                self.metrics.record_applied();
                self.notify(event, applied).await
            }
            Err(ProcessError::StaleEvent { event: event_ts, latest }) => {
                info!(
                    order_id = %event.order_id,
                    store = %event.store_name,
                    event_timestamp = %event_ts,
                    latest_timestamp = %latest,
                    "event_stale"
                );
                self.metrics.record_stale();
                EventOutcome::RejectedStale {
                    event_timestamp: event_ts.as_millis(),
                    latest_timestamp: latest.as_millis(),
                }
            }
            Err(e) => {
                if e.is_configuration() {
                    warn!(
                        order_id = %event.order_id,
                        store = %event.store_name,
                        error = %e,
                        "event_rejected_store_setup"
                    );
                } else {
                    error!(
                        order_id = %event.order_id,
                        store = %event.store_name,
                        event_timestamp = %event.event_timestamp,
                        error = %e,
                        "event_processing_failed"
                    );
                }
                self.metrics.record_failed();
                EventOutcome::Failed(e)
            }
        };

        self.metrics.record_event_processed(start.elapsed().as_micros() as u64);
        outcome
    }

    /// Evaluate, guard and persist; everything up to the trigger decision
    async fn apply_event(&self, event: &IncomingEvent) -> Result<AppliedEvent, ProcessError> {
        let (evaluation, mut existing) = tokio::try_join!(
            evaluate_store(self.repository.as_ref(), &event.store_name, event.event_location),
            async {
                self.repository
                    .get_order(&event.order_id, &event.store_name)
                    .await
                    .map_err(ProcessError::from)
            },
        )?;

        let latest = EventSnapshot {
            event_location: event.event_location,
            event_timestamp: event.event_timestamp,
            geofences: evaluation.geofences,
            inner_geofence: evaluation.inner_geofence,
        };

        let mut attempt = 1;
        loop {
            if let Some(recorded) = existing.as_ref().and_then(Order::latest_timestamp) {
                if recorded > event.event_timestamp {
                    return Err(ProcessError::StaleEvent {
                        event: event.event_timestamp,
                        latest: recorded,
                    });
                }
            }

            let expected_revision = existing.as_ref().map(|o| o.revision);
            let mut order = existing.unwrap_or_else(|| {
                Order::new(&event.order_id, &event.store_name, &self.default_status)
            });
            let prior = order.latest_event.replace(latest.clone());
            order.revision = expected_revision.map_or(1, |r| r + 1);

            if self.repository.compare_and_save_order(&order, expected_revision).await? {
                debug!(
                    order_id = %order.order_id,
                    revision = %order.revision,
                    attempt = %attempt,
                    "order_saved"
                );
                self.record_event(event).await;
                let triggered = is_triggered(prior.as_ref(), &latest);
                return Ok(AppliedEvent { order, prior, triggered });
            }

            self.metrics.record_write_conflict();
            warn!(
                order_id = %event.order_id,
                store = %event.store_name,
                attempt = %attempt,
                "order_write_conflict"
            );
            if attempt >= self.max_write_attempts {
                return Err(ProcessError::WriteConflict { attempts: attempt });
            }
            attempt += 1;

            // Re-read and decide again against the state that won the race
            existing = self.repository.get_order(&event.order_id, &event.store_name).await?;
        }
    }

    /// Best-effort audit write; failures never affect the outcome
    async fn record_event(&self, event: &IncomingEvent) {
        if let Err(e) = self.repository.insert_event(event).await {
            self.metrics.record_audit_failure();
            warn!(
                order_id = %event.order_id,
                event_timestamp = %event.event_timestamp,
                error = %e,
                "event_audit_failed"
            );
        }
    }

    /// Publish a trigger notification when containment changed
    async fn notify(&self, event: &IncomingEvent, applied: AppliedEvent) -> EventOutcome {
        let AppliedEvent { order, prior, triggered } = applied;

        if !triggered {
            debug!(
                order_id = %order.order_id,
                event_timestamp = %event.event_timestamp,
                "geofence_unchanged"
            );
            return EventOutcome::Applied { triggered: false, message_id: None };
        }

        info!(
            order_id = %order.order_id,
            store = %order.store_name,
            event_timestamp = %event.event_timestamp,
            new_order = %prior.is_none(),
            inner_range = ?order
                .latest_event
                .as_ref()
                .and_then(|e| e.inner_geofence.as_ref())
                .map(|g| g.range),
            "geofence_triggered"
        );

        let notification = TriggerNotification { order, prior_event: prior };
        match self.publisher.publish_message(&notification).await {
            Ok(message_id) => {
                self.metrics.record_trigger_published();
                EventOutcome::Applied { triggered: true, message_id: Some(message_id) }
            }
            Err(e) => {
                self.metrics.record_publish_failure();
                error!(
                    order_id = %notification.order.order_id,
                    channel = %self.publisher.channel(),
                    error = %e,
                    "trigger_publish_failed"
                );
                EventOutcome::Applied { triggered: true, message_id: None }
            }
        }
    }
}
