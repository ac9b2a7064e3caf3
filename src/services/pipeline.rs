//! Event pipeline - bounded concurrent dispatch into the orchestrator
//!
//! Ingest pushes events into an mpsc channel. The pipeline spawns one task
//! per event, capped at `max_in_flight` by a semaphore. Two events for the
//! same order may run concurrently; the orchestrator's compare-and-save keeps
//! the order document consistent.
//!
//! When every sender is dropped the pipeline stops accepting work and waits
//! for in-flight events to finish.

use crate::domain::types::IncomingEvent;
use crate::infra::metrics::Metrics;
use crate::io::publisher::TriggerPublisher;
use crate::io::repository::Repository;
use crate::services::orchestrator::Orchestrator;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info};

/// Counts reported when the pipeline stops
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PipelineStats {
    pub dispatched: u64,
    pub applied: u64,
    pub triggered: u64,
    pub panicked: u64,
}

pub struct EventPipeline<R: ?Sized, P: ?Sized> {
    orchestrator: Arc<Orchestrator<R, P>>,
    event_rx: mpsc::Receiver<IncomingEvent>,
    permits: Arc<Semaphore>,
    metrics: Arc<Metrics>,
}

impl<R, P> EventPipeline<R, P>
where
    R: Repository + ?Sized + 'static,
    P: TriggerPublisher + ?Sized + 'static,
{
    pub fn new(
        orchestrator: Arc<Orchestrator<R, P>>,
        event_rx: mpsc::Receiver<IncomingEvent>,
        max_in_flight: usize,
    ) -> Self {
        let metrics = orchestrator.metrics().clone();
        Self {
            orchestrator,
            event_rx,
            permits: Arc::new(Semaphore::new(max_in_flight.max(1))),
            metrics,
        }
    }

    /// Run until the channel closes, then drain in-flight events
    pub async fn run(mut self) -> PipelineStats {
        info!(max_in_flight = %self.permits.available_permits(), "event_pipeline_started");

        let mut stats = PipelineStats::default();
        let mut tasks = JoinSet::new();

        while let Some(event) = self.event_rx.recv().await {
            // Reap finished tasks so the set does not grow with the stream
            while let Some(result) = tasks.try_join_next() {
                Self::account(&mut stats, result);
            }

            let permit = match self.permits.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    error!("event_pipeline_semaphore_closed");
                    break;
                }
            };

            stats.dispatched += 1;
            let orchestrator = self.orchestrator.clone();
            let metrics = self.metrics.clone();
            metrics.in_flight_inc();
            tasks.spawn(async move {
                let outcome = orchestrator.handle_event(&event).await;
                metrics.in_flight_dec();
                drop(permit);
                debug!(
                    order_id = %event.order_id,
                    outcome = %outcome.as_str(),
                    "event_dispatched"
                );
                (outcome.is_applied(), outcome.triggered())
            });
        }

        info!(in_flight = %tasks.len(), "event_pipeline_draining");
        while let Some(result) = tasks.join_next().await {
            Self::account(&mut stats, result);
        }

        info!(
            dispatched = %stats.dispatched,
            applied = %stats.applied,
            triggered = %stats.triggered,
            "event_pipeline_stopped"
        );
        stats
    }

    fn account(stats: &mut PipelineStats, result: Result<(bool, bool), tokio::task::JoinError>) {
        match result {
            Ok((applied, triggered)) => {
                stats.applied += u64::from(applied);
                stats.triggered += u64::from(triggered);
            }
            Err(e) => {
                stats.panicked += 1;
                error!(error = %e, "event_task_failed");
            }
        }
    }
}

/// Create the ingest channel and its pipeline
///
/// Returns the sender (for ingest) and the pipeline (to be spawned)
pub fn create_event_pipeline<R, P>(
    orchestrator: Arc<Orchestrator<R, P>>,
    channel_capacity: usize,
    max_in_flight: usize,
) -> (mpsc::Sender<IncomingEvent>, EventPipeline<R, P>)
where
    R: Repository + ?Sized + 'static,
    P: TriggerPublisher + ?Sized + 'static,
{
    let (event_tx, event_rx) = mpsc::channel(channel_capacity.max(1));
    let pipeline = EventPipeline::new(orchestrator, event_rx, max_in_flight);
    (event_tx, pipeline)
}
