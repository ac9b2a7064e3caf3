//! Geofence evaluation for a single event location
//!
//! Computes containment for every geofence of a store and picks the
//! innermost (smallest `range`) geofence that contains the point.

use crate::domain::geometry::point_in_polygon;
use crate::domain::types::{GeoPoint, Geofence, GeofenceState};
use crate::io::repository::Repository;
use crate::services::error::ProcessError;
use tracing::debug;

/// A geofence paired with its containment result for one point
#[derive(Debug, Clone, Copy)]
pub struct EvaluatedGeofence<'a> {
    pub geofence: &'a Geofence,
    pub intersects_event: bool,
}

impl EvaluatedGeofence<'_> {
    /// Drop `id` and `shape`, keeping only what is persisted
    pub fn strip(&self) -> GeofenceState {
        GeofenceState {
            range_type: self.geofence.range_type.clone(),
            range: self.geofence.range,
            intersects_event: self.intersects_event,
        }
    }
}

/// Stripped evaluation result for one store and point
#[derive(Debug, Clone, PartialEq)]
pub struct GeofenceEvaluation {
    /// One entry per store geofence, in repository order
    pub geofences: Vec<GeofenceState>,
    pub inner_geofence: Option<GeofenceState>,
}

/// Test every geofence against `point`
///
/// Output is 1:1 with the input, in the same order.
pub fn evaluate(geofences: &[Geofence], point: GeoPoint) -> Vec<EvaluatedGeofence<'_>> {
    geofences
        .iter()
        .map(|geofence| EvaluatedGeofence {
            geofence,
            intersects_event: point_in_polygon(point, &geofence.shape),
        })
        .collect()
}

/// Innermost intersecting geofence, if any
///
/// Among intersecting geofences the smallest `range` wins; on equal ranges
/// the first one in input order is returned.
pub fn select_innermost<'e, 'a>(
    evaluated: &'e [EvaluatedGeofence<'a>],
) -> Option<&'e EvaluatedGeofence<'a>> {
    evaluated
        .iter()
        .filter(|e| e.intersects_event)
        .min_by(|a, b| a.geofence.range.total_cmp(&b.geofence.range))
}

/// Resolve the store's geofences and evaluate them against `point`
pub async fn evaluate_store<R>(
    repository: &R,
    store_name: &str,
    point: GeoPoint,
) -> Result<GeofenceEvaluation, ProcessError>
where
    R: Repository + ?Sized,
{
    let store = repository
        .get_store(store_name)
        .await?
        .ok_or_else(|| ProcessError::StoreNotFound(store_name.to_string()))?;

    let geofences = repository.get_geofences_by_store(&store.name).await?;
    if geofences.is_empty() {
        return Err(ProcessError::NoGeofencesConfigured(store.name));
    }

    let evaluated = evaluate(&geofences, point);
    let inner_geofence = select_innermost(&evaluated).map(EvaluatedGeofence::strip);

    debug!(
        store = %store.name,
        geofences = %evaluated.len(),
        intersecting = %evaluated.iter().filter(|e| e.intersects_event).count(),
        inner_range = ?inner_geofence.as_ref().map(|g| g.range),
        "geofences_evaluated"
    );

    Ok(GeofenceEvaluation {
        geofences: evaluated.iter().map(EvaluatedGeofence::strip).collect(),
        inner_geofence,
    })
}
