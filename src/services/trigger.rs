//! Trigger detection between two event snapshots
//!
//! A trigger fires whenever the per-geofence containment of the latest
//! snapshot differs from the prior one. This covers a new order (no prior
//! snapshot) and any boundary crossing. Which geofence changed is left to the
//! consumer, which receives both snapshots.

use crate::domain::types::{EventSnapshot, GeofenceState};

impl GeofenceState {
    /// Identity of a geofence within a store once `id` is stripped
    #[inline]
    fn same_key(&self, other: &GeofenceState) -> bool {
        self.range_type == other.range_type && self.range == other.range
    }
}

/// True if both snapshots record the same containment for every geofence
///
/// Absent snapshots and differing geofence counts are never equal. For each
/// prior geofence, the first latest geofence with the same
/// `(range_type, range)` must exist and agree on `intersects_event`.
/// Location and timestamp are ignored.
pub fn geofences_equal(prior: Option<&EventSnapshot>, latest: Option<&EventSnapshot>) -> bool {
    let (Some(prior), Some(latest)) = (prior, latest) else {
        return false;
    };
    if prior.geofences.len() != latest.geofences.len() {
        return false;
    }
    prior.geofences.iter().all(|prior_gf| {
        latest
            .geofences
            .iter()
            .find(|gf| gf.same_key(prior_gf))
            .is_some_and(|latest_gf| latest_gf.intersects_event == prior_gf.intersects_event)
    })
}

/// Whether processing `latest` after `prior` must notify downstream
#[inline]
pub fn is_triggered(prior: Option<&EventSnapshot>, latest: &EventSnapshot) -> bool {
    !geofences_equal(prior, Some(latest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{EventTimestamp, GeoPoint};

    fn state(range_type: &str, range: f64, intersects_event: bool) -> GeofenceState {
        GeofenceState { range_type: range_type.to_string(), range, intersects_event }
    }

    fn snapshot(ts: i64, geofences: Vec<GeofenceState>) -> EventSnapshot {
        EventSnapshot {
            event_location: GeoPoint::new(36.65, -93.22),
            event_timestamp: EventTimestamp(ts),
            inner_geofence: None,
            geofences,
        }
    }

    #[test]
    fn test_new_order_always_triggers() {
        let latest = snapshot(1000, vec![state("time", 120.0, false)]);
        assert!(is_triggered(None, &latest));

        let empty = snapshot(1000, vec![]);
        assert!(is_triggered(None, &empty));
    }

    #[test]
    fn test_identical_containment_does_not_trigger() {
        let prior = snapshot(1000, vec![state("time", 120.0, true), state("time", 300.0, true)]);
        let mut latest =
            snapshot(2000, vec![state("time", 300.0, true), state("time", 120.0, true)]);
        latest.event_location = GeoPoint::new(36.66, -93.21);
        latest.inner_geofence = Some(state("time", 120.0, true));

        assert!(!is_triggered(Some(&prior), &latest));
    }

    #[test]
    fn test_single_flip_triggers() {
        let prior = snapshot(1000, vec![state("time", 120.0, true), state("time", 300.0, true)]);
        let latest = snapshot(2000, vec![state("time", 120.0, false), state("time", 300.0, true)]);
        assert!(is_triggered(Some(&prior), &latest));
    }

    #[test]
    fn test_geofence_count_change_triggers() {
        let prior = snapshot(1000, vec![state("time", 120.0, false)]);
        let latest =
            snapshot(2000, vec![state("time", 120.0, false), state("time", 300.0, false)]);
        assert!(is_triggered(Some(&prior), &latest));
    }

    #[test]
    fn test_missing_key_triggers() {
        let prior = snapshot(1000, vec![state("time", 120.0, false)]);
        let renamed = snapshot(2000, vec![state("distance", 120.0, false)]);
        let resized = snapshot(2000, vec![state("time", 90.0, false)]);
        assert!(is_triggered(Some(&prior), &renamed));
        assert!(is_triggered(Some(&prior), &resized));
    }

    #[test]
    fn test_empty_snapshots_are_equal() {
        let prior = snapshot(1000, vec![]);
        let latest = snapshot(2000, vec![]);
        assert!(!is_triggered(Some(&prior), &latest));
    }

    #[test]
    fn test_duplicate_keys_compare_against_first_match() {
        let prior = snapshot(1000, vec![state("time", 120.0, true), state("time", 120.0, true)]);
        let latest = snapshot(2000, vec![state("time", 120.0, true), state("time", 120.0, false)]);
        // Only the first latest entry for a key is consulted
        assert!(geofences_equal(Some(&prior), Some(&latest)));
    }

    #[test]
    fn test_absent_latest_is_not_equal() {
        let prior = snapshot(1000, vec![]);
        assert!(!geofences_equal(Some(&prior), None));
        assert!(!geofences_equal(None, None));
    }
}
