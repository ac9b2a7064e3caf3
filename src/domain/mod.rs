//! Domain models - orders, geofences and event snapshots
//!
//! - `types` - Order aggregate, snapshots, incoming events, notifications
//! - `geometry` - Geofence shapes and the point-in-polygon adapter

pub mod geometry;
pub mod types;

pub use geometry::{point_in_polygon, GeofenceShape, ShapeError};
pub use types::{
    EventSnapshot, EventTimestamp, GeoPoint, Geofence, GeofenceId, GeofenceState, IncomingEvent,
    Order, Store, TriggerNotification,
};
