//! Shared types for order geofence tracking

use crate::domain::geometry::GeofenceShape;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// Newtype wrapper for geofence IDs to provide type safety
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GeofenceId(pub String);

impl std::fmt::Display for GeofenceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// WGS84 position in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    #[inline]
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }
}

/// Event timestamp in epoch milliseconds
///
/// Accepts an integer, a float, or an RFC 3339 string on input and always
/// serializes as an integer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct EventTimestamp(pub i64);

impl EventTimestamp {
    #[inline]
    pub fn as_millis(&self) -> i64 {
        self.0
    }

    /// Parse an RFC 3339 timestamp ("2026-01-05T16:41:30.048+00:00")
    pub fn parse_rfc3339(s: &str) -> Option<Self> {
        OffsetDateTime::parse(s, &Rfc3339)
            .ok()
            .map(|dt| Self((dt.unix_timestamp_nanos() / 1_000_000) as i64))
    }
}

impl std::fmt::Display for EventTimestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for EventTimestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(self.0)
    }
}

impl<'de> Deserialize<'de> for EventTimestamp {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::{self, Visitor};

        struct TimestampVisitor;

        impl<'de> Visitor<'de> for TimestampVisitor {
            type Value = EventTimestamp;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("epoch milliseconds or an RFC 3339 timestamp")
            }

            fn visit_i64<E>(self, value: i64) -> Result<EventTimestamp, E>
            where
                E: de::Error,
            {
                Ok(EventTimestamp(value))
            }

            fn visit_u64<E>(self, value: u64) -> Result<EventTimestamp, E>
            where
                E: de::Error,
            {
                i64::try_from(value)
                    .map(EventTimestamp)
                    .map_err(|_| E::custom(format!("timestamp {value} out of range")))
            }

            fn visit_f64<E>(self, value: f64) -> Result<EventTimestamp, E>
            where
                E: de::Error,
            {
                if value.is_finite() {
                    Ok(EventTimestamp(value as i64))
                } else {
                    Err(E::custom("timestamp must be finite"))
                }
            }

            fn visit_str<E>(self, value: &str) -> Result<EventTimestamp, E>
            where
                E: de::Error,
            {
                EventTimestamp::parse_rfc3339(value)
                    .ok_or_else(|| E::custom(format!("invalid RFC 3339 timestamp: {value}")))
            }
        }

        deserializer.deserialize_any(TimestampVisitor)
    }
}

/// Store record; geofences are looked up by store name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Store {
    pub name: String,
}

/// Polygonal boundary owned by a store
///
/// `range` orders geofences by nesting depth: smaller is closer to the store.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Geofence {
    pub id: GeofenceId,
    pub range_type: String,
    pub range: f64,
    pub shape: GeofenceShape,
}

/// Containment result for one geofence, without its id or shape
///
/// This is the only geofence representation that is persisted on orders or
/// handed to the publisher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeofenceState {
    pub range_type: String,
    pub range: f64,
    pub intersects_event: bool,
}

/// Location event for an order, as received from upstream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingEvent {
    pub order_id: String,
    pub store_name: String,
    pub event_location: GeoPoint,
    pub event_timestamp: EventTimestamp,
}

/// Geofence evaluation frozen at one event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventSnapshot {
    pub event_location: GeoPoint,
    pub event_timestamp: EventTimestamp,
    pub geofences: Vec<GeofenceState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inner_geofence: Option<GeofenceState>,
}

/// Order aggregate, the durable record of an order's geofence state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub order_id: String,
    pub store_name: String,
    #[serde(default)]
    pub status: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_event: Option<EventSnapshot>,
    /// Write counter used for compare-and-save; 0 for documents written
    /// without one
    #[serde(default)]
    pub revision: u64,
}

impl Order {
    /// New order created on the first event seen for an order id
    pub fn new(order_id: &str, store_name: &str, default_status: &str) -> Self {
        Self {
            order_id: order_id.to_string(),
            store_name: store_name.to_string(),
            status: vec![default_status.to_string()],
            latest_event: None,
            revision: 0,
        }
    }

    /// Timestamp of the recorded latest event, if any
    #[inline]
    pub fn latest_timestamp(&self) -> Option<EventTimestamp> {
        self.latest_event.as_ref().map(|e| e.event_timestamp)
    }
}

/// Payload handed to the trigger publisher
///
/// Serializes as the order document plus `priorEvent`. The order's
/// `revision` is storage bookkeeping and is not part of the payload.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerNotification {
    pub order: Order,
    pub prior_event: Option<EventSnapshot>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NotificationWire<'a> {
    order_id: &'a str,
    store_name: &'a str,
    status: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    latest_event: Option<&'a EventSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    prior_event: Option<&'a EventSnapshot>,
}

impl Serialize for TriggerNotification {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        NotificationWire {
            order_id: &self.order.order_id,
            store_name: &self.order.store_name,
            status: &self.order.status,
            latest_event: self.order.latest_event.as_ref(),
            prior_event: self.prior_event.as_ref(),
        }
        .serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_from_integer() {
        let ts: EventTimestamp = serde_json::from_str("1767617600000").unwrap();
        assert_eq!(ts, EventTimestamp(1767617600000));
    }

    #[test]
    fn test_timestamp_from_rfc3339() {
        let ts: EventTimestamp = serde_json::from_str("\"2026-01-05T16:41:30.048+00:00\"").unwrap();
        assert!(ts.as_millis() > 1767000000000, "timestamp should be in 2026");
        assert!(ts.as_millis() < 1800000000000, "timestamp should be before 2027");
        assert_eq!(ts.as_millis() % 1000, 48);
    }

    #[test]
    fn test_timestamp_rejects_garbage() {
        assert!(serde_json::from_str::<EventTimestamp>("\"yesterday\"").is_err());
        assert!(serde_json::from_str::<EventTimestamp>("true").is_err());
    }

    #[test]
    fn test_incoming_event_camel_case() {
        let json = r#"{
            "orderId": "o-1",
            "storeName": "springfield",
            "eventLocation": {"latitude": 36.650717, "longitude": -93.220024},
            "eventTimestamp": 1000
        }"#;
        let event: IncomingEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.order_id, "o-1");
        assert_eq!(event.store_name, "springfield");
        assert_eq!(event.event_location.longitude, -93.220024);
        assert_eq!(event.event_timestamp, EventTimestamp(1000));
    }

    #[test]
    fn test_notification_flattens_order_and_omits_missing_prior() {
        let order = Order::new("o-1", "springfield", "open");
        let notification = TriggerNotification { order, prior_event: None };
        let value = serde_json::to_value(&notification).unwrap();

        assert_eq!(value["orderId"], "o-1");
        assert_eq!(value["status"][0], "open");
        assert!(value.get("priorEvent").is_none());
        assert!(value.get("latestEvent").is_none());
    }

    #[test]
    fn test_notification_keeps_revision_internal() {
        let mut order = Order::new("o-1", "springfield", "open");
        order.revision = 9;
        let value = serde_json::to_value(&TriggerNotification { order, prior_event: None }).unwrap();

        assert!(value.get("revision").is_none());
        let keys: Vec<&str> = value.as_object().unwrap().keys().map(String::as_str).collect();
        assert_eq!(keys.len(), 3, "unexpected fields: {keys:?}");
    }

    #[test]
    fn test_order_without_revision_defaults_to_zero() {
        let json = r#"{"orderId": "o-1", "storeName": "s", "status": ["open"]}"#;
        let order: Order = serde_json::from_str(json).unwrap();
        assert_eq!(order.revision, 0);
        assert!(order.latest_event.is_none());
    }
}
