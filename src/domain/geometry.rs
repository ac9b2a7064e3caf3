//! Point-in-polygon adapter over the `geo` crate
//!
//! Geofence shapes arrive as GeoJSON (`Polygon`, `MultiPolygon`, or a
//! `Feature` wrapping either). They are validated once at parse time so
//! that containment checks are infallible.

use crate::domain::types::GeoPoint;
use geo::{Coord, Intersects, LineString, MultiPolygon, Point, Polygon};
use serde::Deserialize;

/// Minimum positions in a linear ring: a triangle plus the closing position
const MIN_RING_POSITIONS: usize = 4;

#[derive(Debug, thiserror::Error)]
pub enum ShapeError {
    #[error("position has {0} coordinates, need at least 2")]
    ShortPosition(usize),

    #[error("ring has {0} positions, need at least 4")]
    ShortRing(usize),

    #[error("ring is not closed: first and last positions differ")]
    UnclosedRing,

    #[error("polygon has no exterior ring")]
    EmptyPolygon,

    #[error("geometry contains no polygons")]
    NoPolygons,
}

type Position = Vec<f64>;
type Ring = Vec<Position>;

/// GeoJSON input accepted for geofence shapes
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum GeoJsonShape {
    Feature { geometry: Box<GeoJsonShape> },
    Polygon { coordinates: Vec<Ring> },
    MultiPolygon { coordinates: Vec<Vec<Ring>> },
}

/// Validated geofence boundary
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "GeoJsonShape")]
pub struct GeofenceShape(MultiPolygon<f64>);

impl GeofenceShape {
    pub fn polygons(&self) -> &MultiPolygon<f64> {
        &self.0
    }
}

impl From<Polygon<f64>> for GeofenceShape {
    fn from(polygon: Polygon<f64>) -> Self {
        Self(MultiPolygon::new(vec![polygon]))
    }
}

impl From<MultiPolygon<f64>> for GeofenceShape {
    fn from(polygons: MultiPolygon<f64>) -> Self {
        Self(polygons)
    }
}

impl TryFrom<GeoJsonShape> for GeofenceShape {
    type Error = ShapeError;

    fn try_from(shape: GeoJsonShape) -> Result<Self, Self::Error> {
        let polygons = match shape {
            GeoJsonShape::Feature { geometry } => return Self::try_from(*geometry),
            GeoJsonShape::Polygon { coordinates } => vec![to_polygon(coordinates)?],
            GeoJsonShape::MultiPolygon { coordinates } => coordinates
                .into_iter()
                .map(to_polygon)
                .collect::<Result<Vec<_>, _>>()?,
        };
        if polygons.is_empty() {
            return Err(ShapeError::NoPolygons);
        }
        Ok(Self(MultiPolygon::new(polygons)))
    }
}

fn to_ring(ring: Ring) -> Result<LineString<f64>, ShapeError> {
    if ring.len() < MIN_RING_POSITIONS {
        return Err(ShapeError::ShortRing(ring.len()));
    }
    let coords = ring
        .into_iter()
        .map(|position| match position.as_slice() {
            [x, y, ..] => Ok(Coord { x: *x, y: *y }),
            short => Err(ShapeError::ShortPosition(short.len())),
        })
        .collect::<Result<Vec<_>, _>>()?;
    if coords.first() != coords.last() {
        return Err(ShapeError::UnclosedRing);
    }
    Ok(LineString::new(coords))
}

fn to_polygon(rings: Vec<Ring>) -> Result<Polygon<f64>, ShapeError> {
    let mut rings = rings.into_iter();
    let exterior = to_ring(rings.next().ok_or(ShapeError::EmptyPolygon)?)?;
    let interiors = rings.map(to_ring).collect::<Result<Vec<_>, _>>()?;
    Ok(Polygon::new(exterior, interiors))
}

/// True if `point` lies inside `shape` or on its boundary
///
/// Holes are excluded. The point is tested as `[longitude, latitude]`, the
/// GeoJSON axis order.
#[inline]
pub fn point_in_polygon(point: GeoPoint, shape: &GeofenceShape) -> bool {
    shape.0.intersects(&Point::new(point.longitude, point.latitude))
}
