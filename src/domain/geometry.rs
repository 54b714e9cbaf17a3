//! Geometry Value Types
//!
//! Structured geometry used for editing, rendering and transmission.
//! Serializes as GeoJSON geometry objects (`{"type": "Point", "coordinates": [lng, lat]}`).

use serde::{Deserialize, Serialize};
use super::entity::{DomainError, DomainResult};

/// A longitude/latitude pair, serialized as `[lng, lat]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Coordinate {
    pub lng: f64,
    pub lat: f64,
}

impl Coordinate {
    pub fn new(lng: f64, lat: f64) -> Self {
        Self { lng, lat }
    }

    /// Finite and inside WGS84 bounds
    pub fn is_valid(&self) -> bool {
        self.lng.is_finite()
            && self.lat.is_finite()
            && (-180.0..=180.0).contains(&self.lng)
            && (-90.0..=90.0).contains(&self.lat)
    }

    fn validate(&self) -> DomainResult<()> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(DomainError::Validation(format!(
                "Coordinate ({}, {}) is outside WGS84 bounds",
                self.lng, self.lat
            )))
        }
    }
}

impl From<[f64; 2]> for Coordinate {
    fn from(pair: [f64; 2]) -> Self {
        Self::new(pair[0], pair[1])
    }
}

impl From<(f64, f64)> for Coordinate {
    fn from(pair: (f64, f64)) -> Self {
        Self::new(pair.0, pair.1)
    }
}

impl From<Coordinate> for [f64; 2] {
    fn from(c: Coordinate) -> Self {
        [c.lng, c.lat]
    }
}

/// A simple polygon: one closed exterior ring, no holes
///
/// The ring always repeats its first vertex as the last one and carries at
/// least 3 distinct vertices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Vec<Coordinate>>", into = "Vec<Vec<Coordinate>>")]
pub struct Polygon {
    ring: Vec<Coordinate>,
}

impl Polygon {
    /// Build a polygon from an open or closed vertex list
    pub fn new(vertices: Vec<Coordinate>) -> DomainResult<Self> {
        for vertex in &vertices {
            vertex.validate()?;
        }
        let ring = crate::codec::close_ring(vertices);
        let distinct = distinct_count(&ring[..ring.len().saturating_sub(1)]);
        if distinct < 3 {
            return Err(DomainError::Validation(format!(
                "Polygon needs at least 3 distinct vertices, got {}",
                distinct
            )));
        }
        Ok(Self { ring })
    }

    /// Closed ring, first vertex repeated last
    pub fn ring(&self) -> &[Coordinate] {
        &self.ring
    }

    /// Ring without the closing vertex
    pub fn vertices(&self) -> &[Coordinate] {
        &self.ring[..self.ring.len() - 1]
    }
}

impl TryFrom<Vec<Vec<Coordinate>>> for Polygon {
    type Error = DomainError;

    fn try_from(mut rings: Vec<Vec<Coordinate>>) -> Result<Self, Self::Error> {
        if rings.len() != 1 {
            return Err(DomainError::Validation(format!(
                "Only simple polygons are supported, got {} rings",
                rings.len()
            )));
        }
        Polygon::new(rings.remove(0))
    }
}

impl From<Polygon> for Vec<Vec<Coordinate>> {
    fn from(polygon: Polygon) -> Self {
        vec![polygon.ring]
    }
}

fn distinct_count(vertices: &[Coordinate]) -> usize {
    let mut seen: Vec<Coordinate> = Vec::with_capacity(vertices.len());
    for vertex in vertices {
        if !seen.contains(vertex) {
            seen.push(*vertex);
        }
    }
    seen.len()
}

/// Shape kind of a geometry; fixed for the lifetime of a lead
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GeometryKind {
    Point,
    Polygon,
}

impl GeometryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GeometryKind::Point => "point",
            GeometryKind::Polygon => "polygon",
        }
    }
}

/// Lead location: a single point or a roof footprint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "coordinates")]
pub enum Geometry {
    Point(Coordinate),
    Polygon(Polygon),
}

impl Geometry {
    pub fn point(lng: f64, lat: f64) -> Self {
        Geometry::Point(Coordinate::new(lng, lat))
    }

    pub fn kind(&self) -> GeometryKind {
        match self {
            Geometry::Point(_) => GeometryKind::Point,
            Geometry::Polygon(_) => GeometryKind::Polygon,
        }
    }

    /// Check coordinate bounds (polygons are validated on construction)
    pub fn validate(&self) -> DomainResult<()> {
        match self {
            Geometry::Point(c) => c.validate(),
            Geometry::Polygon(p) => p.ring().iter().try_for_each(Coordinate::validate),
        }
    }

    /// Axis-aligned bounds of the geometry
    pub fn bounds(&self) -> BBox {
        match self {
            Geometry::Point(c) => BBox {
                min_lng: c.lng,
                min_lat: c.lat,
                max_lng: c.lng,
                max_lat: c.lat,
            },
            Geometry::Polygon(p) => {
                let mut bbox = BBox {
                    min_lng: f64::INFINITY,
                    min_lat: f64::INFINITY,
                    max_lng: f64::NEG_INFINITY,
                    max_lat: f64::NEG_INFINITY,
                };
                for c in p.ring() {
                    bbox.min_lng = bbox.min_lng.min(c.lng);
                    bbox.min_lat = bbox.min_lat.min(c.lat);
                    bbox.max_lng = bbox.max_lng.max(c.lng);
                    bbox.max_lat = bbox.max_lat.max(c.lat);
                }
                bbox
            }
        }
    }
}

/// Visible map region `[minLng, minLat, maxLng, maxLat]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "[f64; 4]", into = "[f64; 4]")]
pub struct BBox {
    pub min_lng: f64,
    pub min_lat: f64,
    pub max_lng: f64,
    pub max_lat: f64,
}

impl BBox {
    pub fn new(min_lng: f64, min_lat: f64, max_lng: f64, max_lat: f64) -> DomainResult<Self> {
        let values = [min_lng, min_lat, max_lng, max_lat];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(DomainError::Validation("Bounding box must be finite".into()));
        }
        if min_lng > max_lng || min_lat > max_lat {
            return Err(DomainError::Validation(format!(
                "Bounding box corners are inverted: {:?}",
                values
            )));
        }
        Ok(Self { min_lng, min_lat, max_lng, max_lat })
    }

    pub fn contains(&self, c: &Coordinate) -> bool {
        c.lng >= self.min_lng && c.lng <= self.max_lng && c.lat >= self.min_lat && c.lat <= self.max_lat
    }

    pub fn intersects(&self, other: &BBox) -> bool {
        self.min_lng <= other.max_lng
            && self.max_lng >= other.min_lng
            && self.min_lat <= other.max_lat
            && self.max_lat >= other.min_lat
    }
}

impl TryFrom<[f64; 4]> for BBox {
    type Error = DomainError;

    fn try_from(v: [f64; 4]) -> Result<Self, Self::Error> {
        BBox::new(v[0], v[1], v[2], v[3])
    }
}

impl From<BBox> for [f64; 4] {
    fn from(b: BBox) -> Self {
        [b.min_lng, b.min_lat, b.max_lng, b.max_lat]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> Vec<Coordinate> {
        vec![
            Coordinate::new(-95.4, 29.8),
            Coordinate::new(-95.3, 29.8),
            Coordinate::new(-95.3, 29.7),
        ]
    }

    #[test]
    fn test_polygon_closes_open_ring() {
        let polygon = Polygon::new(square()).unwrap();
        assert_eq!(polygon.ring().len(), 4);
        assert_eq!(polygon.ring()[0], polygon.ring()[3]);
        assert_eq!(polygon.vertices().len(), 3);
    }

    #[test]
    fn test_polygon_rejects_degenerate_ring() {
        let mut vertices = square();
        vertices[2] = vertices[0];
        let err = Polygon::new(vertices).unwrap_err();
        assert_eq!(err.kind(), "ValidationError");
    }

    #[test]
    fn test_geometry_geojson_shape() {
        let json = serde_json::to_value(Geometry::point(-95.37, 29.76)).unwrap();
        assert_eq!(json, serde_json::json!({"type": "Point", "coordinates": [-95.37, 29.76]}));

        let polygon: Geometry = serde_json::from_value(serde_json::json!({
            "type": "Polygon",
            "coordinates": [[[-95.4, 29.8], [-95.3, 29.8], [-95.3, 29.7]]]
        }))
        .unwrap();
        assert_eq!(polygon.kind(), GeometryKind::Polygon);
    }

    #[test]
    fn test_bbox_intersection() {
        let view = BBox::new(-96.0, 29.0, -95.0, 30.0).unwrap();
        let footprint = Geometry::Polygon(Polygon::new(square()).unwrap()).bounds();
        assert!(view.intersects(&footprint));
        assert!(view.contains(&Coordinate::new(-95.37, 29.76)));
        assert!(!view.contains(&Coordinate::new(-94.0, 29.76)));
        assert!(BBox::new(1.0, 0.0, 0.0, 1.0).is_err());
    }
}
