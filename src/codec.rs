//! Geometry Codec
//!
//! Translates between the store's position-only geometry text and the
//! structured [`Geometry`] value. The accepted grammar is deliberately small:
//!
//! ```text
//! geometry := [ "SRID=" digits ";" ] ( point | polygon )
//! point    := "POINT" "(" position ")"
//! polygon  := "POLYGON" "(" "(" position { "," position } ")" ")"
//! position := number whitespace number          (lng lat)
//! ```
//!
//! Keywords are case-insensitive and whitespace is free between tokens.
//! Anything else (multi-geometries, holes, Z/M values) is a decode error.

use std::sync::OnceLock;

use regex::Regex;

use crate::domain::{Coordinate, DomainError, DomainResult, Geometry, Polygon};

const NUMBER: &str = r"[-+]?(?:\d+\.?\d*|\.\d+)(?:[eE][-+]?\d+)?";

fn point_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(&format!(
            r"(?i)^\s*(?:SRID=\d+\s*;\s*)?POINT\s*\(\s*({n})\s+({n})\s*\)\s*$",
            n = NUMBER
        ))
        .expect("point pattern is valid")
    })
}

fn polygon_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)^\s*(?:SRID=\d+\s*;\s*)?POLYGON\s*\(\s*\(([^()]*)\)\s*\)\s*$")
            .expect("polygon pattern is valid")
    })
}

fn position_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(&format!(r"^\s*({n})\s+({n})\s*$", n = NUMBER)).expect("position pattern is valid")
    })
}

/// Decode stored geometry text, degrading to `None` on any parse failure
pub fn decode(raw: &str) -> Option<Geometry> {
    match try_decode(raw) {
        Ok(geometry) => Some(geometry),
        Err(e) => {
            log::warn!("{}", e);
            None
        }
    }
}

/// Decode stored geometry text
pub fn try_decode(raw: &str) -> DomainResult<Geometry> {
    if let Some(caps) = point_pattern().captures(raw) {
        let coordinate = parse_pair(&caps[1], &caps[2], raw)?;
        if !coordinate.is_valid() {
            return Err(decode_error(raw, "point outside WGS84 bounds"));
        }
        return Ok(Geometry::Point(coordinate));
    }

    if let Some(caps) = polygon_pattern().captures(raw) {
        let mut vertices = Vec::new();
        for position in caps[1].split(',') {
            let pair = position_pattern()
                .captures(position)
                .ok_or_else(|| decode_error(raw, "malformed polygon position"))?;
            vertices.push(parse_pair(&pair[1], &pair[2], raw)?);
        }
        return Polygon::new(vertices)
            .map(Geometry::Polygon)
            .map_err(|e| decode_error(raw, e.message()));
    }

    Err(decode_error(raw, "unsupported geometry"))
}

/// Encode a geometry for submission to the store
///
/// Points pass through unchanged; polygon rings are closed if open.
pub fn encode(geometry: &Geometry) -> String {
    match geometry {
        Geometry::Point(c) => format!("POINT({} {})", c.lng, c.lat),
        Geometry::Polygon(polygon) => {
            let ring = close_ring(polygon.ring().to_vec());
            let positions: Vec<String> = ring
                .iter()
                .map(|c| format!("{} {}", c.lng, c.lat))
                .collect();
            format!("POLYGON(({}))", positions.join(", "))
        }
    }
}

/// Append the first vertex when the ring is open
pub fn close_ring(mut ring: Vec<Coordinate>) -> Vec<Coordinate> {
    if let (Some(first), Some(last)) = (ring.first().copied(), ring.last().copied()) {
        if first != last {
            ring.push(first);
        }
    }
    ring
}

fn parse_pair(lng: &str, lat: &str, raw: &str) -> DomainResult<Coordinate> {
    let lng: f64 = lng.parse().map_err(|_| decode_error(raw, "invalid longitude"))?;
    let lat: f64 = lat.parse().map_err(|_| decode_error(raw, "invalid latitude"))?;
    Ok(Coordinate::new(lng, lat))
}

fn decode_error(raw: &str, reason: &str) -> DomainError {
    let preview: String = raw.chars().take(64).collect();
    DomainError::Decode(format!("{} in {:?}", reason, preview))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle() -> Geometry {
        Geometry::Polygon(
            Polygon::new(vec![
                Coordinate::new(-95.4, 29.8),
                Coordinate::new(-95.3, 29.8),
                Coordinate::new(-95.3, 29.7),
            ])
            .unwrap(),
        )
    }

    #[test]
    fn test_round_trip_point_and_polygon() {
        for geometry in [Geometry::point(-95.37, 29.76), Geometry::point(0.1, -0.000001), triangle()] {
            assert_eq!(decode(&encode(&geometry)), Some(geometry));
        }
    }

    #[test]
    fn test_encoded_ring_is_closed() {
        let encoded = encode(&triangle());
        assert_eq!(encoded, "POLYGON((-95.4 29.8, -95.3 29.8, -95.3 29.7, -95.4 29.8))");
    }

    #[test]
    fn test_close_ring_only_when_open() {
        let a = Coordinate::new(1.0, 1.0);
        let b = Coordinate::new(2.0, 1.0);
        assert_eq!(close_ring(vec![a, b]), vec![a, b, a]);
        assert_eq!(close_ring(vec![a, b, a]), vec![a, b, a]);
        assert!(close_ring(Vec::new()).is_empty());
    }

    #[test]
    fn test_decode_accepts_loose_formatting() {
        assert_eq!(
            decode("SRID=4326;point ( -95.37   29.76 )"),
            Some(Geometry::point(-95.37, 29.76))
        );
        // Open rings in storage are closed on the way in
        let open = decode("POLYGON((-95.4 29.8,-95.3 29.8,-95.3 29.7))").unwrap();
        assert_eq!(open, triangle());
    }

    #[test]
    fn test_decode_rejects_everything_else() {
        for raw in [
            "GARBAGE",
            "",
            "POINT(1)",
            "POINT(1 2 3)",
            "POINT(200 10)",
            "LINESTRING(0 0, 1 1)",
            "MULTIPOINT((0 0))",
            "POLYGON((0 0, 1 0, 1 1, 0 0), (0.2 0.2, 0.4 0.2, 0.4 0.4, 0.2 0.2))",
            "POLYGON((0 0, 1 1, 0 0))",
        ] {
            assert_eq!(decode(raw), None, "{raw} should not decode");
            assert_eq!(try_decode(raw).unwrap_err().kind(), "DecodeError");
        }
    }
}
