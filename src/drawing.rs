//! Drawing Controller
//!
//! Turns map clicks into a finished Point or Polygon. One controller per map
//! session; a drawing never outlives it.

use serde::{Deserialize, Serialize};

use crate::domain::{Coordinate, DomainError, DomainResult, Geometry, Polygon};

/// Minimum vertex count before a polygon can be finished
pub const MIN_POLYGON_VERTICES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DrawMode {
    Point,
    Polygon,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum DrawingState {
    #[default]
    Idle,
    PlacingPoint,
    DrawingPolygon(Vec<Coordinate>),
}

#[derive(Debug, Default)]
pub struct DrawingController {
    state: DrawingState,
}

impl DrawingController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &DrawingState {
        &self.state
    }

    pub fn is_active(&self) -> bool {
        self.state != DrawingState::Idle
    }

    /// Begin a drawing, discarding any pending vertices
    pub fn start(&mut self, mode: DrawMode) {
        self.state = match mode {
            DrawMode::Point => DrawingState::PlacingPoint,
            DrawMode::Polygon => DrawingState::DrawingPolygon(Vec::new()),
        };
    }

    /// Feed a map click
    ///
    /// Placing a point emits immediately. While drawing a polygon the click
    /// becomes a vertex, except that clicking the last vertex again is a
    /// double activation and finishes the polygon.
    pub fn click(&mut self, coordinate: Coordinate) -> Option<Geometry> {
        match &mut self.state {
            DrawingState::Idle => None,
            DrawingState::PlacingPoint => {
                if !coordinate.is_valid() {
                    log::warn!("Ignoring click outside WGS84 bounds: {:?}", coordinate);
                    return None;
                }
                self.state = DrawingState::Idle;
                Some(Geometry::Point(coordinate))
            }
            DrawingState::DrawingPolygon(vertices) => {
                if vertices.last() == Some(&coordinate) {
                    return self.finish();
                }
                if !coordinate.is_valid() {
                    log::warn!("Ignoring click outside WGS84 bounds: {:?}", coordinate);
                    return None;
                }
                vertices.push(coordinate);
                None
            }
        }
    }

    /// Close the polygon being drawn
    ///
    /// Too few vertices (or any other reason the ring would be invalid) leaves
    /// the drawing untouched and emits nothing.
    pub fn finish(&mut self) -> Option<Geometry> {
        self.try_finish().ok()
    }

    /// Like [`finish`](Self::finish) but reports why nothing was emitted
    pub fn try_finish(&mut self) -> DomainResult<Geometry> {
        let DrawingState::DrawingPolygon(vertices) = &self.state else {
            return Err(DomainError::Validation("No polygon is being drawn".into()));
        };
        if vertices.len() < MIN_POLYGON_VERTICES {
            return Err(DomainError::Validation(format!(
                "Polygon needs at least {} vertices, got {}",
                MIN_POLYGON_VERTICES,
                vertices.len()
            )));
        }
        let polygon = Polygon::new(vertices.clone())?;
        self.state = DrawingState::Idle;
        Ok(Geometry::Polygon(polygon))
    }

    /// Abort the drawing; no-op when idle
    pub fn cancel(&mut self) {
        self.state = DrawingState::Idle;
    }

    pub fn vertex_count(&self) -> usize {
        match &self.state {
            DrawingState::DrawingPolygon(vertices) => vertices.len(),
            _ => 0,
        }
    }

    /// Whether a finish action should be offered
    pub fn can_finish(&self) -> bool {
        self.vertex_count() >= MIN_POLYGON_VERTICES
    }
}
