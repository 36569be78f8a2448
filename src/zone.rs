// src/zone.rs
//
// Region of interest. Detections only count when their centroid falls on
// or inside this polygon.

use crate::error::RegionError;
use crate::types::Point;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    vertices: Vec<Point>,
}

impl Region {
    pub fn new(vertices: Vec<Point>) -> Result<Self, RegionError> {
        if vertices.len() < 3 {
            return Err(RegionError::TooFewPoints(vertices.len()));
        }
        Ok(Self { vertices })
    }

    pub fn from_config(polygon: &[[i32; 2]]) -> Result<Self, RegionError> {
        Self::new(polygon.iter().copied().map(Point::from).collect())
    }

    pub fn vertices(&self) -> &[Point] {
        &self.vertices
    }

    /// Crossing-number test where points on an edge or vertex count as inside.
    pub fn contains(&self, p: Point) -> bool {
        let n = self.vertices.len();
        let mut inside = false;

        for i in 0..n {
            let a = self.vertices[i];
            let b = self.vertices[(i + 1) % n];

            if on_segment(a, b, p) {
                return true;
            }

            if (a.y > p.y) != (b.y > p.y) {
                // p.x < x-of-edge-at-p.y, cross-multiplied by dy to stay in integers
                let dy = wide(b.y) - wide(a.y);
                let lhs = (wide(p.x) - wide(a.x)) * dy;
                let rhs = (wide(b.x) - wide(a.x)) * (wide(p.y) - wide(a.y));
                let left_of_edge = if dy > 0 { lhs < rhs } else { lhs > rhs };
                if left_of_edge {
                    inside = !inside;
                }
            }
        }

        inside
    }
}

/// Differences of two `i32`s need 33 bits and their products 66, so all
/// edge arithmetic runs in `i128`.
fn wide(v: i32) -> i128 {
    v as i128
}

fn on_segment(a: Point, b: Point, p: Point) -> bool {
    let cross = (wide(b.x) - wide(a.x)) * (wide(p.y) - wide(a.y))
        - (wide(b.y) - wide(a.y)) * (wide(p.x) - wide(a.x));
    cross == 0
        && p.x >= a.x.min(b.x)
        && p.x <= a.x.max(b.x)
        && p.y >= a.y.min(b.y)
        && p.y <= a.y.max(b.y)
}
