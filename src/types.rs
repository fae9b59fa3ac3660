//! Shared value types for displays, surfaces and migration geometry

use serde::{Deserialize, Serialize};

/// A point in global (virtual desktop) coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Rectangular bounds of a display or surface in global coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bounds {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Bounds {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Top-left corner; surfaces are matched to displays by origin equality
    pub fn origin(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.x
            && p.y >= self.y
            && p.x < self.x + self.width as i32
            && p.y < self.y + self.height as i32
    }

    /// Squared Euclidean distance from `p` to the nearest point of this rect
    /// (zero when the point is inside)
    pub fn distance_squared(&self, p: Point) -> i64 {
        let cx = p.x.clamp(self.x, self.x + self.width as i32 - 1);
        let cy = p.y.clamp(self.y, self.y + self.height as i32 - 1);
        let dx = (p.x - cx) as i64;
        let dy = (p.y - cy) as i64;
        dx * dx + dy * dy
    }
}

/// Drag direction reported by hosted content when an application crosses a
/// screen edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    /// Offset `p` by `magnitude` units toward this direction
    pub fn offset(self, p: Point, magnitude: i32) -> Point {
        match self {
            Direction::Right => Point::new(p.x + magnitude, p.y),
            Direction::Left => Point::new(p.x - magnitude, p.y),
            Direction::Up => Point::new(p.x, p.y - magnitude),
            Direction::Down => Point::new(p.x, p.y + magnitude),
        }
    }
}

/// Stable identifier for a registered surface within one process lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SurfaceId(pub u32);

impl std::fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Physical monitor descriptor, enumerated fresh from the host and never
/// mutated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Display {
    pub bounds: Bounds,
}
