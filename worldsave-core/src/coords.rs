//! Integer coordinates used to address saved records.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Overmap-terrain tiles per map segment along x and y.
pub const SEG_SIZE: i32 = 32;

/// A 3D integer position. For map quadrants and memory regions this is in
/// overmap-terrain units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Tripoint {
    /// X coordinate.
    pub x: i32,
    /// Y coordinate.
    pub y: i32,
    /// Z level.
    pub z: i32,
}

impl Tripoint {
    /// Construct a point.
    #[must_use]
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// The map segment containing this point. z passes through unchanged.
    #[must_use]
    pub fn segment(self) -> Self {
        Self {
            x: self.x.div_euclid(SEG_SIZE),
            y: self.y.div_euclid(SEG_SIZE),
            z: self.z,
        }
    }
}

impl fmt::Display for Tripoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{},{})", self.x, self.y, self.z)
    }
}

/// Position of one overmap on the 2D overmap grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct OvermapCoord {
    /// X coordinate.
    pub x: i32,
    /// Y coordinate.
    pub y: i32,
}

impl OvermapCoord {
    /// Construct a coordinate.
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for OvermapCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.x, self.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_floors_negative_coordinates() {
        assert_eq!(Tripoint::new(0, 0, 0).segment(), Tripoint::new(0, 0, 0));
        assert_eq!(Tripoint::new(31, 32, 1).segment(), Tripoint::new(0, 1, 1));
        assert_eq!(Tripoint::new(-1, -32, -3).segment(), Tripoint::new(-1, -1, -3));
        assert_eq!(Tripoint::new(-33, 95, 0).segment(), Tripoint::new(-2, 2, 0));
    }
}
