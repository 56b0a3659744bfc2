/*!
Display geometry and pointer offset sampling.
*/

use crate::error::{Result, SharedError};
use serde::{Deserialize, Serialize};

/// A pointer location in global screen coordinates
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Bounds of one display in global screen coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DisplayRegion {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl DisplayRegion {
    /// Create a region, rejecting empty or non-finite bounds
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Result<Self> {
        let region = Self { x, y, width, height };
        region.validate()?;
        Ok(region)
    }

    pub fn validate(&self) -> Result<()> {
        let finite = [self.x, self.y, self.width, self.height]
            .iter()
            .all(|v| v.is_finite());
        if !finite || self.width <= 0.0 || self.height <= 0.0 {
            return Err(SharedError::invalid_display(format!("{:?}", self)));
        }
        Ok(())
    }

    /// Half-open containment: the right and bottom edges belong to the neighbour
    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.x
            && point.x < self.x + self.width
            && point.y >= self.y
            && point.y < self.y + self.height
    }

    /// Horizontal distance of the point from this region's midpoint
    pub fn offset_from_center(&self, point: Point) -> f64 {
        (point.x - self.x) - self.width / 2.0
    }
}

/// Offset of the pointer from the midpoint of whichever display contains it.
///
/// Returns 0 when the pointer is outside every known region, which happens
/// transiently while displays are being rearranged.
pub fn sample_pointer_offset(pointer: Point, regions: &[DisplayRegion]) -> f64 {
    regions
        .iter()
        .find(|region| region.contains(pointer))
        .map(|region| region.offset_from_center(pointer))
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_displays() -> Vec<DisplayRegion> {
        vec![
            DisplayRegion::new(0.0, 0.0, 1920.0, 1080.0).unwrap(),
            DisplayRegion::new(1920.0, 0.0, 2560.0, 1440.0).unwrap(),
        ]
    }

    #[test]
    fn test_midpoint_is_zero() {
        let regions = two_displays();
        assert_eq!(sample_pointer_offset(Point::new(960.0, 500.0), &regions), 0.0);
        assert_eq!(sample_pointer_offset(Point::new(3200.0, 10.0), &regions), 0.0);
    }

    #[test]
    fn test_offset_relative_to_containing_region() {
        let regions = two_displays();
        assert_eq!(sample_pointer_offset(Point::new(0.0, 0.0), &regions), -960.0);
        assert_eq!(sample_pointer_offset(Point::new(1919.0, 0.0), &regions), 959.0);
        // Second display is measured from its own origin and width
        assert_eq!(sample_pointer_offset(Point::new(1920.0, 0.0), &regions), -1280.0);
        assert_eq!(sample_pointer_offset(Point::new(4000.0, 1400.0), &regions), 800.0);
    }

    #[test]
    fn test_outside_all_regions_is_neutral() {
        let regions = two_displays();
        assert_eq!(sample_pointer_offset(Point::new(-5.0, 10.0), &regions), 0.0);
        // Below the shorter first display
        assert_eq!(sample_pointer_offset(Point::new(100.0, 1200.0), &regions), 0.0);
        assert_eq!(sample_pointer_offset(Point::new(100.0, 100.0), &[]), 0.0);
    }

    #[test]
    fn test_invalid_region_rejected() {
        assert!(DisplayRegion::new(0.0, 0.0, 0.0, 1080.0).is_err());
        assert!(DisplayRegion::new(0.0, 0.0, 1920.0, -1.0).is_err());
        assert!(DisplayRegion::new(f64::NAN, 0.0, 1920.0, 1080.0).is_err());
    }
}
