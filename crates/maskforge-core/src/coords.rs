//! Display-space to buffer-space coordinate mapping.
//!
//! The canvas is usually shown at a different size than its backing
//! buffer. Pointer positions arrive relative to the displayed canvas's
//! top-left corner and must be scaled per axis before they touch pixels.

use serde::{Deserialize, Serialize};

use crate::types::{Dimensions, EditorError, Point};

/// On-screen size of the displayed canvas, in display units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DisplaySize {
    /// Displayed width.
    pub width: f64,
    /// Displayed height.
    pub height: f64,
}

impl DisplaySize {
    /// Create a new display size.
    #[must_use]
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// Maps display-space points into buffer space.
///
/// Stateless apart from the two sizes; rebuild it whenever the display
/// size changes (for example on window resize).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinateMapper {
    scale_x: f64,
    scale_y: f64,
}

impl CoordinateMapper {
    /// Build a mapper for a buffer shown at `display` size.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::InvalidConfig`] if either display axis is
    /// not a positive finite number.
    pub fn new(buffer: Dimensions, display: DisplaySize) -> Result<Self, EditorError> {
        if !(display.width.is_finite() && display.width > 0.0)
            || !(display.height.is_finite() && display.height > 0.0)
        {
            return Err(EditorError::InvalidConfig(format!(
                "display size must be positive, got {}x{}",
                display.width, display.height
            )));
        }
        Ok(Self {
            scale_x: f64::from(buffer.width) / display.width,
            scale_y: f64::from(buffer.height) / display.height,
        })
    }

    /// Identity mapping, for callers that already work in buffer space.
    #[must_use]
    pub const fn identity() -> Self {
        Self {
            scale_x: 1.0,
            scale_y: 1.0,
        }
    }

    /// Map a point relative to the displayed canvas's top-left corner.
    #[must_use]
    pub fn to_buffer(&self, display: Point) -> Point {
        Point::new(display.x * self.scale_x, display.y * self.scale_y)
    }

    /// Map a display-space displacement (no origin shift involved).
    #[must_use]
    pub fn delta_to_buffer(&self, dx: f64, dy: f64) -> Point {
        Point::new(dx * self.scale_x, dy * self.scale_y)
    }

    /// Horizontal and vertical scale factors (buffer units per display unit).
    #[must_use]
    pub const fn scale(&self) -> (f64, f64) {
        (self.scale_x, self.scale_y)
    }
}

impl Default for CoordinateMapper {
    fn default() -> Self {
        Self::identity()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn corners_map_to_corners() {
        let mapper =
            CoordinateMapper::new(Dimensions::new(1024, 768), DisplaySize::new(512.0, 300.0))
                .unwrap();
        assert_eq!(mapper.to_buffer(Point::ORIGIN), Point::ORIGIN);
        let far = mapper.to_buffer(Point::new(512.0, 300.0));
        assert!((far.x - 1024.0).abs() < 1e-9);
        assert!((far.y - 768.0).abs() < 1e-9);
    }

    #[test]
    fn axes_scale_independently() {
        let mapper =
            CoordinateMapper::new(Dimensions::new(200, 100), DisplaySize::new(100.0, 100.0))
                .unwrap();
        assert_eq!(mapper.to_buffer(Point::new(10.0, 10.0)), Point::new(20.0, 10.0));
        assert_eq!(mapper.scale(), (2.0, 1.0));
    }

    #[test]
    fn deltas_scale_without_offset() {
        let mapper =
            CoordinateMapper::new(Dimensions::new(300, 300), DisplaySize::new(100.0, 150.0))
                .unwrap();
        assert_eq!(mapper.delta_to_buffer(-5.0, 3.0), Point::new(-15.0, 6.0));
    }

    #[test]
    fn zero_display_size_is_rejected() {
        let result = CoordinateMapper::new(Dimensions::new(10, 10), DisplaySize::new(0.0, 10.0));
        assert!(matches!(result, Err(EditorError::InvalidConfig(_))));
    }

    #[test]
    fn identity_leaves_points_alone() {
        let p = Point::new(12.5, 99.0);
        assert_eq!(CoordinateMapper::identity().to_buffer(p), p);
    }
}
