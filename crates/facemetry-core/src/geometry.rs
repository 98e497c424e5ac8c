//! 2D landmark geometry: points, distances, midpoints and guarded division.

use serde::{Deserialize, Serialize};

/// Denominators with a magnitude below this are treated as zero.
pub const ZERO_EPSILON: f32 = 1e-6;

/// A landmark position in image pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to `other`.
    pub fn distance(&self, other: &Point) -> f32 {
        distance(*self, *other)
    }

    /// Point halfway between `self` and `other`.
    pub fn midpoint(&self, other: &Point) -> Point {
        midpoint(*self, *other)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl From<(f32, f32)> for Point {
    fn from((x, y): (f32, f32)) -> Self {
        Self { x, y }
    }
}

/// Euclidean distance between two points. Always non-negative.
pub fn distance(a: Point, b: Point) -> f32 {
    let dx = a.x - b.x;
    let dy = a.y - b.y;
    (dx * dx + dy * dy).sqrt()
}

/// Arithmetic mean of two points.
pub fn midpoint(a: Point, b: Point) -> Point {
    Point::new((a.x + b.x) / 2.0, (a.y + b.y) / 2.0)
}

/// Divide `numerator` by `denominator`, substituting `fallback_divisor` when the
/// denominator is zero (within [`ZERO_EPSILON`]) or not finite.
///
/// Used for every secondary segment in the metric engine so that a collapsed
/// segment yields a finite ratio instead of ∞/NaN.
pub fn safe_divide(numerator: f32, denominator: f32, fallback_divisor: f32) -> f32 {
    if denominator.is_finite() && denominator.abs() >= ZERO_EPSILON {
        numerator / denominator
    } else {
        numerator / fallback_divisor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_pythagorean() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(3.0, 4.0);
        assert!((distance(a, b) - 5.0).abs() < 1e-6);
        assert!((a.distance(&b) - b.distance(&a)).abs() < 1e-6);
    }

    #[test]
    fn test_distance_identical_points() {
        let p = Point::new(12.5, -3.0);
        assert_eq!(distance(p, p), 0.0);
    }

    #[test]
    fn test_midpoint() {
        let m = midpoint(Point::new(-2.0, 4.0), Point::new(6.0, 10.0));
        assert_eq!(m, Point::new(2.0, 7.0));
    }

    #[test]
    fn test_safe_divide_regular() {
        assert!((safe_divide(3.0, 4.0, 1.0) - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_safe_divide_zero_denominator_uses_fallback() {
        assert_eq!(safe_divide(3.0, 0.0, 1.0), 3.0);
        assert_eq!(safe_divide(3.0, 1e-9, 2.0), 1.5);
        assert_eq!(safe_divide(3.0, f32::NAN, 1.0), 3.0);
    }
}
