//! Named 68-point landmark groups as produced by the upstream landmark model.
//!
//! Group cardinality is carried in the array types, so metric formulas index
//! into groups without any runtime bounds handling. The only count check is at
//! the boundary where a flat point list becomes a [`LandmarkSet`].

use crate::geometry::Point;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Total number of points in the 68-point layout.
pub const LANDMARK_COUNT: usize = 68;

const JAW: std::ops::Range<usize> = 0..17;
const LEFT_EYEBROW: std::ops::Range<usize> = 17..22;
const RIGHT_EYEBROW: std::ops::Range<usize> = 22..27;
const NOSE: std::ops::Range<usize> = 27..36;
const LEFT_EYE: std::ops::Range<usize> = 36..42;
const RIGHT_EYE: std::ops::Range<usize> = 42..48;
const MOUTH: std::ops::Range<usize> = 48..68;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LandmarkError {
    #[error("expected 68 landmark points, got {0}")]
    PointCount(usize),
}

/// One face's landmarks, grouped by facial feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "LandmarkInput")]
pub struct LandmarkSet {
    pub jaw: [Point; 17],
    pub left_eyebrow: [Point; 5],
    pub right_eyebrow: [Point; 5],
    pub nose: [Point; 9],
    pub left_eye: [Point; 6],
    pub right_eye: [Point; 6],
    /// Outer lip contour (12 points) followed by the inner contour (8 points).
    pub mouth: [Point; 20],
}

impl LandmarkSet {
    /// Split a flat 68-point list into named groups.
    pub fn from_points(points: &[Point]) -> Result<Self, LandmarkError> {
        if points.len() != LANDMARK_COUNT {
            return Err(LandmarkError::PointCount(points.len()));
        }
        Ok(Self {
            jaw: group(points, JAW),
            left_eyebrow: group(points, LEFT_EYEBROW),
            right_eyebrow: group(points, RIGHT_EYEBROW),
            nose: group(points, NOSE),
            left_eye: group(points, LEFT_EYE),
            right_eye: group(points, RIGHT_EYE),
            mouth: group(points, MOUTH),
        })
    }

    /// Flatten back into the 68-point layout.
    pub fn to_points(&self) -> Vec<Point> {
        let mut points = Vec::with_capacity(LANDMARK_COUNT);
        points.extend_from_slice(&self.jaw);
        points.extend_from_slice(&self.left_eyebrow);
        points.extend_from_slice(&self.right_eyebrow);
        points.extend_from_slice(&self.nose);
        points.extend_from_slice(&self.left_eye);
        points.extend_from_slice(&self.right_eye);
        points.extend_from_slice(&self.mouth);
        points
    }

    /// Center of the left eye (midpoint of its outer and inner corners).
    pub fn left_eye_center(&self) -> Point {
        self.left_eye[0].midpoint(&self.left_eye[3])
    }

    /// Center of the right eye (midpoint of its outer and inner corners).
    pub fn right_eye_center(&self) -> Point {
        self.right_eye[0].midpoint(&self.right_eye[3])
    }

    /// Highest eyebrow point (minimum y across both eyebrows).
    pub fn brow_top(&self) -> Point {
        self.left_eyebrow
            .iter()
            .chain(self.right_eyebrow.iter())
            .copied()
            .fold(self.left_eyebrow[0], |top, p| if p.y < top.y { p } else { top })
    }

    pub fn nose_tip(&self) -> Point {
        self.nose[3]
    }

    pub fn mouth_center(&self) -> Point {
        self.mouth[3].midpoint(&self.mouth[9])
    }

    pub fn chin(&self) -> Point {
        self.jaw[8]
    }

    pub fn is_finite(&self) -> bool {
        self.to_points().iter().all(Point::is_finite)
    }
}

fn group<const N: usize>(points: &[Point], range: std::ops::Range<usize>) -> [Point; N] {
    let mut out = [Point::default(); N];
    out.copy_from_slice(&points[range]);
    out
}

/// Accepted wire shapes: the grouped object or a flat 68-point array.
#[derive(Deserialize)]
#[serde(untagged)]
enum LandmarkInput {
    Grouped(LandmarkGroups),
    Positions { positions: Vec<Point> },
    Flat(Vec<Point>),
}

#[derive(Deserialize)]
struct LandmarkGroups {
    jaw: [Point; 17],
    left_eyebrow: [Point; 5],
    right_eyebrow: [Point; 5],
    nose: [Point; 9],
    left_eye: [Point; 6],
    right_eye: [Point; 6],
    mouth: [Point; 20],
}

impl TryFrom<LandmarkInput> for LandmarkSet {
    type Error = LandmarkError;

    fn try_from(input: LandmarkInput) -> Result<Self, Self::Error> {
        match input {
            LandmarkInput::Grouped(g) => Ok(Self {
                jaw: g.jaw,
                left_eyebrow: g.left_eyebrow,
                right_eyebrow: g.right_eyebrow,
                nose: g.nose,
                left_eye: g.left_eye,
                right_eye: g.right_eye,
                mouth: g.mouth,
            }),
            LandmarkInput::Positions { positions } => Self::from_points(&positions),
            LandmarkInput::Flat(points) => Self::from_points(&points),
        }
    }
}
