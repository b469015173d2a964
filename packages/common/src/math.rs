//! Small geometry helpers over nalgebra vectors.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

pub type Point = Vector3<f64>;

pub fn point(x: f64, y: f64, z: f64) -> Point {
    Vector3::new(x, y, z)
}

pub fn points_equal(a: &Point, b: &Point, epsilon: f64) -> bool {
    (a - b).norm() <= epsilon
}

/// Parameter of `p` along segment `a`→`b` when `p` lies strictly inside it
pub fn segment_interior_param(p: &Point, a: &Point, b: &Point, epsilon: f64) -> Option<f64> {
    let dir = b - a;
    let len_sq = dir.norm_squared();
    if len_sq <= epsilon * epsilon {
        return None;
    }

    let t = (p - a).dot(&dir) / len_sq;
    let closest = a + dir * t;
    if (p - closest).norm() > epsilon {
        return None;
    }

    let len = len_sq.sqrt();
    if t * len <= epsilon || (1.0 - t) * len <= epsilon {
        return None;
    }

    Some(t)
}

/// Plane in Hessian normal form: `normal · p = offset`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Plane {
    pub normal: Point,
    pub offset: f64,
}

impl Plane {
    /// Best-fit plane of a closed polygon (Newell's method)
    ///
    /// Returns `None` for degenerate loops (collinear or fewer than three points).
    pub fn from_polygon(points: &[Point]) -> Option<Plane> {
        if points.len() < 3 {
            return None;
        }

        let mut normal = Point::zeros();
        let mut centroid = Point::zeros();
        for (i, current) in points.iter().enumerate() {
            let next = &points[(i + 1) % points.len()];
            normal.x += (current.y - next.y) * (current.z + next.z);
            normal.y += (current.z - next.z) * (current.x + next.x);
            normal.z += (current.x - next.x) * (current.y + next.y);
            centroid += current;
        }

        let length = normal.norm();
        if length <= f64::EPSILON {
            return None;
        }

        let normal = normal / length;
        let centroid = centroid / points.len() as f64;
        Some(Plane {
            normal,
            offset: normal.dot(&centroid),
        })
    }

    pub fn distance(&self, p: &Point) -> f64 {
        self.normal.dot(p) - self.offset
    }

    pub fn contains(&self, p: &Point, epsilon: f64) -> bool {
        self.distance(p).abs() <= epsilon
    }

    /// Same plane regardless of facing
    pub fn is_coplanar(&self, other: &Plane, epsilon: f64) -> bool {
        let same = (self.normal - other.normal).norm() <= epsilon
            && (self.offset - other.offset).abs() <= epsilon;
        let flipped = (self.normal + other.normal).norm() <= epsilon
            && (self.offset + other.offset).abs() <= epsilon;
        same || flipped
    }
}
