//! Geometry construction from numeric descriptors.
//!
//! [`GeometryBuilder`] is the seam to whatever geometry library the host
//! prefers. [`DefaultGeometry`] builds wireframe outlines with nalgebra:
//! - Bounding box: 12 edges
//! - Cylinder: top and bottom rings joined by 4 uprights
//! - Polygon: footprint extruded by the shape height
//! - Covariance: 2D ellipse from the x/y block of the pose covariance
//!
//! All returned points are in the header frame.

use crate::object::{Pose, PoseWithCovariance, Shape, ShapeKind, Twist};
use crate::primitive::SkipReason;
use nalgebra::{Matrix2, Point3, Vector3};
use std::f64::consts::{FRAC_PI_2, TAU};

/// Eigenvalues at or below this are treated as a degenerate covariance.
const MIN_EIGENVALUE: f64 = 1e-12;

pub trait GeometryBuilder {
    /// Wireframe of `shape` placed at `pose`, as a line list.
    fn shape_outline(&self, shape: &Shape, pose: &Pose) -> Result<Vec<Point3<f64>>, SkipReason>;

    /// Closed `sigma`-scaled ellipse of the horizontal position uncertainty,
    /// as a line strip.
    fn covariance_ellipse(
        &self,
        pose: &PoseWithCovariance,
        sigma: f64,
    ) -> Result<Vec<Point3<f64>>, SkipReason>;

    /// Arrow (tail, head) showing where the object would be after `seconds`
    /// at its current linear velocity. The twist is in object-local axes.
    fn velocity_arrow(&self, pose: &Pose, twist: &Twist, seconds: f64) -> (Point3<f64>, Point3<f64>) {
        let tail = pose.position;
        let head = tail + pose.rotate_vector(&twist.linear) * seconds;
        (tail, head)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DefaultGeometry {
    /// Segments used to approximate circles and ellipses
    pub circle_segments: usize,
}

impl Default for DefaultGeometry {
    fn default() -> Self {
        Self { circle_segments: 24 }
    }
}

fn positive(v: f64) -> bool {
    v.is_finite() && v > 0.0
}

/// Push the edges of a closed ring as line-list pairs.
fn push_ring(out: &mut Vec<Point3<f64>>, ring: &[Point3<f64>]) {
    for (i, a) in ring.iter().enumerate() {
        let b = ring[(i + 1) % ring.len()];
        out.push(*a);
        out.push(b);
    }
}

/// Bottom ring, top ring, and uprights at `upright_indices`.
fn extrude(
    pose: &Pose,
    footprint: &[(f64, f64)],
    height: f64,
    upright_indices: impl Iterator<Item = usize>,
) -> Vec<Point3<f64>> {
    let half = height / 2.0;
    let bottom: Vec<Point3<f64>> = footprint
        .iter()
        .map(|(x, y)| pose.transform_point(&Point3::new(*x, *y, -half)))
        .collect();
    let top: Vec<Point3<f64>> = footprint
        .iter()
        .map(|(x, y)| pose.transform_point(&Point3::new(*x, *y, half)))
        .collect();

    let mut out = Vec::with_capacity(footprint.len() * 6);
    push_ring(&mut out, &bottom);
    push_ring(&mut out, &top);
    for i in upright_indices {
        out.push(bottom[i]);
        out.push(top[i]);
    }
    out
}

impl DefaultGeometry {
    fn circle(&self, radius: f64) -> Vec<(f64, f64)> {
        let n = self.circle_segments.max(3);
        (0..n)
            .map(|k| {
                let theta = TAU * k as f64 / n as f64;
                (radius * theta.cos(), radius * theta.sin())
            })
            .collect()
    }
}

impl GeometryBuilder for DefaultGeometry {
    fn shape_outline(&self, shape: &Shape, pose: &Pose) -> Result<Vec<Point3<f64>>, SkipReason> {
        let dims = shape.dimensions;
        match shape.kind {
            ShapeKind::BoundingBox => {
                if !(positive(dims.x) && positive(dims.y) && positive(dims.z)) {
                    return Err(SkipReason::InvalidDimensions);
                }
                let (hl, hw) = (dims.x / 2.0, dims.y / 2.0);
                let footprint = [(hl, hw), (-hl, hw), (-hl, -hw), (hl, -hw)];
                Ok(extrude(pose, &footprint, dims.z, 0..4))
            }
            ShapeKind::Cylinder => {
                if !(positive(dims.x) && positive(dims.z)) {
                    return Err(SkipReason::InvalidDimensions);
                }
                let ring = self.circle(dims.x / 2.0);
                let n = ring.len();
                // Uprights at 0°, 90°, 180°, 270° (nearest ring vertex).
                let uprights = (0..4).map(move |k| {
                    ((k as f64 * FRAC_PI_2 / TAU) * n as f64).round() as usize % n
                });
                Ok(extrude(pose, &ring, dims.z, uprights))
            }
            ShapeKind::Polygon => {
                let height = dims.z;
                if !(height.is_finite() && height >= 0.0) || shape.footprint.len() < 3 {
                    return Err(SkipReason::InvalidDimensions);
                }
                if shape
                    .footprint
                    .iter()
                    .any(|p| !(p.x.is_finite() && p.y.is_finite()))
                {
                    return Err(SkipReason::InvalidDimensions);
                }
                let footprint: Vec<(f64, f64)> =
                    shape.footprint.iter().map(|p| (p.x, p.y)).collect();
                let n = footprint.len();
                Ok(extrude(pose, &footprint, height, 0..n))
            }
            ShapeKind::Unsupported => Err(SkipReason::UnsupportedShape),
        }
    }

    fn covariance_ellipse(
        &self,
        pose: &PoseWithCovariance,
        sigma: f64,
    ) -> Result<Vec<Point3<f64>>, SkipReason> {
        let cov = &pose.covariance;
        let xy = Matrix2::new(cov[(0, 0)], cov[(0, 1)], cov[(1, 0)], cov[(1, 1)]);
        if !positive(sigma) || xy.iter().any(|v| !v.is_finite()) {
            return Err(SkipReason::DegenerateCovariance);
        }

        let eigen = xy.symmetric_eigen();
        if eigen.eigenvalues.iter().any(|l| *l <= MIN_EIGENVALUE) {
            return Err(SkipReason::DegenerateCovariance);
        }

        let axis_a = eigen.eigenvectors.column(0) * (sigma * eigen.eigenvalues[0].sqrt());
        let axis_b = eigen.eigenvectors.column(1) * (sigma * eigen.eigenvalues[1].sqrt());
        let center = pose.pose.position;
        let n = self.circle_segments.max(3);

        let points = (0..=n)
            .map(|k| {
                let theta = TAU * k as f64 / n as f64;
                let offset = axis_a * theta.cos() + axis_b * theta.sin();
                center + Vector3::new(offset[0], offset[1], 0.0)
            })
            .collect();
        Ok(points)
    }
}
