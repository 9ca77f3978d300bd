//! Inbound data model: one object-list message per frame.
//!
//! Every message is a complete snapshot. Objects are never patched in place;
//! the engine only relies on `object_id` being stable for the lifetime of a
//! physical object.

use nalgebra::{Matrix6, Point3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// HEADER
// ============================================================================

/// Message timestamp split into seconds and nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Stamp {
    pub sec: i32,
    pub nanosec: u32,
}

impl Stamp {
    pub fn new(sec: i32, nanosec: u32) -> Self {
        Self { sec, nanosec }
    }

    /// Build a stamp from fractional seconds (negative input clamps to zero).
    pub fn from_secs_f64(seconds: f64) -> Self {
        let seconds = seconds.max(0.0);
        let sec = seconds.trunc();
        let nanosec = ((seconds - sec) * 1e9).round().min(999_999_999.0);
        Self {
            sec: sec as i32,
            nanosec: nanosec as u32,
        }
    }

    pub fn as_nanos(&self) -> i64 {
        self.sec as i64 * 1_000_000_000 + self.nanosec as i64
    }

    pub fn as_secs_f64(&self) -> f64 {
        self.sec as f64 + self.nanosec as f64 * 1e-9
    }
}

/// Frame reference and timestamp copied onto every emitted primitive.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FrameHeader {
    pub stamp: Stamp,
    pub frame_id: String,
}

impl FrameHeader {
    pub fn new(frame_id: impl Into<String>, stamp: Stamp) -> Self {
        Self {
            stamp,
            frame_id: frame_id.into(),
        }
    }
}

// ============================================================================
// KINEMATICS
// ============================================================================

/// Position + orientation in the header's frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub position: Point3<f64>,
    pub orientation: UnitQuaternion<f64>,
}

impl Pose {
    pub fn new(position: Point3<f64>, orientation: UnitQuaternion<f64>) -> Self {
        Self {
            position,
            orientation,
        }
    }

    /// Pose with a heading (yaw) only.
    pub fn from_xyz_yaw(x: f64, y: f64, z: f64, yaw: f64) -> Self {
        Self {
            position: Point3::new(x, y, z),
            orientation: UnitQuaternion::from_euler_angles(0.0, 0.0, yaw),
        }
    }

    /// Transform a point expressed in this pose's local axes into the parent frame.
    #[inline]
    pub fn transform_point(&self, local: &Point3<f64>) -> Point3<f64> {
        self.position + self.orientation * local.coords
    }

    /// Rotate a local-axes vector into the parent frame (no translation).
    #[inline]
    pub fn rotate_vector(&self, local: &Vector3<f64>) -> Vector3<f64> {
        self.orientation * local
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self {
            position: Point3::origin(),
            orientation: UnitQuaternion::identity(),
        }
    }
}

/// Pose with its 6×6 covariance (x, y, z, roll, pitch, yaw).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseWithCovariance {
    pub pose: Pose,
    pub covariance: Matrix6<f64>,
}

impl PoseWithCovariance {
    /// Pose without any covariance information (all zeros).
    pub fn exact(pose: Pose) -> Self {
        Self {
            pose,
            covariance: Matrix6::zeros(),
        }
    }
}

impl Default for PoseWithCovariance {
    fn default() -> Self {
        Self::exact(Pose::default())
    }
}

/// Linear and angular velocity in the object's local axes.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Twist {
    pub linear: Vector3<f64>,
    pub angular: Vector3<f64>,
}

impl Twist {
    pub fn linear(vx: f64, vy: f64, vz: f64) -> Self {
        Self {
            linear: Vector3::new(vx, vy, vz),
            angular: Vector3::zeros(),
        }
    }

    /// Linear speed magnitude in m/s.
    pub fn speed(&self) -> f64 {
        self.linear.norm()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TwistWithCovariance {
    pub twist: Twist,
    pub covariance: Matrix6<f64>,
}

impl TwistWithCovariance {
    pub fn exact(twist: Twist) -> Self {
        Self {
            twist,
            covariance: Matrix6::zeros(),
        }
    }
}

// ============================================================================
// SHAPE & CLASSIFICATION
// ============================================================================

/// Shape kinds the outline builder understands. Anything else deserializes
/// to `Unsupported` and produces no shape primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeKind {
    BoundingBox,
    Cylinder,
    Polygon,
    #[serde(other)]
    Unsupported,
}

/// Shape descriptor.
///
/// `dimensions` follows the usual perception convention:
/// - bounding box: x = length, y = width, z = height
/// - cylinder: x = diameter, z = height
/// - polygon: z = height, outline taken from `footprint` (object-local)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shape {
    pub kind: ShapeKind,
    pub dimensions: Vector3<f64>,
    #[serde(default)]
    pub footprint: Vec<Point3<f64>>,
}

impl Shape {
    pub fn bounding_box(length: f64, width: f64, height: f64) -> Self {
        Self {
            kind: ShapeKind::BoundingBox,
            dimensions: Vector3::new(length, width, height),
            footprint: Vec::new(),
        }
    }

    pub fn cylinder(diameter: f64, height: f64) -> Self {
        Self {
            kind: ShapeKind::Cylinder,
            dimensions: Vector3::new(diameter, diameter, height),
            footprint: Vec::new(),
        }
    }

    pub fn polygon(footprint: Vec<Point3<f64>>, height: f64) -> Self {
        Self {
            kind: ShapeKind::Polygon,
            dimensions: Vector3::new(0.0, 0.0, height),
            footprint,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ObjectLabel {
    Unknown,
    Car,
    Truck,
    Bus,
    Trailer,
    Motorcycle,
    Bicycle,
    Pedestrian,
}

impl ObjectLabel {
    /// Upper-case display name.
    pub fn name(&self) -> &'static str {
        match self {
            ObjectLabel::Unknown => "UNKNOWN",
            ObjectLabel::Car => "CAR",
            ObjectLabel::Truck => "TRUCK",
            ObjectLabel::Bus => "BUS",
            ObjectLabel::Trailer => "TRAILER",
            ObjectLabel::Motorcycle => "MOTORCYCLE",
            ObjectLabel::Bicycle => "BICYCLE",
            ObjectLabel::Pedestrian => "PEDESTRIAN",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObjectClassification {
    pub label: ObjectLabel,
    pub probability: f64,
}

impl ObjectClassification {
    pub fn new(label: ObjectLabel, probability: f64) -> Self {
        Self { label, probability }
    }
}

/// Highest-probability label. The first entry wins ties; an empty list, or
/// one with only NaN probabilities, yields `Unknown`.
pub fn dominant_label(classification: &[ObjectClassification]) -> ObjectLabel {
    let mut best: Option<&ObjectClassification> = None;
    for entry in classification.iter().filter(|c| !c.probability.is_nan()) {
        match best {
            Some(current) if entry.probability <= current.probability => {}
            _ => best = Some(entry),
        }
    }
    best.map(|c| c.label).unwrap_or(ObjectLabel::Unknown)
}

// ============================================================================
// PREDICTED PATHS
// ============================================================================

/// One trajectory hypothesis. Lives only inside the message that carries it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictedPath {
    /// Timed waypoints, `time_step` seconds apart. May be empty.
    pub waypoints: Vec<Pose>,
    #[serde(default)]
    pub time_step: f64,
    /// Hypothesis confidence in [0, 1].
    pub confidence: f64,
}

impl PredictedPath {
    pub fn new(waypoints: Vec<Pose>, time_step: f64, confidence: f64) -> Self {
        Self {
            waypoints,
            time_step,
            confidence,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }
}

// ============================================================================
// OBJECT & MESSAGE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerceivedObject {
    /// Globally unique, immutable for the object's lifetime.
    pub object_id: Uuid,
    pub shape: Shape,
    #[serde(default)]
    pub classification: Vec<ObjectClassification>,
    pub pose: PoseWithCovariance,
    #[serde(default)]
    pub twist: Option<TwistWithCovariance>,
    #[serde(default)]
    pub predicted_paths: Vec<PredictedPath>,
}

impl PerceivedObject {
    pub fn new(object_id: Uuid, shape: Shape, pose: Pose) -> Self {
        Self {
            object_id,
            shape,
            classification: Vec::new(),
            pose: PoseWithCovariance::exact(pose),
            twist: None,
            predicted_paths: Vec::new(),
        }
    }

    pub fn with_classification(mut self, label: ObjectLabel, probability: f64) -> Self {
        self.classification
            .push(ObjectClassification::new(label, probability));
        self
    }

    pub fn with_covariance(mut self, covariance: Matrix6<f64>) -> Self {
        self.pose.covariance = covariance;
        self
    }

    pub fn with_twist(mut self, twist: Twist) -> Self {
        self.twist = Some(TwistWithCovariance::exact(twist));
        self
    }

    pub fn with_path(mut self, path: PredictedPath) -> Self {
        self.predicted_paths.push(path);
        self
    }

    pub fn label(&self) -> ObjectLabel {
        dominant_label(&self.classification)
    }
}

/// One inbound frame.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ObjectListMessage {
    pub header: FrameHeader,
    pub objects: Vec<PerceivedObject>,
}

impl ObjectListMessage {
    pub fn new(header: FrameHeader, objects: Vec<PerceivedObject>) -> Self {
        Self { header, objects }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dominant_label_picks_highest() {
        let classes = vec![
            ObjectClassification::new(ObjectLabel::Pedestrian, 0.2),
            ObjectClassification::new(ObjectLabel::Car, 0.7),
            ObjectClassification::new(ObjectLabel::Truck, 0.1),
        ];
        assert_eq!(dominant_label(&classes), ObjectLabel::Car);
    }

    #[test]
    fn test_dominant_label_tie_keeps_first() {
        let classes = vec![
            ObjectClassification::new(ObjectLabel::Bus, 0.5),
            ObjectClassification::new(ObjectLabel::Truck, 0.5),
        ];
        assert_eq!(dominant_label(&classes), ObjectLabel::Bus);
    }

    #[test]
    fn test_dominant_label_empty_and_nan() {
        assert_eq!(dominant_label(&[]), ObjectLabel::Unknown);
        let classes = vec![ObjectClassification::new(ObjectLabel::Car, f64::NAN)];
        assert_eq!(dominant_label(&classes), ObjectLabel::Unknown);
    }

    #[test]
    fn test_stamp_conversions() {
        let stamp = Stamp::from_secs_f64(12.25);
        assert_eq!(stamp.sec, 12);
        assert_eq!(stamp.nanosec, 250_000_000);
        assert_eq!(stamp.as_nanos(), 12_250_000_000);
    }

    #[test]
    fn test_unsupported_shape_kind_deserializes() {
        let json = r#"{"kind":"hexagonal_prism","dimensions":[1.0,1.0,1.0]}"#;
        let shape: Shape = serde_json::from_str(json).unwrap();
        assert_eq!(shape.kind, ShapeKind::Unsupported);
        assert!(shape.footprint.is_empty());
    }

    #[test]
    fn test_pose_transform_point_applies_yaw() {
        let pose = Pose::from_xyz_yaw(1.0, 2.0, 0.0, std::f64::consts::FRAC_PI_2);
        let world = pose.transform_point(&Point3::new(1.0, 0.0, 0.0));
        assert!((world.x - 1.0).abs() < 1e-9);
        assert!((world.y - 3.0).abs() < 1e-9);
    }
}
