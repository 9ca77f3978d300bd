//! Synthetic perception stream.
//!
//! The world keeps the ground truth of every tracked object and renders it
//! into one [`ObjectListMessage`] per tick:
//! - Kinematics: constant speed with a small yaw rate
//! - Covariance that grows with distance from the ego origin
//! - Predicted paths: keep lane, drift left, drift right
//!
//! All randomness comes from a single seed.

use crate::SimError;
use nalgebra::{Matrix6, Point3};
use objviz_core::{
    FrameHeader, ObjectLabel, ObjectListMessage, PerceivedObject, Pose, PredictedPath, Shape,
    ShapeKind, Stamp, Twist,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use uuid::Uuid;

/// Lane width in meters.
const LANE_WIDTH: f64 = 3.5;

/// Waypoints per predicted path.
const PATH_POINTS: usize = 10;

/// Time between predicted waypoints in seconds.
const PATH_STEP: f64 = 0.5;

/// One ground truth object.
#[derive(Debug, Clone)]
pub struct SyntheticObject {
    pub id: Uuid,
    pub label: ObjectLabel,
    pub shape: Shape,
    pub position: Point3<f64>,
    pub heading: f64,
    pub speed: f64,
    pub yaw_rate: f64,
    /// Velocity estimate available to the tracker
    pub has_twist: bool,
}

impl SyntheticObject {
    fn step(&mut self, dt: f64) {
        self.heading += self.yaw_rate * dt;
        self.position.x += self.speed * self.heading.cos() * dt;
        self.position.y += self.speed * self.heading.sin() * dt;
    }

    fn pose(&self) -> Pose {
        Pose::from_xyz_yaw(self.position.x, self.position.y, self.position.z, self.heading)
    }

    /// Future poses under a constant lateral drift in m/s.
    fn hypothesis(&self, lateral: f64, confidence: f64) -> PredictedPath {
        let (sin, cos) = self.heading.sin_cos();
        let waypoints = (1..=PATH_POINTS)
            .map(|i| {
                let t = i as f64 * PATH_STEP;
                let along = self.speed * t;
                let across = lateral * t;
                Pose::from_xyz_yaw(
                    self.position.x + along * cos - across * sin,
                    self.position.y + along * sin + across * cos,
                    self.position.z,
                    self.heading + (lateral / self.speed.max(1.0)).atan(),
                )
            })
            .collect();
        PredictedPath::new(waypoints, PATH_STEP, confidence)
    }
}

/// Traffic generator.
pub struct World {
    rng: ChaCha8Rng,
    noise: Normal<f64>,
    objects: Vec<SyntheticObject>,
    paths: usize,
    time: f64,
    frame_id: String,
}

impl World {
    /// `noise_std` is the measurement noise applied to speed and covariance.
    pub fn new(seed: u64, paths: usize, noise_std: f64) -> Result<Self, SimError> {
        Ok(Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            noise: Normal::new(0.0, noise_std)?,
            objects: Vec::new(),
            paths,
            time: 0.0,
            frame_id: "map".to_string(),
        })
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn objects(&self) -> &[SyntheticObject] {
        &self.objects
    }

    fn fresh_uuid(&mut self) -> Uuid {
        uuid::Builder::from_random_bytes(self.rng.gen()).into_uuid()
    }

    /// Spawn a road user in one of four lanes.
    pub fn spawn_vehicle(&mut self) -> Uuid {
        let id = self.fresh_uuid();
        let lane = self.rng.gen_range(0..4) as f64;
        let roll = self.rng.gen_range(0..10);
        let (label, shape, speed) = match roll {
            0..=5 => (ObjectLabel::Car, Shape::bounding_box(4.5, 1.9, 1.5), self.rng.gen_range(20.0..35.0)),
            6 => (ObjectLabel::Truck, Shape::bounding_box(12.0, 2.5, 3.8), self.rng.gen_range(18.0..25.0)),
            7 => (ObjectLabel::Bus, Shape::bounding_box(11.0, 2.6, 3.2), self.rng.gen_range(15.0..22.0)),
            8 => (ObjectLabel::Motorcycle, Shape::cylinder(0.9, 1.4), self.rng.gen_range(22.0..38.0)),
            _ => (ObjectLabel::Trailer, trailer_footprint(), self.rng.gen_range(18.0..24.0)),
        };

        self.objects.push(SyntheticObject {
            id,
            label,
            shape,
            position: Point3::new(self.rng.gen_range(-80.0..80.0), lane * LANE_WIDTH, 0.0),
            heading: 0.0,
            speed,
            yaw_rate: self.rng.gen_range(-0.02..0.02),
            has_twist: true,
        });
        id
    }

    /// Spawn a roadside pedestrian, sometimes without a velocity estimate.
    pub fn spawn_pedestrian(&mut self) -> Uuid {
        let id = self.fresh_uuid();
        let has_twist = self.rng.gen_bool(0.7);
        self.objects.push(SyntheticObject {
            id,
            label: ObjectLabel::Pedestrian,
            shape: Shape::cylinder(0.6, 1.8),
            position: Point3::new(self.rng.gen_range(-40.0..40.0), -3.0, 0.0),
            heading: self.rng.gen_range(-std::f64::consts::PI..std::f64::consts::PI),
            speed: self.rng.gen_range(0.0..1.8),
            yaw_rate: 0.0,
            has_twist,
        });
        id
    }

    /// Spawn something the display cannot outline.
    pub fn spawn_unknown(&mut self) -> Uuid {
        let id = self.fresh_uuid();
        let mut shape = Shape::bounding_box(1.0, 1.0, 1.0);
        shape.kind = ShapeKind::Unsupported;
        self.objects.push(SyntheticObject {
            id,
            label: ObjectLabel::Unknown,
            shape,
            position: Point3::new(self.rng.gen_range(-40.0..40.0), 16.0, 0.0),
            heading: 0.0,
            speed: 0.0,
            yaw_rate: 0.0,
            has_twist: false,
        });
        id
    }

    /// Drop each object with probability `p`. Returns how many were removed.
    pub fn despawn_random(&mut self, p: f64) -> usize {
        let before = self.objects.len();
        let rng = &mut self.rng;
        self.objects.retain(|_| !rng.gen_bool(p));
        before - self.objects.len()
    }

    pub fn step(&mut self, dt: f64) {
        self.time += dt;
        for object in &mut self.objects {
            object.step(dt);
        }
    }

    /// Render the current ground truth as a tracker output message.
    pub fn message(&mut self) -> ObjectListMessage {
        let header = FrameHeader::new(self.frame_id.clone(), Stamp::from_secs_f64(self.time));

        let mut objects = Vec::with_capacity(self.objects.len());
        for i in 0..self.objects.len() {
            let truth = self.objects[i].clone();
            let range = truth.position.coords.xy().norm();
            let sigma2 = 0.05 + 0.002 * range + self.noise.sample(&mut self.rng).abs();

            let mut covariance = Matrix6::zeros();
            covariance[(0, 0)] = sigma2 * 1.5;
            covariance[(1, 1)] = sigma2;
            covariance[(0, 1)] = sigma2 * 0.2;
            covariance[(1, 0)] = sigma2 * 0.2;
            covariance[(5, 5)] = 0.01;

            let probability = self.rng.gen_range(0.55..0.99);
            let mut object = PerceivedObject::new(truth.id, truth.shape.clone(), truth.pose())
                .with_classification(truth.label, probability)
                .with_classification(ObjectLabel::Unknown, 1.0 - probability)
                .with_covariance(covariance);

            if truth.has_twist {
                let noisy = truth.speed + self.noise.sample(&mut self.rng);
                object = object.with_twist(Twist::linear(noisy, 0.0, 0.0));
            }

            for path in self.hypotheses(&truth) {
                object = object.with_path(path);
            }
            objects.push(object);
        }

        ObjectListMessage::new(header, objects)
    }

    /// `paths` hypotheses with descending confidences summing to one.
    fn hypotheses(&mut self, truth: &SyntheticObject) -> Vec<PredictedPath> {
        if self.paths == 0 {
            return Vec::new();
        }
        let mut weights: Vec<f64> = (0..self.paths)
            .map(|_| self.rng.gen_range(0.05..1.0))
            .collect();
        weights.sort_by(|a, b| b.total_cmp(a));
        let total: f64 = weights.iter().sum();

        weights
            .iter()
            .enumerate()
            .map(|(k, w)| {
                // 0, +1, -1, +2, -2, ...
                let side = if k % 2 == 1 { 1.0 } else { -1.0 };
                let lateral = side * ((k + 1) / 2) as f64 * 0.6;
                if truth.speed < 0.1 {
                    // a parked object has nowhere to go
                    PredictedPath::new(Vec::new(), PATH_STEP, w / total)
                } else {
                    truth.hypothesis(lateral, w / total)
                }
            })
            .collect()
    }
}

fn trailer_footprint() -> Shape {
    Shape::polygon(
        vec![
            Point3::new(-4.0, -1.2, 0.0),
            Point3::new(4.0, -1.2, 0.0),
            Point3::new(4.5, 0.0, 0.0),
            Point3::new(4.0, 1.2, 0.0),
            Point3::new(-4.0, 1.2, 0.0),
        ],
        3.0,
    )
}
