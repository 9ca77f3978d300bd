//! Output model: primitives, factory outcomes and per-frame batches.

use crate::marker_id::{MarkerCategory, MarkerId};
use crate::object::{FrameHeader, Pose};
use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// RGBA color, each channel in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rgba {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Rgba {
    pub const WHITE: Rgba = Rgba::new(1.0, 1.0, 1.0, 1.0);

    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub fn from_rgb8(r: u8, g: u8, b: u8) -> Self {
        Self::new(r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0, 1.0)
    }

    pub fn with_alpha(self, a: f32) -> Self {
        Self { a, ..self }
    }

    pub fn to_rgba8(&self) -> [u8; 4] {
        let q = |c: f32| (c.clamp(0.0, 1.0) * 255.0).round() as u8;
        [q(self.r), q(self.g), q(self.b), q(self.a)]
    }
}

/// Geometry or text carried by a primitive. Points are in the header frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Payload {
    /// Independent segments: points are consumed two at a time.
    LineList { points: Vec<Point3<f64>> },
    /// Connected polyline.
    LineStrip { points: Vec<Point3<f64>> },
    Text { text: String },
    Arrow { tail: Point3<f64>, head: Point3<f64> },
}

impl Payload {
    pub fn text(&self) -> Option<&str> {
        match self {
            Payload::Text { text } => Some(text),
            _ => None,
        }
    }

    pub fn points(&self) -> &[Point3<f64>] {
        match self {
            Payload::LineList { points } | Payload::LineStrip { points } => points.as_slice(),
            _ => &[],
        }
    }
}

/// What the factory produces: everything except id, namespace and header,
/// which the assembler stamps on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrimitiveBody {
    pub category: MarkerCategory,
    /// Anchor pose: object pose for geometry, text position for labels.
    pub pose: Pose,
    /// Line width in x; text height in z.
    pub scale: Vector3<f64>,
    pub color: Rgba,
    pub payload: Payload,
}

/// Why a category produced nothing for an object this frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Category switched off in the configuration
    Disabled,
    UnsupportedShape,
    InvalidDimensions,
    DegenerateCovariance,
    MissingTwist,
    BelowMinVelocity,
    EmptyPath,
    /// Path confidence under the display threshold
    LowConfidence,
    /// Handle or path ordinal outside the allocator's id space
    IdSpaceExhausted,
    /// Same UUID appeared earlier in the same message
    DuplicateObject,
    /// Object has no identity handle (handle space exhausted)
    Unregistered,
}

/// Outcome of one factory call.
#[derive(Debug, Clone, PartialEq)]
pub enum Emission {
    Produced(PrimitiveBody),
    Skipped(SkipReason),
}

impl Emission {
    pub fn is_produced(&self) -> bool {
        matches!(self, Emission::Produced(_))
    }
}

/// A stamped, identified primitive ready for the rendering collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Primitive {
    pub namespace: String,
    pub id: MarkerId,
    pub header: FrameHeader,
    /// Object this primitive belongs to.
    pub object_id: Uuid,
    #[serde(flatten)]
    pub body: PrimitiveBody,
}

impl Primitive {
    #[inline]
    pub fn category(&self) -> MarkerCategory {
        self.body.category
    }
}

/// One frame's complete output.
///
/// A batch always replaces everything previously submitted under its
/// namespace: the collaborator drops the namespace's primitives and then
/// adds the batch. An empty batch therefore clears the namespace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerBatch {
    /// Sequence number of the frame that produced the batch, from 1.
    pub frame: u64,
    pub namespace: String,
    pub header: FrameHeader,
    pub primitives: Vec<Primitive>,
}

impl MarkerBatch {
    pub fn len(&self) -> usize {
        self.primitives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.primitives.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = MarkerId> + '_ {
        self.primitives.iter().map(|p| p.id)
    }

    pub fn of_category(&self, category: MarkerCategory) -> impl Iterator<Item = &Primitive> + '_ {
        self.primitives.iter().filter(move |p| p.category() == category)
    }

    pub fn for_object(&self, object_id: Uuid) -> impl Iterator<Item = &Primitive> + '_ {
        self.primitives.iter().filter(move |p| p.object_id == object_id)
    }
}

