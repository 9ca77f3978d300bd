//! ObjViz Core - Marker Synthesis for Predicted-Object Streams
//!
//! Turns each perception message (a timestamped list of tracked objects with
//! shape, class, pose covariance, velocity and predicted paths) into one
//! complete batch of drawable primitives. Three problems are solved here:
//! 1. **Stable ids**: a 128-bit object UUID maps to the same small handle for
//!    as long as it keeps appearing, and every primitive id is a pure function
//!    of (handle, category, path ordinal)
//! 2. **No ghosts**: each batch is a full replacement of its namespace
//! 3. **Graceful degradation**: a feature that cannot be rendered is skipped
//!    with a reason, never an error, and never blocks the rest of the frame

pub mod assembler;
pub mod config;
pub mod error;
pub mod factory;
pub mod frame_queue;
pub mod geometry;
pub mod identity;
pub mod marker_id;
pub mod object;
pub mod palette;
pub mod primitive;
pub mod sink;

#[cfg(feature = "visualization")]
pub mod visualization;

// Re-export key types for convenience
pub use assembler::{FrameAssembler, FramePhase, FrameReport};
pub use config::DisplayConfig;
pub use error::{AssemblerError, ConfigError, QueueError, SinkError};
pub use factory::PrimitiveFactory;
pub use frame_queue::{FrameQueue, FrameQueueHandle};
pub use geometry::{DefaultGeometry, GeometryBuilder};
pub use identity::{EvictionPolicy, IdentityHandle, IdentityRegistry, RefreshSummary};
pub use marker_id::{DecodedId, MarkerCategory, MarkerId, MarkerIdAllocator};
pub use object::{
    FrameHeader, ObjectClassification, ObjectLabel, ObjectListMessage, PerceivedObject, Pose,
    PoseWithCovariance, PredictedPath, Shape, ShapeKind, Stamp, Twist, TwistWithCovariance,
};
pub use palette::{ClassificationPalette, DefaultPalette};
pub use primitive::{Emission, MarkerBatch, Payload, Primitive, PrimitiveBody, Rgba, SkipReason};
pub use sink::{JsonLinesSink, MarkerSink, MemorySink};

#[cfg(feature = "visualization")]
pub use visualization::RerunSink;
