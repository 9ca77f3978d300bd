//! Rerun.io marker sink.
//!
//! Each batch clears `world/<namespace>` recursively and re-logs every
//! primitive at `world/<namespace>/<id>`, so the viewer shows exactly the
//! latest frame. Primitive points are already in the header frame.
//!
//! Enable with the `visualization` feature flag.

use crate::error::SinkError;
use crate::primitive::{MarkerBatch, Payload, Primitive};
use crate::sink::MarkerSink;
use nalgebra::Point3;
use rerun::{RecordingStream, RecordingStreamBuilder};

pub struct RerunSink {
    rec: RecordingStream,
}

impl RerunSink {
    /// Spawn a viewer process and stream to it.
    pub fn spawn(app_id: &str) -> Result<Self, SinkError> {
        let rec = RecordingStreamBuilder::new(app_id)
            .spawn()
            .map_err(SinkError::viewer)?;
        Self::with_stream(rec)
    }

    /// Record to an `.rrd` file instead of a live viewer.
    pub fn to_file(app_id: &str, path: &str) -> Result<Self, SinkError> {
        let rec = RecordingStreamBuilder::new(app_id)
            .save(path)
            .map_err(SinkError::viewer)?;
        Self::with_stream(rec)
    }

    fn with_stream(rec: RecordingStream) -> Result<Self, SinkError> {
        rec.log_static("world", &rerun::ViewCoordinates::RIGHT_HAND_Z_UP())
            .map_err(SinkError::viewer)?;
        Ok(Self { rec })
    }

    fn log_primitive(&self, root: &str, primitive: &Primitive) -> Result<(), SinkError> {
        let path = format!("{}/{}", root, primitive.id);
        let body = &primitive.body;
        let color = body.color.to_rgba8();
        let radius = (body.scale.x * 0.5) as f32;

        let result = match &body.payload {
            Payload::LineStrip { points } => self.rec.log(
                path,
                &rerun::LineStrips3D::new([to_f32(points)])
                    .with_colors([color])
                    .with_radii([radius]),
            ),
            Payload::LineList { points } => {
                let world = to_f32(points);
                let segments: Vec<Vec<[f32; 3]>> =
                    world.chunks_exact(2).map(|pair| pair.to_vec()).collect();
                self.rec.log(
                    path,
                    &rerun::LineStrips3D::new(segments)
                        .with_colors([color])
                        .with_radii([radius]),
                )
            }
            Payload::Text { text } => {
                let anchor = body.pose.position;
                self.rec.log(
                    path,
                    &rerun::Points3D::new([[anchor.x as f32, anchor.y as f32, anchor.z as f32]])
                        .with_labels([text.as_str()])
                        .with_colors([color])
                        .with_radii([0.02]),
                )
            }
            Payload::Arrow { tail, head } => {
                let vector = head - tail;
                self.rec.log(
                    path,
                    &rerun::Arrows3D::from_vectors([[vector.x as f32, vector.y as f32, vector.z as f32]])
                        .with_origins([[tail.x as f32, tail.y as f32, tail.z as f32]])
                        .with_colors([color])
                        .with_radii([radius]),
                )
            }
        };
        result.map_err(SinkError::viewer)
    }
}

fn to_f32(points: &[Point3<f64>]) -> Vec<[f32; 3]> {
    points
        .iter()
        .map(|p| [p.x as f32, p.y as f32, p.z as f32])
        .collect()
}

impl MarkerSink for RerunSink {
    fn submit(&mut self, batch: MarkerBatch) -> Result<(), SinkError> {
        self.rec.set_time_sequence("frame", batch.frame as i64);
        self.rec.set_time(
            "stamp",
            rerun::TimeCell::from_timestamp_nanos_since_epoch(batch.header.stamp.as_nanos()),
        );

        let root = format!("world/{}", batch.namespace);
        self.rec
            .log(root.as_str(), &rerun::Clear::recursive())
            .map_err(SinkError::viewer)?;

        for primitive in &batch.primitives {
            self.log_primitive(&root, primitive)?;
        }
        Ok(())
    }
}
