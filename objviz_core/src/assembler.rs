//! Frame Assembler: one complete visualization cycle per message.
//!
//! ```text
//! Idle → Clearing → Registering → Emitting → Submitted → Idle
//! ```
//!
//! - **Clearing**: drop whatever the previous frame left behind. Batches
//!   are full replacements, never diffs.
//! - **Registering**: refresh the identity registry from the message.
//! - **Emitting**: objects in input order, categories in the fixed order
//!   Shape, Label, IdentityTag, CovarianceEllipse, VelocityText,
//!   VelocityVector, Trajectory×N, TrajectoryConfidence×M.
//! - **Submitted**: the batch goes to the sink as one unit.
//!
//! Frames run to completion one at a time. A skipped primitive never
//! aborts the frame.

use crate::config::DisplayConfig;
use crate::error::{AssemblerError, ConfigError};
use crate::factory::PrimitiveFactory;
use crate::geometry::{DefaultGeometry, GeometryBuilder};
use crate::identity::{IdentityHandle, IdentityRegistry, RefreshSummary};
use crate::marker_id::MarkerIdAllocator;
use crate::object::{FrameHeader, ObjectListMessage, PerceivedObject};
use crate::palette::{ClassificationPalette, DefaultPalette};
use crate::primitive::{Emission, MarkerBatch, Primitive, SkipReason};
use crate::sink::MarkerSink;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, trace, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramePhase {
    Idle,
    Clearing,
    Registering,
    Emitting,
    Submitted,
}

/// Per-frame bookkeeping returned to the host.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FrameReport {
    pub frame: u64,
    pub objects: usize,
    pub emitted: usize,
    pub skipped: BTreeMap<SkipReason, usize>,
    pub registry: RefreshSummary,
    pub registry_size: usize,
}

impl FrameReport {
    fn skip(&mut self, reason: SkipReason) {
        *self.skipped.entry(reason).or_insert(0) += 1;
    }

    pub fn skipped_for(&self, reason: SkipReason) -> usize {
        self.skipped.get(&reason).copied().unwrap_or(0)
    }

    pub fn skipped_total(&self) -> usize {
        self.skipped.values().sum()
    }
}

pub struct FrameAssembler<S, G = DefaultGeometry, P = DefaultPalette> {
    factory: PrimitiveFactory<G, P>,
    allocator: MarkerIdAllocator,
    /// Created once per assembler and mutated only while registering.
    registry: IdentityRegistry,
    sink: S,
    phase: FramePhase,
    frames: u64,
    pending: Vec<Primitive>,
}

impl<S: MarkerSink> FrameAssembler<S> {
    /// Assembler with the built-in geometry and palette.
    pub fn with_config(config: DisplayConfig, sink: S) -> Result<Self, ConfigError> {
        Self::new(config, DefaultGeometry::default(), DefaultPalette, sink)
    }
}

impl<S, G, P> FrameAssembler<S, G, P>
where
    S: MarkerSink,
    G: GeometryBuilder,
    P: ClassificationPalette,
{
    pub fn new(config: DisplayConfig, geometry: G, palette: P, sink: S) -> Result<Self, ConfigError> {
        config.validate()?;
        let allocator = config.allocator()?;
        let registry = IdentityRegistry::new(config.eviction, allocator.handle_capacity());
        Ok(Self {
            factory: PrimitiveFactory::new(geometry, palette, config),
            allocator,
            registry,
            sink,
            phase: FramePhase::Idle,
            frames: 0,
            pending: Vec::new(),
        })
    }

    // ========================================================================
    // ACCESSORS
    // ========================================================================

    pub fn config(&self) -> &DisplayConfig {
        self.factory.config()
    }

    pub fn registry(&self) -> &IdentityRegistry {
        &self.registry
    }

    pub fn allocator(&self) -> &MarkerIdAllocator {
        &self.allocator
    }

    pub fn phase(&self) -> FramePhase {
        self.phase
    }

    /// Frames assembled so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    // ========================================================================
    // FRAME CYCLE
    // ========================================================================

    fn enter(&mut self, phase: FramePhase) {
        trace!("frame {}: {:?} -> {:?}", self.frames, self.phase, phase);
        self.phase = phase;
    }

    /// Produce the frame's complete batch and submit it to the sink.
    pub fn process(&mut self, message: &ObjectListMessage) -> Result<FrameReport, AssemblerError> {
        let (batch, report) = self.assemble(message);
        let frame = batch.frame;
        let result = self.sink.submit(batch);
        self.enter(FramePhase::Idle);

        match result {
            Ok(()) => Ok(report),
            Err(source) => {
                warn!("Failed to submit frame {}: {}", frame, source);
                Err(AssemblerError::Submit { frame, source })
            }
        }
    }

    /// Produce the frame's complete batch without submitting it.
    ///
    /// The registry is refreshed as part of this call, so a batch obtained
    /// here counts as a processed frame.
    pub fn assemble(&mut self, message: &ObjectListMessage) -> (MarkerBatch, FrameReport) {
        self.frames += 1;
        let mut report = FrameReport {
            frame: self.frames,
            objects: message.objects.len(),
            ..Default::default()
        };

        self.enter(FramePhase::Clearing);
        self.pending.clear();

        self.enter(FramePhase::Registering);
        report.registry = self.registry.refresh(&message.objects);
        report.registry_size = self.registry.len();

        self.enter(FramePhase::Emitting);
        let mut seen: HashSet<Uuid> = HashSet::with_capacity(message.objects.len());
        for object in &message.objects {
            if !seen.insert(object.object_id) {
                report.skip(SkipReason::DuplicateObject);
                continue;
            }
            match self.registry.handle_of(&object.object_id) {
                Some(handle) => self.emit_object(&message.header, object, handle, &mut report),
                None => report.skip(SkipReason::Unregistered),
            }
        }

        let batch = MarkerBatch {
            frame: self.frames,
            namespace: self.config().namespace.clone(),
            header: message.header.clone(),
            primitives: std::mem::take(&mut self.pending),
        };
        self.enter(FramePhase::Submitted);

        debug!(
            "frame {}: {} objects -> {} primitives ({} skipped), registry {} (+{} -{})",
            report.frame,
            report.objects,
            report.emitted,
            report.skipped_total(),
            report.registry_size,
            report.registry.added,
            report.registry.released,
        );

        (batch, report)
    }

    fn emit_object(
        &mut self,
        header: &FrameHeader,
        object: &PerceivedObject,
        handle: IdentityHandle,
        report: &mut FrameReport,
    ) {
        let singles = [
            self.factory.shape(object),
            self.factory.label(object),
            self.factory.identity_tag(object),
            self.factory.covariance(object),
            self.factory.velocity_text(object),
            self.factory.velocity_vector(object),
        ];
        for emission in singles {
            self.accept(header, object.object_id, handle, None, emission, report);
        }

        // Ordinals count emitted primitives only; each loop has its own.
        let mut trajectory_ordinal = 0u32;
        for path in &object.predicted_paths {
            let emission = self.factory.trajectory(object, path);
            if self.accept(header, object.object_id, handle, Some(trajectory_ordinal), emission, report) {
                trajectory_ordinal += 1;
            }
        }

        let mut confidence_ordinal = 0u32;
        for path in &object.predicted_paths {
            let emission = self.factory.trajectory_confidence(object, path);
            if self.accept(header, object.object_id, handle, Some(confidence_ordinal), emission, report) {
                confidence_ordinal += 1;
            }
        }
    }

    /// Stamp and keep a produced primitive. Returns whether it was kept.
    fn accept(
        &mut self,
        header: &FrameHeader,
        object_id: Uuid,
        handle: IdentityHandle,
        ordinal: Option<u32>,
        emission: Emission,
        report: &mut FrameReport,
    ) -> bool {
        let body = match emission {
            Emission::Produced(body) => body,
            Emission::Skipped(reason) => {
                report.skip(reason);
                return false;
            }
        };

        let id = match ordinal {
            Some(index) => self.allocator.path_id_for(handle, body.category, index),
            None => self.allocator.id_for(handle, body.category),
        };
        let Some(id) = id else {
            report.skip(SkipReason::IdSpaceExhausted);
            return false;
        };

        self.pending.push(Primitive {
            namespace: self.factory.config().namespace.clone(),
            id,
            header: header.clone(),
            object_id,
            body,
        });
        report.emitted += 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SinkError;
    use crate::marker_id::MarkerCategory;
    use crate::object::{ObjectLabel, Pose, PredictedPath, Shape, ShapeKind, Stamp, Twist};
    use crate::sink::MemorySink;
    use nalgebra::Matrix6;

    fn header(sec: i32) -> FrameHeader {
        FrameHeader::new("map", Stamp::new(sec, 0))
    }

    fn vehicle(n: u128) -> PerceivedObject {
        PerceivedObject::new(
            Uuid::from_u128(n),
            Shape::bounding_box(4.0, 1.8, 1.5),
            Pose::from_xyz_yaw(n as f64 * 10.0, 0.0, 0.0, 0.0),
        )
        .with_classification(ObjectLabel::Car, 0.9)
        .with_covariance(Matrix6::identity() * 0.5)
        .with_twist(Twist::linear(5.0, 0.0, 0.0))
    }

    fn path(waypoints: usize, confidence: f64) -> PredictedPath {
        let poses = (1..=waypoints)
            .map(|i| Pose::from_xyz_yaw(i as f64, 0.0, 0.0, 0.0))
            .collect();
        PredictedPath::new(poses, 0.5, confidence)
    }

    fn assembler() -> FrameAssembler<MemorySink> {
        FrameAssembler::with_config(DisplayConfig::default(), MemorySink::new()).unwrap()
    }

    /// Sink that fails on request.
    struct FlakySink {
        fail_next: bool,
        accepted: usize,
    }

    impl MarkerSink for FlakySink {
        fn submit(&mut self, _batch: MarkerBatch) -> Result<(), SinkError> {
            if std::mem::take(&mut self.fail_next) {
                return Err(SinkError::viewer("viewer disconnected"));
            }
            self.accepted += 1;
            Ok(())
        }
    }

    #[test]
    fn test_category_order_within_object() {
        let mut asm = assembler();
        let object = vehicle(1).with_path(path(2, 0.7));
        let (batch, _) = asm.assemble(&ObjectListMessage::new(header(1), vec![object]));

        let order: Vec<MarkerCategory> = batch.primitives.iter().map(|p| p.category()).collect();
        assert_eq!(order, MarkerCategory::ALL.to_vec());
        assert_eq!(asm.phase(), FramePhase::Submitted);
    }

    #[test]
    fn test_objects_emitted_in_input_order() {
        let mut asm = assembler();
        let message = ObjectListMessage::new(header(1), vec![vehicle(3), vehicle(1), vehicle(2)]);
        let (batch, _) = asm.assemble(&message);

        let mut owners: Vec<Uuid> = batch.primitives.iter().map(|p| p.object_id).collect();
        owners.dedup();
        assert_eq!(owners, vec![Uuid::from_u128(3), Uuid::from_u128(1), Uuid::from_u128(2)]);
    }

    #[test]
    fn test_primitives_carry_header_and_namespace() {
        let mut asm = assembler();
        let (batch, _) = asm.assemble(&ObjectListMessage::new(header(42), vec![vehicle(1)]));
        assert!(batch
            .primitives
            .iter()
            .all(|p| p.header == header(42) && p.namespace == "tracks"));
        assert_eq!(batch.header, header(42));
    }

    #[test]
    fn test_path_counters_reset_per_object() {
        let mut asm = assembler();
        let a = vehicle(1).with_path(path(3, 0.6)).with_path(path(3, 0.4));
        let b = vehicle(2).with_path(path(3, 0.9));
        let (batch, _) = asm.assemble(&ObjectListMessage::new(header(1), vec![a, b]));

        let handle_b = asm.registry().handle_of(&Uuid::from_u128(2)).unwrap();
        let expected = asm
            .allocator()
            .path_id_for(handle_b, MarkerCategory::Trajectory, 0)
            .unwrap();
        let b_paths: Vec<_> = batch
            .of_category(MarkerCategory::Trajectory)
            .filter(|p| p.object_id == Uuid::from_u128(2))
            .collect();
        assert_eq!(b_paths.len(), 1);
        assert_eq!(b_paths[0].id, expected);
    }

    #[test]
    fn test_skipped_paths_do_not_reserve_ordinals() {
        let mut asm = FrameAssembler::with_config(
            DisplayConfig {
                path_confidence_threshold: 0.5,
                ..Default::default()
            },
            MemorySink::new(),
        )
        .unwrap();
        // middle path is below the threshold
        let object = vehicle(1)
            .with_path(path(2, 0.9))
            .with_path(path(2, 0.1))
            .with_path(path(2, 0.8));
        let (batch, report) = asm.assemble(&ObjectListMessage::new(header(1), vec![object]));

        let handle = asm.registry().handle_of(&Uuid::from_u128(1)).unwrap();
        let alloc = asm.allocator();
        let ids: Vec<_> = batch.of_category(MarkerCategory::Trajectory).map(|p| p.id).collect();
        assert_eq!(
            ids,
            vec![
                alloc.path_id_for(handle, MarkerCategory::Trajectory, 0).unwrap(),
                alloc.path_id_for(handle, MarkerCategory::Trajectory, 1).unwrap(),
            ]
        );
        // one trajectory and one confidence text skipped
        assert_eq!(report.skipped_for(SkipReason::LowConfidence), 2);
    }

    #[test]
    fn test_bad_object_does_not_block_others() {
        let mut asm = assembler();
        let mut broken = vehicle(1);
        broken.shape.kind = ShapeKind::Unsupported;
        broken.pose.covariance = Matrix6::zeros();
        broken.twist = None;

        let message = ObjectListMessage::new(header(1), vec![broken, vehicle(2)]);
        let (batch, report) = asm.assemble(&message);

        assert_eq!(batch.for_object(Uuid::from_u128(2)).count(), 6);
        // label and identity tag survive for the broken object
        assert_eq!(batch.for_object(Uuid::from_u128(1)).count(), 2);
        assert_eq!(report.skipped_for(SkipReason::UnsupportedShape), 1);
        assert_eq!(report.skipped_for(SkipReason::DegenerateCovariance), 1);
        assert_eq!(report.skipped_for(SkipReason::MissingTwist), 2);
    }

    #[test]
    fn test_duplicate_uuid_emitted_once() {
        let mut asm = assembler();
        let message = ObjectListMessage::new(header(1), vec![vehicle(1), vehicle(1)]);
        let report = asm.process(&message).unwrap();

        assert_eq!(report.skipped_for(SkipReason::DuplicateObject), 1);
        assert_eq!(asm.sink().scene("tracks").unwrap().len(), 6);
    }

    #[test]
    fn test_exhausted_handle_space_skips_object() {
        let config = DisplayConfig {
            path_stride: 8,
            max_paths_per_object: 1,
            ..Default::default()
        };
        let mut asm = FrameAssembler::with_config(config, MemorySink::new()).unwrap();
        let (batch, report) =
            asm.assemble(&ObjectListMessage::new(header(1), vec![vehicle(1), vehicle(2)]));

        assert_eq!(report.skipped_for(SkipReason::Unregistered), 1);
        assert!(batch.for_object(Uuid::from_u128(2)).next().is_none());
    }

    #[test]
    fn test_paths_beyond_max_are_dropped() {
        let config = DisplayConfig {
            max_paths_per_object: 2,
            ..Default::default()
        };
        let mut asm = FrameAssembler::with_config(config, MemorySink::new()).unwrap();
        let object = vehicle(1)
            .with_path(path(1, 0.5))
            .with_path(path(1, 0.3))
            .with_path(path(1, 0.2));
        let report = asm
            .process(&ObjectListMessage::new(header(1), vec![object]))
            .unwrap();

        assert_eq!(asm.sink().last_batch().unwrap().of_category(MarkerCategory::Trajectory).count(), 2);
        // third trajectory and third confidence text
        assert_eq!(report.skipped_for(SkipReason::IdSpaceExhausted), 2);
    }

    #[test]
    fn test_sink_failure_is_reported_and_next_frame_proceeds() {
        let sink = FlakySink {
            fail_next: true,
            accepted: 0,
        };
        let mut asm = FrameAssembler::with_config(DisplayConfig::default(), sink).unwrap();
        let message = ObjectListMessage::new(header(1), vec![vehicle(1)]);

        let err = asm.process(&message).unwrap_err();
        assert!(matches!(err, AssemblerError::Submit { frame: 1, .. }));
        assert_eq!(asm.phase(), FramePhase::Idle);

        let report = asm.process(&message).unwrap();
        assert_eq!(report.frame, 2);
        assert_eq!(asm.sink().accepted, 1);
    }

    #[test]
    fn test_invalid_config_rejected_at_construction() {
        let config = DisplayConfig {
            max_paths_per_object: 0,
            ..Default::default()
        };
        assert!(FrameAssembler::with_config(config, MemorySink::new()).is_err());
    }
}
