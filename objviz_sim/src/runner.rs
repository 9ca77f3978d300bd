//! Scenario runner.
//!
//! Drives a [`World`] through the engine's FIFO frame queue and checks the
//! engine invariants on every submitted batch:
//! - Ids are unique within a batch
//! - Every id of an object decodes to that object's handle
//! - An object present in consecutive batches keeps its handle

use crate::exporter::{ExportFrame, SimExport};
use crate::scenarios::ScenarioId;
use crate::world::World;
use crate::SimError;
use objviz_core::{
    DisplayConfig, EvictionPolicy, FrameAssembler, FrameQueue, IdentityHandle, MarkerBatch,
    MarkerIdAllocator, MarkerSink, MemorySink, SinkError, SkipReason,
};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Perception rate of the synthetic tracker.
const TICK_HZ: f64 = 10.0;

/// Messages allowed to wait for the assembler.
const QUEUE_DEPTH: usize = 16;

/// Violations recorded before further ones are only counted.
const MAX_VIOLATIONS: usize = 20;

/// Result of one scenario run
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    pub scenario: ScenarioId,
    pub seed: u64,
    pub passed: bool,
    pub frames: u64,
    pub final_object_count: usize,
    pub registry_size: usize,
    pub primitives_emitted: usize,
    pub skipped: BTreeMap<SkipReason, usize>,
    pub failure_reason: Option<String>,
    /// Frame-by-frame data, when export was requested
    pub export: Option<SimExport>,
}

// ============================================================================
// INVARIANT CHECKING SINK
// ============================================================================

/// Sink that verifies every batch before forwarding it.
pub struct CheckingSink {
    allocator: MarkerIdAllocator,
    scene: MemorySink,
    forward: Option<Box<dyn MarkerSink + Send>>,
    last_handles: HashMap<Uuid, IdentityHandle>,
    violations: Vec<String>,
    violation_count: usize,
    keep_batches: bool,
    batches: Vec<MarkerBatch>,
}

impl CheckingSink {
    pub fn new(allocator: MarkerIdAllocator, forward: Option<Box<dyn MarkerSink + Send>>) -> Self {
        Self {
            allocator,
            scene: MemorySink::new(),
            forward,
            last_handles: HashMap::new(),
            violations: Vec::new(),
            violation_count: 0,
            keep_batches: false,
            batches: Vec::new(),
        }
    }

    pub fn keep_batches(mut self, keep: bool) -> Self {
        self.keep_batches = keep;
        self
    }

    pub fn violations(&self) -> &[String] {
        &self.violations
    }

    pub fn violation_count(&self) -> usize {
        self.violation_count
    }

    pub fn take_batches(&mut self) -> Vec<MarkerBatch> {
        std::mem::take(&mut self.batches)
    }

    fn violate(&mut self, message: String) {
        self.violation_count += 1;
        if self.violations.len() < MAX_VIOLATIONS {
            warn!("Invariant violated: {}", message);
            self.violations.push(message);
        }
    }

    fn check(&mut self, batch: &MarkerBatch) {
        if let Err(e) = self.scene.submit(batch.clone()) {
            self.violate(format!("frame {}: {}", batch.frame, e));
        }

        let mut handles: HashMap<Uuid, IdentityHandle> = HashMap::new();
        for primitive in &batch.primitives {
            let Some(decoded) = self.allocator.decode(primitive.id) else {
                self.violate(format!("frame {}: id {} does not decode", batch.frame, primitive.id));
                continue;
            };
            if decoded.category != primitive.category() {
                self.violate(format!(
                    "frame {}: id {} decodes to {} but carries {}",
                    batch.frame,
                    primitive.id,
                    decoded.category.name(),
                    primitive.category().name()
                ));
            }
            let handle = *handles.entry(primitive.object_id).or_insert(decoded.handle);
            if handle != decoded.handle {
                self.violate(format!(
                    "frame {}: object {} spans handles {} and {}",
                    batch.frame, primitive.object_id, handle, decoded.handle
                ));
            }
        }

        for (uuid, handle) in &handles {
            if let Some(&previous) = self.last_handles.get(uuid) {
                if previous != *handle {
                    self.violate(format!(
                        "frame {}: object {} moved from handle {} to {}",
                        batch.frame, uuid, previous, handle
                    ));
                }
            }
        }
        self.last_handles = handles;
    }
}

impl MarkerSink for CheckingSink {
    fn submit(&mut self, batch: MarkerBatch) -> Result<(), SinkError> {
        self.check(&batch);
        if let Some(forward) = self.forward.as_mut() {
            forward.submit(batch.clone())?;
        }
        if self.keep_batches {
            self.batches.push(batch);
        }
        Ok(())
    }
}

// ============================================================================
// RUNNER
// ============================================================================

/// Runs scenarios with a given seed
pub struct ScenarioRunner {
    seed: u64,
    objects: usize,
    frames: u64,
    paths: usize,
    noise_std: f64,
    config: DisplayConfig,
    export: bool,
}

impl ScenarioRunner {
    pub fn new(seed: u64, objects: usize) -> Self {
        Self {
            seed,
            objects,
            frames: 100,
            paths: 3,
            noise_std: 0.05,
            config: DisplayConfig::default(),
            export: false,
        }
    }

    pub fn with_frames(mut self, frames: u64) -> Self {
        self.frames = frames;
        self
    }

    pub fn with_paths(mut self, paths: usize) -> Self {
        self.paths = paths;
        self
    }

    pub fn with_config(mut self, config: DisplayConfig) -> Self {
        self.config = config;
        self
    }

    /// Keep every frame for a JSON export.
    pub fn with_export(mut self, export: bool) -> Self {
        self.export = export;
        self
    }

    fn populate(world: &mut World, count: usize) {
        for i in 0..count {
            match i % 20 {
                0..=15 => world.spawn_vehicle(),
                16..=18 => world.spawn_pedestrian(),
                _ => world.spawn_unknown(),
            };
        }
    }

    /// Run one scenario. Batches are also forwarded to `viewer` if given.
    pub async fn run(
        &self,
        scenario: ScenarioId,
        viewer: Option<Box<dyn MarkerSink + Send>>,
    ) -> Result<ScenarioResult, SimError> {
        let mut world = World::new(self.seed, self.paths, self.noise_std)?;
        Self::populate(&mut world, self.objects);

        let sink = CheckingSink::new(self.config.allocator()?, viewer).keep_batches(self.export);
        let assembler = FrameAssembler::with_config(self.config.clone(), sink)?;
        let queue = FrameQueue::spawn(assembler, QUEUE_DEPTH);
        let handle = queue.handle();

        let dt = 1.0 / TICK_HZ;
        let mut reports = Vec::with_capacity(self.frames as usize);
        let mut times = Vec::with_capacity(self.frames as usize);
        let mut primitives_emitted = 0;
        let mut skipped: BTreeMap<SkipReason, usize> = BTreeMap::new();

        for frame in 0..self.frames {
            world.step(dt);
            let removed = world.despawn_random(scenario.despawn_rate());
            Self::populate(&mut world, removed);

            let report = handle.process(world.message()).await?;
            primitives_emitted += report.emitted;
            for (reason, count) in &report.skipped {
                *skipped.entry(*reason).or_insert(0) += count;
            }

            if frame % 10 == 0 {
                debug!(
                    "  t={:.1}s | objects={} | primitives={} | registry={}",
                    world.time(),
                    report.objects,
                    report.emitted,
                    report.registry_size
                );
            }
            times.push(world.time());
            reports.push(report);
        }

        let assembler = queue.shutdown().await?;
        let registry_size = assembler.registry().len();
        let final_object_count = world.objects().len();
        let mut sink = assembler.into_sink();

        let mut failure_reason = sink.violations().first().map(|v| {
            format!("{} violations, first: {}", sink.violation_count(), v)
        });
        if failure_reason.is_none()
            && self.config.eviction == EvictionPolicy::Recycle
            && registry_size != final_object_count
        {
            failure_reason = Some(format!(
                "registry holds {} handles for {} live objects",
                registry_size, final_object_count
            ));
        }
        let passed = failure_reason.is_none();

        let export = self.export.then(|| {
            let mut export = SimExport::new(scenario.name(), self.seed);
            for ((time_sec, report), batch) in times.into_iter().zip(reports).zip(sink.take_batches()) {
                export.add_frame(ExportFrame {
                    time_sec,
                    report,
                    primitives: batch.primitives,
                });
            }
            export.finalize(passed, failure_reason.clone());
            export
        });

        info!(
            "{}: {} frames, {} primitives, {} skipped",
            scenario.name(),
            self.frames,
            primitives_emitted,
            skipped.values().sum::<usize>()
        );

        Ok(ScenarioResult {
            scenario,
            seed: self.seed,
            passed,
            frames: self.frames,
            final_object_count,
            registry_size,
            primitives_emitted,
            skipped,
            failure_reason,
            export,
        })
    }
}
