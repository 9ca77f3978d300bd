//! Rendering collaborator seam.
//!
//! A [`MarkerSink`] receives one [`MarkerBatch`] per frame and must apply it
//! as a full replace of the batch's namespace.

use crate::error::SinkError;
use crate::marker_id::MarkerId;
use crate::primitive::{MarkerBatch, Primitive};
use std::collections::{BTreeMap, HashMap};
use std::io::Write;

pub trait MarkerSink {
    /// Atomically replace the namespace's primitives with `batch`.
    fn submit(&mut self, batch: MarkerBatch) -> Result<(), SinkError>;
}

impl<S: MarkerSink + ?Sized> MarkerSink for Box<S> {
    fn submit(&mut self, batch: MarkerBatch) -> Result<(), SinkError> {
        (**self).submit(batch)
    }
}

impl<S: MarkerSink + ?Sized> MarkerSink for &mut S {
    fn submit(&mut self, batch: MarkerBatch) -> Result<(), SinkError> {
        (**self).submit(batch)
    }
}

// ============================================================================
// IN-MEMORY SCENE
// ============================================================================

/// Keeps the scene the way a viewer would: namespace → id → primitive.
///
/// Rejects batches that carry the same id twice.
#[derive(Debug, Default)]
pub struct MemorySink {
    scene: HashMap<String, BTreeMap<MarkerId, Primitive>>,
    last_batch: Option<MarkerBatch>,
    submitted: usize,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Primitives currently shown under `namespace`.
    pub fn scene(&self, namespace: &str) -> Option<&BTreeMap<MarkerId, Primitive>> {
        self.scene.get(namespace)
    }

    pub fn last_batch(&self) -> Option<&MarkerBatch> {
        self.last_batch.as_ref()
    }

    /// Number of accepted batches.
    pub fn submitted(&self) -> usize {
        self.submitted
    }
}

impl MarkerSink for MemorySink {
    fn submit(&mut self, batch: MarkerBatch) -> Result<(), SinkError> {
        let mut replacement = BTreeMap::new();
        for primitive in &batch.primitives {
            if replacement.insert(primitive.id, primitive.clone()).is_some() {
                return Err(SinkError::DuplicateId {
                    namespace: batch.namespace.clone(),
                    id: primitive.id.0,
                });
            }
        }
        self.scene.insert(batch.namespace.clone(), replacement);
        self.last_batch = Some(batch);
        self.submitted += 1;
        Ok(())
    }
}

// ============================================================================
// JSON LINES
// ============================================================================

/// Writes one JSON document per batch, newline separated.
pub struct JsonLinesSink<W: Write> {
    writer: W,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> MarkerSink for JsonLinesSink<W> {
    fn submit(&mut self, batch: MarkerBatch) -> Result<(), SinkError> {
        serde_json::to_writer(&mut self.writer, &batch)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}
