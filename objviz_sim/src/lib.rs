//! ObjViz scenario driver
//!
//! Feeds seeded synthetic perception streams through the marker engine and
//! verifies its invariants on every submitted batch.
//!
//! ```text
//! World (seeded) ──message──► FrameQueue ──► FrameAssembler ──batch──► CheckingSink
//!                                                                         │
//!                                                                 (optional viewer)
//! ```

mod exporter;
mod runner;
mod world;
pub mod scenarios;

pub use exporter::{ExportFrame, SimExport};
pub use runner::{CheckingSink, ScenarioResult, ScenarioRunner};
pub use world::{SyntheticObject, World};

use objviz_core::{ConfigError, QueueError, SinkError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("invalid noise model: {0}")]
    Noise(#[from] rand_distr::NormalError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error("export failed: {0}")]
    Export(#[from] std::io::Error),
}
