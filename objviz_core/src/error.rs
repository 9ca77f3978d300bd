//! Error types for the marker engine.
//!
//! Unrenderable features are never errors: the factory reports them as
//! skips. What remains is configuration validation and failures reported
//! by the rendering collaborator.

use thiserror::Error;

/// Invalid engine configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("path stride {stride} leaves no room for {categories} marker categories")]
    StrideTooSmall { stride: u64, categories: u64 },

    #[error("max paths per object must be at least 1")]
    NoPaths,

    #[error("{max_paths} paths with stride {stride} overflow the marker id space")]
    IdSpaceOverflow { stride: u64, max_paths: u32 },

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field,
            reason: reason.into(),
        }
    }
}

/// Failure reported by a rendering collaborator.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Viewer error: {0}")]
    Viewer(String),

    #[error("duplicate marker id {id} in namespace {namespace}")]
    DuplicateId { namespace: String, id: u64 },
}

impl SinkError {
    pub fn viewer(msg: impl std::fmt::Display) -> Self {
        Self::Viewer(msg.to_string())
    }
}

/// Errors surfaced by [`crate::FrameAssembler::process`].
#[derive(Debug, Error)]
pub enum AssemblerError {
    #[error("frame {frame} could not be submitted: {source}")]
    Submit {
        frame: u64,
        #[source]
        source: SinkError,
    },
}

/// Errors from the FIFO frame queue.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("frame queue worker has stopped")]
    WorkerStopped,

    #[error(transparent)]
    Assembler(#[from] AssemblerError),
}
