//! Marker Id Allocator: flat, collision-free primitive ids.
//!
//! ```text
//! id = base(handle, category) + path_index * path_stride
//! base = handle * CATEGORY_COUNT + category
//! ```
//!
//! The allocator is a pure function of its inputs. Deriving an id for the
//! same (handle, category, path_index) in a later frame gives the same
//! integer, which is how the viewer recognizes "same element, replace in
//! place".
//!
//! Collision freedom holds as long as every base stays below the stride
//! (`handle < path_stride / CATEGORY_COUNT`) and path indices stay below
//! `max_paths`. Both bounds are enforced here: out-of-range requests yield
//! `None` instead of an id that could alias another primitive.

use crate::error::ConfigError;
use crate::identity::IdentityHandle;
use serde::{Deserialize, Serialize};

/// Primitive categories, in emission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerCategory {
    Shape,
    Label,
    IdentityTag,
    CovarianceEllipse,
    VelocityText,
    VelocityVector,
    Trajectory,
    TrajectoryConfidence,
}

/// Number of marker categories sharing one handle's base range.
pub const CATEGORY_COUNT: u64 = 8;

/// Stride that fits every possible `u32` handle below it.
pub const DEFAULT_PATH_STRIDE: u64 = CATEGORY_COUNT << 32;

pub const DEFAULT_MAX_PATHS: u32 = 64;

impl MarkerCategory {
    pub const ALL: [MarkerCategory; CATEGORY_COUNT as usize] = [
        MarkerCategory::Shape,
        MarkerCategory::Label,
        MarkerCategory::IdentityTag,
        MarkerCategory::CovarianceEllipse,
        MarkerCategory::VelocityText,
        MarkerCategory::VelocityVector,
        MarkerCategory::Trajectory,
        MarkerCategory::TrajectoryConfidence,
    ];

    #[inline]
    pub fn index(&self) -> u64 {
        *self as u64
    }

    /// Categories emitted once per predicted path.
    #[inline]
    pub fn is_per_path(&self) -> bool {
        matches!(
            self,
            MarkerCategory::Trajectory | MarkerCategory::TrajectoryConfidence
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            MarkerCategory::Shape => "shape",
            MarkerCategory::Label => "label",
            MarkerCategory::IdentityTag => "identity_tag",
            MarkerCategory::CovarianceEllipse => "covariance",
            MarkerCategory::VelocityText => "velocity_text",
            MarkerCategory::VelocityVector => "velocity_vector",
            MarkerCategory::Trajectory => "trajectory",
            MarkerCategory::TrajectoryConfidence => "trajectory_confidence",
        }
    }

    fn from_index(index: u64) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }
}

/// Primitive id, unique within the engine's namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MarkerId(pub u64);

impl std::fmt::Display for MarkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Components recovered from a [`MarkerId`] by [`MarkerIdAllocator::decode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedId {
    pub handle: IdentityHandle,
    pub category: MarkerCategory,
    pub path_index: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkerIdAllocator {
    path_stride: u64,
    max_paths: u32,
}

impl MarkerIdAllocator {
    pub fn new(path_stride: u64, max_paths: u32) -> Result<Self, ConfigError> {
        if path_stride < CATEGORY_COUNT {
            return Err(ConfigError::StrideTooSmall {
                stride: path_stride,
                categories: CATEGORY_COUNT,
            });
        }
        if max_paths == 0 {
            return Err(ConfigError::NoPaths);
        }
        if (max_paths as u64).checked_mul(path_stride).is_none() {
            return Err(ConfigError::IdSpaceOverflow {
                stride: path_stride,
                max_paths,
            });
        }
        Ok(Self {
            path_stride,
            max_paths,
        })
    }

    pub fn path_stride(&self) -> u64 {
        self.path_stride
    }

    pub fn max_paths(&self) -> u32 {
        self.max_paths
    }

    /// Number of distinct handles whose bases fit below the stride.
    pub fn handle_capacity(&self) -> u64 {
        self.path_stride / CATEGORY_COUNT
    }

    #[inline]
    fn base(&self, handle: IdentityHandle, category: MarkerCategory) -> Option<u64> {
        let handle = handle.0 as u64;
        if handle >= self.handle_capacity() {
            return None;
        }
        Some(handle * CATEGORY_COUNT + category.index())
    }

    /// Id of a single-instance category. For per-path categories this is
    /// the id of path ordinal 0.
    pub fn id_for(&self, handle: IdentityHandle, category: MarkerCategory) -> Option<MarkerId> {
        self.base(handle, category).map(MarkerId)
    }

    /// Id of the `path_index`-th emitted primitive of a per-path category.
    pub fn path_id_for(
        &self,
        handle: IdentityHandle,
        category: MarkerCategory,
        path_index: u32,
    ) -> Option<MarkerId> {
        if !category.is_per_path() || path_index >= self.max_paths {
            return None;
        }
        let base = self.base(handle, category)?;
        Some(MarkerId(base + path_index as u64 * self.path_stride))
    }

    /// Inverse of [`Self::id_for`] / [`Self::path_id_for`].
    pub fn decode(&self, id: MarkerId) -> Option<DecodedId> {
        let path_index = id.0 / self.path_stride;
        let base = id.0 % self.path_stride;
        if path_index >= self.max_paths as u64 || base >= self.handle_capacity() * CATEGORY_COUNT {
            return None;
        }
        let category = MarkerCategory::from_index(base % CATEGORY_COUNT)?;
        if path_index > 0 && !category.is_per_path() {
            return None;
        }
        Some(DecodedId {
            handle: IdentityHandle((base / CATEGORY_COUNT) as u32),
            category,
            path_index: path_index as u32,
        })
    }
}

impl Default for MarkerIdAllocator {
    fn default() -> Self {
        Self {
            path_stride: DEFAULT_PATH_STRIDE,
            max_paths: DEFAULT_MAX_PATHS,
        }
    }
}
