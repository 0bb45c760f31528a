//! Shared types for the restauro filter pipeline.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Re-export `GrayImage` so downstream crates can build single-channel
/// inputs without depending on `image` directly.
pub use image::GrayImage;

/// Re-export `RgbImage` so downstream crates can build three-channel
/// inputs without depending on `image` directly.
pub use image::RgbImage;

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Total number of pixels (`width * height`).
    #[must_use]
    pub fn pixel_count(self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    /// The shorter of the two sides.
    #[must_use]
    pub const fn shorter_side(self) -> u32 {
        if self.width < self.height {
            self.width
        } else {
            self.height
        }
    }

    /// The longer of the two sides.
    #[must_use]
    pub const fn longer_side(self) -> u32 {
        if self.width > self.height {
            self.width
        } else {
            self.height
        }
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Fatal errors that abort a pipeline run.
///
/// These are surfaced to the caller as a terminal failure and no
/// partial image is returned. Recoverable, per-stage problems are
/// [`StageError`]s instead.
#[derive(Debug, Clone, PartialEq, thiserror::Error, Serialize, Deserialize)]
pub enum PipelineError {
    /// A filter spec is malformed (bad parameters, mismatched
    /// notch coordinate lists, ...). Reported before any stage runs.
    #[error("invalid pipeline configuration: {0}")]
    InvalidConfig(String),

    /// A working buffer for the image could not be allocated.
    #[error("failed to allocate a {width}x{height} working buffer")]
    Allocation {
        /// Requested width in pixels.
        width: usize,
        /// Requested height in pixels.
        height: usize,
    },

    /// The input image is unusable (empty, or raw data of the wrong size).
    #[error("invalid input image: {0}")]
    InvalidImage(String),

    /// The background worker thread could not be started, or the run
    /// panicked.
    #[error("pipeline worker failed: {0}")]
    Worker(String),
}

/// Recoverable failure of a single stage.
///
/// The executor records the failure and continues with the next stage,
/// feeding it the image produced by the last successful stage.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum StageError {
    /// The pipeline names a filter the registry does not know.
    #[error("unknown filter: {0:?}")]
    UnknownFilter(String),

    /// The stage produced an image of different dimensions than its input.
    #[error("stage changed image dimensions from {expected} to {actual}")]
    DimensionMismatch {
        /// Dimensions of the stage input.
        expected: Dimensions,
        /// Dimensions of the rejected stage output.
        actual: Dimensions,
    },

    /// The stage computation could not produce a usable result.
    #[error("numeric failure: {0}")]
    Numeric(String),
}

/// Why a single stage did not produce an image.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FilterError {
    /// Recorded; the run continues with the last good image.
    #[error(transparent)]
    Stage(#[from] StageError),

    /// Aborts the run.
    #[error(transparent)]
    Fatal(#[from] PipelineError),
}

/// A recorded per-stage failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageFailure {
    /// Zero-based position of the stage in the pipeline.
    pub index: usize,
    /// Filter name as given in the pipeline.
    pub name: String,
    /// What went wrong.
    pub error: StageError,
}

impl fmt::Display for StageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stage {} ({}): {}", self.index, self.name, self.error)
    }
}
