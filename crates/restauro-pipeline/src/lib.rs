//! restauro-pipeline: Image restoration filter pipeline (sans-IO).
//!
//! Applies an ordered list of restoration and degradation stages to an
//! in-memory raster:
//! spatial filters (median, means, Gaussian) -> frequency filters
//! (homomorphic, notch) -> PDE filters (shock, anisotropic diffusion)
//! -> deconvolution (ℓ1-TV, Wiener) -> synthetic noise, in any order
//! and combination.
//!
//! Every algorithm is written once for a single 8-bit plane and lifted
//! to RGB by the [`channel`] adapter. Pipelines are either typed
//! ([`Filter`]) or string-keyed ([`FilterSpec`], the saved form);
//! [`execute`] runs them synchronously and [`PipelineSupervisor`] runs
//! them on a background thread with single-flight cancellation.
//!
//! This crate has **no I/O dependencies**: decoding, encoding and file
//! handling live in `restauro-bench`.

pub mod buffer;
pub mod cancel;
pub mod channel;
pub mod config;
pub mod diagnostics;
pub mod executor;
pub mod filter;
pub mod filters;
pub mod history;
pub mod metrics;
pub mod registry;
pub mod supervisor;
pub mod types;

pub use buffer::{Image, Plane};
pub use cancel::CancellationToken;
pub use config::ConfigError;
pub use diagnostics::{RunDiagnostics, StageDiagnostics, StageStatus};
pub use executor::{ExecutionResult, RunOutcome, execute, execute_filters};
pub use filter::{Filter, FilterKind};
pub use history::FilterChain;
pub use metrics::MetricsError;
pub use registry::{FilterParams, FilterSpec, ResolveError, resolve};
pub use supervisor::{Delivery, PipelineSupervisor};
pub use types::{
    Dimensions, FilterError, GrayImage, PipelineError, RgbImage, StageError, StageFailure,
};
