//! Pipeline executor: runs an ordered list of stages over a base image.
//!
//! The executor owns a single accumulator image. Each stage reads it and
//! produces a replacement; the previous accumulator is dropped as soon
//! as the stage output is accepted. A stage that cannot run (unknown
//! name, numeric failure, changed dimensions) is recorded and skipped,
//! and the next stage sees the last good image.
//!
//! Kernel sizes are checked against the base image before the first
//! stage, and a stage that cannot allocate its working buffers aborts
//! the run with [`PipelineError::Allocation`].
//!
//! Cancellation is checked before the first stage and after every
//! stage. Iterative filters also check it between iterations, so a
//! long stage ends early; its partial output is never accepted.

use log::{debug, info, warn};
use web_time::Instant;

use crate::buffer::{Image, Plane};
use crate::cancel::CancellationToken;
use crate::diagnostics::{RunDiagnostics, StageDiagnostics, StageStatus};
use crate::filter::Filter;
use crate::registry::{FilterSpec, ResolveError, resolve};
use crate::types::{FilterError, PipelineError, StageError, StageFailure};

/// Result of a run that reached the end of the pipeline.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// Image after the last successful stage (the base image if none
    /// succeeded).
    pub image: Image,
    /// Stages that were skipped, in pipeline order.
    pub failures: Vec<StageFailure>,
    /// Timing and per-stage outcome.
    pub diagnostics: RunDiagnostics,
}

impl ExecutionResult {
    /// Whether every stage was applied.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// How a run ended.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    /// Every stage was attempted.
    Completed(ExecutionResult),
    /// Cancellation was observed; no image is produced and the caller's
    /// previous image stays authoritative.
    Cancelled,
}

impl RunOutcome {
    /// The result, if the run completed.
    #[must_use]
    pub fn completed(self) -> Option<ExecutionResult> {
        match self {
            Self::Completed(result) => Some(result),
            Self::Cancelled => None,
        }
    }
}

/// A stage ready to run: its name and, unless the name is unknown, the
/// resolved filter.
struct Stage {
    name: String,
    filter: Option<Filter>,
}

/// Run string-keyed filter specs over `base`.
///
/// Every spec is resolved before any stage runs. Unknown names
/// become recorded stage failures; malformed parameters reject the
/// whole run.
///
/// # Errors
///
/// - [`PipelineError::InvalidConfig`] if any spec has
///   malformed parameters, or a kernel too large for `base`.
/// - [`PipelineError::InvalidImage`] if `base` has no pixels.
/// - [`PipelineError::Allocation`] if working buffers for `base`
///   or for any stage cannot be allocated.
pub fn execute(
    base: &Image,
    specs: &[FilterSpec],
    cancel: &CancellationToken,
) -> Result<RunOutcome, PipelineError> {
    let stages = specs
        .iter()
        .map(|spec| match resolve(spec) {
            Ok(filter) => Ok(Stage {
                name: spec.name.clone(),
                filter: Some(filter),
            }),
            Err(ResolveError::Unknown(name)) => Ok(Stage { name, filter: None }),
            Err(err @ ResolveError::Invalid { .. }) => {
                Err(PipelineError::InvalidConfig(err.to_string()))
            }
        })
        .collect::<Result<Vec<_>, _>>()?;
    run(base, &stages, cancel)
}

/// Run typed filters over `base`.
///
/// # Errors
///
/// Same as [`execute`]; `InvalidConfig` comes from
/// [`Filter::validate`].
pub fn execute_filters(
    base: &Image,
    filters: &[Filter],
    cancel: &CancellationToken,
) -> Result<RunOutcome, PipelineError> {
    let stages = filters
        .iter()
        .map(|filter| {
            filter
                .validate()
                .map_err(|reason| PipelineError::InvalidConfig(format!("{}: {reason}", filter.name())))?;
            Ok(Stage {
                name: filter.name().to_string(),
                filter: Some(filter.clone()),
            })
        })
        .collect::<Result<Vec<_>, PipelineError>>()?;
    run(base, &stages, cancel)
}

/// Reject images no stage can work on.
fn preflight(base: &Image) -> Result<(), PipelineError> {
    if base.width() == 0 || base.height() == 0 {
        return Err(PipelineError::InvalidImage(format!(
            "image has no pixels ({})",
            base.dimensions(),
        )));
    }
    // Every floating-point stage needs at least one plane of this size.
    Plane::try_new(base.width() as usize, base.height() as usize).map(drop)
}

/// Reject stages whose parameters do not fit the base image. Stages
/// keep the base dimensions, so one check covers the whole run.
fn check_stages(base: &Image, stages: &[Stage]) -> Result<(), PipelineError> {
    let dims = base.dimensions();
    for stage in stages {
        if let Some(filter) = &stage.filter {
            filter.validate_for(dims).map_err(|reason| {
                PipelineError::InvalidConfig(format!("{}: {reason}", stage.name))
            })?;
        }
    }
    Ok(())
}

fn run(
    base: &Image,
    stages: &[Stage],
    cancel: &CancellationToken,
) -> Result<RunOutcome, PipelineError> {
    preflight(base)?;
    check_stages(base, stages)?;

    let started = Instant::now();
    let mut current = base.clone();
    let mut failures = Vec::new();
    let mut diagnostics = Vec::with_capacity(stages.len());

    if cancel.is_cancelled() {
        warn!("pipeline cancelled before the first stage");
        return Ok(RunOutcome::Cancelled);
    }

    for (index, stage) in stages.iter().enumerate() {
        debug!("stage {index} ({}) starting", stage.name);
        let stage_start = Instant::now();
        let result = match &stage.filter {
            Some(filter) => match filter.apply(&current, cancel) {
                Ok(out) => check_dimensions(&current, out),
                Err(FilterError::Stage(error)) => Err(error),
                Err(FilterError::Fatal(error)) => {
                    warn!("stage {index} ({}) aborted the run: {error}", stage.name);
                    return Err(error);
                }
            },
            None => Err(StageError::UnknownFilter(stage.name.clone())),
        };
        let duration = stage_start.elapsed();

        if cancel.is_cancelled() {
            warn!("pipeline cancelled after stage {index} ({})", stage.name);
            return Ok(RunOutcome::Cancelled);
        }

        let status = match result {
            Ok(out) => {
                debug!("stage {index} ({}) applied in {duration:?}", stage.name);
                current = out;
                StageStatus::Applied
            }
            Err(error) => {
                warn!("stage {index} ({}) skipped: {error}", stage.name);
                failures.push(StageFailure {
                    index,
                    name: stage.name.clone(),
                    error: error.clone(),
                });
                StageStatus::Failed(error)
            }
        };
        diagnostics.push(StageDiagnostics {
            index,
            name: stage.name.clone(),
            duration,
            status,
        });
    }

    let total_duration = started.elapsed();
    info!(
        "pipeline finished: {} of {} stages applied in {total_duration:?}",
        stages.len() - failures.len(),
        stages.len(),
    );

    Ok(RunOutcome::Completed(ExecutionResult {
        image: current,
        failures,
        diagnostics: RunDiagnostics {
            image: base.dimensions(),
            channels: base.channels(),
            stages: diagnostics,
            total_duration,
        },
    }))
}

/// Stage outputs must keep the input's width and height.
fn check_dimensions(input: &Image, output: Image) -> Result<Image, StageError> {
    let (expected, actual) = (input.dimensions(), output.dimensions());
    if expected == actual {
        Ok(output)
    } else {
        Err(StageError::DimensionMismatch { expected, actual })
    }
}
