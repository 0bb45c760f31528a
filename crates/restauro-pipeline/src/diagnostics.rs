//! Run diagnostics: per-stage timing and outcome.
//!
//! Every call to [`execute`](crate::execute) collects diagnostics
//! alongside the result image. Timestamps come from the `web-time`
//! crate (`performance.now()` on WASM, `std::time::Instant` natively);
//! durations are serialized as fractional seconds.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::{Dimensions, StageError};

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// Diagnostics collected from one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunDiagnostics {
    /// Dimensions of the base image.
    pub image: Dimensions,
    /// Channel count of the base image.
    pub channels: usize,
    /// One entry per stage that was reached, in pipeline order.
    pub stages: Vec<StageDiagnostics>,
    /// Wall-clock duration of the whole run.
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
}

/// Diagnostics for a single stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageDiagnostics {
    /// Zero-based position in the pipeline.
    pub index: usize,
    /// Filter name as given in the pipeline.
    pub name: String,
    /// Wall-clock duration of the stage.
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Whether the stage output was kept.
    pub status: StageStatus,
}

/// Outcome of a single stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StageStatus {
    /// The output became the new accumulator.
    Applied,
    /// The stage was skipped; the accumulator is unchanged.
    Failed(StageError),
}

impl RunDiagnostics {
    /// Number of stages whose output was kept.
    #[must_use]
    pub fn applied_count(&self) -> usize {
        self.stages
            .iter()
            .filter(|s| s.status == StageStatus::Applied)
            .count()
    }

    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Pipeline Diagnostics Report\n{}", "=".repeat(60)));
        lines.push(format!(
            "Image: {} x{} ({} pixels)",
            self.image,
            self.channels,
            self.image.pixel_count(),
        ));
        lines.push(format!(
            "Total duration: {:.3}ms",
            duration_ms(self.total_duration),
        ));
        lines.push(String::new());

        lines.push(format!(
            "{:<4} {:<36} {:>10} {:>8}  {}",
            "#", "Stage", "Duration", "% Total", "Status"
        ));
        lines.push("-".repeat(80));

        let total_ms = duration_ms(self.total_duration);
        for stage in &self.stages {
            let ms = duration_ms(stage.duration);
            let pct = if total_ms > 0.0 {
                ms / total_ms * 100.0
            } else {
                0.0
            };
            let status = match &stage.status {
                StageStatus::Applied => "ok".to_string(),
                StageStatus::Failed(err) => format!("skipped: {err}"),
            };
            lines.push(format!(
                "{:<4} {:<36} {ms:>8.3}ms {pct:>7.1}%  {status}",
                stage.index, stage.name,
            ));
        }

        lines.push(String::new());
        lines.push(format!(
            "Stages applied: {} / {}",
            self.applied_count(),
            self.stages.len(),
        ));

        lines.join("\n")
    }
}

/// Convert a `Duration` to milliseconds as `f64`.
fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}
