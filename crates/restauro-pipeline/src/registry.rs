//! String-keyed filter specs and their resolution to
//! [`Filter`] values.
//!
//! A [`FilterSpec`] is what gets saved and loaded: a registry name plus
//! loosely-typed parameters (`null`, a scalar, or a flat record).
//! [`resolve`] is the only place where names are compared as strings.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::filter::{Filter, FilterKind};
use crate::filters::deconvolution::{L1TvParams, WienerParams};
use crate::filters::frequency::{HomomorphicParams, NotchParams};
use crate::filters::noise::{
    FilmGrainParams, GaussianNoiseParams, PeriodicNoiseParams, SaltAndPepperParams,
    UniformNoiseParams,
};
use crate::filters::pde::{DEFAULT_SHOCK_ITERATIONS, DiffusionParams};
use crate::filters::spatial::{ContraharmonicParams, GaussianParams, GeometricMeanParams};
use crate::filters::DEFAULT_KERNEL_SIZE;

/// Parameters of a [`FilterSpec`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterParams {
    /// No parameters; the filter's defaults apply.
    None,
    /// A single number: kernel size or iteration count.
    Scalar(Number),
    /// Named parameters.
    Record(Map<String, Value>),
}

/// One stage of a saved pipeline: `[name, params]` on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "(String, FilterParams)", into = "(String, FilterParams)")]
pub struct FilterSpec {
    /// Registry name, e.g. `"Filtro Mediano"`.
    pub name: String,
    /// Loosely-typed parameters.
    pub params: FilterParams,
}

impl FilterSpec {
    /// Build a spec from a name and parameters.
    #[must_use]
    pub fn new(name: impl Into<String>, params: FilterParams) -> Self {
        Self {
            name: name.into(),
            params,
        }
    }
}

impl From<(String, FilterParams)> for FilterSpec {
    fn from((name, params): (String, FilterParams)) -> Self {
        Self { name, params }
    }
}

impl From<FilterSpec> for (String, FilterParams) {
    fn from(spec: FilterSpec) -> Self {
        (spec.name, spec.params)
    }
}

impl From<&Filter> for FilterSpec {
    fn from(filter: &Filter) -> Self {
        filter.to_spec()
    }
}

/// Why a [`FilterSpec`] could not be turned into a [`Filter`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    /// No filter is registered under this name. Recoverable: the
    /// executor records it and skips the stage.
    #[error("unknown filter: {0:?}")]
    Unknown(String),

    /// The name is known but the parameters are malformed. Fatal: the
    /// run is rejected before any stage executes.
    #[error("{name}: {reason}")]
    Invalid {
        /// Registry name of the offending stage.
        name: String,
        /// What is wrong with its parameters.
        reason: String,
    },
}

#[derive(Deserialize)]
struct KernelRecord {
    #[serde(default = "default_kernel_size")]
    ksize: u32,
}

#[derive(Deserialize)]
struct IterationsRecord {
    #[serde(default = "default_shock_iterations")]
    iterations: u32,
}

const fn default_kernel_size() -> u32 {
    DEFAULT_KERNEL_SIZE
}

const fn default_shock_iterations() -> u32 {
    DEFAULT_SHOCK_ITERATIONS
}

/// Resolve a filter spec into a validated [`Filter`].
///
/// # Errors
///
/// Returns [`ResolveError::Unknown`] for an unregistered name and
/// [`ResolveError::Invalid`] when the parameters have the wrong shape or
/// fail validation.
pub fn resolve(spec: &FilterSpec) -> Result<Filter, ResolveError> {
    let kind =
        FilterKind::from_name(&spec.name).ok_or_else(|| ResolveError::Unknown(spec.name.clone()))?;
    let invalid = |reason: String| ResolveError::Invalid {
        name: spec.name.clone(),
        reason,
    };
    let filter = build(kind, &spec.params).map_err(invalid)?;
    filter.validate().map_err(invalid)?;
    Ok(filter)
}

fn build(kind: FilterKind, params: &FilterParams) -> Result<Filter, String> {
    Ok(match kind {
        FilterKind::Median => Filter::Median {
            ksize: kernel_size(params)?,
        },
        FilterKind::MedianReference => Filter::MedianReference {
            ksize: kernel_size(params)?,
        },
        FilterKind::Mean => Filter::Mean {
            ksize: kernel_size(params)?,
        },
        FilterKind::LogGeometricMean => Filter::LogGeometricMean {
            ksize: kernel_size(params)?,
        },
        FilterKind::GeometricMean => Filter::GeometricMean(match params {
            FilterParams::Scalar(n) => GeometricMeanParams {
                ksize: scalar_count(n)?,
                luminance: false,
            },
            _ => record(params)?,
        }),
        FilterKind::Shock => Filter::Shock {
            iterations: match params {
                FilterParams::Scalar(n) => scalar_count(n)?,
                _ => record::<IterationsRecord>(params)?.iterations,
            },
        },
        FilterKind::ContraharmonicMean => {
            Filter::ContraharmonicMean(record::<ContraharmonicParams>(params)?)
        }
        FilterKind::Gaussian => Filter::Gaussian(record::<GaussianParams>(params)?),
        FilterKind::Homomorphic => Filter::Homomorphic(record::<HomomorphicParams>(params)?),
        FilterKind::Notch => Filter::Notch(record::<NotchParams>(params)?),
        FilterKind::AnisotropicDiffusion => {
            Filter::AnisotropicDiffusion(record::<DiffusionParams>(params)?)
        }
        FilterKind::L1TvDeconvolution => Filter::L1TvDeconvolution(record::<L1TvParams>(params)?),
        FilterKind::WienerDeconvolution => {
            Filter::WienerDeconvolution(record::<WienerParams>(params)?)
        }
        FilterKind::GaussianNoise => Filter::GaussianNoise(record::<GaussianNoiseParams>(params)?),
        FilterKind::SaltAndPepper => Filter::SaltAndPepper(record::<SaltAndPepperParams>(params)?),
        FilterKind::UniformNoise => Filter::UniformNoise(record::<UniformNoiseParams>(params)?),
        FilterKind::FilmGrain => Filter::FilmGrain(record::<FilmGrainParams>(params)?),
        FilterKind::PeriodicNoise => Filter::PeriodicNoise(record::<PeriodicNoiseParams>(params)?),
    })
}

fn kernel_size(params: &FilterParams) -> Result<u32, String> {
    match params {
        FilterParams::Scalar(n) => scalar_count(n),
        _ => Ok(record::<KernelRecord>(params)?.ksize),
    }
}

/// Read a scalar kernel size or iteration count. Values below 1
/// (including negatives) map to 0, which kernel-size normalization
/// turns into the default.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn scalar_count(n: &Number) -> Result<u32, String> {
    if let Some(v) = n.as_u64() {
        return u32::try_from(v).map_err(|_| format!("{v} is out of range"));
    }
    if n.is_i64() {
        return Ok(0);
    }
    match n.as_f64() {
        Some(v) if v.is_finite() && v.fract() == 0.0 => {
            if v < 1.0 {
                Ok(0)
            } else if v > f64::from(u32::MAX) {
                Err(format!("{v} is out of range"))
            } else {
                Ok(v as u32)
            }
        }
        _ => Err(format!("expected a whole number, got {n}")),
    }
}

/// Deserialize a record, or the type's defaults when there are no
/// parameters.
fn record<T>(params: &FilterParams) -> Result<T, String>
where
    T: DeserializeOwned,
{
    let map = match params {
        FilterParams::None => Map::new(),
        FilterParams::Record(map) => map.clone(),
        FilterParams::Scalar(n) => {
            return Err(format!("expected a parameter record, got the scalar {n}"));
        }
    };
    serde_json::from_value(Value::Object(map)).map_err(|e| e.to_string())
}
