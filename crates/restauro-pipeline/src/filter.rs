//! Typed filter stages.
//!
//! [`Filter`] has one variant per operation in the library, each
//! carrying its strongly-typed parameters. Trusted callers build
//! `Filter` values directly; untrusted pipelines arrive as string-keyed
//! [`FilterSpec`]s and go through [`registry::resolve`](crate::registry::resolve).

use std::fmt;

use serde::Serialize;
use serde_json::{Number, Value};

use crate::buffer::Image;
use crate::cancel::CancellationToken;
use crate::channel::{
    apply_per_channel, apply_per_channel_indexed, apply_per_channel_shared, try_apply_per_channel,
};
use crate::filters::deconvolution::{self, L1TvParams, WienerParams};
use crate::filters::frequency::{self, HomomorphicParams, NotchParams};
use crate::filters::noise::{
    self, FilmGrainParams, GaussianNoiseParams, PeriodicNoiseParams, SaltAndPepperParams,
    UniformNoiseParams, channel_rng,
};
use crate::filters::pde::{self, DiffusionParams};
use crate::filters::spatial::{self, ContraharmonicParams, GaussianParams, GeometricMeanParams};
use crate::filters::odd_kernel_size;
use crate::registry::{FilterParams, FilterSpec};
use crate::types::{Dimensions, FilterError, StageError};

/// Identifies an operation independently of its parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterKind {
    Median,
    MedianReference,
    Mean,
    GeometricMean,
    LogGeometricMean,
    ContraharmonicMean,
    Gaussian,
    Homomorphic,
    Notch,
    Shock,
    AnisotropicDiffusion,
    L1TvDeconvolution,
    WienerDeconvolution,
    GaussianNoise,
    SaltAndPepper,
    UniformNoise,
    FilmGrain,
    PeriodicNoise,
}

impl FilterKind {
    /// Every kind, in menu order.
    pub const ALL: [Self; 18] = [
        Self::Median,
        Self::MedianReference,
        Self::Mean,
        Self::GeometricMean,
        Self::LogGeometricMean,
        Self::ContraharmonicMean,
        Self::Gaussian,
        Self::Homomorphic,
        Self::Notch,
        Self::Shock,
        Self::AnisotropicDiffusion,
        Self::L1TvDeconvolution,
        Self::WienerDeconvolution,
        Self::GaussianNoise,
        Self::SaltAndPepper,
        Self::UniformNoise,
        Self::FilmGrain,
        Self::PeriodicNoise,
    ];

    /// Registry name used in saved configurations.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Median => "Filtro Mediano",
            Self::MedianReference => "Filtro Mediano Manuale",
            Self::Mean => "Filtro Media Aritmetica",
            Self::GeometricMean => "Filtro Media Geometrica",
            Self::LogGeometricMean => "Filtro Media Geometrica Logaritmica",
            Self::ContraharmonicMean => "Filtro Media Contro-Armonica",
            Self::Gaussian => "Filtro Gaussiano",
            Self::Homomorphic => "Filtro Homomorphic",
            Self::Notch => "Filtro Notch",
            Self::Shock => "Filtro Shock",
            Self::AnisotropicDiffusion => "Diffusione Anisotropa",
            Self::L1TvDeconvolution => "Deconvoluzione L1-TV",
            Self::WienerDeconvolution => "Deconvoluzione Wiener",
            Self::GaussianNoise => "Rumore Gaussiano",
            Self::SaltAndPepper => "Rumore Sale e Pepe",
            Self::UniformNoise => "Rumore Uniforme",
            Self::FilmGrain => "Rumore Film Grain",
            Self::PeriodicNoise => "Rumore Periodico",
        }
    }

    /// Look a kind up by its registry name (exact match).
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A fully-typed pipeline stage.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Median filter, fast path.
    Median { ksize: u32 },
    /// Median filter, reference implementation.
    MedianReference { ksize: u32 },
    /// Arithmetic mean (box) filter.
    Mean { ksize: u32 },
    /// Geometric mean filter.
    GeometricMean(GeometricMeanParams),
    /// Log-domain geometric mean filter.
    LogGeometricMean { ksize: u32 },
    /// Contra-harmonic mean filter.
    ContraharmonicMean(ContraharmonicParams),
    /// Gaussian blur.
    Gaussian(GaussianParams),
    /// Homomorphic filter.
    Homomorphic(HomomorphicParams),
    /// Notch reject filter.
    Notch(NotchParams),
    /// Shock filter.
    Shock { iterations: u32 },
    /// Perona-Malik diffusion.
    AnisotropicDiffusion(DiffusionParams),
    /// ℓ1-TV deconvolution.
    L1TvDeconvolution(L1TvParams),
    /// Adaptive Wiener deconvolution.
    WienerDeconvolution(WienerParams),
    /// Additive Gaussian noise.
    GaussianNoise(GaussianNoiseParams),
    /// Salt-and-pepper noise.
    SaltAndPepper(SaltAndPepperParams),
    /// Additive uniform noise.
    UniformNoise(UniformNoiseParams),
    /// Film grain.
    FilmGrain(FilmGrainParams),
    /// Sinusoidal column interference.
    PeriodicNoise(PeriodicNoiseParams),
}

impl Filter {
    /// The operation this stage performs.
    #[must_use]
    pub const fn kind(&self) -> FilterKind {
        match self {
            Self::Median { .. } => FilterKind::Median,
            Self::MedianReference { .. } => FilterKind::MedianReference,
            Self::Mean { .. } => FilterKind::Mean,
            Self::GeometricMean(_) => FilterKind::GeometricMean,
            Self::LogGeometricMean { .. } => FilterKind::LogGeometricMean,
            Self::ContraharmonicMean(_) => FilterKind::ContraharmonicMean,
            Self::Gaussian(_) => FilterKind::Gaussian,
            Self::Homomorphic(_) => FilterKind::Homomorphic,
            Self::Notch(_) => FilterKind::Notch,
            Self::Shock { .. } => FilterKind::Shock,
            Self::AnisotropicDiffusion(_) => FilterKind::AnisotropicDiffusion,
            Self::L1TvDeconvolution(_) => FilterKind::L1TvDeconvolution,
            Self::WienerDeconvolution(_) => FilterKind::WienerDeconvolution,
            Self::GaussianNoise(_) => FilterKind::GaussianNoise,
            Self::SaltAndPepper(_) => FilterKind::SaltAndPepper,
            Self::UniformNoise(_) => FilterKind::UniformNoise,
            Self::FilmGrain(_) => FilterKind::FilmGrain,
            Self::PeriodicNoise(_) => FilterKind::PeriodicNoise,
        }
    }

    /// Registry name of this stage.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.kind().name()
    }

    /// Check the parameters before any stage runs.
    ///
    /// # Errors
    ///
    /// Returns a description of the first malformed parameter.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Self::ContraharmonicMean(p) if !p.q.is_finite() => {
                Err(format!("contra-harmonic order must be finite, got {}", p.q))
            }
            Self::Gaussian(p) if p.sigma.is_nan() => Err("gaussian sigma is NaN".to_string()),
            Self::Homomorphic(p) => p.validate(),
            Self::Notch(p) => p.validate(),
            Self::AnisotropicDiffusion(p) => p.validate(),
            Self::L1TvDeconvolution(p) => p.validate(),
            Self::WienerDeconvolution(p) => p.validate(),
            Self::GaussianNoise(p) => p.distribution().map(drop),
            Self::SaltAndPepper(p) => p.validate(),
            Self::UniformNoise(p) => p.distribution().map(drop),
            Self::FilmGrain(p) => p.distribution().map(drop),
            Self::PeriodicNoise(p) => p.validate(),
            _ => Ok(()),
        }
    }

    /// Window side requested by kernel-based stages.
    #[must_use]
    pub const fn kernel_size(&self) -> Option<u32> {
        match self {
            Self::Median { ksize }
            | Self::MedianReference { ksize }
            | Self::Mean { ksize }
            | Self::LogGeometricMean { ksize } => Some(*ksize),
            Self::GeometricMean(p) => Some(p.ksize),
            Self::ContraharmonicMean(p) => Some(p.ksize),
            Self::Gaussian(p) => Some(p.ksize),
            Self::WienerDeconvolution(p) => Some(p.ksize),
            _ => None,
        }
    }

    /// Check the parameters against the image a run starts from.
    ///
    /// A kernel's radius may not exceed the longer image side, which
    /// bounds the reflect-padded buffers to a few times the image.
    ///
    /// # Errors
    ///
    /// Returns a description of the oversized kernel.
    pub fn validate_for(&self, dims: Dimensions) -> Result<(), String> {
        let Some(ksize) = self.kernel_size() else {
            return Ok(());
        };
        if odd_kernel_size(ksize) / 2 > dims.longer_side() {
            return Err(format!("kernel size {ksize} is too large for a {dims} image"));
        }
        Ok(())
    }

    /// Run this stage on `image`.
    ///
    /// Iterative stages consult `cancel` between iterations and return
    /// early once it is set; the partial output must then be discarded.
    ///
    /// # Errors
    ///
    /// - [`FilterError::Stage`] with [`StageError::Numeric`] if the
    ///   parameters cannot be evaluated (only possible when
    ///   [`validate`](Self::validate) was skipped).
    /// - [`FilterError::Fatal`] with
    ///   [`PipelineError::Allocation`](crate::PipelineError::Allocation)
    ///   if a working buffer cannot be allocated.
    pub fn apply(&self, image: &Image, cancel: &CancellationToken) -> Result<Image, FilterError> {
        let out = match self {
            Self::Median { ksize } => {
                try_apply_per_channel(image, |p| spatial::median_filter(p, *ksize))?
            }
            Self::MedianReference { ksize } => {
                try_apply_per_channel(image, |p| spatial::median_filter_reference(p, *ksize))?
            }
            Self::Mean { ksize } => {
                try_apply_per_channel(image, |p| spatial::mean_filter(p, *ksize))?
            }
            Self::GeometricMean(params) => {
                if params.luminance && image.channels() > 1 {
                    Image::Gray(spatial::geometric_mean_filter(&image.to_luma(), params.ksize)?)
                } else {
                    try_apply_per_channel(image, |p| {
                        spatial::geometric_mean_filter(p, params.ksize)
                    })?
                }
            }
            Self::LogGeometricMean { ksize } => {
                try_apply_per_channel(image, |p| spatial::log_geometric_mean_filter(p, *ksize))?
            }
            Self::ContraharmonicMean(params) => try_apply_per_channel(image, |p| {
                spatial::contraharmonic_mean_filter(p, params.ksize, params.q)
            })?,
            Self::Gaussian(params) => try_apply_per_channel(image, |p| {
                spatial::gaussian_filter(p, params.ksize, params.sigma)
            })?,
            Self::Homomorphic(params) => {
                params.validate().map_err(StageError::Numeric)?;
                apply_per_channel_shared(image, |p| frequency::homomorphic_filter(p, params))
            }
            Self::Notch(params) => {
                params.validate().map_err(StageError::Numeric)?;
                apply_per_channel_shared(image, |p| frequency::notch_filter(p, params))
            }
            Self::Shock { iterations } => {
                apply_per_channel(image, |p| pde::shock_filter(p, *iterations, cancel))
            }
            Self::AnisotropicDiffusion(params) => {
                apply_per_channel(image, |p| pde::anisotropic_diffusion(p, params, cancel))
            }
            Self::L1TvDeconvolution(params) => try_apply_per_channel(image, |p| {
                deconvolution::l1_tv_deconvolution(p, params, cancel)
            })?,
            Self::WienerDeconvolution(params) => {
                try_apply_per_channel(image, |p| deconvolution::wiener_deconvolution(p, params))?
            }
            Self::GaussianNoise(params) => {
                let dist = params.distribution().map_err(StageError::Numeric)?;
                apply_per_channel_indexed(image, |c, p| {
                    noise::gaussian_noise(p, &dist, &mut channel_rng(params.seed, c))
                })
            }
            Self::SaltAndPepper(params) => {
                params.validate().map_err(StageError::Numeric)?;
                apply_per_channel_indexed(image, |c, p| {
                    noise::salt_and_pepper(p, params.prob, &mut channel_rng(params.seed, c))
                })
            }
            Self::UniformNoise(params) => {
                let dist = params.distribution().map_err(StageError::Numeric)?;
                apply_per_channel_indexed(image, |c, p| {
                    noise::uniform_noise(p, &dist, &mut channel_rng(params.seed, c))
                })
            }
            Self::FilmGrain(params) => {
                let dist = params.distribution().map_err(StageError::Numeric)?;
                apply_per_channel_indexed(image, |c, p| {
                    noise::film_grain(p, &dist, &mut channel_rng(params.seed, c))
                })
            }
            Self::PeriodicNoise(params) => {
                apply_per_channel(image, |p| noise::periodic_noise(p, params))
            }
        };
        Ok(out)
    }

    /// Canonical string-keyed form of this stage.
    ///
    /// Single-parameter stages use a scalar, everything else a record.
    /// [`registry::resolve`](crate::registry::resolve) maps the result
    /// back to an equal `Filter`.
    #[must_use]
    pub fn to_spec(&self) -> FilterSpec {
        let params = match self {
            Self::Median { ksize }
            | Self::MedianReference { ksize }
            | Self::Mean { ksize }
            | Self::LogGeometricMean { ksize } => FilterParams::Scalar(Number::from(*ksize)),
            Self::GeometricMean(p) if !p.luminance => FilterParams::Scalar(Number::from(p.ksize)),
            Self::Shock { iterations } => FilterParams::Scalar(Number::from(*iterations)),
            Self::GeometricMean(p) => record(p),
            Self::ContraharmonicMean(p) => record(p),
            Self::Gaussian(p) => record(p),
            Self::Homomorphic(p) => record(p),
            Self::Notch(p) => record(p),
            Self::AnisotropicDiffusion(p) => record(p),
            Self::L1TvDeconvolution(p) => record(p),
            Self::WienerDeconvolution(p) => record(p),
            Self::GaussianNoise(p) => record(p),
            Self::SaltAndPepper(p) => record(p),
            Self::UniformNoise(p) => record(p),
            Self::FilmGrain(p) => record(p),
            Self::PeriodicNoise(p) => record(p),
        };
        FilterSpec::new(self.name(), params)
    }
}

/// Serialize a parameter struct as a flat record.
fn record(params: &impl Serialize) -> FilterParams {
    match serde_json::to_value(params) {
        Ok(Value::Object(map)) => FilterParams::Record(map),
        _ => FilterParams::None,
    }
}
