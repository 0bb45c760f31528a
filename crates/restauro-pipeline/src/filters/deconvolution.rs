//! Regularized deconvolution: ℓ1-TV and adaptive Wiener.

use image::GrayImage;
use serde::{Deserialize, Serialize};

use super::odd_kernel_size;
use super::spatial::median_filter;
use crate::buffer::Plane;
use crate::cancel::CancellationToken;
use crate::types::PipelineError;

/// Forward blur model of the ℓ1-TV restoration: a normalized 3x3
/// binomial kernel.
const BLUR_KERNEL: [[f64; 3]; 3] = [
    [1.0 / 16.0, 2.0 / 16.0, 1.0 / 16.0],
    [2.0 / 16.0, 4.0 / 16.0, 2.0 / 16.0],
    [1.0 / 16.0, 2.0 / 16.0, 1.0 / 16.0],
];

/// Keeps the TV magnitude strictly positive.
pub const TV_EPSILON: f64 = 1e-8;

/// Bound on the per-iteration fidelity residual.
pub const RESIDUAL_CLIP: f64 = 0.1;

/// Parameters of ℓ1-TV deconvolution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct L1TvParams {
    /// Number of gradient steps.
    #[serde(default = "L1TvParams::default_iterations")]
    pub iterations: u32,
    /// Step weight of the regularized update.
    #[serde(default = "L1TvParams::default_weight")]
    pub regularization_weight: f64,
}

impl L1TvParams {
    /// Default iteration count.
    pub const DEFAULT_ITERATIONS: u32 = 50;
    /// Default regularization weight.
    pub const DEFAULT_WEIGHT: f64 = 0.01;

    const fn default_iterations() -> u32 {
        Self::DEFAULT_ITERATIONS
    }

    const fn default_weight() -> f64 {
        Self::DEFAULT_WEIGHT
    }

    /// # Errors
    ///
    /// Returns a description of the problem if the weight is not finite.
    pub fn validate(&self) -> Result<(), String> {
        if self.regularization_weight.is_finite() {
            Ok(())
        } else {
            Err(format!(
                "regularization weight must be finite, got {}",
                self.regularization_weight,
            ))
        }
    }
}

impl Default for L1TvParams {
    fn default() -> Self {
        Self {
            iterations: Self::DEFAULT_ITERATIONS,
            regularization_weight: Self::DEFAULT_WEIGHT,
        }
    }
}

/// Forward differences along x and y; the last column (row) gets 0.
fn forward_gradients(plane: &Plane) -> (Plane, Plane) {
    let (w, h) = (plane.width(), plane.height());
    let gx = Plane::from_fn(w, h, |x, y| {
        if x + 1 < w {
            plane.get(x + 1, y) - plane.get(x, y)
        } else {
            0.0
        }
    });
    let gy = Plane::from_fn(w, h, |x, y| {
        if y + 1 < h {
            plane.get(x, y + 1) - plane.get(x, y)
        } else {
            0.0
        }
    });
    (gx, gy)
}

/// ℓ1-TV deconvolution.
///
/// A 3x3 median pre-filter removes impulses first. Each iteration then
/// blurs the estimate `f` with the forward model, takes the clipped
/// residual against the observation `g`, and steps
/// `f -= w * residual / (tv + eps)` where
/// `tv = sqrt(gx^2 + gy^2 + eps)` from forward differences of `f`.
///
/// # Errors
///
/// Returns [`PipelineError::Allocation`] if the pre-filter's padded
/// buffer cannot be allocated.
pub fn l1_tv_deconvolution(
    image: &GrayImage,
    params: &L1TvParams,
    cancel: &CancellationToken,
) -> Result<GrayImage, PipelineError> {
    let observed = Plane::from_gray(&median_filter(image, 3)?, 1.0 / 255.0);
    let mut estimate = observed.clone();

    for _ in 0..params.iterations {
        if cancel.is_cancelled() {
            break;
        }
        let blurred = estimate.filter3x3(&BLUR_KERNEL);
        let residual = blurred.zip_map(&observed, |b, g| {
            (b - g).clamp(-RESIDUAL_CLIP, RESIDUAL_CLIP)
        });
        let (gx, gy) = forward_gradients(&estimate);
        let tv = gx.zip_map(&gy, |a, b| a.mul_add(a, b.mul_add(b, TV_EPSILON)).sqrt());
        let step = residual.zip_map(&tv, |r, t| params.regularization_weight * r / (t + TV_EPSILON));
        estimate = estimate.zip_map(&step, |f, s| f - s);
    }

    estimate.clip(0.0, 1.0);
    Ok(estimate.to_gray(255.0))
}

/// Parameters of the adaptive Wiener filter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WienerParams {
    /// Side of the square estimation window.
    #[serde(default = "WienerParams::default_ksize")]
    pub ksize: u32,
    /// Noise power on the `[0, 1]` intensity scale. When absent it is
    /// estimated as the mean of the local variances.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub noise: Option<f64>,
}

impl WienerParams {
    /// Default window size.
    pub const DEFAULT_KSIZE: u32 = 5;

    const fn default_ksize() -> u32 {
        Self::DEFAULT_KSIZE
    }

    /// # Errors
    ///
    /// Returns a description of the problem if an explicit noise power is
    /// negative or non-finite.
    pub fn validate(&self) -> Result<(), String> {
        match self.noise {
            Some(n) if !n.is_finite() || n < 0.0 => {
                Err(format!("wiener noise power must be finite and >= 0, got {n}"))
            }
            _ => Ok(()),
        }
    }
}

impl Default for WienerParams {
    fn default() -> Self {
        Self {
            ksize: Self::DEFAULT_KSIZE,
            noise: None,
        }
    }
}

/// Adaptive Wiener deconvolution.
///
/// The plane is reflect-padded by `k / 2`. For every original pixel the
/// local mean `m` and variance `v` over its `k x k` window give
/// `m + (x - m) * (1 - noise / v)`, or just `m` where `v <= noise`.
/// Non-finite results become 0 before the final clip.
///
/// # Errors
///
/// Returns [`PipelineError::Allocation`] if the padded plane or the
/// statistics planes cannot be allocated.
#[allow(clippy::cast_precision_loss)]
pub fn wiener_deconvolution(
    image: &GrayImage,
    params: &WienerParams,
) -> Result<GrayImage, PipelineError> {
    let k = odd_kernel_size(params.ksize) as usize;
    let pad = k / 2;
    let plane = Plane::from_gray(image, 1.0 / 255.0);
    let padded = plane.pad_reflect(pad)?;
    let area = (k * k) as f64;

    let (w, h) = (plane.width(), plane.height());
    let mut means = Plane::try_new(w, h)?;
    let mut variances = Plane::try_new(w, h)?;
    for y in 0..h {
        for x in 0..w {
            let (mut sum, mut sum_sq) = (0.0, 0.0);
            for wy in y..y + k {
                for wx in x..x + k {
                    let v = padded.get(wx, wy);
                    sum += v;
                    sum_sq = v.mul_add(v, sum_sq);
                }
            }
            let mean = sum / area;
            means.set(x, y, mean);
            variances.set(x, y, mean.mul_add(-mean, sum_sq / area).max(0.0));
        }
    }

    let noise = params.noise.unwrap_or_else(|| variances.mean());
    let mut out = Plane::from_fn(w, h, |x, y| {
        let (m, var) = (means.get(x, y), variances.get(x, y));
        let res = if var <= noise {
            m
        } else {
            (plane.get(x, y) - m).mul_add(1.0 - noise / var, m)
        };
        if res.is_finite() { res } else { 0.0 }
    });
    out.clip(0.0, 1.0);
    Ok(out.to_gray(255.0))
}
