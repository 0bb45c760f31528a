//! Image quality metrics: MSE, PSNR and SSIM.
//!
//! All metrics compare two images of equal width and height. A
//! single-channel image compared against a three-channel one is
//! promoted to three identical channels first.

use crate::buffer::{Image, Plane};
use crate::channel::split;
use crate::types::Dimensions;

/// Peak sample value of 8-bit images.
pub const PEAK: f64 = 255.0;

/// Largest SSIM window side.
pub const MAX_SSIM_WINDOW: u32 = 7;

const SSIM_K1: f64 = 0.01;
const SSIM_K2: f64 = 0.03;

/// Errors comparing two images.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MetricsError {
    /// The images differ in width or height.
    #[error("cannot compare a {left} image with a {right} image")]
    ShapeMismatch {
        /// Dimensions of the first image.
        left: Dimensions,
        /// Dimensions of the second image.
        right: Dimensions,
    },
    /// The images have no pixels.
    #[error("cannot compare empty images")]
    Empty,
}

/// Split both images into the same number of planes (1 or 3).
fn paired_planes(a: &Image, b: &Image) -> Result<Vec<(Plane, Plane)>, MetricsError> {
    let (left, right) = (a.dimensions(), b.dimensions());
    if left != right {
        return Err(MetricsError::ShapeMismatch { left, right });
    }
    if left.pixel_count() == 0 {
        return Err(MetricsError::Empty);
    }
    let planes = |image: &Image, promote: bool| -> Vec<Plane> {
        match image {
            Image::Gray(g) if promote => vec![Plane::from_gray(g, 1.0); 3],
            Image::Gray(g) => vec![Plane::from_gray(g, 1.0)],
            Image::Rgb(c) => split(c).iter().map(|p| Plane::from_gray(p, 1.0)).collect(),
        }
    };
    let promote = a.channels() != b.channels();
    Ok(planes(a, promote).into_iter().zip(planes(b, promote)).collect())
}

/// Mean squared error over every sample.
///
/// # Errors
///
/// Returns [`MetricsError`] if the images differ in shape or are empty.
#[allow(clippy::cast_precision_loss)]
pub fn mse(a: &Image, b: &Image) -> Result<f64, MetricsError> {
    let pairs = paired_planes(a, b)?;
    let (mut sum, mut count) = (0.0, 0usize);
    for (pa, pb) in &pairs {
        for (x, y) in pa.data().iter().zip(pb.data()) {
            sum += (x - y) * (x - y);
        }
        count += pa.data().len();
    }
    Ok(sum / count as f64)
}

/// Peak signal-to-noise ratio in decibels; infinite for identical
/// images.
///
/// # Errors
///
/// Returns [`MetricsError`] if the images differ in shape or are empty.
pub fn psnr(a: &Image, b: &Image) -> Result<f64, MetricsError> {
    let mse = mse(a, b)?;
    if mse == 0.0 {
        return Ok(f64::INFINITY);
    }
    Ok(10.0 * (PEAK * PEAK / mse).log10())
}

/// Largest odd window side `<= MAX_SSIM_WINDOW` that fits in `dims`, or
/// `None` if not even a 3x3 window fits.
#[must_use]
pub const fn ssim_window(dims: Dimensions) -> Option<u32> {
    let side = dims.shorter_side();
    let side = if side < MAX_SSIM_WINDOW {
        side
    } else {
        MAX_SSIM_WINDOW
    };
    let side = if side % 2 == 0 { side.saturating_sub(1) } else { side };
    if side >= 3 { Some(side) } else { None }
}

/// Structural similarity with a uniform window.
///
/// The window is the largest odd side up to 7 that fits the image.
/// Statistics use the sample covariance; the score is averaged over all
/// window positions that lie fully inside the image, then over
/// channels. Returns `Ok(None)` when the image is smaller than 3x3.
///
/// # Errors
///
/// Returns [`MetricsError`] if the images differ in shape or are empty.
pub fn ssim(a: &Image, b: &Image) -> Result<Option<f64>, MetricsError> {
    let pairs = paired_planes(a, b)?;
    let Some(win) = ssim_window(a.dimensions()) else {
        return Ok(None);
    };
    #[allow(clippy::cast_precision_loss)]
    let mean = pairs
        .iter()
        .map(|(pa, pb)| plane_ssim(pa, pb, win as usize))
        .sum::<f64>()
        / pairs.len() as f64;
    Ok(Some(mean))
}

#[allow(clippy::cast_precision_loss)]
fn plane_ssim(a: &Plane, b: &Plane, win: usize) -> f64 {
    let c1 = (SSIM_K1 * PEAK).powi(2);
    let c2 = (SSIM_K2 * PEAK).powi(2);
    let n = (win * win) as f64;
    let cov_norm = n / (n - 1.0);

    let (w, h) = (a.width(), a.height());
    let (mut total, mut positions) = (0.0, 0usize);
    for y0 in 0..=h - win {
        for x0 in 0..=w - win {
            let (mut sa, mut sb, mut saa, mut sbb, mut sab) = (0.0, 0.0, 0.0, 0.0, 0.0);
            for y in y0..y0 + win {
                for x in x0..x0 + win {
                    let (va, vb) = (a.get(x, y), b.get(x, y));
                    sa += va;
                    sb += vb;
                    saa += va * va;
                    sbb += vb * vb;
                    sab += va * vb;
                }
            }
            let (ua, ub) = (sa / n, sb / n);
            let va = cov_norm * ua.mul_add(-ua, saa / n);
            let vb = cov_norm * ub.mul_add(-ub, sbb / n);
            let vab = cov_norm * ua.mul_add(-ub, sab / n);
            let num = (2.0 * ua).mul_add(ub, c1) * 2.0f64.mul_add(vab, c2);
            let den = (ua.mul_add(ua, ub * ub) + c1) * (va + vb + c2);
            total += num / den;
            positions += 1;
        }
    }
    total / positions as f64
}
