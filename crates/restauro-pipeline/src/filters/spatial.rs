//! Spatial-domain window filters.
//!
//! All filters take a kernel size `k`, normalized by
//! [`odd_kernel_size`]. Borders are handled by reflect-101 padding the
//! plane by `k / 2` on every side; each output pixel reads exactly the
//! `k x k` window of the padded buffer centered on it. Padding and
//! window buffers are allocated fallibly, so an oversized kernel ends
//! the run with [`PipelineError::Allocation`] instead of aborting.

use image::{GrayImage, ImageBuffer, Luma};
use imageproc::kernel::Kernel;
use serde::{Deserialize, Serialize};

use super::{DEFAULT_KERNEL_SIZE, odd_kernel_size};
use crate::buffer::{Plane, pad_reflect_gray, try_buffer};
use crate::types::PipelineError;

/// Guard added to window products and logarithms so zero-valued pixels
/// do not collapse the geometric means.
pub const GEOMETRIC_EPSILON: f64 = 1e-5;

/// Replacement for zero-valued samples in the contra-harmonic mean, so
/// negative orders do not raise zero to a negative power.
pub const CONTRAHARMONIC_EPSILON: f64 = 1e-10;

type FloatImage = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Visit every output pixel with the `k x k` window of samples around
/// it (reflect-101 borders) and collect `reduce(window)` into a plane.
fn window_reduce(
    image: &GrayImage,
    k: usize,
    reduce: impl Fn(&[f64]) -> f64,
) -> Result<Plane, PipelineError> {
    let padded = Plane::from_gray(image, 1.0).pad_reflect(k / 2)?;
    let mut window = try_buffer(k, k)?;
    let (w, h) = (image.width() as usize, image.height() as usize);
    let mut out = Plane::try_new(w, h)?;
    for y in 0..h {
        for x in 0..w {
            window.clear();
            for wy in y..y + k {
                for wx in x..x + k {
                    window.push(padded.get(wx, wy));
                }
            }
            out.set(x, y, reduce(&window));
        }
    }
    Ok(out)
}

/// Round the `width x height` region at `(offset, offset)` of a float
/// image back to 8 bits. NaN becomes 0.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn crop_rounded(image: &FloatImage, offset: u32, width: u32, height: u32) -> GrayImage {
    GrayImage::from_fn(width, height, |x, y| {
        let v = image.get_pixel(x + offset, y + offset).0[0];
        Luma([if v.is_nan() {
            0
        } else {
            v.clamp(0.0, 255.0).round() as u8
        }])
    })
}

/// Median filter, reference pixel-by-pixel implementation.
///
/// Sorts each window explicitly. [`median_filter`] is the fast path and
/// produces identical output.
///
/// # Errors
///
/// Returns [`PipelineError::Allocation`] if the padded image or the
/// window buffer cannot be allocated.
pub fn median_filter_reference(image: &GrayImage, ksize: u32) -> Result<GrayImage, PipelineError> {
    let k = odd_kernel_size(ksize);
    let pad = k / 2;
    let padded = pad_reflect_gray(image, pad)?;
    let mut window: Vec<u8> = try_buffer(k as usize, k as usize)?;
    Ok(GrayImage::from_fn(image.width(), image.height(), |x, y| {
        window.clear();
        for wy in y..y + k {
            for wx in x..x + k {
                window.push(padded.get_pixel(wx, wy).0[0]);
            }
        }
        let mid = window.len() / 2;
        let (_, median, _) = window.select_nth_unstable(mid);
        Luma([*median])
    }))
}

/// Median filter, fast path.
///
/// Reflect-pads the plane and delegates to
/// [`imageproc::filter::median_filter`], then crops the padding away.
/// Because the padding is exactly the kernel radius, `imageproc`'s own
/// border clamping is never reached and the result matches
/// [`median_filter_reference`] bit for bit.
///
/// # Errors
///
/// Returns [`PipelineError::Allocation`] if the padded image cannot be
/// allocated.
pub fn median_filter(image: &GrayImage, ksize: u32) -> Result<GrayImage, PipelineError> {
    let radius = odd_kernel_size(ksize) / 2;
    if radius == 0 {
        return Ok(image.clone());
    }
    let padded = pad_reflect_gray(image, radius)?;
    let filtered = imageproc::filter::median_filter(&padded, radius, radius);
    Ok(
        image::imageops::crop_imm(&filtered, radius, radius, image.width(), image.height())
            .to_image(),
    )
}

/// Arithmetic mean (box) filter: correlation with a uniform kernel of
/// weight `1 / (k * k)`.
///
/// Correlates the reflect-padded image through
/// [`imageproc::filter::filter`], then crops the padding away.
///
/// # Errors
///
/// Returns [`PipelineError::Allocation`] if the padded image or the
/// kernel cannot be allocated.
#[allow(clippy::cast_precision_loss)]
pub fn mean_filter(image: &GrayImage, ksize: u32) -> Result<GrayImage, PipelineError> {
    let k = odd_kernel_size(ksize);
    let radius = k / 2;
    let padded = pad_reflect_gray(image, radius)?;
    let mut ones: Vec<f32> = try_buffer(k as usize, k as usize)?;
    ones.resize(k as usize * k as usize, 1.0);
    let n = ones.len() as f32;
    let means: FloatImage =
        imageproc::filter::filter(&padded, Kernel::new(&ones, k, k), |sum: f32| sum / n);
    Ok(crop_rounded(&means, radius, image.width(), image.height()))
}

/// Geometric mean filter: `(prod(window) + eps)^(1 / k^2)`.
///
/// Samples are taken in `[0, 255]`. For large kernels the raw product
/// overflows to infinity and the output saturates at 255; this matches
/// the direct-product formulation and is not corrected.
///
/// # Errors
///
/// Returns [`PipelineError::Allocation`] if the working buffers cannot
/// be allocated.
pub fn geometric_mean_filter(image: &GrayImage, ksize: u32) -> Result<GrayImage, PipelineError> {
    let k = odd_kernel_size(ksize) as usize;
    let exponent = 1.0 / f64::from(odd_kernel_size(ksize)).powi(2);
    let out = window_reduce(image, k, |w| {
        (w.iter().product::<f64>() + GEOMETRIC_EPSILON).powf(exponent)
    })?;
    Ok(out.to_gray(1.0))
}

/// Log-domain geometric mean filter: `exp(mean(ln(window + eps)))`.
///
/// Mathematically the same as [`geometric_mean_filter`] but summed in
/// the log domain. Unstable: near-zero samples dominate the sum through
/// `ln(eps)`, so dark regions are pulled sharply towards zero. Kept
/// as-is for comparison against the direct product.
///
/// # Errors
///
/// Returns [`PipelineError::Allocation`] if the working buffers cannot
/// be allocated.
#[allow(clippy::cast_precision_loss)]
pub fn log_geometric_mean_filter(
    image: &GrayImage,
    ksize: u32,
) -> Result<GrayImage, PipelineError> {
    let k = odd_kernel_size(ksize) as usize;
    let n = (k * k) as f64;
    let out = window_reduce(image, k, |w| {
        (w.iter().map(|v| (v + GEOMETRIC_EPSILON).ln()).sum::<f64>() / n).exp()
    })?;
    Ok(out.to_gray(1.0))
}

/// Contra-harmonic mean filter of order `q`:
/// `sum(window^(q+1)) / sum(window^q)`.
///
/// Positive `q` removes pepper noise, negative `q` removes salt noise.
/// Zero samples are replaced by [`CONTRAHARMONIC_EPSILON`] before
/// exponentiation; a zero or NaN denominator yields 0.
///
/// # Errors
///
/// Returns [`PipelineError::Allocation`] if the working buffers cannot
/// be allocated.
pub fn contraharmonic_mean_filter(
    image: &GrayImage,
    ksize: u32,
    q: f64,
) -> Result<GrayImage, PipelineError> {
    let k = odd_kernel_size(ksize) as usize;
    let out = window_reduce(image, k, |w| {
        let (mut num, mut den) = (0.0, 0.0);
        for &v in w {
            let v = if v == 0.0 { CONTRAHARMONIC_EPSILON } else { v };
            num += v.powf(q + 1.0);
            den += v.powf(q);
        }
        if den == 0.0 || den.is_nan() {
            0.0
        } else {
            num / den
        }
    })?;
    Ok(out.to_gray(1.0))
}

/// Geometric mean filter parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeometricMeanParams {
    /// Window side.
    #[serde(default = "default_ksize")]
    pub ksize: u32,
    /// Reduce color input to its luminance plane first. The stage then
    /// outputs a single-channel image.
    #[serde(default)]
    pub luminance: bool,
}

impl Default for GeometricMeanParams {
    fn default() -> Self {
        Self {
            ksize: DEFAULT_KERNEL_SIZE,
            luminance: false,
        }
    }
}

/// Contra-harmonic mean filter parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContraharmonicParams {
    /// Window side.
    #[serde(default = "default_ksize")]
    pub ksize: u32,
    /// Filter order `Q`.
    #[serde(rename = "Q", alias = "q", default = "ContraharmonicParams::default_q")]
    pub q: f64,
}

impl ContraharmonicParams {
    /// Default order: removes pepper noise.
    pub const DEFAULT_Q: f64 = 1.5;

    const fn default_q() -> f64 {
        Self::DEFAULT_Q
    }
}

impl Default for ContraharmonicParams {
    fn default() -> Self {
        Self {
            ksize: DEFAULT_KERNEL_SIZE,
            q: Self::DEFAULT_Q,
        }
    }
}

/// Gaussian filter parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GaussianParams {
    /// Kernel side, forced odd.
    #[serde(default = "default_ksize")]
    pub ksize: u32,
    /// Standard deviation; `<= 0` derives it from `ksize`.
    #[serde(default)]
    pub sigma: f64,
}

impl Default for GaussianParams {
    fn default() -> Self {
        Self {
            ksize: DEFAULT_KERNEL_SIZE,
            sigma: 0.0,
        }
    }
}

const fn default_ksize() -> u32 {
    DEFAULT_KERNEL_SIZE
}

/// Sigma used by [`gaussian_kernel`] when the requested sigma is not
/// positive: `0.3 * ((k - 1) * 0.5 - 1) + 0.8`.
#[must_use]
pub fn sigma_for_kernel_size(ksize: u32) -> f64 {
    0.3f64.mul_add((f64::from(ksize) - 1.0).mul_add(0.5, -1.0), 0.8)
}

/// Normalized 1D Gaussian kernel of odd length `ksize`.
#[must_use]
#[allow(clippy::cast_precision_loss, clippy::cast_possible_wrap)]
pub fn gaussian_kernel(ksize: u32, sigma: f64) -> Vec<f64> {
    let k = odd_kernel_size(ksize);
    let sigma = if sigma > 0.0 {
        sigma
    } else {
        sigma_for_kernel_size(k)
    };
    let radius = (k / 2) as i64;
    let weights: Vec<f64> = (-radius..=radius)
        .map(|i| {
            let d = i as f64;
            (-(d * d) / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let total: f64 = weights.iter().sum();
    weights.into_iter().map(|w| w / total).collect()
}

/// Gaussian blur with an explicit odd kernel size and sigma.
///
/// The reflect-padded image is blurred separably with
/// [`imageproc::filter::separable_filter_equal`] and the padding cropped
/// away. Non-positive `sigma` derives sigma from the kernel size via
/// [`sigma_for_kernel_size`].
///
/// # Errors
///
/// Returns [`PipelineError::Allocation`] if the padded image cannot be
/// allocated.
#[allow(clippy::cast_possible_truncation)]
pub fn gaussian_filter(
    image: &GrayImage,
    ksize: u32,
    sigma: f64,
) -> Result<GrayImage, PipelineError> {
    let k = odd_kernel_size(ksize);
    let radius = k / 2;
    let padded = pad_reflect_gray(image, radius)?;
    let (pw, ph) = padded.dimensions();
    let mut samples = try_buffer(pw as usize, ph as usize)?;
    samples.extend(padded.as_raw().iter().map(|&v| f32::from(v)));
    let padded = FloatImage::from_raw(pw, ph, samples).ok_or(PipelineError::Allocation {
        width: pw as usize,
        height: ph as usize,
    })?;

    let kernel: Vec<f32> = gaussian_kernel(k, sigma).into_iter().map(|w| w as f32).collect();
    let blurred = imageproc::filter::separable_filter_equal(&padded, kernel.as_slice());
    Ok(crop_rounded(&blurred, radius, image.width(), image.height()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    /// Deterministic pseudo-random test image (xorshift).
    fn noisy_image(w: u32, h: u32, seed: u32) -> GrayImage {
        let mut state = seed.max(1);
        GrayImage::from_fn(w, h, |_, _| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            Luma([(state & 0xFF) as u8])
        })
    }

    /// 3x3 image with values 10, 20, ..., 90 in row-major order.
    fn tens() -> GrayImage {
        GrayImage::from_fn(3, 3, |x, y| Luma([u8::try_from((y * 3 + x + 1) * 10).unwrap()]))
    }

    #[test]
    fn median_of_constant_image_is_identity() {
        let img = GrayImage::from_pixel(9, 7, Luma([123]));
        for k in [1, 3, 5, 7] {
            assert_eq!(median_filter(&img, k).unwrap(), img, "fast path, k={k}");
            assert_eq!(median_filter_reference(&img, k).unwrap(), img, "reference, k={k}");
        }
    }

    #[test]
    fn median_fast_path_matches_reference() {
        let img = noisy_image(17, 11, 42);
        for k in [3, 5, 7] {
            assert_eq!(
                median_filter(&img, k).unwrap(),
                median_filter_reference(&img, k).unwrap(),
                "mismatch for k={k}",
            );
        }
    }

    #[test]
    fn median_removes_single_impulse() {
        let mut img = GrayImage::from_pixel(5, 5, Luma([100]));
        img.put_pixel(2, 2, Luma([255]));
        let out = median_filter(&img, 3).unwrap();
        assert_eq!(out.get_pixel(2, 2).0[0], 100);
    }

    #[test]
    fn median_even_kernel_behaves_as_next_odd() {
        let img = noisy_image(8, 8, 7);
        assert_eq!(median_filter(&img, 4).unwrap(), median_filter(&img, 5).unwrap());
    }

    #[test]
    fn mean_interior_pixel_is_window_average() {
        let out = mean_filter(&tens(), 3).unwrap();
        // (10 + 20 + ... + 90) / 9 = 50
        assert_eq!(out.get_pixel(1, 1).0[0], 50);
    }

    #[test]
    fn mean_corner_uses_reflected_neighborhood() {
        // Reflect-101 window around (0, 0):
        //   50 40 50
        //   20 10 20
        //   50 40 50   -> 330 / 9 = 36.67
        let out = mean_filter(&tens(), 3).unwrap();
        assert_eq!(out.get_pixel(0, 0).0[0], 37);
    }

    #[test]
    fn mean_kernel_below_one_defaults_to_three() {
        let img = tens();
        assert_eq!(mean_filter(&img, 0).unwrap(), mean_filter(&img, 3).unwrap());
    }

    #[test]
    fn output_dimensions_preserved() {
        let img = noisy_image(13, 6, 3);
        for out in [
            median_filter(&img, 5).unwrap(),
            median_filter_reference(&img, 5).unwrap(),
            mean_filter(&img, 5).unwrap(),
            geometric_mean_filter(&img, 3).unwrap(),
            log_geometric_mean_filter(&img, 3).unwrap(),
            contraharmonic_mean_filter(&img, 3, 1.5).unwrap(),
            gaussian_filter(&img, 5, 1.0).unwrap(),
        ] {
            assert_eq!(out.dimensions(), (13, 6));
        }
    }

    #[test]
    fn geometric_mean_of_constant_is_constant() {
        let img = GrayImage::from_pixel(6, 6, Luma([80]));
        let out = geometric_mean_filter(&img, 3).unwrap();
        for p in out.pixels() {
            assert_eq!(p.0[0], 80);
        }
    }

    #[test]
    fn geometric_mean_with_zero_pixel_collapses_window() {
        let mut img = GrayImage::from_pixel(5, 5, Luma([200]));
        img.put_pixel(2, 2, Luma([0]));
        let out = geometric_mean_filter(&img, 3).unwrap();
        // The window product is 0, leaving only eps^(1/9) (~0.28).
        assert_eq!(out.get_pixel(2, 2).0[0], 0);
    }

    #[test]
    fn log_geometric_mean_of_constant_is_constant() {
        let img = GrayImage::from_pixel(6, 6, Luma([80]));
        let out = log_geometric_mean_filter(&img, 3).unwrap();
        for p in out.pixels() {
            assert_eq!(p.0[0], 80);
        }
    }

    #[test]
    fn contraharmonic_positive_q_removes_pepper() {
        let mut img = GrayImage::from_pixel(5, 5, Luma([120]));
        img.put_pixel(2, 2, Luma([0]));
        let out = contraharmonic_mean_filter(&img, 3, 1.5).unwrap();
        assert!(out.get_pixel(2, 2).0[0] >= 115);
    }

    #[test]
    fn contraharmonic_negative_q_removes_salt() {
        let mut img = GrayImage::from_pixel(5, 5, Luma([120]));
        img.put_pixel(2, 2, Luma([255]));
        let out = contraharmonic_mean_filter(&img, 3, -1.5).unwrap();
        assert!(out.get_pixel(2, 2).0[0] <= 130);
    }

    #[test]
    fn contraharmonic_all_zero_window_stays_finite() {
        let img = GrayImage::new(4, 4);
        let out = contraharmonic_mean_filter(&img, 3, -2.0).unwrap();
        for p in out.pixels() {
            assert_eq!(p.0[0], 0);
        }
    }

    #[test]
    fn gaussian_kernel_is_normalized_and_symmetric() {
        let kernel = gaussian_kernel(5, 1.2);
        assert_eq!(kernel.len(), 5);
        assert!((kernel.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert!((kernel[0] - kernel[4]).abs() < 1e-15);
        assert!(kernel[2] > kernel[1]);
    }

    #[test]
    fn gaussian_sigma_derived_from_kernel_size() {
        // k = 3 -> 0.3 * (2 * 0.5 - 1) + 0.8 = 0.8
        assert!((sigma_for_kernel_size(3) - 0.8).abs() < 1e-12);
        // k = 5 -> 0.3 * (4 * 0.5 - 1) + 0.8 = 1.1
        assert!((sigma_for_kernel_size(5) - 1.1).abs() < 1e-12);
        assert_eq!(gaussian_kernel(3, 0.0), gaussian_kernel(3, 0.8));
    }

    #[test]
    fn gaussian_smooths_sharp_edge() {
        let img = GrayImage::from_fn(10, 10, |x, _| Luma([if x < 5 { 0 } else { 255 }]));
        let out = gaussian_filter(&img, 5, 1.5).unwrap();
        assert!(out.get_pixel(4, 5).0[0] > 0);
        assert!(out.get_pixel(5, 5).0[0] < 255);
    }

    #[test]
    fn gaussian_uniform_image_unchanged() {
        let img = GrayImage::from_pixel(8, 8, Luma([128]));
        assert_eq!(gaussian_filter(&img, 7, 2.0).unwrap(), img);
    }

    #[test]
    fn mean_matches_direct_window_average() {
        let img = noisy_image(12, 9, 11);
        for k in [3, 5] {
            let n = f64::from(k * k);
            let direct = window_reduce(&img, k as usize, |w| w.iter().sum::<f64>() / n)
                .unwrap()
                .to_gray(1.0);
            assert_eq!(mean_filter(&img, k).unwrap(), direct, "k={k}");
        }
    }

    #[test]
    fn gaussian_matches_direct_window_correlation() {
        let img = noisy_image(11, 10, 5);
        let kernel = gaussian_kernel(5, 1.1);
        let direct = window_reduce(&img, 5, |w| {
            w.iter()
                .enumerate()
                .map(|(i, v)| kernel[i / 5] * kernel[i % 5] * v)
                .sum()
        })
        .unwrap()
        .to_gray(1.0);
        let out = gaussian_filter(&img, 5, 1.1).unwrap();
        for (a, b) in out.pixels().zip(direct.pixels()) {
            assert!(a.0[0].abs_diff(b.0[0]) <= 1, "{} vs {}", a.0[0], b.0[0]);
        }
    }

    #[test]
    fn oversized_kernel_reports_allocation_failure() {
        let img = GrayImage::from_pixel(4, 4, Luma([9]));
        for result in [
            median_filter(&img, u32::MAX),
            median_filter_reference(&img, u32::MAX),
            mean_filter(&img, u32::MAX),
            gaussian_filter(&img, u32::MAX, 0.0),
        ] {
            assert!(matches!(result, Err(PipelineError::Allocation { .. })));
        }
    }
}
