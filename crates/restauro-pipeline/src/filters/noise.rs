//! Synthetic degradations: additive noise and periodic interference.
//!
//! Every generator draws from a caller-supplied [`Rng`], so seeded runs
//! are reproducible. [`channel_rng`] derives one independent stream per
//! color plane from an optional seed.

use image::{GrayImage, Luma};
use rand::distr::Uniform;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

/// Random stream for color plane `channel`: seeded streams are offset
/// by the channel index, unseeded ones come from the OS.
#[must_use]
pub fn channel_rng(seed: Option<u64>, channel: usize) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(channel as u64)),
        None => StdRng::from_os_rng(),
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn saturate(v: f64) -> u8 {
    if v.is_nan() {
        0
    } else {
        v.clamp(0.0, 255.0).round() as u8
    }
}

/// Additive Gaussian noise parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GaussianNoiseParams {
    /// Mean of the added noise, in 8-bit intensity units.
    #[serde(default)]
    pub mean: f64,
    /// Standard deviation, in 8-bit intensity units.
    #[serde(default = "GaussianNoiseParams::default_std")]
    pub std: f64,
    /// Seed for a reproducible draw.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl GaussianNoiseParams {
    /// Default standard deviation.
    pub const DEFAULT_STD: f64 = 25.0;

    const fn default_std() -> f64 {
        Self::DEFAULT_STD
    }

    /// The normal distribution these parameters describe.
    ///
    /// # Errors
    ///
    /// Returns a description of the problem if `std` is negative or
    /// either value is non-finite.
    pub fn distribution(&self) -> Result<Normal<f64>, String> {
        normal(self.mean, self.std)
    }
}

impl Default for GaussianNoiseParams {
    fn default() -> Self {
        Self {
            mean: 0.0,
            std: Self::DEFAULT_STD,
            seed: None,
        }
    }
}

fn normal(mean: f64, std: f64) -> Result<Normal<f64>, String> {
    if !mean.is_finite() {
        return Err(format!("noise mean must be finite, got {mean}"));
    }
    Normal::new(mean, std).map_err(|e| format!("invalid noise deviation {std}: {e}"))
}

/// Add a sample of `dist` to every pixel, clipping to `[0, 255]`.
#[must_use = "returns the noisy image"]
pub fn gaussian_noise(image: &GrayImage, dist: &Normal<f64>, rng: &mut impl Rng) -> GrayImage {
    let mut out = image.clone();
    for p in out.pixels_mut() {
        p.0[0] = saturate(f64::from(p.0[0]) + dist.sample(rng));
    }
    out
}

/// Salt-and-pepper parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SaltAndPepperParams {
    /// Fraction of pixels turned white, and separately black.
    #[serde(default = "SaltAndPepperParams::default_prob")]
    pub prob: f64,
    /// Seed for a reproducible draw.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl SaltAndPepperParams {
    /// Default corruption fraction.
    pub const DEFAULT_PROB: f64 = 0.02;

    const fn default_prob() -> f64 {
        Self::DEFAULT_PROB
    }

    /// # Errors
    ///
    /// Returns a description of the problem if `prob` lies outside `[0, 1]`.
    pub fn validate(&self) -> Result<(), String> {
        if (0.0..=1.0).contains(&self.prob) {
            Ok(())
        } else {
            Err(format!("salt-and-pepper probability must be in [0, 1], got {}", self.prob))
        }
    }
}

impl Default for SaltAndPepperParams {
    fn default() -> Self {
        Self {
            prob: Self::DEFAULT_PROB,
            seed: None,
        }
    }
}

/// Salt-and-pepper noise on one plane.
///
/// Color images get it per plane through the channel adapter, each
/// plane with its own random stream. `ceil(prob * pixels)` coordinates are drawn uniformly and set to the
/// maximum, then as many again are drawn and set to the minimum.
/// Coordinates are not deduplicated: a pixel may be drawn twice, or
/// salted and then peppered, so the realized fraction can fall short of
/// `prob`.
#[must_use = "returns the noisy image"]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn salt_and_pepper(image: &GrayImage, prob: f64, rng: &mut impl Rng) -> GrayImage {
    let mut out = image.clone();
    let (w, h) = out.dimensions();
    if w == 0 || h == 0 {
        return out;
    }
    let count = (prob * f64::from(w) * f64::from(h)).ceil() as u64;
    for value in [u8::MAX, u8::MIN] {
        for _ in 0..count {
            let (x, y) = (rng.random_range(0..w), rng.random_range(0..h));
            out.put_pixel(x, y, Luma([value]));
        }
    }
    out
}

/// Uniform noise parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UniformNoiseParams {
    /// Lower bound of the added value.
    #[serde(default = "UniformNoiseParams::default_low")]
    pub low: f64,
    /// Upper bound of the added value.
    #[serde(default = "UniformNoiseParams::default_high")]
    pub high: f64,
    /// Seed for a reproducible draw.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl UniformNoiseParams {
    /// Default lower bound.
    pub const DEFAULT_LOW: f64 = -20.0;
    /// Default upper bound.
    pub const DEFAULT_HIGH: f64 = 20.0;

    const fn default_low() -> f64 {
        Self::DEFAULT_LOW
    }

    const fn default_high() -> f64 {
        Self::DEFAULT_HIGH
    }

    /// The uniform distribution over `[low, high]`.
    ///
    /// # Errors
    ///
    /// Returns a description of the problem if `low > high` or either
    /// bound is non-finite.
    pub fn distribution(&self) -> Result<Uniform<f64>, String> {
        Uniform::new_inclusive(self.low, self.high)
            .map_err(|e| format!("invalid uniform range [{}, {}]: {e}", self.low, self.high))
    }
}

impl Default for UniformNoiseParams {
    fn default() -> Self {
        Self {
            low: Self::DEFAULT_LOW,
            high: Self::DEFAULT_HIGH,
            seed: None,
        }
    }
}

/// Add a sample of `dist` to every pixel, clipping to `[0, 255]`.
#[must_use = "returns the noisy image"]
pub fn uniform_noise(image: &GrayImage, dist: &Uniform<f64>, rng: &mut impl Rng) -> GrayImage {
    let mut out = image.clone();
    for p in out.pixels_mut() {
        p.0[0] = saturate(f64::from(p.0[0]) + dist.sample(rng));
    }
    out
}

/// Film grain parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilmGrainParams {
    /// Standard deviation of the grain.
    #[serde(default = "FilmGrainParams::default_intensity")]
    pub intensity: f64,
    /// Seed for a reproducible draw.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl FilmGrainParams {
    /// Default grain deviation.
    pub const DEFAULT_INTENSITY: f64 = 15.0;

    const fn default_intensity() -> f64 {
        Self::DEFAULT_INTENSITY
    }

    /// Zero-mean normal distribution with deviation `intensity`.
    ///
    /// # Errors
    ///
    /// Returns a description of the problem if `intensity` is negative or
    /// non-finite.
    pub fn distribution(&self) -> Result<Normal<f64>, String> {
        normal(0.0, self.intensity)
    }
}

impl Default for FilmGrainParams {
    fn default() -> Self {
        Self {
            intensity: Self::DEFAULT_INTENSITY,
            seed: None,
        }
    }
}

/// Film grain: integer Gaussian grain added in 16-bit signed
/// arithmetic, saturated back to 8 bits once at the end.
#[must_use = "returns the noisy image"]
#[allow(clippy::cast_possible_truncation)]
pub fn film_grain(image: &GrayImage, dist: &Normal<f64>, rng: &mut impl Rng) -> GrayImage {
    let mut out = image.clone();
    for p in out.pixels_mut() {
        // `as` saturates at the i16 bounds.
        let grain = dist.sample(rng).round() as i16;
        let v = i16::from(p.0[0]).saturating_add(grain);
        p.0[0] = u8::try_from(v.clamp(0, 255)).unwrap_or(u8::MAX);
    }
    out
}

/// Periodic noise parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PeriodicNoiseParams {
    /// Peak deviation in 8-bit intensity units.
    #[serde(default = "PeriodicNoiseParams::default_amplitude")]
    pub amplitude: f64,
    /// Number of full periods across the image width.
    #[serde(default = "PeriodicNoiseParams::default_frequency")]
    pub frequency: f64,
}

impl PeriodicNoiseParams {
    /// Default amplitude.
    pub const DEFAULT_AMPLITUDE: f64 = 20.0;
    /// Default number of periods.
    pub const DEFAULT_FREQUENCY: f64 = 10.0;

    const fn default_amplitude() -> f64 {
        Self::DEFAULT_AMPLITUDE
    }

    const fn default_frequency() -> f64 {
        Self::DEFAULT_FREQUENCY
    }

    /// # Errors
    ///
    /// Returns a description of the problem if either value is non-finite.
    pub fn validate(&self) -> Result<(), String> {
        if self.amplitude.is_finite() && self.frequency.is_finite() {
            Ok(())
        } else {
            Err("periodic noise parameters must be finite".to_string())
        }
    }
}

impl Default for PeriodicNoiseParams {
    fn default() -> Self {
        Self {
            amplitude: Self::DEFAULT_AMPLITUDE,
            frequency: Self::DEFAULT_FREQUENCY,
        }
    }
}

/// Add `amplitude * sin(2 pi frequency x / width)` to every pixel of
/// column `x`.
#[must_use = "returns the noisy image"]
pub fn periodic_noise(image: &GrayImage, params: &PeriodicNoiseParams) -> GrayImage {
    let width = f64::from(image.width().max(1));
    let wave: Vec<f64> = (0..image.width())
        .map(|x| {
            let phase = std::f64::consts::TAU * params.frequency * f64::from(x) / width;
            params.amplitude * phase.sin()
        })
        .collect();
    let mut out = image.clone();
    for (x, _, p) in out.enumerate_pixels_mut() {
        *p = Luma([saturate(f64::from(p.0[0]) + wave[x as usize])]);
    }
    out
}
