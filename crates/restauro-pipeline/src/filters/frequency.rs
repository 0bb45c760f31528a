//! Frequency-domain filters: homomorphic and notch.
//!
//! Both transform a whole plane with a 2D FFT (rows, then columns, via
//! [`rustfft`]), multiply the spectrum by a mask, and transform back.
//!
//! Masks are defined on the *centered* spectrum, where the
//! zero-frequency term sits at `(height / 2, width / 2)`. Rather than
//! physically shifting the spectrum, [`Spectrum::centered_offset`] maps
//! an unshifted index to its signed offset from that center, which is
//! equivalent to an `fftshift` / `ifftshift` pair around the mask.

use image::GrayImage;
use rustfft::FftPlanner;
use rustfft::num_complex::Complex;
use serde::{Deserialize, Serialize};

use crate::buffer::Plane;

/// 2D complex spectrum of a plane, stored row-major and unshifted.
pub struct Spectrum {
    width: usize,
    height: usize,
    data: Vec<Complex<f64>>,
}

impl Spectrum {
    /// Forward 2D FFT of a real plane.
    #[must_use]
    pub fn forward(plane: &Plane) -> Self {
        let mut data: Vec<Complex<f64>> =
            plane.data().iter().map(|&v| Complex::new(v, 0.0)).collect();
        let (width, height) = (plane.width(), plane.height());
        transform_2d(&mut data, width, height, false);
        Self {
            width,
            height,
            data,
        }
    }

    /// Inverse 2D FFT, normalized by `1 / (width * height)`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn inverse(mut self) -> Vec<Complex<f64>> {
        transform_2d(&mut self.data, self.width, self.height, true);
        let scale = 1.0 / (self.width * self.height) as f64;
        for v in &mut self.data {
            *v *= scale;
        }
        self.data
    }

    /// Signed offset of the unshifted bin `(x, y)` from the centered
    /// zero-frequency position, as `(dx, dy)`.
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub const fn centered_offset(&self, x: usize, y: usize) -> (isize, isize) {
        let (cx, cy) = (self.width / 2, self.height / 2);
        let sx = (x + cx) % self.width;
        let sy = (y + cy) % self.height;
        (sx as isize - cx as isize, sy as isize - cy as isize)
    }

    /// Multiply every bin by `mask(dx, dy)`, where `(dx, dy)` is the
    /// bin's offset from the spectrum center.
    pub fn apply_mask(&mut self, mask: impl Fn(isize, isize) -> f64) {
        for y in 0..self.height {
            for x in 0..self.width {
                let (dx, dy) = self.centered_offset(x, y);
                self.data[y * self.width + x] *= mask(dx, dy);
            }
        }
    }
}

/// In-place 2D FFT: every row, then every column.
fn transform_2d(data: &mut [Complex<f64>], width: usize, height: usize, inverse: bool) {
    if width == 0 || height == 0 {
        return;
    }
    let mut planner = FftPlanner::<f64>::new();
    let (row_fft, col_fft) = if inverse {
        (planner.plan_fft_inverse(width), planner.plan_fft_inverse(height))
    } else {
        (planner.plan_fft_forward(width), planner.plan_fft_forward(height))
    };

    for row in data.chunks_exact_mut(width) {
        row_fft.process(row);
    }

    let mut column = vec![Complex::new(0.0, 0.0); height];
    for x in 0..width {
        for (y, slot) in column.iter_mut().enumerate() {
            *slot = data[y * width + x];
        }
        col_fft.process(&mut column);
        for (y, value) in column.iter().enumerate() {
            data[y * width + x] = *value;
        }
    }
}

/// Parameters of the homomorphic filter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HomomorphicParams {
    /// Gain applied at zero frequency (illumination), usually `< 1`.
    pub low: f64,
    /// Gain approached at high frequencies (reflectance), usually `> 1`.
    pub high: f64,
    /// Radius of the transition between `low` and `high`, in frequency
    /// bins. Must be positive.
    pub cutoff: f64,
}

impl HomomorphicParams {
    /// Default low gain.
    pub const DEFAULT_LOW: f64 = 0.5;
    /// Default high gain.
    pub const DEFAULT_HIGH: f64 = 1.5;
    /// Default cutoff radius.
    pub const DEFAULT_CUTOFF: f64 = 30.0;

    /// Check the parameters can be evaluated.
    ///
    /// # Errors
    ///
    /// Returns a description of the problem if any value is non-finite
    /// or `cutoff` is not positive.
    pub fn validate(&self) -> Result<(), String> {
        if !(self.low.is_finite() && self.high.is_finite() && self.cutoff.is_finite()) {
            return Err("homomorphic parameters must be finite".to_string());
        }
        if self.cutoff <= 0.0 {
            return Err(format!("homomorphic cutoff must be positive, got {}", self.cutoff));
        }
        Ok(())
    }

    /// The high-emphasis mask value at squared distance `d2` from the
    /// spectrum center: `high - (high - low) * exp(-d2 / (2 * cutoff^2))`.
    #[must_use]
    pub fn mask(&self, d2: f64) -> f64 {
        (self.high - self.low).mul_add(
            -(-d2 / (2.0 * self.cutoff * self.cutoff)).exp(),
            self.high,
        )
    }
}

impl Default for HomomorphicParams {
    fn default() -> Self {
        Self {
            low: Self::DEFAULT_LOW,
            high: Self::DEFAULT_HIGH,
            cutoff: Self::DEFAULT_CUTOFF,
        }
    }
}

/// Homomorphic filter: compresses illumination while boosting
/// reflectance detail.
///
/// `log1p(v / 255)` -> FFT -> high-emphasis mask -> inverse FFT ->
/// `expm1` -> clip to `[0, 1]` -> rescale to 8 bits.
#[must_use = "returns the filtered image"]
#[allow(clippy::cast_precision_loss)]
pub fn homomorphic_filter(image: &GrayImage, params: &HomomorphicParams) -> GrayImage {
    let log_plane = Plane::from_gray(image, 1.0 / 255.0).map(f64::ln_1p);
    let mut spectrum = Spectrum::forward(&log_plane);
    spectrum.apply_mask(|dx, dy| {
        let (dx, dy) = (dx as f64, dy as f64);
        params.mask(dx.mul_add(dx, dy * dy))
    });
    let restored = spectrum.inverse();

    let mut out = Plane::from_fn(log_plane.width(), log_plane.height(), |x, y| {
        restored[y * log_plane.width() + x].re.exp_m1()
    });
    out.clip(0.0, 1.0);
    out.to_gray(255.0)
}

/// Parameters of the notch filter.
///
/// Each `(u_k[i], v_k[i])` pair is a frequency offset from the spectrum
/// center: `u` along rows (vertical frequency), `v` along columns
/// (horizontal frequency).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotchParams {
    /// Notch radius in frequency bins.
    pub d0: f64,
    /// Vertical frequency offsets of the notches.
    pub u_k: Vec<i32>,
    /// Horizontal frequency offsets of the notches.
    pub v_k: Vec<i32>,
}

impl NotchParams {
    /// Default notch radius.
    pub const DEFAULT_D0: f64 = 10.0;

    /// Check the coordinate lists pair up and the radius is usable.
    ///
    /// # Errors
    ///
    /// Returns a description of the problem if `u_k` and `v_k` differ
    /// in length or `d0` is negative or non-finite.
    pub fn validate(&self) -> Result<(), String> {
        if self.u_k.len() != self.v_k.len() {
            return Err(format!(
                "notch coordinate lists differ in length: u_k has {}, v_k has {}",
                self.u_k.len(),
                self.v_k.len(),
            ));
        }
        if !self.d0.is_finite() || self.d0 < 0.0 {
            return Err(format!("notch radius d0 must be finite and >= 0, got {}", self.d0));
        }
        Ok(())
    }

    /// Whether the centered bin `(dx, dy)` falls inside any notch or its
    /// conjugate-symmetric twin.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn rejects(&self, dx: isize, dy: isize) -> bool {
        let (dx, dy) = (dx as f64, dy as f64);
        let r2 = self.d0 * self.d0;
        self.u_k.iter().zip(&self.v_k).any(|(&u, &v)| {
            let (u, v) = (f64::from(u), f64::from(v));
            let d_pos = (dy - u).mul_add(dy - u, (dx - v) * (dx - v));
            let d_neg = (dy + u).mul_add(dy + u, (dx + v) * (dx + v));
            d_pos <= r2 || d_neg <= r2
        })
    }
}

impl Default for NotchParams {
    fn default() -> Self {
        Self {
            d0: Self::DEFAULT_D0,
            u_k: Vec::new(),
            v_k: Vec::new(),
        }
    }
}

/// Notch reject filter: zeroes the spectrum within `d0` of every
/// `(u_k[i], v_k[i])` offset and its mirror `(-u_k[i], -v_k[i])`, then
/// returns the magnitude of the inverse transform. Removes periodic
/// interference patterns.
///
/// Parameters must already have passed [`NotchParams::validate`];
/// extra entries in the longer list would otherwise be ignored.
#[must_use = "returns the filtered image"]
pub fn notch_filter(image: &GrayImage, params: &NotchParams) -> GrayImage {
    let plane = Plane::from_gray(image, 1.0);
    let mut spectrum = Spectrum::forward(&plane);
    spectrum.apply_mask(|dx, dy| if params.rejects(dx, dy) { 0.0 } else { 1.0 });
    let restored = spectrum.inverse();
    let magnitude = Plane::from_fn(plane.width(), plane.height(), |x, y| {
        restored[y * plane.width() + x].norm()
    });
    magnitude.to_gray(1.0)
}

#[cfg(test)]
mod tests {
    use image::Luma;

    use super::*;

    fn textured(w: u32, h: u32) -> GrayImage {
        GrayImage::from_fn(w, h, |x, y| {
            #[allow(clippy::cast_possible_truncation)]
            let v = ((x * 37 + y * 91 + x * y * 13) % 200 + 20) as u8;
            Luma([v])
        })
    }

    #[test]
    fn fft_round_trip_recovers_plane() {
        let plane = Plane::from_gray(&textured(7, 5), 1.0);
        let restored = Spectrum::forward(&plane).inverse();
        for (a, b) in plane.data().iter().zip(&restored) {
            assert!((a - b.re).abs() < 1e-9);
            assert!(b.im.abs() < 1e-9);
        }
    }

    #[test]
    fn centered_offset_puts_dc_at_origin() {
        let spectrum = Spectrum::forward(&Plane::new(6, 5));
        assert_eq!(spectrum.centered_offset(0, 0), (0, 0));
        // Bin 1 is +1, the last bin is -1 (wraps to negative frequency).
        assert_eq!(spectrum.centered_offset(1, 1), (1, 1));
        assert_eq!(spectrum.centered_offset(5, 4), (-1, -1));
    }

    #[test]
    fn empty_notch_lists_are_identity() {
        let img = textured(16, 12);
        let params = NotchParams {
            d0: 5.0,
            u_k: vec![],
            v_k: vec![],
        };
        assert_eq!(notch_filter(&img, &params), img);
    }

    #[test]
    fn notch_removes_periodic_stripes() {
        // Vertical stripes with period 4 -> energy at horizontal frequency
        // +-16/4 = +-4 bins.
        let (w, h) = (16u32, 16u32);
        let base = 120.0;
        let img = GrayImage::from_fn(w, h, |x, _| {
            let phase = 2.0 * std::f64::consts::PI * f64::from(x) / 4.0;
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let v = 40.0f64.mul_add(phase.cos(), base).round() as u8;
            Luma([v])
        });
        let params = NotchParams {
            d0: 1.0,
            u_k: vec![0],
            v_k: vec![4],
        };
        let out = notch_filter(&img, &params);
        for p in out.pixels() {
            assert!(
                (i16::from(p.0[0]) - 120).abs() <= 1,
                "stripe survived: {}",
                p.0[0],
            );
        }
    }

    #[test]
    fn notch_validate_rejects_mismatched_lists() {
        let params = NotchParams {
            d0: 3.0,
            u_k: vec![1, 2],
            v_k: vec![1],
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn notch_validate_rejects_negative_radius() {
        let params = NotchParams {
            d0: -1.0,
            u_k: vec![],
            v_k: vec![],
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn homomorphic_unit_gain_is_identity() {
        let img = textured(12, 10);
        let params = HomomorphicParams {
            low: 1.0,
            high: 1.0,
            cutoff: 10.0,
        };
        assert_eq!(homomorphic_filter(&img, &params), img);
    }

    #[test]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn homomorphic_flat_mask_is_uniform_log_gain() {
        // With low == high == g the mask is the constant g, so the log
        // image is scaled by g: out = ((1 + v/255)^g - 1) * 255.
        let img = textured(10, 8);
        let g = 0.5;
        let params = HomomorphicParams {
            low: g,
            high: g,
            cutoff: 15.0,
        };
        let out = homomorphic_filter(&img, &params);
        for (src, dst) in img.pixels().zip(out.pixels()) {
            let v = f64::from(src.0[0]) / 255.0;
            let expected = ((1.0 + v).powf(g) - 1.0).clamp(0.0, 1.0) * 255.0;
            let diff = (f64::from(dst.0[0]) - expected.round()).abs();
            assert!(diff <= 1.0, "expected ~{expected}, got {}", dst.0[0]);
        }
    }

    #[test]
    fn homomorphic_suppresses_uniform_illumination() {
        // A flat image carries all energy at DC, which gets the low gain.
        let img = GrayImage::from_pixel(8, 8, Luma([200]));
        let out = homomorphic_filter(&img, &HomomorphicParams::default());
        assert!(out.get_pixel(0, 0).0[0] < 200);
    }

    #[test]
    fn homomorphic_validate_rejects_zero_cutoff() {
        let params = HomomorphicParams {
            cutoff: 0.0,
            ..HomomorphicParams::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn homomorphic_mask_endpoints() {
        let params = HomomorphicParams::default();
        assert!((params.mask(0.0) - params.low).abs() < 1e-12);
        assert!((params.mask(1e12) - params.high).abs() < 1e-12);
    }
}
