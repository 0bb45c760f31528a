//! Image buffers: the 8-bit [`Image`] exchanged between stages and the
//! floating-point [`Plane`] most algorithms compute on.
//!
//! Every stage consumes an `&Image` and returns a new `Image`; nothing
//! is mutated in place from the pipeline's point of view.
//!
//! Border handling throughout the crate is reflect-101
//! (`d c b | a b c d | c b a`), the mirror that excludes the edge
//! sample. [`reflect_index`] implements the index folding, so padding
//! wider than the image still stays inside the buffer.

use image::{DynamicImage, GrayImage, RgbImage};

use crate::types::{Dimensions, PipelineError};

/// An 8-bit raster with one (gray) or three (RGB) channels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Image {
    /// Single-channel intensity image.
    Gray(GrayImage),
    /// Three-channel color image.
    Rgb(RgbImage),
}

impl Image {
    /// Wrap a grayscale image.
    #[must_use]
    pub const fn from_gray(image: GrayImage) -> Self {
        Self::Gray(image)
    }

    /// Wrap an RGB image.
    #[must_use]
    pub const fn from_rgb(image: RgbImage) -> Self {
        Self::Rgb(image)
    }

    /// Convert a decoded image of any color type.
    ///
    /// Luma and luma-alpha inputs become [`Image::Gray`]; everything
    /// else becomes [`Image::Rgb`]. Alpha is dropped and 16-bit or
    /// float samples are reduced to 8 bits.
    #[must_use]
    pub fn from_dynamic(image: &DynamicImage) -> Self {
        if image.color().has_color() {
            Self::Rgb(image.to_rgb8())
        } else {
            Self::Gray(image.to_luma8())
        }
    }

    /// Build an image from raw interleaved 8-bit samples.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidImage`] if `channels` is not 1 or
    /// 3, or if `data` does not hold exactly `width * height * channels`
    /// samples.
    pub fn from_raw(
        width: u32,
        height: u32,
        channels: u8,
        data: Vec<u8>,
    ) -> Result<Self, PipelineError> {
        let len = data.len();
        let mismatch = || {
            PipelineError::InvalidImage(format!(
                "{len} samples do not form a {width}x{height} image with {channels} channel(s)"
            ))
        };
        match channels {
            1 => GrayImage::from_raw(width, height, data)
                .map(Self::Gray)
                .ok_or_else(mismatch),
            3 => RgbImage::from_raw(width, height, data)
                .map(Self::Rgb)
                .ok_or_else(mismatch),
            other => Err(PipelineError::InvalidImage(format!(
                "unsupported channel count {other} (expected 1 or 3)"
            ))),
        }
    }

    /// Convert back into the `image` crate's dynamic representation,
    /// e.g. for encoding.
    #[must_use]
    pub fn into_dynamic(self) -> DynamicImage {
        match self {
            Self::Gray(g) => DynamicImage::ImageLuma8(g),
            Self::Rgb(c) => DynamicImage::ImageRgb8(c),
        }
    }

    /// Width in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        match self {
            Self::Gray(g) => g.width(),
            Self::Rgb(c) => c.width(),
        }
    }

    /// Height in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        match self {
            Self::Gray(g) => g.height(),
            Self::Rgb(c) => c.height(),
        }
    }

    /// Width and height.
    #[must_use]
    pub fn dimensions(&self) -> Dimensions {
        Dimensions {
            width: self.width(),
            height: self.height(),
        }
    }

    /// Number of channels (1 or 3).
    #[must_use]
    pub const fn channels(&self) -> usize {
        match self {
            Self::Gray(_) => 1,
            Self::Rgb(_) => 3,
        }
    }

    /// Raw interleaved samples.
    #[must_use]
    pub fn as_raw(&self) -> &[u8] {
        match self {
            Self::Gray(g) => g.as_raw(),
            Self::Rgb(c) => c.as_raw(),
        }
    }

    /// Luminance reduction of the image.
    ///
    /// Gray images are returned as-is. This is the explicit
    /// channel-reduction step used by filters that are defined on a
    /// single luminance plane.
    #[must_use]
    pub fn to_luma(&self) -> GrayImage {
        match self {
            Self::Gray(g) => g.clone(),
            Self::Rgb(c) => image::imageops::grayscale(c),
        }
    }
}

impl From<GrayImage> for Image {
    fn from(image: GrayImage) -> Self {
        Self::Gray(image)
    }
}

impl From<RgbImage> for Image {
    fn from(image: RgbImage) -> Self {
        Self::Rgb(image)
    }
}

/// Fold an out-of-range index back into `0..len` by reflect-101
/// mirroring. Works for arbitrarily large offsets.
#[must_use]
#[allow(
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss,
    clippy::cast_possible_truncation
)]
pub fn reflect_index(index: isize, len: usize) -> usize {
    if len <= 1 {
        return 0;
    }
    let period = 2 * (len as isize - 1);
    let folded = index.rem_euclid(period);
    let last = len as isize - 1;
    (if folded > last { period - folded } else { folded }) as usize
}

/// Side lengths of a `width x height` buffer grown by `pad` on every
/// side, checked so the sample count fits in memory arithmetic.
///
/// # Errors
///
/// Returns [`PipelineError::Allocation`] if a side or the sample count
/// overflows.
pub fn padded_dimensions(
    width: usize,
    height: usize,
    pad: usize,
) -> Result<(usize, usize), PipelineError> {
    let grow = |side: usize| pad.checked_mul(2).and_then(|p| side.checked_add(p));
    match (grow(width), grow(height)) {
        (Some(w), Some(h)) if w.checked_mul(h).is_some() => Ok((w, h)),
        _ => Err(PipelineError::Allocation {
            width: width.saturating_add(pad.saturating_mul(2)),
            height: height.saturating_add(pad.saturating_mul(2)),
        }),
    }
}

/// Empty vector with room for `width * height` samples, reporting
/// allocation failure instead of aborting.
///
/// # Errors
///
/// Returns [`PipelineError::Allocation`] if the sample count overflows
/// or the memory cannot be reserved.
pub fn try_buffer<T>(width: usize, height: usize) -> Result<Vec<T>, PipelineError> {
    let err = || PipelineError::Allocation { width, height };
    let len = width.checked_mul(height).ok_or_else(err)?;
    let mut data = Vec::new();
    data.try_reserve_exact(len).map_err(|_| err())?;
    Ok(data)
}

/// Reflect-101 pad a grayscale image by `pad` pixels on every side.
///
/// # Errors
///
/// Returns [`PipelineError::Allocation`] if the padded image is too
/// large to address or allocate.
#[allow(clippy::cast_possible_wrap)]
pub fn pad_reflect_gray(image: &GrayImage, pad: u32) -> Result<GrayImage, PipelineError> {
    let (w, h) = (image.width() as usize, image.height() as usize);
    let pad = pad as usize;
    let (pw, ph) = padded_dimensions(w, h, pad)?;
    let err = || PipelineError::Allocation {
        width: pw,
        height: ph,
    };
    let out_w = u32::try_from(pw).map_err(|_| err())?;
    let out_h = u32::try_from(ph).map_err(|_| err())?;
    let src = image.as_raw();
    let mut raw = try_buffer(pw, ph)?;
    for y in 0..ph {
        let sy = reflect_index(y as isize - pad as isize, h);
        for x in 0..pw {
            let sx = reflect_index(x as isize - pad as isize, w);
            raw.push(src[sy * w + sx]);
        }
    }
    GrayImage::from_raw(out_w, out_h, raw).ok_or_else(err)
}

/// Owned single-channel `f64` buffer in row-major layout.
#[derive(Debug, Clone, PartialEq)]
pub struct Plane {
    width: usize,
    height: usize,
    data: Vec<f64>,
}

impl Plane {
    /// Zero-initialized plane.
    #[must_use]
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![0.0; width * height],
        }
    }

    /// Zero-initialized plane, reporting allocation failure instead of
    /// aborting.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Allocation`] if the sample count
    /// overflows or the memory cannot be reserved.
    pub fn try_new(width: usize, height: usize) -> Result<Self, PipelineError> {
        let mut data = try_buffer(width, height)?;
        data.resize(width * height, 0.0);
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Build a plane by evaluating `f(x, y)` at every sample.
    #[must_use]
    pub fn from_fn(width: usize, height: usize, mut f: impl FnMut(usize, usize) -> f64) -> Self {
        let mut data = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        Self {
            width,
            height,
            data,
        }
    }

    /// Convert an 8-bit image, multiplying each sample by `scale`
    /// (`1.0 / 255.0` normalizes to `[0, 1]`).
    #[must_use]
    pub fn from_gray(image: &GrayImage, scale: f64) -> Self {
        Self {
            width: image.width() as usize,
            height: image.height() as usize,
            data: image.as_raw().iter().map(|&v| f64::from(v) * scale).collect(),
        }
    }

    /// Convert back to 8 bits: multiply by `scale`, clip to `[0, 255]`
    /// and round. NaN samples become 0; infinities saturate.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn to_gray(&self, scale: f64) -> GrayImage {
        let raw: Vec<u8> = self
            .data
            .iter()
            .map(|&v| {
                let v = v * scale;
                if v.is_nan() {
                    0
                } else {
                    v.clamp(0.0, 255.0).round() as u8
                }
            })
            .collect();
        // Every constructor keeps `data.len() == width * height`.
        debug_assert_eq!(raw.len(), self.width * self.height);
        GrayImage::from_raw(self.width as u32, self.height as u32, raw)
            .unwrap_or_else(|| GrayImage::new(self.width as u32, self.height as u32))
    }

    /// Width in samples.
    #[must_use]
    pub const fn width(&self) -> usize {
        self.width
    }

    /// Height in samples.
    #[must_use]
    pub const fn height(&self) -> usize {
        self.height
    }

    /// Sample at `(x, y)`.
    #[inline]
    #[must_use]
    pub fn get(&self, x: usize, y: usize) -> f64 {
        self.data[y * self.width + x]
    }

    /// Overwrite the sample at `(x, y)`.
    #[inline]
    pub fn set(&mut self, x: usize, y: usize, value: f64) {
        self.data[y * self.width + x] = value;
    }

    /// Sample at a possibly out-of-range position, reflected back
    /// into the plane.
    #[inline]
    #[must_use]
    pub fn get_reflected(&self, x: isize, y: isize) -> f64 {
        self.get(reflect_index(x, self.width), reflect_index(y, self.height))
    }

    /// All samples, row-major.
    #[must_use]
    pub fn data(&self) -> &[f64] {
        &self.data
    }

    /// All samples, row-major, mutable.
    pub fn data_mut(&mut self) -> &mut [f64] {
        &mut self.data
    }

    /// Apply `f` to every sample, returning a new plane.
    #[must_use]
    pub fn map(&self, f: impl Fn(f64) -> f64) -> Self {
        Self {
            width: self.width,
            height: self.height,
            data: self.data.iter().map(|&v| f(v)).collect(),
        }
    }

    /// Combine two equally-sized planes sample by sample.
    #[must_use]
    pub fn zip_map(&self, other: &Self, f: impl Fn(f64, f64) -> f64) -> Self {
        debug_assert_eq!(
            (self.width, self.height),
            (other.width, other.height),
            "zip_map on planes of different size",
        );
        Self {
            width: self.width,
            height: self.height,
            data: self
                .data
                .iter()
                .zip(&other.data)
                .map(|(&a, &b)| f(a, b))
                .collect(),
        }
    }

    /// Clip every sample to `[lo, hi]`.
    pub fn clip(&mut self, lo: f64, hi: f64) {
        for v in &mut self.data {
            *v = v.clamp(lo, hi);
        }
    }

    /// Reflect-101 pad by `pad` samples on every side.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Allocation`] if the padded plane is too
    /// large to address or allocate.
    #[allow(clippy::cast_possible_wrap)]
    pub fn pad_reflect(&self, pad: usize) -> Result<Self, PipelineError> {
        let (width, height) = padded_dimensions(self.width, self.height, pad)?;
        let mut data = try_buffer(width, height)?;
        let p = pad as isize;
        for y in 0..height {
            for x in 0..width {
                data.push(self.get_reflected(x as isize - p, y as isize - p));
            }
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Copy out the `width x height` window whose top-left corner is
    /// `(x0, y0)`.
    #[must_use]
    pub fn crop(&self, x0: usize, y0: usize, width: usize, height: usize) -> Self {
        Self::from_fn(width, height, |x, y| self.get(x0 + x, y0 + y))
    }

    /// Circularly shift the plane: the sample at `(x, y)` moves to
    /// `(x + dx, y + dy)`, wrapping around the edges.
    #[must_use]
    #[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
    pub fn roll(&self, dx: isize, dy: isize) -> Self {
        let (w, h) = (self.width as isize, self.height as isize);
        Self::from_fn(self.width, self.height, |x, y| {
            let sx = (x as isize - dx).rem_euclid(w) as usize;
            let sy = (y as isize - dy).rem_euclid(h) as usize;
            self.get(sx, sy)
        })
    }

    /// Correlate with a 3x3 kernel using reflect-101 borders.
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub fn filter3x3(&self, kernel: &[[f64; 3]; 3]) -> Self {
        Self::from_fn(self.width, self.height, |x, y| {
            let (cx, cy) = (x as isize, y as isize);
            let mut acc = 0.0;
            for (ky, row) in kernel.iter().enumerate() {
                for (kx, &k) in row.iter().enumerate() {
                    acc += k * self.get_reflected(cx + kx as isize - 1, cy + ky as isize - 1);
                }
            }
            acc
        })
    }

    /// Mean of all samples (0 for an empty plane).
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn mean(&self) -> f64 {
        if self.data.is_empty() {
            0.0
        } else {
            self.data.iter().sum::<f64>() / self.data.len() as f64
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use image::Luma;

    use super::*;

    #[test]
    fn reflect_index_in_range_is_identity() {
        for i in 0..5 {
            assert_eq!(reflect_index(i, 5), i as usize);
        }
    }

    #[test]
    fn reflect_index_mirrors_without_edge() {
        // d c b | a b c d | c b a
        assert_eq!(reflect_index(-1, 4), 1);
        assert_eq!(reflect_index(-2, 4), 2);
        assert_eq!(reflect_index(4, 4), 2);
        assert_eq!(reflect_index(5, 4), 1);
    }

    #[test]
    fn reflect_index_handles_wide_padding() {
        // Padding wider than the image keeps folding.
        assert_eq!(reflect_index(-7, 3), 1);
        assert_eq!(reflect_index(9, 3), 1);
        assert_eq!(reflect_index(-3, 1), 0);
    }

    #[test]
    fn from_raw_rejects_wrong_length() {
        let err = Image::from_raw(2, 2, 3, vec![0; 11]).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidImage(_)));
    }

    #[test]
    fn from_raw_rejects_unsupported_channels() {
        let err = Image::from_raw(1, 1, 4, vec![0; 4]).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidImage(_)));
    }

    #[test]
    fn from_raw_builds_rgb() {
        let img = Image::from_raw(2, 1, 3, vec![1, 2, 3, 4, 5, 6]).unwrap();
        assert_eq!(img.channels(), 3);
        assert_eq!(img.dimensions(), Dimensions { width: 2, height: 1 });
        assert_eq!(img.as_raw(), &[1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn from_dynamic_keeps_gray_as_gray() {
        let gray = GrayImage::from_pixel(3, 3, Luma([9]));
        let img = Image::from_dynamic(&DynamicImage::ImageLuma8(gray.clone()));
        assert_eq!(img, Image::Gray(gray));
    }

    #[test]
    fn from_dynamic_drops_alpha() {
        let rgba = image::RgbaImage::from_pixel(2, 2, image::Rgba([10, 20, 30, 40]));
        let img = Image::from_dynamic(&DynamicImage::ImageRgba8(rgba));
        assert_eq!(img.channels(), 3);
        assert_eq!(&img.as_raw()[..3], &[10, 20, 30]);
    }

    #[test]
    fn pad_reflect_gray_mirrors_border() {
        let img = GrayImage::from_fn(3, 1, |x, _| Luma([u8::try_from(x).unwrap() * 10]));
        let padded = pad_reflect_gray(&img, 1).unwrap();
        assert_eq!(padded.dimensions(), (5, 3));
        let row: Vec<u8> = (0..5).map(|x| padded.get_pixel(x, 1).0[0]).collect();
        assert_eq!(row, vec![10, 0, 10, 20, 10]);
    }

    #[test]
    fn plane_round_trip_through_gray() {
        let img = GrayImage::from_fn(4, 3, |x, y| Luma([u8::try_from(x * 40 + y).unwrap()]));
        let plane = Plane::from_gray(&img, 1.0 / 255.0);
        assert_eq!(plane.to_gray(255.0), img);
    }

    #[test]
    fn to_gray_sanitizes_nan_and_saturates() {
        let mut plane = Plane::new(3, 1);
        plane.set(0, 0, f64::NAN);
        plane.set(1, 0, f64::INFINITY);
        plane.set(2, 0, -4.0);
        let gray = plane.to_gray(1.0);
        assert_eq!(gray.as_raw(), &[0, 255, 0]);
    }

    #[test]
    fn try_new_reports_overflow() {
        let err = Plane::try_new(usize::MAX, 2).unwrap_err();
        assert!(matches!(err, PipelineError::Allocation { .. }));
    }

    #[test]
    fn pad_reflect_gray_reports_unaddressable_padding() {
        let img = GrayImage::from_pixel(4, 4, Luma([1]));
        let err = pad_reflect_gray(&img, u32::MAX).unwrap_err();
        assert!(matches!(err, PipelineError::Allocation { .. }));
    }

    #[test]
    fn plane_pad_reflect_reports_overflow() {
        let plane = Plane::new(3, 3);
        let err = plane.pad_reflect(usize::MAX / 2).unwrap_err();
        assert!(matches!(err, PipelineError::Allocation { .. }));
    }

    #[test]
    fn padded_dimensions_checks_sample_count() {
        assert_eq!(padded_dimensions(4, 3, 2).unwrap(), (8, 7));
        assert!(padded_dimensions(1 << 40, 1 << 40, 0).is_err());
    }

    #[test]
    fn roll_wraps_around() {
        let plane = Plane::from_fn(3, 1, |x, _| x as f64);
        let rolled = plane.roll(1, 0);
        assert_eq!(rolled.data(), &[2.0, 0.0, 1.0]);
        let back = plane.roll(-1, 0);
        assert_eq!(back.data(), &[1.0, 2.0, 0.0]);
    }

    #[test]
    fn filter3x3_identity_kernel() {
        let plane = Plane::from_fn(4, 4, |x, y| (x * 4 + y) as f64);
        let identity = [[0.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 0.0]];
        assert_eq!(plane.filter3x3(&identity), plane);
    }

    #[test]
    fn crop_of_pad_is_original() {
        let plane = Plane::from_fn(5, 4, |x, y| (x * 7 + y * 3) as f64);
        let padded = plane.pad_reflect(2).unwrap();
        assert_eq!(padded.width(), 9);
        assert_eq!(padded.crop(2, 2, 5, 4), plane);
    }

    #[test]
    fn luma_of_gray_is_identity() {
        let gray = GrayImage::from_pixel(2, 2, Luma([77]));
        assert_eq!(Image::Gray(gray.clone()).to_luma(), gray);
    }
}
