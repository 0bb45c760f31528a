//! Channel adapter: generalizes single-plane algorithms to color images.
//!
//! Every spatial, frequency and PDE filter in this crate is written
//! once, against a single [`GrayImage`] plane. [`apply_per_channel`]
//! lifts such a function to an [`Image`] by splitting RGB input into
//! three planes, running the function on each with identical
//! parameters (captured by the closure), and reassembling them in the
//! original channel order.

use image::{GrayImage, Luma, Rgb, RgbImage};

use crate::buffer::Image;

/// Split an RGB image into its three channel planes (R, G, B).
#[must_use]
pub fn split(image: &RgbImage) -> [GrayImage; 3] {
    let (w, h) = image.dimensions();
    std::array::from_fn(|c| GrayImage::from_fn(w, h, |x, y| Luma([image.get_pixel(x, y).0[c]])))
}

/// Reassemble three equally-sized planes into an RGB image.
#[must_use]
pub fn merge(planes: &[GrayImage; 3]) -> RgbImage {
    let (w, h) = planes[0].dimensions();
    RgbImage::from_fn(w, h, |x, y| {
        Rgb([
            planes[0].get_pixel(x, y).0[0],
            planes[1].get_pixel(x, y).0[0],
            planes[2].get_pixel(x, y).0[0],
        ])
    })
}

/// Run a single-plane function on every channel of `image`.
///
/// Gray images are passed straight through to `f`.
pub fn apply_per_channel<F>(image: &Image, f: F) -> Image
where
    F: Fn(&GrayImage) -> GrayImage,
{
    apply_per_channel_indexed(image, |_, plane| f(plane))
}

/// Fallible [`apply_per_channel`]: stops at the first plane `f` fails
/// on and returns its error.
///
/// # Errors
///
/// Returns the first error produced by `f`.
pub fn try_apply_per_channel<F, E>(image: &Image, f: F) -> Result<Image, E>
where
    F: Fn(&GrayImage) -> Result<GrayImage, E>,
{
    match image {
        Image::Gray(g) => f(g).map(Image::Gray),
        Image::Rgb(c) => {
            let [r, g, b] = split(c);
            Ok(Image::Rgb(merge(&[f(&r)?, f(&g)?, f(&b)?])))
        }
    }
}

/// Like [`apply_per_channel`], but `f` also receives the channel index
/// (always `0` for gray input). Noise generators use it to derive an
/// independent random stream per plane.
pub fn apply_per_channel_indexed<F>(image: &Image, f: F) -> Image
where
    F: Fn(usize, &GrayImage) -> GrayImage,
{
    match image {
        Image::Gray(g) => Image::Gray(f(0, g)),
        Image::Rgb(c) => {
            let planes = split(c);
            let processed: [GrayImage; 3] = std::array::from_fn(|i| f(i, &planes[i]));
            Image::Rgb(merge(&processed))
        }
    }
}

/// Like [`apply_per_channel`], but an RGB image whose channels are all
/// identical is processed once and the result replicated to all three
/// channels. Used by the frequency-domain filters to avoid redundant
/// Fourier transforms.
pub fn apply_per_channel_shared<F>(image: &Image, f: F) -> Image
where
    F: Fn(&GrayImage) -> GrayImage,
{
    match image {
        Image::Rgb(c) if is_grayscale(image) => {
            let plane = split(c)[0].clone();
            let out = f(&plane);
            Image::Rgb(merge(&[out.clone(), out.clone(), out]))
        }
        _ => apply_per_channel(image, f),
    }
}

/// Whether `image` is effectively grayscale: either single-channel, or
/// RGB with all three channels identical at every pixel.
#[must_use]
pub fn is_grayscale(image: &Image) -> bool {
    match image {
        Image::Gray(_) => true,
        Image::Rgb(c) => c.pixels().all(|p| p.0[0] == p.0[1] && p.0[1] == p.0[2]),
    }
}
