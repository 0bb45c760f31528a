//! The filter library: pure single-plane algorithms.
//!
//! Each function takes a [`GrayImage`](image::GrayImage) plane plus its
//! parameters and returns a new plane of identical dimensions. Color
//! support comes from the [`channel`](crate::channel) adapter, applied
//! by [`Filter::apply`](crate::filter::Filter::apply).

pub mod deconvolution;
pub mod frequency;
pub mod noise;
pub mod pde;
pub mod spatial;

/// Kernel size used when the requested size is below 1.
pub const DEFAULT_KERNEL_SIZE: u32 = 3;

/// Normalize a requested kernel size: values below 1 fall back to
/// [`DEFAULT_KERNEL_SIZE`], even values are bumped to the next odd one.
#[must_use]
pub const fn odd_kernel_size(ksize: u32) -> u32 {
    if ksize < 1 {
        DEFAULT_KERNEL_SIZE
    } else if ksize % 2 == 0 {
        ksize + 1
    } else {
        ksize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kernel_size_below_one_defaults() {
        assert_eq!(odd_kernel_size(0), 3);
    }

    #[test]
    fn even_kernel_size_is_bumped() {
        assert_eq!(odd_kernel_size(2), 3);
        assert_eq!(odd_kernel_size(4), 5);
    }

    #[test]
    fn odd_kernel_size_is_kept() {
        assert_eq!(odd_kernel_size(1), 1);
        assert_eq!(odd_kernel_size(7), 7);
    }
}
