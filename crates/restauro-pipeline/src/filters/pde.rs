//! Iterative PDE filters: shock sharpening and Perona-Malik diffusion.
//!
//! Both operate on a single plane normalized to `[0, 1]` and consult a
//! [`CancellationToken`] between iterations. When cancelled they stop
//! early and return the partial estimate; the executor discards it.

use image::GrayImage;
use serde::{Deserialize, Serialize};

use crate::buffer::Plane;
use crate::cancel::CancellationToken;

/// Fixed time step of the shock filter update.
pub const SHOCK_DT: f64 = 0.1;

/// Default shock filter iteration count.
pub const DEFAULT_SHOCK_ITERATIONS: u32 = 10;

const LAPLACIAN: [[f64; 3]; 3] = [[0.0, 1.0, 0.0], [1.0, -4.0, 1.0], [0.0, 1.0, 0.0]];
const SOBEL_X: [[f64; 3]; 3] = [[-1.0, 0.0, 1.0], [-2.0, 0.0, 2.0], [-1.0, 0.0, 1.0]];
const SOBEL_Y: [[f64; 3]; 3] = [[-1.0, -2.0, -1.0], [0.0, 0.0, 0.0], [1.0, 2.0, 1.0]];

/// Sign with `sign(0) == 0`, unlike [`f64::signum`].
fn sign(v: f64) -> f64 {
    if v > 0.0 {
        1.0
    } else if v < 0.0 {
        -1.0
    } else {
        0.0
    }
}

/// Shock filter: `I += dt * sign(laplacian(I)) * |grad(I)|`, repeated
/// exactly `iterations` times.
#[must_use = "returns the filtered image"]
pub fn shock_filter(image: &GrayImage, iterations: u32, cancel: &CancellationToken) -> GrayImage {
    let mut plane = Plane::from_gray(image, 1.0 / 255.0);
    for _ in 0..iterations {
        if cancel.is_cancelled() {
            break;
        }
        let lap = plane.filter3x3(&LAPLACIAN);
        let gx = plane.filter3x3(&SOBEL_X);
        let gy = plane.filter3x3(&SOBEL_Y);
        let grad = gx.zip_map(&gy, f64::hypot);
        let step = lap.zip_map(&grad, |l, g| SHOCK_DT * sign(l) * g);
        plane = plane.zip_map(&step, |v, s| v + s);
    }
    plane.clip(0.0, 1.0);
    plane.to_gray(255.0)
}

/// Perona-Malik edge-stopping function.
///
/// Serialized as the integers `1` (exponential) and `2` (rational).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum EdgeStopping {
    /// `exp(-(d / k)^2)`: favours high-contrast edges.
    #[default]
    Exponential,
    /// `1 / (1 + (d / k)^2)`: favours wide regions over small ones.
    Rational,
}

impl EdgeStopping {
    /// Diffusion coefficient for a difference `d` and edge sensitivity `k`.
    #[must_use]
    pub fn coefficient(self, d: f64, kappa: f64) -> f64 {
        let r = d / kappa;
        match self {
            Self::Exponential => (-(r * r)).exp(),
            Self::Rational => 1.0 / r.mul_add(r, 1.0),
        }
    }
}

impl TryFrom<u8> for EdgeStopping {
    type Error = String;

    fn try_from(option: u8) -> Result<Self, Self::Error> {
        match option {
            1 => Ok(Self::Exponential),
            2 => Ok(Self::Rational),
            other => Err(format!("diffusion option must be 1 or 2, got {other}")),
        }
    }
}

impl From<EdgeStopping> for u8 {
    fn from(option: EdgeStopping) -> Self {
        match option {
            EdgeStopping::Exponential => 1,
            EdgeStopping::Rational => 2,
        }
    }
}

/// Parameters of Perona-Malik anisotropic diffusion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DiffusionParams {
    /// Number of update steps. `0` leaves the image untouched.
    #[serde(default = "DiffusionParams::default_iterations")]
    pub iterations: u32,
    /// Edge sensitivity `k`.
    #[serde(default = "DiffusionParams::default_kappa")]
    pub kappa: f64,
    /// Step size of each update.
    #[serde(default = "DiffusionParams::default_gamma")]
    pub gamma: f64,
    /// Edge-stopping function.
    #[serde(default)]
    pub option: EdgeStopping,
}

impl DiffusionParams {
    /// Default iteration count.
    pub const DEFAULT_ITERATIONS: u32 = 10;
    /// Default edge sensitivity.
    pub const DEFAULT_KAPPA: f64 = 15.0;
    /// Default step size.
    pub const DEFAULT_GAMMA: f64 = 0.1;

    const fn default_iterations() -> u32 {
        Self::DEFAULT_ITERATIONS
    }

    const fn default_kappa() -> f64 {
        Self::DEFAULT_KAPPA
    }

    const fn default_gamma() -> f64 {
        Self::DEFAULT_GAMMA
    }

    /// Check the parameters can be evaluated.
    ///
    /// # Errors
    ///
    /// Returns a description of the problem if `kappa` is not a positive
    /// finite number or `gamma` is not finite.
    pub fn validate(&self) -> Result<(), String> {
        if !self.kappa.is_finite() || self.kappa <= 0.0 {
            return Err(format!("diffusion k must be positive, got {}", self.kappa));
        }
        if !self.gamma.is_finite() {
            return Err(format!("diffusion gamma must be finite, got {}", self.gamma));
        }
        Ok(())
    }
}

impl Default for DiffusionParams {
    fn default() -> Self {
        Self {
            iterations: Self::DEFAULT_ITERATIONS,
            kappa: Self::DEFAULT_KAPPA,
            gamma: Self::DEFAULT_GAMMA,
            option: EdgeStopping::default(),
        }
    }
}

/// Perona-Malik anisotropic diffusion on one plane.
///
/// Neighbour differences wrap around the image edges (circular shift).
#[must_use = "returns the filtered image"]
pub fn anisotropic_diffusion(
    image: &GrayImage,
    params: &DiffusionParams,
    cancel: &CancellationToken,
) -> GrayImage {
    if params.iterations == 0 {
        return image.clone();
    }

    let mut plane = Plane::from_gray(image, 1.0 / 255.0);
    for _ in 0..params.iterations {
        if cancel.is_cancelled() {
            break;
        }
        // (dx, dy) shifts that bring the N, S, E, W neighbour onto each sample.
        let mut flux = Plane::new(plane.width(), plane.height());
        for (dx, dy) in [(0, 1), (0, -1), (-1, 0), (1, 0)] {
            let diff = plane.roll(dx, dy).zip_map(&plane, |n, v| n - v);
            flux = flux.zip_map(&diff, |acc, d| {
                params.option.coefficient(d, params.kappa).mul_add(d, acc)
            });
        }
        plane = plane.zip_map(&flux, |v, f| params.gamma.mul_add(f, v));
    }
    plane.clip(0.0, 1.0);
    plane.to_gray(255.0)
}
