//! Laplacian-of-Gaussian blob enhancement.
//!
//! The LoG is evaluated separably: with `g` the sampled 1-D Gaussian and
//! `g''` its second derivative,
//!
//! ```text
//! ∂xx(G * I) = g  ⊛_y ( g'' ⊛_x I )
//! ∂yy(G * I) = g  ⊛_x ( g'' ⊛_y I )
//! ```
//!
//! so the cost is four 1-D passes of `2·ceil(4σ) + 1` taps per pixel instead
//! of a full 2-D kernel. Borders replicate the edge sample.
//!
//! The response is `−2σ²·∇²(G_σ * I)`: bright blobs give positive peaks, and
//! a Gaussian spot of width σ and amplitude `A` peaks at ≈ `A`, which keeps
//! prominence thresholds in the units of the input intensities.

use crate::error::{Error, Result};
use crate::raster::Plane;

/// Kernel support in multiples of sigma.
const SUPPORT_SIGMAS: f64 = 4.0;

/// Largest accepted scale in pixels. Kernels stay within `4 * 256 + 1` taps.
pub const MAX_SIGMA_PIXELS: f64 = 256.0;

/// Sampled 1-D kernels for one scale.
#[derive(Debug, Clone)]
pub struct LogKernels {
    /// Half-width in pixels; each kernel has `2 * radius + 1` taps.
    pub radius: usize,
    /// Gaussian, normalised to unit sum.
    pub gauss: Vec<f32>,
    /// Gaussian second derivative, corrected to zero sum.
    pub second: Vec<f32>,
}

/// Build the separable kernels for a scale given in pixels.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss,
    clippy::cast_possible_wrap
)]
pub fn log_kernels(sigma_px: f64) -> LogKernels {
    let radius = ((SUPPORT_SIGMAS * sigma_px).ceil() as usize).max(1);
    let s2 = sigma_px * sigma_px;
    let xs: Vec<f64> = (-(radius as i64)..=radius as i64).map(|i| i as f64).collect();

    let mut gauss: Vec<f64> = xs.iter().map(|x| (-x * x / (2.0 * s2)).exp()).collect();
    let total: f64 = gauss.iter().sum();
    gauss.iter_mut().for_each(|v| *v /= total);

    let mut second: Vec<f64> = xs
        .iter()
        .zip(&gauss)
        .map(|(x, g)| (x * x - s2) / (s2 * s2) * g)
        .collect();
    let drift: f64 = second.iter().sum();
    for (d, g) in second.iter_mut().zip(&gauss) {
        *d -= drift * g;
    }

    LogKernels {
        radius,
        gauss: gauss.into_iter().map(|v| v as f32).collect(),
        second: second.into_iter().map(|v| v as f32).collect(),
    }
}

/// Closed-form LoG kernel `∇²G_σ` sampled on a `(2r+1)²` grid, row-major.
///
/// Reference for validating [`enhance`]; not used on the hot path.
#[must_use]
#[allow(clippy::cast_possible_wrap, clippy::cast_precision_loss)]
pub fn reference_log_kernel(sigma_px: f64, radius: usize) -> Vec<f64> {
    let r = radius as i64;
    let s2 = sigma_px * sigma_px;
    let norm = 1.0 / (2.0 * std::f64::consts::PI * s2 * s2 * s2);
    let mut kernel = Vec::with_capacity((2 * radius + 1).pow(2));
    for y in -r..=r {
        for x in -r..=r {
            let d2 = (x * x + y * y) as f64;
            kernel.push((d2 - 2.0 * s2) * norm * (-d2 / (2.0 * s2)).exp());
        }
    }
    kernel
}

/// Compute the scale-normalised, sign-flipped LoG response of `plane`.
///
/// `sigma` is in physical units and is converted to pixels with the plane's
/// pixel size. The output has the same size, origin and pixel size.
///
/// # Errors
///
/// Returns [`Error::InvalidScale`] if `sigma` is not a positive finite
/// number or the derived pixel scale exceeds [`MAX_SIGMA_PIXELS`].
#[allow(clippy::cast_possible_truncation)]
pub fn enhance(plane: &Plane, sigma: f64) -> Result<Plane> {
    if !(sigma.is_finite() && sigma > 0.0) {
        return Err(Error::InvalidScale(sigma));
    }
    let sigma_px = sigma / plane.pixel_size;
    if !(sigma_px.is_finite() && sigma_px > 0.0 && sigma_px <= MAX_SIGMA_PIXELS) {
        return Err(Error::InvalidScale(sigma_px));
    }

    let mut out = plane.zeros_like();
    if plane.data.is_empty() {
        return Ok(out);
    }

    let k = log_kernels(sigma_px);
    let (w, h) = (plane.width, plane.height);

    let dxx = convolve_cols(&convolve_rows(&plane.data, w, h, &k.second), w, h, &k.gauss);
    let dyy = convolve_rows(&convolve_cols(&plane.data, w, h, &k.second), w, h, &k.gauss);

    let scale = (-2.0 * sigma_px * sigma_px) as f32;
    for ((o, a), b) in out.data.iter_mut().zip(&dxx).zip(&dyy) {
        *o = scale * (a + b);
    }
    Ok(out)
}

/// Horizontal 1-D convolution with edge replication.
fn convolve_rows(src: &[f32], w: usize, h: usize, taps: &[f32]) -> Vec<f32> {
    let r = taps.len() / 2;
    let mut dst = vec![0.0_f32; w * h];
    for y in 0..h {
        let row = &src[y * w..(y + 1) * w];
        let out = &mut dst[y * w..(y + 1) * w];
        for (x, o) in out.iter_mut().enumerate() {
            let mut acc = 0.0_f32;
            for (j, &t) in taps.iter().enumerate() {
                let sx = (x + j).saturating_sub(r).min(w - 1);
                acc += t * row[sx];
            }
            *o = acc;
        }
    }
    dst
}

/// Vertical 1-D convolution with edge replication.
fn convolve_cols(src: &[f32], w: usize, h: usize, taps: &[f32]) -> Vec<f32> {
    let r = taps.len() / 2;
    let mut dst = vec![0.0_f32; w * h];
    for y in 0..h {
        let out = &mut dst[y * w..(y + 1) * w];
        for (j, &t) in taps.iter().enumerate() {
            let sy = (y + j).saturating_sub(r).min(h - 1);
            let row = &src[sy * w..(sy + 1) * w];
            for (o, &v) in out.iter_mut().zip(row) {
                *o += t * v;
            }
        }
    }
    dst
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gaussian_spot(size: usize, cx: f32, cy: f32, amplitude: f32, sigma: f32) -> Plane {
        let mut p = Plane::new(size, size, 1.0);
        for y in 0..size {
            for x in 0..size {
                let dx = x as f32 - cx;
                let dy = y as f32 - cy;
                let v = amplitude * (-(dx * dx + dy * dy) / (2.0 * sigma * sigma)).exp();
                p.set(x, y, v);
            }
        }
        p
    }

    #[test]
    fn kernels_are_normalised() {
        for sigma in [0.7, 1.0, 2.0, 3.5] {
            let k = log_kernels(sigma);
            assert_eq!(k.gauss.len(), 2 * k.radius + 1);
            let gsum: f32 = k.gauss.iter().sum();
            let dsum: f32 = k.second.iter().sum();
            assert!((gsum - 1.0).abs() < 1e-5, "gauss sum {gsum} for sigma {sigma}");
            assert!(dsum.abs() < 1e-5, "g'' sum {dsum} for sigma {sigma}");
        }
    }

    #[test]
    fn separable_response_matches_reference_kernel() {
        let sigma = 2.0;
        let size = 41;
        let c = size / 2;
        let mut delta = Plane::new(size, size, 1.0);
        delta.set(c, c, 1.0);

        let response = enhance(&delta, sigma).unwrap();
        let radius = log_kernels(sigma).radius;
        let reference = reference_log_kernel(sigma, radius);
        let side = 2 * radius + 1;
        let peak = reference.iter().fold(0.0_f64, |m, v| m.max(v.abs())) * 2.0 * sigma * sigma;

        for ky in 0..side {
            for kx in 0..side {
                let expected = -2.0 * sigma * sigma * reference[ky * side + kx];
                let got = f64::from(response.get(c + kx - radius, c + ky - radius));
                assert!(
                    (got - expected).abs() < 5e-3 * peak,
                    "({kx},{ky}): got {got}, expected {expected}"
                );
            }
        }
    }

    #[test]
    fn matched_spot_responds_with_its_amplitude() {
        let spot = gaussian_spot(41, 20.0, 20.0, 100.0, 2.0);
        let response = enhance(&spot, 2.0).unwrap();
        let centre = response.get(20, 20);
        assert!(
            (centre - 100.0).abs() < 3.0,
            "matched LoG response should be ~amplitude, got {centre}"
        );
        let max = response.data.iter().copied().fold(f32::MIN, f32::max);
        assert!((max - centre).abs() < f32::EPSILON, "peak should sit at the spot centre");
    }

    #[test]
    fn flat_image_gives_zero_response() {
        let mut p = Plane::new(16, 12, 1.0);
        p.data.iter_mut().for_each(|v| *v = 42.0);
        let response = enhance(&p, 1.0).unwrap();
        for &v in &response.data {
            assert!(v.abs() < 1e-3, "flat input should not respond, got {v}");
        }
    }

    #[test]
    fn sigma_is_converted_with_pixel_size() {
        let mut spot = gaussian_spot(41, 20.0, 20.0, 100.0, 2.0);
        spot.pixel_size = 0.5;
        let physical = enhance(&spot, 1.0).unwrap();
        spot.pixel_size = 1.0;
        let pixels = enhance(&spot, 2.0).unwrap();
        assert_eq!(physical.data, pixels.data);
    }

    #[test]
    fn rejects_non_positive_sigma() {
        let p = Plane::new(4, 4, 1.0);
        assert!(matches!(enhance(&p, 0.0), Err(Error::InvalidScale(_))));
        assert!(matches!(enhance(&p, -1.0), Err(Error::InvalidScale(_))));
        assert!(matches!(enhance(&p, f64::NAN), Err(Error::InvalidScale(_))));
    }

    #[test]
    fn rejects_scale_beyond_kernel_limit() {
        let mut p = Plane::new(4, 4, 0.5);
        assert!(matches!(enhance(&p, 1e12), Err(Error::InvalidScale(_))));
        assert!(enhance(&p, MAX_SIGMA_PIXELS * 0.5).is_ok());
        p.pixel_size = 1e-9;
        assert!(matches!(enhance(&p, 1.0), Err(Error::InvalidScale(_))));
    }
}
