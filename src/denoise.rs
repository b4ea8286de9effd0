//! Circular-window median filter used to suppress shot noise before
//! enhancement.
//!
//! The window holds every offset with `dx² + dy² ≤ r² + 1`, the usual
//! rank-filter circle: radius 1 and 1.5 give the full 3×3 block, radius 2 a
//! 21-pixel disc. Windows are clipped at the image border rather than padded.

use crate::error::{Error, Result};
use crate::raster::Plane;

/// Default median radius in pixels.
pub const DEFAULT_MEDIAN_RADIUS: f32 = 1.5;

/// Window offsets `(dx, dy)` for a circular kernel of the given radius.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn circular_offsets(radius: f32) -> Vec<(isize, isize)> {
    let r2 = radius * radius + 1.0;
    let extent = (r2 + 1e-6).sqrt().floor() as isize;
    let mut offsets = Vec::new();
    for dy in -extent..=extent {
        for dx in -extent..=extent {
            #[allow(clippy::cast_precision_loss)]
            let d2 = (dx * dx + dy * dy) as f32;
            if d2 <= r2 {
                offsets.push((dx, dy));
            }
        }
    }
    offsets
}

/// Median-filter `plane` with a circular window of `radius` pixels.
///
/// NaN samples are ignored; a window with an even number of samples yields
/// the mean of its two middle values.
///
/// # Errors
///
/// Returns [`Error::InvalidRadius`] if `radius` is not a positive finite
/// number.
#[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
pub fn denoise(plane: &Plane, radius: f32) -> Result<Plane> {
    if !(radius.is_finite() && radius > 0.0) {
        return Err(Error::InvalidRadius(radius));
    }

    let offsets = circular_offsets(radius);
    let (w, h) = (plane.width as isize, plane.height as isize);
    let mut out = plane.zeros_like();
    let mut window = Vec::with_capacity(offsets.len());

    for y in 0..h {
        for x in 0..w {
            window.clear();
            for &(dx, dy) in &offsets {
                let (sx, sy) = (x + dx, y + dy);
                if sx < 0 || sy < 0 || sx >= w || sy >= h {
                    continue;
                }
                let v = plane.data[(sy * w + sx) as usize];
                if !v.is_nan() {
                    window.push(v);
                }
            }
            out.data[(y * w + x) as usize] = median(&mut window);
        }
    }

    Ok(out)
}

/// Median of `values`, reordering them in place. NaN for an empty slice.
fn median(values: &mut [f32]) -> f32 {
    let n = values.len();
    if n == 0 {
        return f32::NAN;
    }
    let mid = n / 2;
    let (lower, upper, _) = values.select_nth_unstable_by(mid, f32::total_cmp);
    let upper = *upper;
    if n % 2 == 1 {
        upper
    } else {
        let below = lower.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        0.5 * (below + upper)
    }
}
