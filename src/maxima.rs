//! Prominence-thresholded 2-D local maxima.
//!
//! Candidates are pixels that are `≥` all of their in-mask 8-neighbours;
//! connected equal-valued pixels form one plateau and are handled together.
//! Candidates are visited in descending value (ties in raster order). For a
//! plateau of value `h` the finder grows the 8-connected set of in-mask
//! pixels with value `≥ h − prominence`:
//!
//! - growth that reaches a strictly higher pixel, or the territory of an
//!   already accepted maximum, rejects the candidate (there is an escape path
//!   whose drop never exceeds the prominence);
//! - growth that floods its whole mask component without meeting a pixel
//!   below `h − prominence` rejects the candidate (its contrast is not above
//!   the prominence);
//! - otherwise the candidate is accepted, its growth becomes territory and
//!   the plateau pixel nearest the plateau centroid is reported.
//!
//! The reported pixel is always a plateau member, not the rounded centroid,
//! so it stays inside the mask even for concave plateaus. A two-pixel
//! plateau at columns 1 and 2 reports column 1 (ties go to raster order).
//!
//! So a maximum is kept iff its prominence is strictly greater than the
//! threshold. NaN samples are never candidates and block growth.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::raster::{Mask, Plane};

/// An accepted local maximum in the pixel grid of the searched plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Spot {
    /// Row (y) index.
    pub row: usize,
    /// Column (x) index.
    pub col: usize,
}

const DONE: u8 = 1;
const TERRITORY: u8 = 2;

/// Find prominent local maxima in `response`.
///
/// Spots are returned in acceptance order, i.e. by descending response. When
/// `mask` is given, candidates outside it are ignored and growth never
/// crosses its boundary.
///
/// # Errors
///
/// Returns [`Error::InvalidProminence`] if `prominence` is negative or not
/// finite, and [`Error::DimensionMismatch`] if the mask size differs from
/// the plane size.
pub fn find_maxima(response: &Plane, prominence: f32, mask: Option<&Mask>) -> Result<Vec<Spot>> {
    if !(prominence.is_finite() && prominence >= 0.0) {
        return Err(Error::InvalidProminence(prominence));
    }
    if let Some(m) = mask {
        if m.width != response.width || m.height != response.height {
            return Err(Error::DimensionMismatch {
                expected_width: response.width,
                expected_height: response.height,
                width: m.width,
                height: m.height,
            });
        }
    }

    let mut finder = Finder::new(response, mask);
    let candidates = finder.candidates();
    log::trace!("{} maxima candidates", candidates.len());

    let mut spots = Vec::new();
    for (value, index) in candidates {
        if finder.status[index] & DONE != 0 {
            continue;
        }
        if let Some(spot) = finder.grow(index, value, prominence) {
            spots.push(spot);
        }
    }
    Ok(spots)
}

struct Finder<'a> {
    width: usize,
    height: usize,
    values: &'a [f32],
    mask: Option<&'a [bool]>,
    status: Vec<u8>,
    stamp: Vec<u32>,
    generation: u32,
    stack: Vec<usize>,
    plateau: Vec<usize>,
    flood: Vec<usize>,
}

impl<'a> Finder<'a> {
    fn new(plane: &'a Plane, mask: Option<&'a Mask>) -> Self {
        let n = plane.data.len();
        Self {
            width: plane.width,
            height: plane.height,
            values: &plane.data,
            mask: mask.map(|m| m.data.as_slice()),
            status: vec![0; n],
            stamp: vec![0; n],
            generation: 0,
            stack: Vec::new(),
            plateau: Vec::new(),
            flood: Vec::new(),
        }
    }

    #[inline]
    fn inside(&self, i: usize) -> bool {
        self.mask.is_none_or(|m| m[i])
    }

    /// In-mask pixels not below any in-mask neighbour, sorted by descending
    /// value then raster order.
    fn candidates(&self) -> Vec<(f32, usize)> {
        let mut out = Vec::new();
        for i in 0..self.values.len() {
            let v = self.values[i];
            if v.is_nan() || !self.inside(i) {
                continue;
            }
            let (nbrs, count) = neighbours(i, self.width, self.height);
            let is_max = nbrs[..count]
                .iter()
                .filter(|&&q| self.inside(q))
                .all(|&q| self.values[q] <= v || self.values[q].is_nan());
            if is_max {
                out.push((v, i));
            }
        }
        out.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1)));
        out
    }

    fn next_generation(&mut self) -> u32 {
        if self.generation == u32::MAX {
            self.stamp.fill(0);
            self.generation = 0;
        }
        self.generation += 1;
        self.generation
    }

    /// Collect the plateau around `start`, then grow it down to
    /// `value - prominence`. Returns the representative spot if accepted.
    fn grow(&mut self, start: usize, value: f32, prominence: f32) -> Option<Spot> {
        let generation = self.next_generation();

        self.plateau.clear();
        self.stack.clear();
        self.stack.push(start);
        self.stamp[start] = generation;
        let mut rejected = false;
        while let Some(p) = self.stack.pop() {
            self.plateau.push(p);
            let (nbrs, count) = neighbours(p, self.width, self.height);
            for &q in &nbrs[..count] {
                if !self.inside(q) {
                    continue;
                }
                let vq = self.values[q];
                if vq > value {
                    rejected = true;
                } else if vq == value && self.stamp[q] != generation {
                    self.stamp[q] = generation;
                    self.stack.push(q);
                }
            }
        }
        for &p in &self.plateau {
            if self.status[p] & TERRITORY != 0 {
                rejected = true;
            }
            self.status[p] |= DONE;
        }
        if rejected {
            return None;
        }

        let floor = value - prominence;
        let mut bounded = false;
        self.flood.clear();
        self.flood.extend_from_slice(&self.plateau);
        self.stack.clear();
        self.stack.extend_from_slice(&self.plateau);
        while let Some(p) = self.stack.pop() {
            let (nbrs, count) = neighbours(p, self.width, self.height);
            for &q in &nbrs[..count] {
                if !self.inside(q) || self.stamp[q] == generation {
                    continue;
                }
                let vq = self.values[q];
                if vq.is_nan() {
                    continue;
                }
                if vq < floor {
                    bounded = true;
                    continue;
                }
                if vq > value || self.status[q] & TERRITORY != 0 {
                    return None;
                }
                self.stamp[q] = generation;
                self.flood.push(q);
                self.stack.push(q);
            }
        }
        if !bounded {
            return None;
        }

        for &p in &self.flood {
            self.status[p] |= TERRITORY;
        }
        Some(self.representative())
    }

    /// Plateau pixel closest to the plateau centroid, ties in raster order.
    #[allow(clippy::cast_precision_loss)]
    fn representative(&self) -> Spot {
        let n = self.plateau.len() as f64;
        let (sx, sy) = self.plateau.iter().fold((0.0, 0.0), |(sx, sy), &p| {
            (sx + (p % self.width) as f64, sy + (p / self.width) as f64)
        });
        let (cx, cy) = (sx / n, sy / n);

        let mut best = self.plateau[0];
        let mut best_d2 = f64::INFINITY;
        for &p in &self.plateau {
            let dx = (p % self.width) as f64 - cx;
            let dy = (p / self.width) as f64 - cy;
            let d2 = dx * dx + dy * dy;
            if d2 < best_d2 || (d2 == best_d2 && p < best) {
                best = p;
                best_d2 = d2;
            }
        }
        Spot {
            row: best / self.width,
            col: best % self.width,
        }
    }
}

/// 8-connected neighbours of linear index `i`; only the first `count`
/// entries are valid.
#[inline]
fn neighbours(i: usize, width: usize, height: usize) -> ([usize; 8], usize) {
    let (x, y) = (i % width, i / width);
    let mut out = [0usize; 8];
    let mut count = 0;
    for ny in y.saturating_sub(1)..=(y + 1).min(height - 1) {
        for nx in x.saturating_sub(1)..=(x + 1).min(width - 1) {
            if nx != x || ny != y {
                out[count] = ny * width + nx;
                count += 1;
            }
        }
    }
    (out, count)
}
