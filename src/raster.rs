//! In-memory pixel buffers.
//!
//! - [`Raster`]: named, planar multi-channel samples as handed over by an
//!   [`ImageAccessor`](crate::accessor::ImageAccessor).
//! - [`Plane`]: a single `f32` channel, the unit every pipeline stage consumes
//!   and produces.
//! - [`Mask`]: a boolean region mask aligned with a plane.
//!
//! All buffers are row-major with stride equal to width. Every buffer carries
//! the pixel size (physical length per pixel, isotropic) and its origin in
//! full-image pixel coordinates so crops can be mapped back.

use crate::error::{Error, Result};
use crate::geometry::PixelBounds;

/// Multi-channel raster with named channels.
#[derive(Debug, Clone)]
pub struct Raster {
    width: usize,
    height: usize,
    pixel_size: f64,
    origin: (usize, usize),
    names: Vec<String>,
    planes: Vec<Vec<f32>>,
}

impl Raster {
    /// Build a raster from one sample buffer per named channel.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if there are no channels, names and
    /// buffers disagree in count, or the pixel size is not positive, and
    /// [`Error::DimensionMismatch`] if a buffer is not `width * height` long.
    pub fn new(
        width: usize,
        height: usize,
        pixel_size: f64,
        names: Vec<String>,
        planes: Vec<Vec<f32>>,
    ) -> Result<Self> {
        if names.is_empty() {
            return Err(Error::Configuration("raster has no channels".to_string()));
        }
        if names.len() != planes.len() {
            return Err(Error::Configuration(format!(
                "{} channel names for {} channel buffers",
                names.len(),
                planes.len()
            )));
        }
        if !(pixel_size.is_finite() && pixel_size > 0.0) {
            return Err(Error::Configuration(format!(
                "pixel size must be > 0, got {pixel_size}"
            )));
        }
        for plane in &planes {
            if plane.len() != width * height {
                return Err(Error::DimensionMismatch {
                    expected_width: width,
                    expected_height: height,
                    width: plane.len(),
                    height: 1,
                });
            }
        }
        Ok(Self {
            width,
            height,
            pixel_size,
            origin: (0, 0),
            names,
            planes,
        })
    }

    /// Set the offset of this raster inside the full image.
    #[must_use]
    pub fn with_origin(mut self, x: usize, y: usize) -> Self {
        self.origin = (x, y);
        self
    }

    /// Width in pixels.
    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Height in pixels.
    #[must_use]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Physical length of one pixel side.
    #[must_use]
    pub fn pixel_size(&self) -> f64 {
        self.pixel_size
    }

    /// Offset `(x, y)` of the top-left pixel in full-image coordinates.
    #[must_use]
    pub fn origin(&self) -> (usize, usize) {
        self.origin
    }

    /// Channel names in storage order.
    #[must_use]
    pub fn channel_names(&self) -> &[String] {
        &self.names
    }

    /// Number of channels.
    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.names.len()
    }

    /// Index of the channel called `name`, if any.
    #[must_use]
    pub fn channel_index(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// Samples of channel `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= channel_count()`.
    #[must_use]
    pub fn channel_data(&self, index: usize) -> &[f32] {
        &self.planes[index]
    }

    /// Copy out a rectangular window (in this raster's own pixel coordinates)
    /// restricted to the listed channels.
    ///
    /// The window is clipped to the raster; `None` is returned when nothing
    /// remains. The crop's origin is this raster's origin plus the window
    /// offset.
    #[must_use]
    pub fn crop(&self, bounds: &PixelBounds, channels: &[usize]) -> Option<Raster> {
        let x0 = bounds.x.min(self.width);
        let y0 = bounds.y.min(self.height);
        let x1 = (bounds.x + bounds.width).min(self.width);
        let y1 = (bounds.y + bounds.height).min(self.height);
        if x0 >= x1 || y0 >= y1 || channels.is_empty() {
            return None;
        }
        let (w, h) = (x1 - x0, y1 - y0);

        let mut names = Vec::with_capacity(channels.len());
        let mut planes = Vec::with_capacity(channels.len());
        for &c in channels {
            let src = self.planes.get(c)?;
            let mut out = Vec::with_capacity(w * h);
            for y in y0..y1 {
                let start = y * self.width;
                out.extend_from_slice(&src[start + x0..start + x1]);
            }
            names.push(self.names[c].clone());
            planes.push(out);
        }

        Some(Raster {
            width: w,
            height: h,
            pixel_size: self.pixel_size,
            origin: (self.origin.0 + x0, self.origin.1 + y0),
            names,
            planes,
        })
    }
}

/// Owned single-channel `f32` image.
#[derive(Debug, Clone, PartialEq)]
pub struct Plane {
    /// Width in pixels.
    pub width: usize,
    /// Height in pixels.
    pub height: usize,
    /// Physical length of one pixel side.
    pub pixel_size: f64,
    /// Offset `(x, y)` of the top-left pixel in full-image coordinates.
    pub origin: (usize, usize),
    /// Samples in row-major order.
    pub data: Vec<f32>,
}

impl Plane {
    /// Zero-initialised plane of size `width × height`.
    #[must_use]
    pub fn new(width: usize, height: usize, pixel_size: f64) -> Self {
        Self {
            width,
            height,
            pixel_size,
            origin: (0, 0),
            data: vec![0.0; width * height],
        }
    }

    /// Wrap an existing buffer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DimensionMismatch`] if `data.len() != width * height`.
    pub fn from_vec(width: usize, height: usize, pixel_size: f64, data: Vec<f32>) -> Result<Self> {
        if data.len() != width * height {
            return Err(Error::DimensionMismatch {
                expected_width: width,
                expected_height: height,
                width: data.len(),
                height: 1,
            });
        }
        Ok(Self {
            width,
            height,
            pixel_size,
            origin: (0, 0),
            data,
        })
    }

    /// A plane of the same geometry filled with zeros.
    #[must_use]
    pub fn zeros_like(&self) -> Self {
        Self {
            width: self.width,
            height: self.height,
            pixel_size: self.pixel_size,
            origin: self.origin,
            data: vec![0.0; self.data.len()],
        }
    }

    /// Linear index of `(x, y)`.
    #[inline]
    #[must_use]
    pub fn idx(&self, x: usize, y: usize) -> usize {
        y * self.width + x
    }

    /// Sample at `(x, y)`.
    #[inline]
    #[must_use]
    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.data[self.idx(x, y)]
    }

    /// Overwrite the sample at `(x, y)`.
    #[inline]
    pub fn set(&mut self, x: usize, y: usize, v: f32) {
        let i = self.idx(x, y);
        self.data[i] = v;
    }

    /// Row `y` as a slice.
    #[inline]
    #[must_use]
    pub fn row(&self, y: usize) -> &[f32] {
        let start = y * self.width;
        &self.data[start..start + self.width]
    }
}

/// Boolean mask aligned with a [`Plane`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    /// Width in pixels.
    pub width: usize,
    /// Height in pixels.
    pub height: usize,
    /// `true` for pixels inside the region, row-major.
    pub data: Vec<bool>,
}

impl Mask {
    /// Mask of the given size with every pixel set to `value`.
    #[must_use]
    pub fn filled(width: usize, height: usize, value: bool) -> Self {
        Self {
            width,
            height,
            data: vec![value; width * height],
        }
    }

    /// Whether `(x, y)` is inside the mask.
    #[inline]
    #[must_use]
    pub fn contains(&self, x: usize, y: usize) -> bool {
        x < self.width && y < self.height && self.data[y * self.width + x]
    }

    /// Number of pixels inside the mask.
    #[must_use]
    pub fn count(&self) -> usize {
        self.data.iter().filter(|&&v| v).count()
    }
}
