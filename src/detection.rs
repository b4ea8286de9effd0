//! Per-region, per-channel spot detection.
//!
//! Pipeline for one region and one channel:
//! 1. crop the channel plane to the region's bounding box and rasterise the
//!    region into a mask;
//! 2. median-filter the crop ([`denoise`]);
//! 3. LoG-enhance it at the channel's scale ([`enhance`]);
//! 4. find prominent maxima inside the mask ([`find_maxima`]);
//! 5. map the maxima back to image coordinates and derive count and density.
//!
//! Detection is pure: measurements are returned, never written.

use serde::{Deserialize, Serialize};

use crate::denoise::{denoise, DEFAULT_MEDIAN_RADIUS};
use crate::enhance::{enhance, MAX_SIGMA_PIXELS};
use crate::error::{Error, Result};
use crate::geometry::{Geometry, PixelBounds};
use crate::maxima::{find_maxima, Spot};
use crate::raster::{Mask, Plane};
use crate::region::Region;

/// Processing parameters for one channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelSpec {
    /// Channel name as it appears in the image metadata.
    pub name: String,
    /// LoG scale in physical units.
    pub sigma: f64,
    /// Minimum prominence of an accepted maximum, in response units.
    pub prominence: f32,
}

impl ChannelSpec {
    /// Parameters whose scale is one pixel, expressed in physical units.
    ///
    /// # Errors
    ///
    /// See [`ChannelSpec::with_sigma_pixels`].
    pub fn new(name: impl Into<String>, pixel_size: f64, prominence: f32) -> Result<Self> {
        Self::with_sigma_pixels(name, pixel_size, 1.0, prominence)
    }

    /// Parameters whose scale is `sigma_pixels` pixels, expressed in physical units.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] for a blank name or a non-positive
    /// pixel size, [`Error::InvalidScale`] for a non-positive scale or one
    /// above [`MAX_SIGMA_PIXELS`], and [`Error::InvalidProminence`] for a
    /// negative prominence.
    pub fn with_sigma_pixels(
        name: impl Into<String>,
        pixel_size: f64,
        sigma_pixels: f64,
        prominence: f32,
    ) -> Result<Self> {
        if !(pixel_size.is_finite() && pixel_size > 0.0) {
            return Err(Error::Configuration(format!(
                "pixel size must be > 0, got {pixel_size}"
            )));
        }
        if sigma_pixels > MAX_SIGMA_PIXELS {
            return Err(Error::InvalidScale(sigma_pixels));
        }
        let spec = Self {
            name: name.into(),
            sigma: sigma_pixels * pixel_size,
            prominence,
        };
        spec.validate()?;
        Ok(spec)
    }

    /// Check the parameters without touching any image data.
    ///
    /// # Errors
    ///
    /// Same conditions as [`ChannelSpec::with_sigma_pixels`].
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Configuration("channel name is empty".to_string()));
        }
        if !(self.sigma.is_finite() && self.sigma > 0.0) {
            return Err(Error::InvalidScale(self.sigma));
        }
        if !(self.prominence.is_finite() && self.prominence >= 0.0) {
            return Err(Error::InvalidProminence(self.prominence));
        }
        Ok(())
    }
}

/// A spot in full-image coordinates (pixel centre).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpotPoint {
    /// Horizontal position in pixels.
    pub x: f64,
    /// Vertical position in pixels.
    pub y: f64,
}

/// Outcome of [`detect`] for one region and one channel.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionDetection {
    /// Maxima in the pixel grid of the region crop, in acceptance order.
    pub spots: Vec<Spot>,
    /// The same maxima in full-image coordinates.
    pub points: Vec<SpotPoint>,
    /// Number of spots.
    pub count: usize,
    /// Region area in physical units².
    pub area: f64,
    /// `count / area`, or 0 for an empty region.
    pub density: f64,
    /// Set when the region was skipped (zero area).
    pub warning: Option<String>,
}

impl RegionDetection {
    fn empty(warning: String) -> Self {
        Self {
            spots: Vec::new(),
            points: Vec::new(),
            count: 0,
            area: 0.0,
            density: 0.0,
            warning: Some(warning),
        }
    }
}

/// Region area in physical units².
///
/// # Errors
///
/// Returns [`Error::EmptyRegion`] when the area is zero (or not finite).
pub fn region_area(region: &Region, pixel_size: f64) -> Result<f64> {
    let area = region.geometry.area() * pixel_size * pixel_size;
    if area.is_finite() && area > 0.0 {
        Ok(area)
    } else {
        Err(Error::EmptyRegion {
            label: region.label().to_string(),
        })
    }
}

/// Detect spots of one channel inside one region.
///
/// `channel` may be the whole image or any crop containing the region; its
/// origin locates it in the image. A zero-area region yields zero count and
/// density plus a warning instead of an error.
///
/// # Errors
///
/// Returns [`Error::RegionOutsideImage`] if the region does not overlap
/// `channel`, and propagates parameter errors from the pipeline stages.
pub fn detect(
    region: &Region,
    channel: &Plane,
    spec: &ChannelSpec,
    median_radius: f32,
) -> Result<RegionDetection> {
    match region_area(region, channel.pixel_size) {
        Ok(area) => detect_with_area(region, channel, spec, median_radius, area),
        Err(e @ Error::EmptyRegion { .. }) => {
            log::warn!("{e}; recording zero spots for channel '{}'", spec.name);
            Ok(RegionDetection::empty(e.to_string()))
        }
        Err(e) => Err(e),
    }
}

/// [`detect`] with a precomputed, strictly positive region area, so callers
/// processing several channels compute the area once per region.
///
/// # Errors
///
/// Same as [`detect`].
pub fn detect_with_area(
    region: &Region,
    channel: &Plane,
    spec: &ChannelSpec,
    median_radius: f32,
    area: f64,
) -> Result<RegionDetection> {
    spec.validate()?;
    let (crop, mask) =
        crop_to_region(channel, &region.geometry).ok_or_else(|| Error::RegionOutsideImage {
            label: region.label().to_string(),
        })?;

    let denoised = denoise(&crop, median_radius)?;
    let response = enhance(&denoised, spec.sigma)?;
    let spots = find_maxima(&response, spec.prominence, Some(&mask))?;

    #[allow(clippy::cast_precision_loss)]
    let points = spots
        .iter()
        .map(|s| SpotPoint {
            x: (crop.origin.0 + s.col) as f64 + 0.5,
            y: (crop.origin.1 + s.row) as f64 + 0.5,
        })
        .collect();

    let count = spots.len();
    #[allow(clippy::cast_precision_loss)]
    let density = count as f64 / area;
    log::debug!(
        "region '{}' channel '{}': {count} spots over {area:.3} -> density {density:.5}",
        region.label(),
        spec.name
    );

    Ok(RegionDetection {
        spots,
        points,
        count,
        area,
        density,
        warning: None,
    })
}

/// Cut `plane` down to the bounding box of `geometry` and rasterise the
/// geometry over it. `None` when they do not overlap.
fn crop_to_region(plane: &Plane, geometry: &Geometry) -> Option<(Plane, Mask)> {
    let (ox, oy) = plane.origin;
    let image_bounds = geometry.pixel_bounds(ox + plane.width, oy + plane.height)?;
    let x0 = image_bounds.x.max(ox);
    let y0 = image_bounds.y.max(oy);
    let x1 = image_bounds.x + image_bounds.width;
    let y1 = image_bounds.y + image_bounds.height;
    if x0 >= x1 || y0 >= y1 {
        return None;
    }
    let bounds = PixelBounds {
        x: x0,
        y: y0,
        width: x1 - x0,
        height: y1 - y0,
    };

    let mut data = Vec::with_capacity(bounds.width * bounds.height);
    for y in (y0 - oy)..(y1 - oy) {
        let row = plane.row(y);
        data.extend_from_slice(&row[x0 - ox..x1 - ox]);
    }
    let crop = Plane {
        width: bounds.width,
        height: bounds.height,
        pixel_size: plane.pixel_size,
        origin: (x0, y0),
        data,
    };
    Some((crop, geometry.rasterize(&bounds)))
}

/// Convenience wrapper using the default median radius.
///
/// # Errors
///
/// Same as [`detect`].
pub fn detect_default(region: &Region, channel: &Plane, spec: &ChannelSpec) -> Result<RegionDetection> {
    detect(region, channel, spec, DEFAULT_MEDIAN_RADIUS)
}
