//! Access to the source image.
//!
//! [`ImageAccessor`] is the seam between the detection core and whatever
//! holds the pixels. [`InMemoryImage`] is the stock implementation over a
//! decoded [`image::DynamicImage`].

use std::path::Path;

use image::{DynamicImage, ImageBuffer, Pixel, Rgb};

use crate::error::{Error, Result};
use crate::raster::Raster;
use crate::region::Region;

/// Read access to a multi-channel image.
///
/// Implementations must be shareable across worker threads.
pub trait ImageAccessor: Sync {
    /// Names of the channels the image provides, in order.
    fn channel_names(&self) -> Vec<String>;

    /// Physical length of one pixel side.
    fn pixel_size(&self) -> f64;

    /// Display colour of a channel.
    fn channel_color(&self, name: &str) -> Option<Rgb<u8>>;

    /// Pixels covering the bounding box of `region`, restricted to
    /// `channels`, with the raster origin set to the box's top-left corner.
    ///
    /// # Errors
    ///
    /// [`Error::ChannelNotFound`] for an unknown channel,
    /// [`Error::RegionOutsideImage`] if the region does not overlap the image.
    fn region_raster(&self, region: &Region, channels: &[&str]) -> Result<Raster>;
}

/// Palette cycled for channels without a well-known name.
const PALETTE: [[u8; 3]; 6] = [
    [255, 0, 0],
    [0, 255, 0],
    [0, 128, 255],
    [255, 255, 0],
    [255, 0, 255],
    [0, 255, 255],
];

fn default_color(name: &str, index: usize) -> Rgb<u8> {
    let rgb = match name.to_ascii_lowercase().as_str() {
        "red" => [255, 0, 0],
        "green" => [0, 255, 0],
        "blue" | "dapi" => [0, 0, 255],
        "gray" | "grey" | "alpha" => [255, 255, 255],
        _ => PALETTE[index % PALETTE.len()],
    };
    Rgb(rgb)
}

/// A fully decoded image held in memory.
#[derive(Debug, Clone)]
pub struct InMemoryImage {
    raster: Raster,
    colors: Vec<Rgb<u8>>,
}

impl InMemoryImage {
    /// Wrap a raster, assigning default channel colours.
    #[must_use]
    pub fn new(raster: Raster) -> Self {
        let colors = raster
            .channel_names()
            .iter()
            .enumerate()
            .map(|(i, n)| default_color(n, i))
            .collect();
        Self { raster, colors }
    }

    /// Override the display colour of one channel; unknown names are ignored.
    #[must_use]
    pub fn with_color(mut self, name: &str, color: Rgb<u8>) -> Self {
        if let Some(i) = self.raster.channel_index(name) {
            self.colors[i] = color;
        }
        self
    }

    /// The underlying full-image raster.
    #[must_use]
    pub fn raster(&self) -> &Raster {
        &self.raster
    }

    /// Convert a decoded image, keeping raw sample values (no rescaling).
    ///
    /// Channels are named `Gray`, `Gray`/`Alpha`, `Red`/`Green`/`Blue` or
    /// `Red`/`Green`/`Blue`/`Alpha` unless `names` is given.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if `names` does not match the number
    /// of channels or the pixel size is not positive.
    pub fn from_dynamic_image(
        img: &DynamicImage,
        names: Option<Vec<String>>,
        pixel_size: f64,
    ) -> Result<Self> {
        let planes = match img {
            DynamicImage::ImageLuma8(b) => deinterleave(b),
            DynamicImage::ImageLumaA8(b) => deinterleave(b),
            DynamicImage::ImageRgb8(b) => deinterleave(b),
            DynamicImage::ImageRgba8(b) => deinterleave(b),
            DynamicImage::ImageLuma16(b) => deinterleave(b),
            DynamicImage::ImageLumaA16(b) => deinterleave(b),
            DynamicImage::ImageRgb16(b) => deinterleave(b),
            DynamicImage::ImageRgba16(b) => deinterleave(b),
            DynamicImage::ImageRgb32F(b) => deinterleave(b),
            DynamicImage::ImageRgba32F(b) => deinterleave(b),
            // Future layouts: fall back to float RGBA in [0, 1].
            other => deinterleave(&other.to_rgba32f()),
        };

        let names = names.unwrap_or_else(|| {
            let defaults: &[&str] = match planes.len() {
                1 => &["Gray"],
                2 => &["Gray", "Alpha"],
                3 => &["Red", "Green", "Blue"],
                _ => &["Red", "Green", "Blue", "Alpha"],
            };
            defaults.iter().map(ToString::to_string).collect()
        });

        let raster = Raster::new(
            img.width() as usize,
            img.height() as usize,
            pixel_size,
            names,
            planes,
        )?;
        Ok(Self::new(raster))
    }

    /// Decode an image file from disk.
    ///
    /// # Errors
    ///
    /// Propagates decoding errors and the conditions of
    /// [`InMemoryImage::from_dynamic_image`].
    pub fn open(path: &Path, names: Option<Vec<String>>, pixel_size: f64) -> Result<Self> {
        let img = image::open(path)?;
        log::debug!(
            "loaded {} ({}x{}, {:?})",
            path.display(),
            img.width(),
            img.height(),
            img.color()
        );
        Self::from_dynamic_image(&img, names, pixel_size)
    }
}

/// Split an interleaved buffer into one `f32` plane per channel.
fn deinterleave<P>(buf: &ImageBuffer<P, Vec<P::Subpixel>>) -> Vec<Vec<f32>>
where
    P: Pixel,
    P::Subpixel: Into<f32>,
{
    let n = usize::from(P::CHANNEL_COUNT);
    let raw = buf.as_raw();
    (0..n)
        .map(|c| raw.iter().skip(c).step_by(n).map(|&v| v.into()).collect())
        .collect()
}

impl ImageAccessor for InMemoryImage {
    fn channel_names(&self) -> Vec<String> {
        self.raster.channel_names().to_vec()
    }

    fn pixel_size(&self) -> f64 {
        self.raster.pixel_size()
    }

    fn channel_color(&self, name: &str) -> Option<Rgb<u8>> {
        self.raster.channel_index(name).map(|i| self.colors[i])
    }

    fn region_raster(&self, region: &Region, channels: &[&str]) -> Result<Raster> {
        let indices = channels
            .iter()
            .map(|&name| {
                self.raster
                    .channel_index(name)
                    .ok_or_else(|| Error::ChannelNotFound {
                        name: name.to_string(),
                        available: self.channel_names(),
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        let outside = || Error::RegionOutsideImage {
            label: region.label().to_string(),
        };
        let bounds = region
            .geometry
            .pixel_bounds(self.raster.width(), self.raster.height())
            .ok_or_else(outside)?;
        self.raster.crop(&bounds, &indices).ok_or_else(outside)
    }
}
