//! Run configuration: which channels to count and how strictly.
//!
//! ```json
//! {
//!   "channels": ["Opal 570", "Opal 690"],
//!   "prominences": [40.0, 25.0],
//!   "denoise_radius": 1.5,
//!   "sigma_pixels": 1.0,
//!   "base_class": "Tissue"
//! }
//! ```
//!
//! Everything except `channels` and `prominences` has a default.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::denoise::DEFAULT_MEDIAN_RADIUS;
use crate::detection::ChannelSpec;
use crate::enhance::MAX_SIGMA_PIXELS;
use crate::error::{Error, Result};

fn default_denoise_radius() -> f32 {
    DEFAULT_MEDIAN_RADIUS
}

fn default_sigma_pixels() -> f64 {
    1.0
}

/// Spot-counting parameters shared by every region of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpotConfig {
    /// Channel names, in processing order.
    pub channels: Vec<String>,
    /// Prominence threshold per channel, parallel to `channels`.
    pub prominences: Vec<f32>,
    /// Median filter radius in pixels.
    #[serde(default = "default_denoise_radius")]
    pub denoise_radius: f32,
    /// LoG scale in pixels; converted to physical units per image.
    #[serde(default = "default_sigma_pixels")]
    pub sigma_pixels: f64,
    /// Classification used for spot collections of unclassified regions.
    #[serde(default)]
    pub base_class: Option<String>,
}

impl Default for SpotConfig {
    fn default() -> Self {
        Self {
            channels: Vec::new(),
            prominences: Vec::new(),
            denoise_radius: DEFAULT_MEDIAN_RADIUS,
            sigma_pixels: default_sigma_pixels(),
            base_class: None,
        }
    }
}

impl SpotConfig {
    /// Configuration for the given channel/prominence pairs with defaults
    /// for everything else.
    #[must_use]
    pub fn new<S: Into<String>>(pairs: impl IntoIterator<Item = (S, f32)>) -> Self {
        let (channels, prominences) = pairs.into_iter().map(|(c, p)| (c.into(), p)).unzip();
        Self {
            channels,
            prominences,
            ..Self::default()
        }
    }

    /// Validate the whole configuration and build one [`ChannelSpec`] per
    /// channel for an image with the given pixel size.
    ///
    /// # Errors
    ///
    /// - [`Error::Configuration`]: no channels, list lengths differ, a blank
    ///   or repeated channel name, non-positive pixel size.
    /// - [`Error::InvalidProminence`]: negative or non-finite prominence.
    /// - [`Error::InvalidScale`]: non-positive `sigma_pixels`, or one above
    ///   [`MAX_SIGMA_PIXELS`].
    /// - [`Error::InvalidRadius`]: non-positive `denoise_radius`.
    pub fn channel_specs(&self, pixel_size: f64) -> Result<Vec<ChannelSpec>> {
        if self.channels.is_empty() {
            return Err(Error::Configuration("no channels configured".to_string()));
        }
        if self.channels.len() != self.prominences.len() {
            return Err(Error::Configuration(format!(
                "{} channels but {} prominences",
                self.channels.len(),
                self.prominences.len()
            )));
        }
        if !(self.denoise_radius.is_finite() && self.denoise_radius > 0.0) {
            return Err(Error::InvalidRadius(self.denoise_radius));
        }
        if !(self.sigma_pixels.is_finite()
            && self.sigma_pixels > 0.0
            && self.sigma_pixels <= MAX_SIGMA_PIXELS)
        {
            return Err(Error::InvalidScale(self.sigma_pixels));
        }

        let mut seen = HashSet::new();
        for name in &self.channels {
            if !seen.insert(name.as_str()) {
                return Err(Error::Configuration(format!(
                    "channel '{name}' is listed more than once"
                )));
            }
        }

        self.channels
            .iter()
            .zip(&self.prominences)
            .map(|(name, &p)| {
                ChannelSpec::with_sigma_pixels(name.as_str(), pixel_size, self.sigma_pixels, p)
            })
            .collect()
    }
}

/// Read a [`SpotConfig`] from a JSON file.
///
/// # Errors
///
/// Returns [`Error::Io`] if the file cannot be read and [`Error::Json`] if it
/// does not parse.
pub fn load_config(path: &Path) -> Result<SpotConfig> {
    let contents = fs::read_to_string(path)?;
    let config: SpotConfig = serde_json::from_str(&contents)?;
    log::debug!(
        "loaded config {} ({} channels)",
        path.display(),
        config.channels.len()
    );
    Ok(config)
}
