//! Batch spot counting over every region and channel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;

use crate::accessor::ImageAccessor;
use crate::channel;
use crate::config::SpotConfig;
use crate::denoise::DEFAULT_MEDIAN_RADIUS;
use crate::enhance::MAX_SIGMA_PIXELS;
use crate::detection::{detect_with_area, region_area, ChannelSpec, SpotPoint};
use crate::error::{Error, Result};
use crate::region::{density_key, spots_key, Region, RegionSource, MEASUREMENT_PREFIX};

/// Shared flag for stopping a running batch between units of work.
///
/// Clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// A token that has not been cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Units already running finish.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Options that apply to every unit of a batch.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Median filter radius in pixels.
    pub median_radius: f32,
    /// Classification used for spot collections of unclassified regions.
    pub base_class: Option<String>,
    /// Checked before each region and each (region, channel) unit.
    pub cancel: CancelToken,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            median_radius: DEFAULT_MEDIAN_RADIUS,
            base_class: None,
            cancel: CancelToken::new(),
        }
    }
}

/// Detected spots of one region and channel, ready to hand back to the
/// application as a point collection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpotCollection {
    /// `"<base-class> RNAScope <channel>"`.
    pub classification: String,
    /// Display colour of the channel as `[r, g, b]`.
    pub color: [u8; 3],
    /// Spot centres in full-image pixel coordinates.
    pub points: Vec<SpotPoint>,
}

/// Result of one (region, channel) unit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnitResult {
    /// Index of the region in the source.
    pub region: usize,
    /// Channel name.
    pub channel: String,
    /// Spot count.
    pub count: usize,
    /// Spots per physical unit².
    pub density: f64,
    /// The spots themselves.
    pub spots: SpotCollection,
}

/// A non-fatal problem that skipped a region, or one channel of it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Warning {
    /// Index of the region in the source.
    pub region: usize,
    /// Affected channel.
    pub channel: String,
    /// Human-readable description.
    pub message: String,
}

/// Everything a batch produced, in region-major, channel-minor order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchReport {
    /// One entry per unit that produced measurements.
    pub units: Vec<UnitResult>,
    /// Physical area of each region, indexed like the source.
    pub areas: Vec<f64>,
    /// Per-region warnings.
    pub warnings: Vec<Warning>,
}

impl BatchReport {
    /// Write the count and density of every unit into its region's
    /// measurement map.
    ///
    /// Units whose region index is out of range are ignored.
    pub fn apply(&self, regions: &mut [Region]) {
        for unit in &self.units {
            let Some(region) = regions.get_mut(unit.region) else {
                continue;
            };
            #[allow(clippy::cast_precision_loss)]
            let count = unit.count as f64;
            region.measurements.insert(spots_key(&unit.channel), count);
            region
                .measurements
                .insert(density_key(&unit.channel), unit.density);
        }
    }

    /// Result for one region and channel.
    #[must_use]
    pub fn unit(&self, region: usize, channel: &str) -> Option<&UnitResult> {
        self.units
            .iter()
            .find(|u| u.region == region && u.channel == channel)
    }

    /// Total number of spots over all units.
    #[must_use]
    pub fn total_spots(&self) -> usize {
        self.units.iter().map(|u| u.count).sum()
    }
}

/// Everything one region contributed.
struct RegionOutcome {
    area: f64,
    units: Vec<UnitResult>,
    warnings: Vec<Warning>,
}

/// Runs detection for every region × channel of an image.
///
/// Create once per image with [`SpotEngine::new`]; all parameters are
/// validated there so a bad configuration fails before any pixels are read.
#[derive(Debug, Clone)]
pub struct SpotEngine {
    specs: Vec<ChannelSpec>,
    options: RunOptions,
}

impl SpotEngine {
    /// Build an engine from a configuration for the given image.
    ///
    /// # Errors
    ///
    /// Any validation error of [`SpotConfig::channel_specs`], and
    /// [`Error::ChannelNotFound`] if a configured channel is not in the image.
    pub fn new<A: ImageAccessor + ?Sized>(config: &SpotConfig, accessor: &A) -> Result<Self> {
        let specs = config.channel_specs(accessor.pixel_size())?;
        let options = RunOptions {
            median_radius: config.denoise_radius,
            base_class: config.base_class.clone(),
            ..RunOptions::default()
        };
        Self::with_options(specs, options, accessor)
    }

    /// Build an engine from ready-made channel specs.
    ///
    /// # Errors
    ///
    /// [`Error::Configuration`] for an empty or duplicated channel list,
    /// [`Error::InvalidRadius`] for a bad median radius, any
    /// [`ChannelSpec::validate`] error, [`Error::InvalidScale`] for a scale
    /// above [`MAX_SIGMA_PIXELS`] at the image's pixel size, and
    /// [`Error::ChannelNotFound`].
    pub fn with_options<A: ImageAccessor + ?Sized>(
        specs: Vec<ChannelSpec>,
        options: RunOptions,
        accessor: &A,
    ) -> Result<Self> {
        if specs.is_empty() {
            return Err(Error::Configuration("no channels configured".to_string()));
        }
        if !(options.median_radius.is_finite() && options.median_radius > 0.0) {
            return Err(Error::InvalidRadius(options.median_radius));
        }
        let pixel_size = accessor.pixel_size();
        for (i, spec) in specs.iter().enumerate() {
            spec.validate()?;
            let sigma_px = spec.sigma / pixel_size;
            if !(sigma_px.is_finite() && sigma_px <= MAX_SIGMA_PIXELS) {
                return Err(Error::InvalidScale(sigma_px));
            }
            if specs[..i].iter().any(|s| s.name == spec.name) {
                return Err(Error::Configuration(format!(
                    "channel '{}' is listed more than once",
                    spec.name
                )));
            }
        }
        let engine = Self { specs, options };
        engine.check_channels(accessor)?;
        Ok(engine)
    }

    /// Replace the cancellation token.
    #[must_use]
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.options.cancel = token;
        self
    }

    /// A handle that cancels this engine's batches.
    #[must_use]
    pub fn cancel_token(&self) -> CancelToken {
        self.options.cancel.clone()
    }

    /// The validated channel specs, in processing order.
    #[must_use]
    pub fn specs(&self) -> &[ChannelSpec] {
        &self.specs
    }

    /// Options applied to every unit.
    #[must_use]
    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    fn check_channels<A: ImageAccessor + ?Sized>(&self, accessor: &A) -> Result<()> {
        let available = accessor.channel_names();
        for spec in &self.specs {
            if !available.contains(&spec.name) {
                return Err(Error::ChannelNotFound {
                    name: spec.name.clone(),
                    available,
                });
            }
        }
        Ok(())
    }

    /// Count spots for every region and channel.
    ///
    /// Regions are not modified; pass the report to [`BatchReport::apply`]
    /// (or use [`SpotEngine::run_and_apply`]) to record measurements.
    ///
    /// Uses parallel iteration when the `parallel` feature is enabled (via
    /// rayon). The report order is the same either way.
    ///
    /// # Errors
    ///
    /// Fatal errors ([`Error::is_fatal`]) abort the batch, including
    /// [`Error::Cancelled`]. Non-fatal ones become [`Warning`]s.
    pub fn run_all<S, A>(&self, source: &S, accessor: &A) -> Result<BatchReport>
    where
        S: RegionSource + ?Sized,
        A: ImageAccessor + ?Sized,
    {
        self.check_channels(accessor)?;
        let regions = source.regions();
        let pixel_size = accessor.pixel_size();

        let outcomes = map_indexed(regions.len(), |i| {
            self.run_region(i, &regions[i], accessor, pixel_size)
        })?;

        let mut report = BatchReport::default();
        for outcome in outcomes {
            report.areas.push(outcome.area);
            report.units.extend(outcome.units);
            report.warnings.extend(outcome.warnings);
        }
        log::info!(
            "{} regions x {} channels: {} spots, {} warnings",
            regions.len(),
            self.specs.len(),
            report.total_spots(),
            report.warnings.len()
        );
        Ok(report)
    }

    /// Clear measurements from earlier runs, count spots and record the
    /// new measurements on the regions.
    ///
    /// Regions are only modified once the whole batch has succeeded.
    ///
    /// # Errors
    ///
    /// Same as [`SpotEngine::run_all`].
    pub fn run_and_apply<S, A>(&self, source: &mut S, accessor: &A) -> Result<BatchReport>
    where
        S: RegionSource + ?Sized,
        A: ImageAccessor + ?Sized,
    {
        let report = self.run_all(&*source, accessor)?;
        let regions = source.regions_mut();
        for region in regions.iter_mut() {
            region.clear_spot_measurements();
        }
        report.apply(regions);
        Ok(report)
    }

    fn run_region<A: ImageAccessor + ?Sized>(
        &self,
        index: usize,
        region: &Region,
        accessor: &A,
        pixel_size: f64,
    ) -> Result<RegionOutcome> {
        if self.options.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let area = match region_area(region, pixel_size) {
            Ok(area) => area,
            Err(e @ Error::EmptyRegion { .. }) => {
                log::warn!("{e}; recording zero spots");
                return Ok(self.empty_region(index, region, accessor, &e));
            }
            Err(e) => return Err(e),
        };

        let names: Vec<&str> = self.specs.iter().map(|s| s.name.as_str()).collect();
        let raster = match accessor.region_raster(region, &names) {
            Ok(raster) => raster,
            Err(e) if !e.is_fatal() => {
                log::warn!("{e}; skipping region");
                return Ok(RegionOutcome {
                    area,
                    units: Vec::new(),
                    warnings: self.warn_all(index, &e),
                });
            }
            Err(e) => return Err(e),
        };

        let results = map_indexed(self.specs.len(), |c| {
            if self.options.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let spec = &self.specs[c];
            let plane = channel::extract(&raster, &spec.name)?;
            match detect_with_area(region, &plane, spec, self.options.median_radius, area) {
                Ok(det) => Ok(Ok(UnitResult {
                    region: index,
                    channel: spec.name.clone(),
                    count: det.count,
                    density: det.density,
                    spots: self.collection(region, spec, accessor, det.points),
                })),
                Err(e) if !e.is_fatal() => {
                    log::warn!("{e}; channel '{}' skipped", spec.name);
                    Ok(Err(Warning {
                        region: index,
                        channel: spec.name.clone(),
                        message: e.to_string(),
                    }))
                }
                Err(e) => Err(e),
            }
        })?;

        let mut outcome = RegionOutcome {
            area,
            units: Vec::new(),
            warnings: Vec::new(),
        };
        for result in results {
            match result {
                Ok(unit) => outcome.units.push(unit),
                Err(warning) => outcome.warnings.push(warning),
            }
        }
        Ok(outcome)
    }

    /// Zero count and density for every channel, plus one warning each.
    fn empty_region<A: ImageAccessor + ?Sized>(
        &self,
        index: usize,
        region: &Region,
        accessor: &A,
        cause: &Error,
    ) -> RegionOutcome {
        let units = self
            .specs
            .iter()
            .map(|spec| UnitResult {
                region: index,
                channel: spec.name.clone(),
                count: 0,
                density: 0.0,
                spots: self.collection(region, spec, accessor, Vec::new()),
            })
            .collect();
        RegionOutcome {
            area: 0.0,
            units,
            warnings: self.warn_all(index, cause),
        }
    }

    fn warn_all(&self, index: usize, cause: &Error) -> Vec<Warning> {
        self.specs
            .iter()
            .map(|spec| Warning {
                region: index,
                channel: spec.name.clone(),
                message: cause.to_string(),
            })
            .collect()
    }

    fn collection<A: ImageAccessor + ?Sized>(
        &self,
        region: &Region,
        spec: &ChannelSpec,
        accessor: &A,
        points: Vec<SpotPoint>,
    ) -> SpotCollection {
        let base = region
            .classification
            .as_deref()
            .or(self.options.base_class.as_deref())
            .unwrap_or("Unclassified");
        let color = accessor
            .channel_color(&spec.name)
            .map_or([255, 255, 255], |c| c.0);
        SpotCollection {
            classification: format!("{base} {MEASUREMENT_PREFIX} {}", spec.name),
            color,
            points,
        }
    }
}

/// Evaluate `f(0..n)` and collect the results in index order, stopping at
/// the first error.
fn map_indexed<R, F>(n: usize, f: F) -> Result<Vec<R>>
where
    R: Send,
    F: Fn(usize) -> Result<R> + Sync + Send,
{
    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;
        (0..n).into_par_iter().map(f).collect()
    }

    #[cfg(not(feature = "parallel"))]
    {
        (0..n).map(f).collect()
    }
}
