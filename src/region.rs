//! Operator-defined regions of interest and their measurement maps.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::geometry::Geometry;

/// Prefix shared by every measurement and classification this crate writes.
pub const MEASUREMENT_PREFIX: &str = "RNAScope";

/// Measurement key for the spot count of `channel`.
#[must_use]
pub fn spots_key(channel: &str) -> String {
    format!("{MEASUREMENT_PREFIX} {channel} Spots")
}

/// Measurement key for the spot density of `channel`.
#[must_use]
pub fn density_key(channel: &str) -> String {
    format!("{MEASUREMENT_PREFIX} {channel} Density")
}

/// A region of interest: geometry, classification and measurements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    /// Classification label, e.g. `"Tumor"`.
    #[serde(default)]
    pub classification: Option<String>,
    /// Shape in full-image pixel coordinates.
    pub geometry: Geometry,
    /// Named numeric measurements.
    #[serde(default)]
    pub measurements: BTreeMap<String, f64>,
}

impl Region {
    /// Unclassified region with no measurements.
    #[must_use]
    pub fn new(geometry: Geometry) -> Self {
        Self {
            classification: None,
            geometry,
            measurements: BTreeMap::new(),
        }
    }

    /// Set the classification label.
    #[must_use]
    pub fn with_classification(mut self, classification: impl Into<String>) -> Self {
        self.classification = Some(classification.into());
        self
    }

    /// Label used in log messages and warnings.
    #[must_use]
    pub fn label(&self) -> &str {
        self.classification.as_deref().unwrap_or("Unclassified")
    }

    /// Drop every measurement written by a previous spot-counting run.
    pub fn clear_spot_measurements(&mut self) {
        self.measurements
            .retain(|k, _| !k.starts_with(MEASUREMENT_PREFIX));
    }
}

/// Supplier of the regions to analyse.
///
/// Regions are only read for geometry and written for measurements; the
/// source owns them.
pub trait RegionSource {
    /// All regions, in a stable order.
    fn regions(&self) -> &[Region];

    /// Mutable access for writing measurements back.
    fn regions_mut(&mut self) -> &mut [Region];
}

impl RegionSource for Vec<Region> {
    fn regions(&self) -> &[Region] {
        self
    }

    fn regions_mut(&mut self) -> &mut [Region] {
        self
    }
}
