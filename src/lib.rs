//! Count RNAScope spots per region and per channel.
//!
//! RNAScope in-situ hybridisation shows single transcripts as diffraction-
//! limited bright dots. For every operator-drawn region and every configured
//! fluorescence channel this crate
//!
//! 1. extracts the channel and crops it to the region,
//! 2. suppresses shot noise with a circular median filter,
//! 3. enhances blobs with a Laplacian of Gaussian at ~1 pixel scale,
//! 4. keeps local maxima that stand out from their surroundings by at least
//!    a per-channel prominence,
//!
//! and reports the spot count and the density (spots per physical area).
//!
//! # Quick Start
//!
//! ```no_run
//! use rnascope_spots::{InMemoryImage, Region, SpotConfig, SpotEngine};
//!
//! # fn main() -> rnascope_spots::Result<()> {
//! let image = InMemoryImage::open("slide.tif".as_ref(), None, 0.325)?;
//! let mut regions: Vec<Region> =
//!     serde_json::from_str(&std::fs::read_to_string("regions.json")?)?;
//!
//! let config = SpotConfig::new([("Red", 40.0), ("Green", 25.0)]);
//! let engine = SpotEngine::new(&config, &image)?;
//! let report = engine.run_and_apply(&mut regions, &image)?;
//! println!("{} spots", report.total_spots());
//! # Ok(())
//! # }
//! ```
//!
//! # Building blocks
//!
//! Each stage is usable on its own:
//!
//! ```
//! use rnascope_spots::{enhance, find_maxima, Plane};
//!
//! let mut plane = Plane::new(32, 32, 1.0);
//! for y in 0..32 {
//!     for x in 0..32 {
//!         let d2 = (x as f32 - 16.0).powi(2) + (y as f32 - 16.0).powi(2);
//!         plane.set(x, y, 100.0 * (-d2 / 8.0).exp());
//!     }
//! }
//! let response = enhance(&plane, 2.0).unwrap();
//! let spots = find_maxima(&response, 50.0, None).unwrap();
//! assert_eq!(spots.len(), 1);
//! ```

#![deny(missing_docs)]

pub mod accessor;
pub mod channel;
pub mod config;
pub mod denoise;
pub mod detection;
mod engine;
pub mod enhance;
pub mod error;
pub mod geometry;
pub mod maxima;
pub mod raster;
pub mod region;

pub use accessor::{ImageAccessor, InMemoryImage};
pub use config::{load_config, SpotConfig};
pub use denoise::denoise;
pub use detection::{detect, ChannelSpec, RegionDetection, SpotPoint};
pub use engine::{
    BatchReport, CancelToken, RunOptions, SpotCollection, SpotEngine, UnitResult, Warning,
};
pub use enhance::enhance;
pub use error::{Error, Result};
pub use geometry::Geometry;
pub use maxima::{find_maxima, Spot};
pub use raster::{Mask, Plane, Raster};
pub use region::{Region, RegionSource};
