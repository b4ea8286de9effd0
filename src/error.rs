//! Error types for the rnascope-spots crate.

/// Errors that can occur while configuring or running spot detection.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A configured channel is not present in the image's channel metadata.
    #[error("channel '{name}' not found (available: {})", available.join(", "))]
    ChannelNotFound {
        /// The requested channel name.
        name: String,
        /// Channel names the image actually provides.
        available: Vec<String>,
    },

    /// The enhancement scale is not strictly positive (or not finite).
    #[error("invalid LoG scale: sigma must be > 0, got {0}")]
    InvalidScale(f64),

    /// The prominence threshold is negative (or not finite).
    #[error("invalid prominence: must be >= 0, got {0}")]
    InvalidProminence(f32),

    /// The median filter radius is not strictly positive (or not finite).
    #[error("invalid median radius: must be > 0, got {0}")]
    InvalidRadius(f32),

    /// The caller-supplied configuration is inconsistent.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The region geometry has zero area.
    #[error("region '{label}' has zero area")]
    EmptyRegion {
        /// Classification label of the offending region.
        label: String,
    },

    /// The region does not overlap the image.
    #[error("region '{label}' lies outside the image")]
    RegionOutsideImage {
        /// Classification label of the offending region.
        label: String,
    },

    /// Two buffers that must share dimensions do not.
    #[error("dimension mismatch: expected {expected_width}x{expected_height}, got {width}x{height}")]
    DimensionMismatch {
        /// Expected width in pixels.
        expected_width: usize,
        /// Expected height in pixels.
        expected_height: usize,
        /// Actual width in pixels.
        width: usize,
        /// Actual height in pixels.
        height: usize,
    },

    /// The batch was cancelled between two units of work.
    #[error("batch cancelled")]
    Cancelled,

    /// An I/O error occurred while reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An error occurred while decoding an image.
    #[error("image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// A JSON document could not be parsed or written.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Whether the error aborts a whole batch.
    ///
    /// Region-level problems (empty or out-of-image geometry) are reported as
    /// warnings and the batch moves on to the next region.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Error::EmptyRegion { .. } | Error::RegionOutsideImage { .. }
        )
    }
}

/// A specialized `Result` type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
