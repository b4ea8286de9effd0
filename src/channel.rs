//! Single-channel extraction from a multi-channel [`Raster`].

use crate::error::{Error, Result};
use crate::raster::{Plane, Raster};

/// Copy the channel called `name` out of `raster`.
///
/// The returned plane keeps the raster's pixel size and origin.
///
/// # Errors
///
/// Returns [`Error::ChannelNotFound`] if `name` is not one of the raster's
/// channels.
pub fn extract(raster: &Raster, name: &str) -> Result<Plane> {
    let index = raster
        .channel_index(name)
        .ok_or_else(|| Error::ChannelNotFound {
            name: name.to_string(),
            available: raster.channel_names().to_vec(),
        })?;

    let mut plane = Plane::from_vec(
        raster.width(),
        raster.height(),
        raster.pixel_size(),
        raster.channel_data(index).to_vec(),
    )?;
    plane.origin = raster.origin();
    Ok(plane)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raster() -> Raster {
        Raster::new(
            2,
            2,
            0.25,
            vec!["DAPI".into(), "Opal 570".into()],
            vec![vec![1.0, 2.0, 3.0, 4.0], vec![10.0, 20.0, 30.0, 40.0]],
        )
        .unwrap()
        .with_origin(5, 7)
    }

    #[test]
    fn extract_returns_named_channel() {
        let plane = extract(&raster(), "Opal 570").unwrap();
        assert_eq!(plane.data, vec![10.0, 20.0, 30.0, 40.0]);
        assert_eq!(plane.origin, (5, 7));
        assert!((plane.pixel_size - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn extract_unknown_channel_lists_available() {
        match extract(&raster(), "Cy5") {
            Err(Error::ChannelNotFound { name, available }) => {
                assert_eq!(name, "Cy5");
                assert_eq!(available, vec!["DAPI".to_string(), "Opal 570".to_string()]);
            }
            other => panic!("expected ChannelNotFound, got {other:?}"),
        }
    }
}
