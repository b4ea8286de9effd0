//! Count spots in a synthetic two-channel image.
//!
//! Usage:
//! ```sh
//! cargo run --example count_spots
//! cargo run --example count_spots -- 40
//! ```
//! The optional argument is the prominence used for both channels.

use std::env;
use std::process;

use rnascope_spots::{Geometry, InMemoryImage, Raster, Region, SpotConfig, SpotEngine};

const WIDTH: usize = 120;
const HEIGHT: usize = 80;

fn channel(centres: &[(f32, f32)]) -> Vec<f32> {
    let mut data = vec![8.0_f32; WIDTH * HEIGHT];
    for (i, v) in data.iter_mut().enumerate() {
        let (x, y) = ((i % WIDTH) as f32, (i / WIDTH) as f32);
        for &(cx, cy) in centres {
            let d2 = (x - cx).powi(2) + (y - cy).powi(2);
            *v += 150.0 * (-d2 / 2.0).exp();
        }
    }
    data
}

fn main() {
    let prominence: f32 = match env::args().nth(1).map(|s| s.parse()) {
        None => 25.0,
        Some(Ok(p)) => p,
        Some(Err(e)) => {
            eprintln!("Error: invalid prominence: {e}");
            process::exit(1);
        }
    };

    let opal570 = channel(&[(15.0, 20.0), (40.0, 55.0), (90.0, 30.0)]);
    let opal690 = channel(&[(25.0, 40.0), (80.0, 60.0), (100.0, 15.0), (70.0, 25.0)]);
    let raster = match Raster::new(
        WIDTH,
        HEIGHT,
        0.325,
        vec!["Opal 570".to_string(), "Opal 690".to_string()],
        vec![opal570, opal690],
    ) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };
    let image = InMemoryImage::new(raster);

    let mut regions = vec![
        Region::new(Geometry::Rectangle {
            x: 0.0,
            y: 0.0,
            width: 60.0,
            height: 80.0,
        })
        .with_classification("Tumor"),
        Region::new(Geometry::Ellipse {
            x: 60.0,
            y: 0.0,
            width: 60.0,
            height: 80.0,
        })
        .with_classification("Stroma"),
    ];

    let config = SpotConfig::new([("Opal 570", prominence), ("Opal 690", prominence)]);
    let result = SpotEngine::new(&config, &image)
        .and_then(|engine| engine.run_and_apply(&mut regions, &image));
    let report = match result {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };

    for region in &regions {
        println!("{}", region.label());
        for (key, value) in &region.measurements {
            println!("  {key}: {value:.4}");
        }
    }
    for w in &report.warnings {
        eprintln!("warning: region #{} {}: {}", w.region, w.channel, w.message);
    }
    println!("{} spots total", report.total_spots());
}
