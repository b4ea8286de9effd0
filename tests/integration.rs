use std::collections::HashSet;

use image::{DynamicImage, ImageBuffer, Rgb};
use rnascope_spots::{
    detect, enhance, find_maxima, BatchReport, ChannelSpec, Geometry, InMemoryImage, Mask, Plane,
    Region, SpotConfig, SpotEngine,
};

/// Minimal LCG so synthetic noise is reproducible without extra crates.
struct Lcg(u64);

impl Lcg {
    fn next_f32(&mut self) -> f32 {
        self.0 = self
            .0
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        (self.0 >> 40) as f32 / (1u64 << 24) as f32
    }
}

fn bumps(size: usize, centres: &[(f32, f32)], amplitude: f32, sigma: f32) -> Plane {
    let mut p = Plane::new(size, size, 1.0);
    for y in 0..size {
        for x in 0..size {
            let v: f32 = centres
                .iter()
                .map(|&(cx, cy)| {
                    let d2 = (x as f32 - cx).powi(2) + (y as f32 - cy).powi(2);
                    amplitude * (-d2 / (2.0 * sigma * sigma)).exp()
                })
                .sum();
            p.set(x, y, v);
        }
    }
    p
}

fn rect(x: f64, y: f64, w: f64, h: f64) -> Region {
    Region::new(Geometry::Rectangle {
        x,
        y,
        width: w,
        height: h,
    })
}

#[test]
fn single_bump_gives_one_spot_at_its_centre() {
    let plane = bumps(100, &[(50.0, 50.0)], 100.0, 2.0);
    let response = enhance(&plane, 2.0).unwrap();
    let spots = find_maxima(&response, 50.0, None).unwrap();

    assert_eq!(spots.len(), 1, "expected one spot, got {spots:?}");
    assert!(spots[0].row.abs_diff(50) <= 1 && spots[0].col.abs_diff(50) <= 1);
}

#[test]
fn separated_bumps_give_two_spots() {
    let plane = bumps(100, &[(35.0, 50.0), (65.0, 50.0)], 100.0, 2.0);
    let response = enhance(&plane, 2.0).unwrap();
    let spots = find_maxima(&response, 50.0, None).unwrap();

    assert_eq!(spots.len(), 2, "expected two spots, got {spots:?}");
    let mut cols: Vec<usize> = spots.iter().map(|s| s.col).collect();
    cols.sort_unstable();
    assert!(cols[0].abs_diff(35) <= 1 && cols[1].abs_diff(65) <= 1);
    assert!(spots.iter().all(|s| s.row.abs_diff(50) <= 1));
}

#[test]
fn close_bumps_merge_into_one_spot() {
    let plane = bumps(100, &[(48.0, 50.0), (51.0, 50.0)], 100.0, 1.2);
    let (peak, saddle) = (plane.get(48, 50), plane.get(49, 50));
    assert!(peak > saddle && plane.get(51, 50) > plane.get(50, 50));
    assert!(
        (5.0..15.0).contains(&(peak - saddle)),
        "raw profile should dip between the bumps: {peak} vs {saddle}"
    );

    let response = enhance(&plane, 1.0).unwrap();
    let spots = find_maxima(&response, 50.0, None).unwrap();

    assert_eq!(spots.len(), 1, "3 px apart should merge, got {spots:?}");
    assert_eq!(spots[0].row, 50);
    assert!((48..=51).contains(&spots[0].col));
}

#[test]
fn zero_area_region_yields_zero_density_and_warning() {
    let plane = bumps(40, &[(20.0, 20.0)], 100.0, 1.0);
    let spec = ChannelSpec::new("Cy3", 1.0, 10.0).unwrap();
    let region = Region::new(Geometry::Polygon {
        points: vec![[5.0, 5.0], [30.0, 5.0], [15.0, 5.0]],
    });
    let det = detect(&region, &plane, &spec, 1.5).unwrap();

    assert_eq!(det.count, 0);
    assert!(det.density.abs() < f64::EPSILON && !det.density.is_nan());
    assert!(det.warning.is_some());
}

#[test]
fn higher_prominence_returns_a_subset() {
    let mut rng = Lcg(0x5EED);
    let mut plane = Plane::new(64, 64, 1.0);
    plane.data.iter_mut().for_each(|v| *v = 100.0 * rng.next_f32());
    let response = enhance(&plane, 1.0).unwrap();

    let base: HashSet<_> = find_maxima(&response, 0.0, None)
        .unwrap()
        .into_iter()
        .collect();
    assert!(!base.is_empty());
    for p in [1.0, 5.0, 20.0, 50.0, 500.0] {
        let spots = find_maxima(&response, p, None).unwrap();
        assert!(
            spots.iter().all(|s| base.contains(s)),
            "prominence {p} produced a maximum not found at 0"
        );
    }
    assert!(find_maxima(&response, 500.0, None).unwrap().is_empty());
}

#[test]
fn maxima_stay_inside_mask() {
    let mut rng = Lcg(42);
    let mut plane = Plane::new(48, 48, 1.0);
    plane.data.iter_mut().for_each(|v| *v = 50.0 * rng.next_f32());
    let response = enhance(&plane, 1.0).unwrap();

    let disc = Geometry::Ellipse {
        x: 8.0,
        y: 8.0,
        width: 32.0,
        height: 32.0,
    };
    let bounds = disc.pixel_bounds(48, 48).unwrap();
    assert_eq!((bounds.x, bounds.y), (8, 8));
    let local: Mask = disc.rasterize(&bounds);
    let mut mask = Mask::filled(48, 48, false);
    for y in 0..bounds.height {
        for x in 0..bounds.width {
            mask.data[(y + 8) * 48 + x + 8] = local.contains(x, y);
        }
    }

    let spots = find_maxima(&response, 0.0, Some(&mask)).unwrap();
    assert!(!spots.is_empty());
    for s in &spots {
        assert!(mask.contains(s.col, s.row), "{s:?} outside mask");
    }
}

#[test]
fn repeated_runs_are_bit_identical() {
    let mut rng = Lcg(7);
    let mut plane = Plane::new(50, 50, 0.5);
    plane.data.iter_mut().for_each(|v| *v = 30.0 * rng.next_f32());
    let response = enhance(&plane, 0.5).unwrap();
    let a = find_maxima(&response, 3.0, None).unwrap();
    let b = find_maxima(&enhance(&plane, 0.5).unwrap(), 3.0, None).unwrap();
    assert_eq!(a, b);
}

/// 16-bit RGB slide: spots in red, a different set in green, flat blue.
fn slide() -> InMemoryImage {
    let red = [(12.0, 12.0), (30.0, 40.0), (70.0, 20.0), (85.0, 50.0)];
    let green = [(20.0, 50.0), (60.0, 45.0)];
    let value = |x: u32, y: u32, centres: &[(f32, f32)]| -> u16 {
        let v: f32 = centres
            .iter()
            .map(|&(cx, cy)| {
                let d2 = (x as f32 - cx).powi(2) + (y as f32 - cy).powi(2);
                1200.0 * (-d2 / 2.0).exp()
            })
            .sum();
        (1000.0 + v).round() as u16
    };
    let img = ImageBuffer::from_fn(100, 64, |x, y| {
        Rgb([value(x, y, &red), value(x, y, &green), 1000])
    });
    InMemoryImage::from_dynamic_image(&DynamicImage::ImageRgb16(img), None, 0.5).unwrap()
}

fn slide_regions() -> Vec<Region> {
    serde_json::from_str(
        r#"[
            {"classification": "Tumor",
             "geometry": {"type": "rectangle", "x": 0, "y": 0, "width": 50, "height": 64}},
            {"classification": "Stroma",
             "geometry": {"type": "polygon", "points": [[50, 0], [100, 0], [100, 64], [50, 64]]}},
            {"geometry": {"type": "ellipse", "x": 2, "y": 2, "width": 20, "height": 20}}
        ]"#,
    )
    .unwrap()
}

fn run_slide() -> (Vec<Region>, BatchReport) {
    let _ = env_logger::builder().is_test(true).try_init();
    let image = slide();
    let config = SpotConfig {
        base_class: Some("Tissue".to_string()),
        ..SpotConfig::new([("Red", 250.0), ("Green", 250.0), ("Blue", 250.0)])
    };
    let engine = SpotEngine::new(&config, &image).unwrap();
    let mut regions = slide_regions();
    let report = engine.run_and_apply(&mut regions, &image).unwrap();
    (regions, report)
}

#[test]
fn batch_counts_and_writes_measurements() {
    let (regions, report) = run_slide();

    let spots = |i: usize, ch: &str| regions[i].measurements[&format!("RNAScope {ch} Spots")];
    assert!((spots(0, "Red") - 2.0).abs() < f64::EPSILON);
    assert!((spots(0, "Green") - 1.0).abs() < f64::EPSILON);
    assert!((spots(1, "Red") - 2.0).abs() < f64::EPSILON);
    assert!((spots(1, "Green") - 1.0).abs() < f64::EPSILON);
    assert!(spots(0, "Blue").abs() < f64::EPSILON);
    assert!((spots(2, "Red") - 1.0).abs() < f64::EPSILON);

    assert!(report.warnings.is_empty(), "{:?}", report.warnings);
    assert_eq!(
        report.unit(2, "Red").unwrap().spots.classification,
        "Tissue RNAScope Red"
    );
    assert_eq!(report.unit(1, "Green").unwrap().spots.color, [0, 255, 0]);
}

#[test]
fn density_is_count_over_shared_area() {
    let (regions, report) = run_slide();
    assert!((report.areas[0] - 50.0 * 64.0 * 0.25).abs() < 1e-9);

    for (i, region) in regions.iter().enumerate() {
        let area = report.areas[i];
        for ch in ["Red", "Green", "Blue"] {
            let count = region.measurements[&format!("RNAScope {ch} Spots")];
            let density = region.measurements[&format!("RNAScope {ch} Density")];
            assert_eq!(density, count / area, "region {i} channel {ch}");
        }
    }
}

#[test]
fn reported_points_lie_in_their_region() {
    let (regions, report) = run_slide();
    for unit in &report.units {
        let geometry = &regions[unit.region].geometry;
        for p in &unit.spots.points {
            assert!(geometry.contains(p.x, p.y), "{p:?} outside region {}", unit.region);
        }
    }
}

#[test]
fn batch_is_deterministic() {
    let (_, first) = run_slide();
    let (_, second) = run_slide();
    assert_eq!(first, second);
}

#[test]
fn rerun_replaces_previous_measurements() {
    let image = slide();
    let mut regions = slide_regions();

    let both = SpotEngine::new(&SpotConfig::new([("Red", 250.0), ("Green", 250.0)]), &image).unwrap();
    both.run_and_apply(&mut regions, &image).unwrap();
    assert!(regions[0].measurements.contains_key("RNAScope Green Spots"));

    let red_only = SpotEngine::new(&SpotConfig::new([("Red", 250.0)]), &image).unwrap();
    red_only.run_and_apply(&mut regions, &image).unwrap();
    assert!(!regions[0].measurements.contains_key("RNAScope Green Spots"));
    assert_eq!(regions[0].measurements.len(), 2);
}

#[test]
fn rect_region_against_full_plane_matches_engine() {
    let image = slide();
    let raster = image.raster();
    let red = Plane::from_vec(
        raster.width(),
        raster.height(),
        raster.pixel_size(),
        raster.channel_data(0).to_vec(),
    )
    .unwrap();
    let spec = ChannelSpec::new("Red", 0.5, 250.0).unwrap();
    let det = detect(&rect(0.0, 0.0, 50.0, 64.0), &red, &spec, 1.5).unwrap();

    let (_, report) = run_slide();
    let unit = report.unit(0, "Red").unwrap();
    assert_eq!(det.count, unit.count);
    assert_eq!(det.points, unit.spots.points);
}
