//! Region shapes in full-image pixel coordinates.
//!
//! Pixel `(c, r)` covers `[c, c+1) × [r, r+1)`. A pixel belongs to a shape's
//! mask iff its centre `(c + 0.5, r + 0.5)` is inside the shape, so
//! [`Geometry::contains`] and [`Geometry::rasterize`] always agree.

use serde::{Deserialize, Serialize};

use crate::raster::Mask;

/// Integer pixel window, already clipped to an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelBounds {
    /// Left column.
    pub x: usize,
    /// Top row.
    pub y: usize,
    /// Width in pixels.
    pub width: usize,
    /// Height in pixels.
    pub height: usize,
}

/// Operator-drawn region shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Geometry {
    /// Axis-aligned rectangle.
    Rectangle {
        /// Left edge.
        x: f64,
        /// Top edge.
        y: f64,
        /// Width in pixels.
        width: f64,
        /// Height in pixels.
        height: f64,
    },
    /// Axis-aligned ellipse inscribed in the given box.
    Ellipse {
        /// Left edge of the bounding box.
        x: f64,
        /// Top edge of the bounding box.
        y: f64,
        /// Width of the bounding box.
        width: f64,
        /// Height of the bounding box.
        height: f64,
    },
    /// Simple or self-intersecting polygon (even-odd fill).
    Polygon {
        /// Vertices `[x, y]`; the closing edge is implicit.
        points: Vec<[f64; 2]>,
    },
}

impl Geometry {
    /// Area in pixels².
    #[must_use]
    pub fn area(&self) -> f64 {
        match self {
            Geometry::Rectangle { width, height, .. } => (width * height).abs(),
            Geometry::Ellipse { width, height, .. } => {
                std::f64::consts::PI * (width * 0.5).abs() * (height * 0.5).abs()
            }
            Geometry::Polygon { points } => {
                if points.len() < 3 {
                    return 0.0;
                }
                let mut twice = 0.0;
                for (i, p) in points.iter().enumerate() {
                    let q = points[(i + 1) % points.len()];
                    twice += p[0] * q[1] - q[0] * p[1];
                }
                (twice * 0.5).abs()
            }
        }
    }

    /// Whether the point `(px, py)` lies inside the shape.
    #[must_use]
    pub fn contains(&self, px: f64, py: f64) -> bool {
        match self {
            Geometry::Rectangle {
                x,
                y,
                width,
                height,
            } => {
                let (x0, y0, x1, y1) = corners(*x, *y, *width, *height);
                px >= x0 && px < x1 && py >= y0 && py < y1
            }
            Geometry::Ellipse {
                x,
                y,
                width,
                height,
            } => {
                let (x0, y0, x1, y1) = corners(*x, *y, *width, *height);
                let (a, b) = ((x1 - x0) * 0.5, (y1 - y0) * 0.5);
                if a <= 0.0 || b <= 0.0 {
                    return false;
                }
                let dx = (px - (x0 + a)) / a;
                let dy = (py - (y0 + b)) / b;
                dx * dx + dy * dy <= 1.0
            }
            Geometry::Polygon { points } => {
                let crossings = scanline_crossings(points, py);
                crossings.iter().filter(|&&cx| cx > px).count() % 2 == 1
            }
        }
    }

    /// Bounding box `(min_x, min_y, max_x, max_y)`; `None` for a polygon
    /// without vertices.
    #[must_use]
    pub fn extent(&self) -> Option<(f64, f64, f64, f64)> {
        match self {
            Geometry::Rectangle {
                x,
                y,
                width,
                height,
            }
            | Geometry::Ellipse {
                x,
                y,
                width,
                height,
            } => Some(corners(*x, *y, *width, *height)),
            Geometry::Polygon { points } => {
                let first = points.first()?;
                let init = (first[0], first[1], first[0], first[1]);
                Some(points.iter().fold(init, |(x0, y0, x1, y1), p| {
                    (x0.min(p[0]), y0.min(p[1]), x1.max(p[0]), y1.max(p[1]))
                }))
            }
        }
    }

    /// Pixel window covering the shape, clipped to an image of the given
    /// size. `None` when the shape does not overlap the image.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn pixel_bounds(&self, image_width: usize, image_height: usize) -> Option<PixelBounds> {
        let (min_x, min_y, max_x, max_y) = self.extent()?;
        if !(min_x.is_finite() && min_y.is_finite() && max_x.is_finite() && max_y.is_finite()) {
            return None;
        }
        let x0 = min_x.floor().max(0.0) as usize;
        let y0 = min_y.floor().max(0.0) as usize;
        let x1 = (max_x.ceil().max(0.0) as usize).min(image_width);
        let y1 = (max_y.ceil().max(0.0) as usize).min(image_height);
        if x0 >= x1 || y0 >= y1 {
            return None;
        }
        Some(PixelBounds {
            x: x0,
            y: y0,
            width: x1 - x0,
            height: y1 - y0,
        })
    }

    /// Rasterise the shape over `bounds`; mask pixel `(c, r)` corresponds to
    /// image pixel `(bounds.x + c, bounds.y + r)`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn rasterize(&self, bounds: &PixelBounds) -> Mask {
        let mut mask = Mask::filled(bounds.width, bounds.height, false);
        for r in 0..bounds.height {
            let cy = (bounds.y + r) as f64 + 0.5;
            let row = &mut mask.data[r * bounds.width..(r + 1) * bounds.width];
            match self {
                Geometry::Polygon { points } => {
                    let mut crossings = scanline_crossings(points, cy);
                    crossings.sort_by(f64::total_cmp);
                    for (c, inside) in row.iter_mut().enumerate() {
                        let cx = (bounds.x + c) as f64 + 0.5;
                        let at_or_left = crossings.partition_point(|&v| v <= cx);
                        *inside = (crossings.len() - at_or_left) % 2 == 1;
                    }
                }
                _ => {
                    for (c, inside) in row.iter_mut().enumerate() {
                        let cx = (bounds.x + c) as f64 + 0.5;
                        *inside = self.contains(cx, cy);
                    }
                }
            }
        }
        mask
    }
}

/// `(min_x, min_y, max_x, max_y)` of a box whose width or height may be
/// negative (drawn right-to-left or bottom-to-top).
fn corners(x: f64, y: f64, width: f64, height: f64) -> (f64, f64, f64, f64) {
    (
        x.min(x + width),
        y.min(y + height),
        x.max(x + width),
        y.max(y + height),
    )
}

/// X coordinates where the horizontal line `y` crosses polygon edges.
fn scanline_crossings(points: &[[f64; 2]], y: f64) -> Vec<f64> {
    let n = points.len();
    let mut xs = Vec::new();
    if n < 3 {
        return xs;
    }
    for i in 0..n {
        let [x1, y1] = points[i];
        let [x2, y2] = points[(i + 1) % n];
        if (y1 > y) != (y2 > y) {
            xs.push(x1 + (y - y1) * (x2 - x1) / (y2 - y1));
        }
    }
    xs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(x: f64, y: f64, s: f64) -> Geometry {
        Geometry::Polygon {
            points: vec![[x, y], [x + s, y], [x + s, y + s], [x, y + s]],
        }
    }

    #[test]
    fn polygon_area_uses_shoelace_regardless_of_winding() {
        let ccw = square(0.0, 0.0, 4.0);
        let cw = Geometry::Polygon {
            points: vec![[0.0, 0.0], [0.0, 4.0], [4.0, 4.0], [4.0, 0.0]],
        };
        assert!((ccw.area() - 16.0).abs() < 1e-12);
        assert!((cw.area() - 16.0).abs() < 1e-12);
    }

    #[test]
    fn degenerate_shapes_have_zero_area() {
        let line = Geometry::Polygon {
            points: vec![[0.0, 0.0], [5.0, 5.0], [10.0, 10.0]],
        };
        assert!(line.area().abs() < 1e-12);
        let flat = Geometry::Rectangle {
            x: 3.0,
            y: 3.0,
            width: 10.0,
            height: 0.0,
        };
        assert!(flat.area().abs() < 1e-12);
        assert!(Geometry::Polygon { points: vec![] }.extent().is_none());
    }

    #[test]
    fn ellipse_area_is_pi_a_b() {
        let e = Geometry::Ellipse {
            x: 0.0,
            y: 0.0,
            width: 10.0,
            height: 4.0,
        };
        assert!((e.area() - std::f64::consts::PI * 5.0 * 2.0).abs() < 1e-12);
        assert!(e.contains(5.0, 2.0));
        assert!(!e.contains(0.5, 0.5));
    }

    #[test]
    fn pixel_bounds_clip_to_image() {
        let r = Geometry::Rectangle {
            x: -3.5,
            y: 2.2,
            width: 10.0,
            height: 100.0,
        };
        let b = r.pixel_bounds(50, 40).unwrap();
        assert_eq!(
            b,
            PixelBounds {
                x: 0,
                y: 2,
                width: 7,
                height: 38
            }
        );
        let outside = square(60.0, 60.0, 5.0);
        assert!(outside.pixel_bounds(50, 40).is_none());
    }

    #[test]
    fn rasterized_polygon_matches_contains() {
        let tri = Geometry::Polygon {
            points: vec![[1.0, 1.0], [18.0, 3.0], [6.0, 15.0]],
        };
        let b = tri.pixel_bounds(20, 20).unwrap();
        let mask = tri.rasterize(&b);
        for r in 0..b.height {
            for c in 0..b.width {
                let expected = tri.contains((b.x + c) as f64 + 0.5, (b.y + r) as f64 + 0.5);
                assert_eq!(mask.contains(c, r), expected, "pixel ({c},{r})");
            }
        }
        assert!(mask.count() > 0);
    }

    #[test]
    fn rasterized_square_covers_pixel_centres() {
        let sq = square(2.0, 2.0, 3.0);
        let b = sq.pixel_bounds(10, 10).unwrap();
        let mask = sq.rasterize(&b);
        assert_eq!(mask.count(), 9);
    }

    #[test]
    fn mirrored_boxes_cover_the_same_pixels() {
        let drawn = Geometry::Rectangle {
            x: 10.0,
            y: 10.0,
            width: 20.0,
            height: 20.0,
        };
        let mirrored = Geometry::Rectangle {
            x: 30.0,
            y: 30.0,
            width: -20.0,
            height: -20.0,
        };
        let b = drawn.pixel_bounds(40, 40).unwrap();
        assert_eq!(mirrored.pixel_bounds(40, 40), Some(b));
        assert_eq!(mirrored.rasterize(&b), drawn.rasterize(&b));
        assert_eq!(mirrored.rasterize(&b).count(), 400);

        let ellipse = Geometry::Ellipse {
            x: 30.0,
            y: 10.0,
            width: -20.0,
            height: 20.0,
        };
        assert!(ellipse.contains(20.0, 20.0));
        assert!(!ellipse.contains(10.5, 10.5));
    }
}
