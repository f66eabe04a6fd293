//! External contour extraction and the minimum-area rotated rectangle.

use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

use crate::geometry::mask::Mask;
use crate::geometry::rect::{Point, Rect};

/// Minimum-area rotated rectangle around a mask's external contour.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrientedRect {
    /// Corner points in winding order.
    pub corners: [Point; 4],
    /// Angle of the longer side in degrees, normalized to [0, 180).
    pub angle: f32,
    /// Extent along the rectangle's first axis.
    pub width: f32,
    /// Extent along the rectangle's second axis.
    pub height: f32,
}

impl OrientedRect {
    /// The degenerate rectangle reported for empty masks: four (0, 0)
    /// corners, angle zero.
    pub fn degenerate() -> Self {
        Self {
            corners: [Point::default(); 4],
            angle: 0.0,
            width: 0.0,
            height: 0.0,
        }
    }

    pub fn area(&self) -> f32 {
        self.width * self.height
    }

    /// How much tighter this rectangle is than the axis-aligned bbox:
    /// `1 - rotated_area / axis_aligned_area`, a fraction in [0, 1].
    /// Zero when the axis-aligned box is degenerate.
    pub fn area_reduction(&self, axis_aligned: &Rect) -> f32 {
        let axis_area = axis_aligned.area();
        if axis_area <= 0.0 {
            return 0.0;
        }
        (1.0 - self.area() / axis_area).clamp(0.0, 1.0)
    }
}

/// Points on the external contour: foreground pixels with at least one
/// background 4-neighbor, raster edges counting as background.
pub fn boundary_points(mask: &Mask) -> Vec<Point> {
    let w = mask.width();
    let h = mask.height();
    let mut points = Vec::new();
    for (x, y) in mask.foreground() {
        let on_edge = x == 0 || y == 0 || x == w - 1 || y == h - 1;
        let exposed = on_edge
            || !mask.get(x - 1, y)
            || !mask.get(x + 1, y)
            || !mask.get(x, y - 1)
            || !mask.get(x, y + 1);
        if exposed {
            points.push(Point::new(x as f32, y as f32));
        }
    }
    points
}

/// Convex hull by Andrew's monotone chain, in counter-clockwise order
/// (image coordinates, y down). Collinear points are dropped.
pub fn convex_hull(points: &[Point]) -> Vec<Point> {
    if points.len() < 3 {
        return points.to_vec();
    }
    let mut pts = points.to_vec();
    pts.sort_by(|a, b| a.x.total_cmp(&b.x).then(a.y.total_cmp(&b.y)));
    pts.dedup();

    let cross = |o: &Point, a: &Point, b: &Point| -> f32 {
        (a.x - o.x) * (b.y - o.y) - (a.y - o.y) * (b.x - o.x)
    };

    let mut lower: Vec<Point> = Vec::with_capacity(pts.len());
    for p in &pts {
        while lower.len() >= 2
            && cross(&lower[lower.len() - 2], &lower[lower.len() - 1], p) <= 0.0
        {
            lower.pop();
        }
        lower.push(*p);
    }

    let mut upper: Vec<Point> = Vec::with_capacity(pts.len());
    for p in pts.iter().rev() {
        while upper.len() >= 2
            && cross(&upper[upper.len() - 2], &upper[upper.len() - 1], p) <= 0.0
        {
            upper.pop();
        }
        upper.push(*p);
    }

    lower.pop();
    upper.pop();
    lower.extend(upper);
    lower
}

/// Minimum-area enclosing rotated rectangle of the mask's external
/// contour, via rotating calipers over the convex hull. The mask is
/// expected to have been cleaned first, so its largest-area contour is
/// its only one.
pub fn oriented_rect(mask: &Mask) -> OrientedRect {
    let boundary = boundary_points(mask);
    if boundary.is_empty() {
        return OrientedRect::degenerate();
    }
    let hull = convex_hull(&boundary);

    match hull.len() {
        0 => OrientedRect::degenerate(),
        1 => OrientedRect {
            corners: [hull[0]; 4],
            angle: 0.0,
            width: 0.0,
            height: 0.0,
        },
        2 => {
            let d = Vector2::new(hull[1].x - hull[0].x, hull[1].y - hull[0].y);
            OrientedRect {
                corners: [hull[0], hull[1], hull[1], hull[0]],
                angle: normalize_angle(d.y.atan2(d.x).to_degrees()),
                width: d.norm(),
                height: 0.0,
            }
        }
        _ => calipers(&hull),
    }
}

fn calipers(hull: &[Point]) -> OrientedRect {
    let mut best_area = f32::INFINITY;
    let mut best: Option<(Vector2<f32>, Vector2<f32>, f32, f32, f32, f32)> = None;

    for i in 0..hull.len() {
        let a = &hull[i];
        let b = &hull[(i + 1) % hull.len()];
        let edge = Vector2::new(b.x - a.x, b.y - a.y);
        let len = edge.norm();
        if len <= f32::EPSILON {
            continue;
        }
        let dir = edge / len;
        let normal = Vector2::new(-dir.y, dir.x);

        let mut u_min = f32::INFINITY;
        let mut u_max = f32::NEG_INFINITY;
        let mut v_min = f32::INFINITY;
        let mut v_max = f32::NEG_INFINITY;
        for p in hull {
            let q = Vector2::new(p.x, p.y);
            let u = q.dot(&dir);
            let v = q.dot(&normal);
            u_min = u_min.min(u);
            u_max = u_max.max(u);
            v_min = v_min.min(v);
            v_max = v_max.max(v);
        }

        let area = (u_max - u_min) * (v_max - v_min);
        if area < best_area {
            best_area = area;
            best = Some((dir, normal, u_min, u_max, v_min, v_max));
        }
    }

    let Some((dir, normal, u_min, u_max, v_min, v_max)) = best else {
        return OrientedRect::degenerate();
    };

    let corner = |u: f32, v: f32| -> Point {
        let q = dir * u + normal * v;
        Point::new(q.x, q.y)
    };
    let width = u_max - u_min;
    let height = v_max - v_min;
    let long_side = if width >= height { dir } else { normal };

    OrientedRect {
        corners: [
            corner(u_min, v_min),
            corner(u_max, v_min),
            corner(u_max, v_max),
            corner(u_min, v_max),
        ],
        angle: normalize_angle(long_side.y.atan2(long_side.x).to_degrees()),
        width,
        height,
    }
}

fn normalize_angle(degrees: f32) -> f32 {
    let mut a = degrees % 180.0;
    if a < 0.0 {
        a += 180.0;
    }
    a
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rotated_bar(width: u32, height: u32, half_len: f32, half_thick: f32, deg: f32) -> Mask {
        let cx = width as f32 / 2.0;
        let cy = height as f32 / 2.0;
        let (sin, cos) = deg.to_radians().sin_cos();
        let mut px = Vec::new();
        for y in 0..height {
            for x in 0..width {
                let dx = x as f32 - cx;
                let dy = y as f32 - cy;
                let u = dx * cos + dy * sin;
                let v = -dx * sin + dy * cos;
                if u.abs() <= half_len && v.abs() <= half_thick {
                    px.push((x, y));
                }
            }
        }
        Mask::from_pixels(width, height, &px)
    }

    #[test]
    fn test_empty_mask_degenerate() {
        let rect = oriented_rect(&Mask::empty(32, 32));
        assert_eq!(rect, OrientedRect::degenerate());
        assert_eq!(rect.corners, [Point::default(); 4]);
    }

    #[test]
    fn test_axis_aligned_block() {
        let px: Vec<(u32, u32)> = (10..30)
            .flat_map(|y| (5..45).map(move |x| (x, y)))
            .collect();
        let mask = Mask::from_pixels(64, 64, &px);
        let rect = oriented_rect(&mask);
        // Long side is horizontal.
        assert!(rect.angle < 1.0 || rect.angle > 179.0, "angle {}", rect.angle);
        assert!((rect.width.max(rect.height) - 39.0).abs() < 1.0);
        // Barely tighter than the axis-aligned bbox.
        assert!(rect.area_reduction(&mask.tight_bbox()) < 0.15);
    }

    #[test]
    fn test_rotated_bar_angle() {
        let mask = rotated_bar(256, 256, 100.0, 10.0, 30.0);
        let rect = oriented_rect(&mask);
        assert!((rect.angle - 30.0).abs() < 3.0, "angle {}", rect.angle);
        // Elongated tool: the rotated box is substantially tighter.
        assert!(rect.area_reduction(&mask.tight_bbox()) > 0.3);
    }

    #[test]
    fn test_oriented_rect_idempotent() {
        let mask = rotated_bar(128, 128, 40.0, 6.0, 55.0);
        assert_eq!(oriented_rect(&mask), oriented_rect(&mask));
    }

    #[test]
    fn test_convex_hull_square() {
        let pts = vec![
            Point::new(0.0, 0.0),
            Point::new(4.0, 0.0),
            Point::new(4.0, 4.0),
            Point::new(0.0, 4.0),
            Point::new(2.0, 2.0), // interior
            Point::new(2.0, 0.0), // collinear
        ];
        let hull = convex_hull(&pts);
        assert_eq!(hull.len(), 4);
    }

    #[test]
    fn test_single_pixel() {
        let mask = Mask::from_pixels(16, 16, &[(7, 9)]);
        let rect = oriented_rect(&mask);
        assert_eq!(rect.corners[0], Point::new(7.0, 9.0));
        assert_eq!(rect.area(), 0.0);
    }
}
