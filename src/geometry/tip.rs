//! Tool-tip localization via principal-axis contour projection, and the
//! tip-biased point prompt handed back to the oracle on the next query.

use nalgebra::{Matrix2, SymmetricEigen, Vector2};

use crate::geometry::contour::boundary_points;
use crate::geometry::mask::Mask;
use crate::geometry::rect::{Point, Rect};

/// Minimum foreground pixels for a meaningful principal axis.
const MIN_TIP_PIXELS: u32 = 5;

/// Locate the "business end" of an elongated tool.
///
/// Projects every contour point's centroid-relative position onto the
/// dominant principal axis of the foreground pixel cloud; the tip is the
/// point with the largest positive projection, falling back to the
/// largest-magnitude negative projection when the axis orientation is
/// ambiguous. A tip outside the given bbox is discarded in favor of the
/// centroid. Returns None when the mask cannot support the analysis, in
/// which case callers substitute the centroid (or bbox center).
pub fn locate_tip(mask: &Mask, bbox: &Rect) -> Option<Point> {
    if mask.area() < MIN_TIP_PIXELS {
        return None;
    }
    let centroid = mask.centroid()?;

    let mut sxx = 0.0f64;
    let mut sxy = 0.0f64;
    let mut syy = 0.0f64;
    let mut n = 0.0f64;
    for (x, y) in mask.foreground() {
        let dx = x as f64 - centroid.x as f64;
        let dy = y as f64 - centroid.y as f64;
        sxx += dx * dx;
        sxy += dx * dy;
        syy += dy * dy;
        n += 1.0;
    }
    let cov = Matrix2::new(sxx / n, sxy / n, sxy / n, syy / n);
    if cov.norm() <= f64::EPSILON {
        return None;
    }

    let eigen = SymmetricEigen::new(cov);
    let dominant = if eigen.eigenvalues[0] >= eigen.eigenvalues[1] {
        0
    } else {
        1
    };
    let axis = Vector2::new(
        eigen.eigenvectors[(0, dominant)],
        eigen.eigenvectors[(1, dominant)],
    );

    let contour = boundary_points(mask);
    if contour.is_empty() {
        return None;
    }

    let mut max_proj = f64::NEG_INFINITY;
    let mut max_point = contour[0];
    let mut min_proj = f64::INFINITY;
    let mut min_point = contour[0];
    for p in &contour {
        let rel = Vector2::new(p.x as f64 - centroid.x as f64, p.y as f64 - centroid.y as f64);
        let proj = rel.dot(&axis);
        if proj > max_proj {
            max_proj = proj;
            max_point = *p;
        }
        if proj < min_proj {
            min_proj = proj;
            min_point = *p;
        }
    }

    let tip = if max_proj > 0.0 { max_point } else { min_point };
    if bbox.contains(&tip) {
        Some(tip)
    } else {
        Some(centroid)
    }
}

/// Synthesize the multi-point prompt for re-querying the oracle.
///
/// The tip is included twice to bias the oracle toward the tool end
/// rather than the whole hand-plus-tool blob, followed by the midpoint
/// between tip and centroid, the centroid, and the bbox center as a
/// guaranteed fallback. Identical extra points are deduplicated; the
/// doubled tip is kept. Without a tip, centroid and bbox center remain.
/// Always returns at least one point.
pub fn tip_biased_prompt(tip: Option<Point>, centroid: Option<Point>, bbox: &Rect) -> Vec<Point> {
    let mut points: Vec<Point> = Vec::with_capacity(5);
    match tip {
        Some(tip) => {
            points.push(tip);
            points.push(tip);
            let anchor = centroid.unwrap_or_else(|| bbox.center());
            push_unique(&mut points, tip.midpoint(&anchor));
            if let Some(c) = centroid {
                push_unique(&mut points, c);
            }
            push_unique(&mut points, bbox.center());
        }
        None => {
            if let Some(c) = centroid {
                points.push(c);
            }
            push_unique(&mut points, bbox.center());
        }
    }
    points
}

fn push_unique(points: &mut Vec<Point>, candidate: Point) {
    if !points.contains(&candidate) {
        points.push(candidate);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::mask::analyze;

    fn horizontal_bar(width: u32, height: u32, y: u32, x0: u32, x1: u32, thick: u32) -> Mask {
        let mut px = Vec::new();
        for row in y..y + thick {
            for x in x0..x1 {
                px.push((x, row));
            }
        }
        Mask::from_pixels(width, height, &px)
    }

    #[test]
    fn test_tip_at_bar_end() {
        let mask = horizontal_bar(200, 100, 45, 20, 180, 10);
        let geom = analyze(&mask);
        let tip = locate_tip(&geom.cleaned, &geom.bbox).unwrap();
        // One of the two extreme ends, not the middle.
        let from_left = (tip.x - geom.bbox.x).abs();
        let from_right = (geom.bbox.x + geom.bbox.width - tip.x).abs();
        assert!(from_left < 3.0 || from_right < 3.0, "tip at {:?}", tip);
        assert!(geom.bbox.contains(&tip));
    }

    #[test]
    fn test_tip_requires_five_pixels() {
        let mask = Mask::from_pixels(32, 32, &[(1, 1), (2, 2), (3, 3), (4, 4)]);
        assert!(locate_tip(&mask, &mask.tight_bbox()).is_none());
    }

    #[test]
    fn test_tip_outside_bbox_becomes_centroid() {
        let mask = horizontal_bar(100, 50, 20, 10, 90, 6);
        let centroid = mask.centroid().unwrap();
        // A bbox that excludes both bar ends forces the centroid fallback.
        let narrow = Rect::new(40.0, 18.0, 20.0, 10.0);
        let tip = locate_tip(&mask, &narrow).unwrap();
        assert_eq!(tip, centroid);
    }

    #[test]
    fn test_tip_idempotent() {
        let mask = horizontal_bar(120, 60, 25, 15, 100, 8);
        let bbox = mask.tight_bbox();
        assert_eq!(locate_tip(&mask, &bbox), locate_tip(&mask, &bbox));
    }

    #[test]
    fn test_prompt_doubles_tip() {
        let tip = Point::new(50.0, 10.0);
        let centroid = Point::new(30.0, 10.0);
        let bbox = Rect::new(10.0, 5.0, 50.0, 10.0);
        let prompt = tip_biased_prompt(Some(tip), Some(centroid), &bbox);
        assert_eq!(prompt[0], tip);
        assert_eq!(prompt[1], tip);
        assert!(prompt.contains(&Point::new(40.0, 10.0))); // midpoint
        assert!(prompt.contains(&centroid));
        assert!(prompt.contains(&bbox.center()));
    }

    #[test]
    fn test_prompt_without_tip() {
        let centroid = Point::new(30.0, 10.0);
        let bbox = Rect::new(10.0, 5.0, 50.0, 10.0);
        let prompt = tip_biased_prompt(None, Some(centroid), &bbox);
        assert_eq!(prompt, vec![centroid, bbox.center()]);
    }

    #[test]
    fn test_prompt_never_empty() {
        let prompt = tip_biased_prompt(None, None, &Rect::default());
        assert_eq!(prompt.len(), 1);
    }
}
