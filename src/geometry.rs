//! Mask geometry: tight and oriented bounding boxes, centroids, tip
//! localization, and prompt synthesis.

mod contour;
mod mask;
mod rect;
mod tip;

pub use contour::{OrientedRect, boundary_points, convex_hull, oriented_rect};
pub use mask::{Mask, MaskGeometry, analyze};
pub use rect::{Point, Rect};
pub use tip::{locate_tip, tip_biased_prompt};
