//! Binary mask raster and the cleanup chain that turns a raw oracle mask
//! into a tight bounding box.

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::geometry::rect::{Point, Rect};

/// A binary segmentation mask. Zero is background, anything else foreground.
///
/// Rows index y, columns index x. Masks are replaced wholesale on every
/// accepted frame and never mutated in place by the tracking loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mask {
    data: Array2<u8>,
}

impl Mask {
    /// An all-background mask of the given dimensions.
    pub fn empty(width: u32, height: u32) -> Self {
        Self {
            data: Array2::zeros((height as usize, width as usize)),
        }
    }

    /// Wrap an existing raster. Values are binarized on construction.
    pub fn from_array(data: Array2<u8>) -> Self {
        Self {
            data: data.mapv(|v| u8::from(v != 0)),
        }
    }

    /// Build a mask from foreground pixel coordinates.
    pub fn from_pixels(width: u32, height: u32, pixels: &[(u32, u32)]) -> Self {
        let mut mask = Self::empty(width, height);
        for &(x, y) in pixels {
            if x < width && y < height {
                mask.data[[y as usize, x as usize]] = 1;
            }
        }
        mask
    }

    pub fn width(&self) -> u32 {
        self.data.ncols() as u32
    }

    pub fn height(&self) -> u32 {
        self.data.nrows() as u32
    }

    /// Number of foreground pixels.
    pub fn area(&self) -> u32 {
        self.data.iter().filter(|&&v| v != 0).count() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.data.iter().all(|&v| v == 0)
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32) -> bool {
        self.data[[y as usize, x as usize]] != 0
    }

    /// Iterate foreground pixel coordinates in row-major order.
    pub fn foreground(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.data
            .indexed_iter()
            .filter(|&(_, &v)| v != 0)
            .map(|((y, x), _)| (x as u32, y as u32))
    }

    /// Morphological opening with a 3x3 structuring element: erosion
    /// followed by dilation. Removes speckle noise smaller than the
    /// element; pixels outside the raster count as background.
    pub fn opened(&self) -> Mask {
        let (rows, cols) = self.data.dim();
        let mut eroded = Array2::<u8>::zeros((rows, cols));
        for y in 0..rows {
            for x in 0..cols {
                if self.data[[y, x]] == 0 {
                    continue;
                }
                let mut keep = true;
                'probe: for dy in -1i64..=1 {
                    for dx in -1i64..=1 {
                        let ny = y as i64 + dy;
                        let nx = x as i64 + dx;
                        if ny < 0
                            || nx < 0
                            || ny >= rows as i64
                            || nx >= cols as i64
                            || self.data[[ny as usize, nx as usize]] == 0
                        {
                            keep = false;
                            break 'probe;
                        }
                    }
                }
                if keep {
                    eroded[[y, x]] = 1;
                }
            }
        }

        let mut dilated = Array2::<u8>::zeros((rows, cols));
        for y in 0..rows {
            for x in 0..cols {
                if eroded[[y, x]] == 0 {
                    continue;
                }
                for dy in -1i64..=1 {
                    for dx in -1i64..=1 {
                        let ny = y as i64 + dy;
                        let nx = x as i64 + dx;
                        if ny >= 0 && nx >= 0 && ny < rows as i64 && nx < cols as i64 {
                            dilated[[ny as usize, nx as usize]] = 1;
                        }
                    }
                }
            }
        }

        Mask { data: dilated }
    }

    /// Keep only the largest 8-connected foreground component.
    pub fn largest_component(&self) -> Mask {
        let (rows, cols) = self.data.dim();
        let mut labels = Array2::<u32>::zeros((rows, cols));
        let mut next_label = 0u32;
        let mut best_label = 0u32;
        let mut best_size = 0usize;
        let mut stack: Vec<(usize, usize)> = Vec::new();

        for y in 0..rows {
            for x in 0..cols {
                if self.data[[y, x]] == 0 || labels[[y, x]] != 0 {
                    continue;
                }
                next_label += 1;
                let mut size = 0usize;
                labels[[y, x]] = next_label;
                stack.push((y, x));
                while let Some((cy, cx)) = stack.pop() {
                    size += 1;
                    for dy in -1i64..=1 {
                        for dx in -1i64..=1 {
                            let ny = cy as i64 + dy;
                            let nx = cx as i64 + dx;
                            if ny < 0 || nx < 0 || ny >= rows as i64 || nx >= cols as i64 {
                                continue;
                            }
                            let (ny, nx) = (ny as usize, nx as usize);
                            if self.data[[ny, nx]] != 0 && labels[[ny, nx]] == 0 {
                                labels[[ny, nx]] = next_label;
                                stack.push((ny, nx));
                            }
                        }
                    }
                }
                if size > best_size {
                    best_size = size;
                    best_label = next_label;
                }
            }
        }

        if best_label == 0 {
            return Mask {
                data: Array2::zeros((rows, cols)),
            };
        }

        Mask {
            data: labels.mapv(|l| u8::from(l == best_label)),
        }
    }

    /// Axis-aligned bounding box of the foreground, in pixel-extent
    /// convention (a single pixel at (3, 4) yields a 1x1 rect at (3, 4)).
    /// Empty masks yield the degenerate (0, 0, 0, 0) rect.
    pub fn tight_bbox(&self) -> Rect {
        let mut min_x = u32::MAX;
        let mut min_y = u32::MAX;
        let mut max_x = 0u32;
        let mut max_y = 0u32;
        let mut any = false;
        for (x, y) in self.foreground() {
            any = true;
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }
        if !any {
            return Rect::default();
        }
        Rect::from_tlbr(
            min_x as f32,
            min_y as f32,
            (max_x + 1) as f32,
            (max_y + 1) as f32,
        )
    }

    /// Foreground centroid via pixel moments, or None for an empty mask.
    pub fn centroid(&self) -> Option<Point> {
        let mut m00 = 0.0f64;
        let mut m10 = 0.0f64;
        let mut m01 = 0.0f64;
        for (x, y) in self.foreground() {
            m00 += 1.0;
            m10 += x as f64;
            m01 += y as f64;
        }
        if m00 == 0.0 {
            return None;
        }
        Some(Point::new((m10 / m00) as f32, (m01 / m00) as f32))
    }
}

/// Derived geometry of one cleaned mask, computed once per oracle reply.
#[derive(Debug, Clone)]
pub struct MaskGeometry {
    /// Opened (with fallback) and largest-component-filtered mask.
    pub cleaned: Mask,
    /// Tight bbox of the cleaned mask; degenerate when the mask is empty.
    pub bbox: Rect,
    /// Pixel-moment centroid of the cleaned mask.
    pub centroid: Option<Point>,
    /// Foreground area of the cleaned mask, in pixels.
    pub area: u32,
}

/// Run the cleanup chain: binarize (done at construction), open with a
/// 3x3 element, fall back to the unopened mask if opening empties it,
/// keep the largest connected component, then measure what survives.
pub fn analyze(mask: &Mask) -> MaskGeometry {
    let opened = mask.opened();
    let survivor = if opened.is_empty() && !mask.is_empty() {
        mask.largest_component()
    } else {
        opened.largest_component()
    };
    let bbox = survivor.tight_bbox();
    let centroid = survivor.centroid();
    let area = survivor.area();
    MaskGeometry {
        cleaned: survivor,
        bbox,
        centroid,
        area,
    }
}
