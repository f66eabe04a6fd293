//! Oracle reply and reporting-sink record types.

use serde::{Deserialize, Serialize};

use crate::geometry::{Mask, OrientedRect, Point, Rect};

/// One mask hypothesis returned by the segmentation oracle.
///
/// `score` is the oracle's own confidence where the backend provides one;
/// whole-video propagation backends return `None` and confidence is
/// derived geometrically instead.
#[derive(Debug, Clone)]
pub struct MaskCandidate {
    pub mask: Mask,
    pub score: Option<f32>,
}

impl MaskCandidate {
    pub fn new(mask: Mask, score: f32) -> Self {
        Self {
            mask,
            score: Some(score),
        }
    }

    pub fn unscored(mask: Mask) -> Self {
        Self { mask, score: None }
    }

    /// The structurally valid "no object found" answer: an all-background
    /// mask with score zero. Rejected by the confidence model, never an
    /// error.
    pub fn empty(width: u32, height: u32) -> Self {
        Self {
            mask: Mask::empty(width, height),
            score: Some(0.0),
        }
    }

    /// Resolve multiple hypotheses to the maximum-score one. Adapters use
    /// this when a backend returns several masks per prompt.
    pub fn best_of(candidates: Vec<MaskCandidate>, width: u32, height: u32) -> MaskCandidate {
        candidates
            .into_iter()
            .max_by(|a, b| {
                a.score
                    .unwrap_or(0.0)
                    .total_cmp(&b.score.unwrap_or(0.0))
            })
            .unwrap_or_else(|| MaskCandidate::empty(width, height))
    }
}

/// How one per-frame step resolved for one instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionOutcome {
    /// Primary query accepted
    Accepted,
    /// Recovered through the expanded-region re-detection query
    Redetected,
    /// Both queries rejected; the last known box is reported as lost
    Coasting,
    /// Lost-frame budget exhausted; nothing emitted from here on
    Abandoned,
}

/// Per-frame, per-instrument record emitted to the reporting sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    pub instrument_id: u32,
    pub name: String,
    pub color: [u8; 3],
    pub bbox: Rect,
    pub oriented_bbox: OrientedRect,
    pub tip: Option<Point>,
    pub confidence: f32,
    /// Most recent trajectory centroids, oldest first, at most 10.
    pub trajectory_tail: Vec<Point>,
    pub lost: bool,
    pub redetected: bool,
}
