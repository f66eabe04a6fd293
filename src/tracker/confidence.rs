//! Confidence models: the oracle-score adaptive threshold, the geometric
//! estimator for scoreless backends, and the adaptive search-region
//! expansion used for re-detection.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::geometry::Rect;
use crate::tracker::detection::MaskCandidate;

/// Adaptive acceptance threshold driven by an instrument's recent raw
/// confidence scores.
///
/// A consistently high-confidence instrument is held to a stricter bar; an
/// erratic one is tracked more leniently to avoid spurious loss events.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AdaptiveThreshold {
    /// Threshold used until enough history accumulates.
    pub base: f32,
    /// Lower clamp on the computed threshold.
    pub min: f32,
    /// Upper clamp on the computed threshold.
    pub max: f32,
}

impl Default for AdaptiveThreshold {
    fn default() -> Self {
        Self {
            base: 0.5,
            min: 0.3,
            max: 0.7,
        }
    }
}

impl AdaptiveThreshold {
    /// Compute the acceptance threshold from the raw score history.
    ///
    /// Fewer than 3 samples fall back to the base threshold. Otherwise the
    /// coefficient of variation selects the band: CV < 0.2 scores 0.9 of
    /// the mean, CV < 0.5 scores 0.8, anything noisier 0.7. The result is
    /// clamped to `[min, max]`.
    pub fn threshold(&self, history: &VecDeque<f32>) -> f32 {
        if history.len() < 3 {
            return self.base;
        }
        let n = history.len() as f32;
        let mean = history.iter().sum::<f32>() / n;
        if mean <= f32::EPSILON {
            return self.min;
        }
        let var = history.iter().map(|s| (s - mean) * (s - mean)).sum::<f32>() / n;
        let cv = var.sqrt() / mean;

        let tau = if cv < 0.2 {
            0.9 * mean
        } else if cv < 0.5 {
            0.8 * mean
        } else {
            0.7 * mean
        };
        tau.clamp(self.min, self.max)
    }
}

/// Geometric confidence estimator for backends that return no per-object
/// score (the whole-video memory variant).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GeometricConfidence {
    /// Noise floor: masks below this area score down.
    pub min_area: f32,
    /// Upper area bound as a fraction of the frame area.
    pub max_area_fraction: f32,
}

impl Default for GeometricConfidence {
    fn default() -> Self {
        Self {
            min_area: 100.0,
            max_area_fraction: 0.5,
        }
    }
}

impl GeometricConfidence {
    /// Blend fill, size, and shape plausibility into a [0, 1] confidence.
    pub fn confidence(&self, mask_area: f32, bbox: &Rect, frame_area: f32) -> f32 {
        let (w, h) = (bbox.width, bbox.height);
        if w <= 0.0 || h <= 0.0 || mask_area <= 0.0 {
            return 0.0;
        }
        let aspect = w.max(h) / w.min(h);

        // Elongated tools fill their bbox sparsely; compact shapes densely.
        let expected_fill = if aspect >= 3.0 {
            0.3
        } else if aspect >= 1.5 {
            0.5
        } else {
            0.7
        };
        let fill_score = ((mask_area / (w * h)) / expected_fill).min(1.0);

        let max_area = self.max_area_fraction * frame_area;
        let size_score = if mask_area < self.min_area {
            (mask_area / self.min_area).clamp(0.0, 1.0)
        } else if mask_area > max_area && max_area > 0.0 {
            (max_area / mask_area).clamp(0.0, 1.0)
        } else {
            1.0
        };

        // Near-square blobs are likely noise; implausibly thin ones too.
        let shape_score = if aspect < 1.5 {
            0.5 + 0.5 * ((aspect - 1.0) / 0.5).clamp(0.0, 1.0)
        } else if aspect > 15.0 {
            1.0 - 0.5 * ((aspect - 15.0) / 15.0).clamp(0.0, 1.0)
        } else {
            1.0
        };

        (0.3 * fill_score + 0.2 * size_score + 0.5 * shape_score).clamp(0.0, 1.0)
    }
}

/// Which confidence source scores oracle replies, selected once per
/// backend rather than forking the tracking loop.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum ConfidenceModel {
    /// Use the oracle's own per-object score; a scoreless reply rejects.
    OracleScore,
    /// Derive confidence from mask geometry.
    Geometric(GeometricConfidence),
}

impl ConfidenceModel {
    /// Raw confidence for one candidate, given the cleaned-mask geometry.
    pub fn score(
        &self,
        candidate: &MaskCandidate,
        mask_area: f32,
        bbox: &Rect,
        frame_area: f32,
    ) -> f32 {
        match self {
            ConfidenceModel::OracleScore => candidate.score.unwrap_or(0.0).clamp(0.0, 1.0),
            ConfidenceModel::Geometric(model) => model.confidence(mask_area, bbox, frame_area),
        }
    }
}

/// Adaptive search-region expansion for re-detection: a size term plus a
/// velocity term, clamped to `[min, max]` pixels.
pub fn search_expansion(bbox: &Rect, velocity: f32, min: f32, max: f32) -> f32 {
    let size_based = 0.3 * bbox.width.max(bbox.height);
    let velocity_based = 1.5 * velocity;
    (size_based + velocity_based).clamp(min, max)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history(scores: &[f32]) -> VecDeque<f32> {
        scores.iter().copied().collect()
    }

    #[test]
    fn test_short_history_uses_base() {
        let model = AdaptiveThreshold::default();
        assert_eq!(model.threshold(&history(&[0.9, 0.9])), 0.5);
    }

    #[test]
    fn test_stable_history_clamps_high() {
        // mean ~0.9, CV well under 0.2, so tau = 0.81 before the clamp.
        let model = AdaptiveThreshold::default();
        let tau = model.threshold(&history(&[0.9, 0.91, 0.89, 0.90]));
        assert!((tau - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_erratic_history_is_lenient() {
        let model = AdaptiveThreshold::default();
        let tau = model.threshold(&history(&[0.9, 0.2, 0.8, 0.1, 0.7]));
        let mean = (0.9 + 0.2 + 0.8 + 0.1 + 0.7) / 5.0;
        assert!((tau - 0.7 * mean).abs() < 1e-6);
    }

    #[test]
    fn test_threshold_always_clamped() {
        let model = AdaptiveThreshold::default();
        for scores in [
            vec![0.99, 0.99, 0.99, 0.99],
            vec![0.05, 0.06, 0.05, 0.04],
            vec![1.0, 0.0, 1.0, 0.0, 1.0],
            vec![0.5; 10],
        ] {
            let tau = model.threshold(&history(&scores));
            assert!((0.3..=0.7).contains(&tau), "tau {tau} for {scores:?}");
        }
    }

    #[test]
    fn test_geometric_elongated_tool_scores_high() {
        let model = GeometricConfidence::default();
        // 200x20 bbox, ~60% filled: a plausible elongated tool.
        let conf = model.confidence(2400.0, &Rect::new(0.0, 0.0, 200.0, 20.0), 640.0 * 480.0);
        assert!(conf > 0.8, "conf {conf}");
    }

    #[test]
    fn test_geometric_square_blob_penalized() {
        let model = GeometricConfidence::default();
        let square = model.confidence(900.0, &Rect::new(0.0, 0.0, 30.0, 30.0), 640.0 * 480.0);
        let elongated = model.confidence(900.0, &Rect::new(0.0, 0.0, 90.0, 10.0), 640.0 * 480.0);
        assert!(square < elongated);
    }

    #[test]
    fn test_geometric_empty_mask_rejects() {
        let model = GeometricConfidence::default();
        assert_eq!(model.confidence(0.0, &Rect::default(), 640.0 * 480.0), 0.0);
    }

    #[test]
    fn test_geometric_confidence_in_unit_range() {
        let model = GeometricConfidence::default();
        for (area, w, h) in [
            (10.0, 5.0, 5.0),
            (5000.0, 100.0, 50.0),
            (200000.0, 600.0, 400.0),
            (50.0, 400.0, 2.0),
        ] {
            let conf = model.confidence(area, &Rect::new(0.0, 0.0, w, h), 640.0 * 480.0);
            assert!((0.0..=1.0).contains(&conf), "conf {conf}");
        }
    }

    #[test]
    fn test_expansion_clamped() {
        // Tiny stationary box clamps to the floor.
        let e = search_expansion(&Rect::new(0.0, 0.0, 10.0, 10.0), 0.0, 50.0, 200.0);
        assert_eq!(e, 50.0);
        // Huge fast box clamps to the ceiling.
        let e = search_expansion(&Rect::new(0.0, 0.0, 500.0, 300.0), 100.0, 50.0, 200.0);
        assert_eq!(e, 200.0);
        // Mid-range passes through: 0.3*200 + 1.5*20 = 90.
        let e = search_expansion(&Rect::new(0.0, 0.0, 200.0, 40.0), 20.0, 50.0, 200.0);
        assert!((e - 90.0).abs() < 1e-4);
    }
}
