//! Per-instrument tracking state: identity, last accepted geometry,
//! bounded histories, loss counters, and the update rules the session
//! applies each frame.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::geometry::{Mask, OrientedRect, Point, Rect};
use crate::tracker::track_state::TrackState;

/// Queryable per-instrument counters, also the surface where permanent
/// tracking loss is reported.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentStats {
    pub id: u32,
    pub name: String,
    pub state: TrackState,
    pub frames_accepted: u64,
    pub frames_redetected: u64,
    pub frames_coasted: u64,
    pub trajectory_len: usize,
}

/// A single tracked instrument.
///
/// All mutable fields are owned exclusively by the session's frame loop.
/// The mask is replaced wholesale on acceptance, never mutated in place.
#[derive(Debug, Clone)]
pub struct TrackedInstrument {
    pub id: u32,
    pub name: String,
    pub display_color: [u8; 3],
    /// Axis-aligned box of the last accepted detection.
    pub last_bbox: Rect,
    /// Most recent accepted mask (cleaned).
    pub last_mask: Mask,
    /// Oriented box of the last accepted detection.
    pub last_oriented: OrientedRect,
    /// Tip of the last accepted detection, if one was found.
    pub last_tip: Option<Point>,
    /// Last raw confidence in [0, 1].
    pub last_score: f32,
    /// Reference mask kept from a mask seed for potential re-seeding.
    pub reference_mask: Option<Mask>,
    pub lost_frame_count: u32,
    pub state: TrackState,
    trajectory: VecDeque<Point>,
    trajectory_capacity: usize,
    confidence_history: VecDeque<f32>,
    history_window: usize,
    frames_accepted: u64,
    frames_redetected: u64,
    frames_coasted: u64,
}

impl TrackedInstrument {
    pub fn new(
        id: u32,
        name: String,
        display_color: [u8; 3],
        frame_width: u32,
        frame_height: u32,
        trajectory_capacity: usize,
        history_window: usize,
    ) -> Self {
        Self {
            id,
            name,
            display_color,
            last_bbox: Rect::default(),
            last_mask: Mask::empty(frame_width, frame_height),
            last_oriented: OrientedRect::degenerate(),
            last_tip: None,
            last_score: 0.0,
            reference_mask: None,
            lost_frame_count: 0,
            state: TrackState::Tracking,
            trajectory: VecDeque::with_capacity(trajectory_capacity),
            trajectory_capacity,
            confidence_history: VecDeque::with_capacity(history_window),
            history_window,
            frames_accepted: 0,
            frames_redetected: 0,
            frames_coasted: 0,
        }
    }

    pub fn is_active(&self) -> bool {
        self.state != TrackState::Abandoned
    }

    /// Raw pre-threshold scores, oldest first.
    pub fn confidence_history(&self) -> &VecDeque<f32> {
        &self.confidence_history
    }

    /// Push a raw score, evicting the oldest past the window.
    pub fn record_confidence(&mut self, raw: f32) {
        if self.confidence_history.len() == self.history_window {
            self.confidence_history.pop_front();
        }
        self.confidence_history.push_back(raw);
    }

    /// Accept a detection: replace the geometric state, append the
    /// centroid to the trajectory, and return to Tracking.
    pub fn accept(
        &mut self,
        mask: Mask,
        bbox: Rect,
        oriented: OrientedRect,
        tip: Option<Point>,
        centroid: Option<Point>,
        score: f32,
        redetected: bool,
    ) {
        self.last_mask = mask;
        self.last_bbox = bbox;
        self.last_oriented = oriented;
        self.last_tip = tip;
        self.last_score = score;
        if let Some(c) = centroid {
            if self.trajectory.len() == self.trajectory_capacity {
                self.trajectory.pop_front();
            }
            self.trajectory.push_back(c);
        }
        self.lost_frame_count = 0;
        self.state = TrackState::Tracking;
        self.frames_accepted += 1;
        if redetected {
            self.frames_redetected += 1;
        }
    }

    /// Register a missed frame. Returns true while the instrument stays
    /// within its lost-frame budget (now Searching); false once the budget
    /// is exhausted and the instrument is abandoned.
    pub fn miss(&mut self, max_lost_frames: u32) -> bool {
        self.lost_frame_count += 1;
        if self.lost_frame_count > max_lost_frames {
            self.state = TrackState::Abandoned;
            false
        } else {
            self.state = TrackState::Searching;
            true
        }
    }

    /// Count a coasting frame (both queries rejected, last box reported).
    pub fn note_coasted(&mut self) {
        self.frames_coasted += 1;
    }

    /// Most recent trajectory centroid, if any.
    pub fn last_centroid(&self) -> Option<Point> {
        self.trajectory.back().copied()
    }

    /// Displacement between the two most recent trajectory points.
    pub fn velocity(&self) -> f32 {
        let len = self.trajectory.len();
        if len < 2 {
            return 0.0;
        }
        self.trajectory[len - 2].distance(&self.trajectory[len - 1])
    }

    /// The most recent `n` trajectory points, oldest first.
    pub fn trajectory_tail(&self, n: usize) -> Vec<Point> {
        let skip = self.trajectory.len().saturating_sub(n);
        self.trajectory.iter().skip(skip).copied().collect()
    }

    /// Full trajectory, oldest first; UI trails draw from this.
    pub fn trajectory(&self) -> impl Iterator<Item = &Point> {
        self.trajectory.iter()
    }

    pub fn stats(&self) -> InstrumentStats {
        InstrumentStats {
            id: self.id,
            name: self.name.clone(),
            state: self.state,
            frames_accepted: self.frames_accepted,
            frames_redetected: self.frames_redetected,
            frames_coasted: self.frames_coasted,
            trajectory_len: self.trajectory.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::track_state::TrackState;

    fn instrument() -> TrackedInstrument {
        TrackedInstrument::new(1, "needle-driver".into(), [255, 0, 0], 64, 64, 50, 10)
    }

    fn accept_at(inst: &mut TrackedInstrument, x: f32, y: f32) {
        inst.accept(
            Mask::empty(64, 64),
            Rect::new(x, y, 10.0, 10.0),
            OrientedRect::degenerate(),
            None,
            Some(Point::new(x + 5.0, y + 5.0)),
            0.9,
            false,
        );
    }

    #[test]
    fn test_trajectory_bounded_fifo() {
        let mut inst = instrument();
        for i in 0..60 {
            accept_at(&mut inst, i as f32, 0.0);
        }
        let tail: Vec<Point> = inst.trajectory().copied().collect();
        assert_eq!(tail.len(), 50);
        // Oldest evicted first: points 0..10 are gone.
        assert_eq!(tail[0], Point::new(15.0, 5.0));
        assert_eq!(tail[49], Point::new(64.0, 5.0));
    }

    #[test]
    fn test_confidence_history_window() {
        let mut inst = instrument();
        for i in 0..15 {
            inst.record_confidence(i as f32 / 15.0);
        }
        assert_eq!(inst.confidence_history().len(), 10);
        assert!((inst.confidence_history()[0] - 5.0 / 15.0).abs() < 1e-6);
    }

    #[test]
    fn test_accept_resets_loss() {
        let mut inst = instrument();
        assert!(inst.miss(10));
        assert!(inst.miss(10));
        assert_eq!(inst.state, TrackState::Searching);
        assert_eq!(inst.lost_frame_count, 2);

        accept_at(&mut inst, 5.0, 5.0);
        assert_eq!(inst.state, TrackState::Tracking);
        assert_eq!(inst.lost_frame_count, 0);
    }

    #[test]
    fn test_miss_budget_abandons() {
        let mut inst = instrument();
        for _ in 0..10 {
            assert!(inst.miss(10));
        }
        assert!(!inst.miss(10));
        assert_eq!(inst.state, TrackState::Abandoned);
        assert!(!inst.is_active());
    }

    #[test]
    fn test_velocity_from_last_two_points() {
        let mut inst = instrument();
        assert_eq!(inst.velocity(), 0.0);
        accept_at(&mut inst, 0.0, 0.0);
        assert_eq!(inst.velocity(), 0.0);
        accept_at(&mut inst, 3.0, 4.0);
        assert!((inst.velocity() - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_trajectory_tail_limit() {
        let mut inst = instrument();
        for i in 0..20 {
            accept_at(&mut inst, i as f32, 0.0);
        }
        let tail = inst.trajectory_tail(10);
        assert_eq!(tail.len(), 10);
        assert_eq!(tail[9], Point::new(24.0, 5.0));
    }
}
