//! The tracking session: instrument registration, bootstrap, and the
//! per-frame accept / re-detect / coast / abandon loop.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::TrackError;
use crate::geometry::{self, Mask, MaskGeometry};
use crate::oracle::{Frame, InstrumentSeed, PromptPoint, SegmentationOracle, Selection};
use crate::tracker::confidence::{AdaptiveThreshold, ConfidenceModel, search_expansion};
use crate::tracker::detection::{Detection, DetectionOutcome, MaskCandidate};
use crate::tracker::instrument::{InstrumentStats, TrackedInstrument};

/// Detections report at most this many trailing trajectory points.
const TRAJECTORY_TAIL: usize = 10;

/// Fallback display colors, assigned by registration order.
const PALETTE: [[u8; 3]; 8] = [
    [230, 57, 70],
    [29, 53, 87],
    [42, 157, 143],
    [233, 196, 106],
    [144, 103, 198],
    [244, 162, 97],
    [38, 70, 83],
    [231, 111, 81],
];

/// Session-wide configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Acceptance threshold used until enough score history accumulates.
    pub base_threshold: f32,
    /// Lower clamp on the adaptive threshold.
    pub threshold_min: f32,
    /// Upper clamp on the adaptive threshold.
    pub threshold_max: f32,
    /// Consecutive misses before an instrument is abandoned.
    pub max_lost_frames: u32,
    /// Floor of the re-detection search expansion, in pixels.
    pub min_expansion: f32,
    /// Ceiling of the re-detection search expansion, in pixels.
    pub max_expansion: f32,
    /// Raw-score FIFO window feeding the adaptive threshold.
    pub history_window: usize,
    /// Centroid trajectory FIFO capacity.
    pub trajectory_capacity: usize,
    /// Re-detection accepts at this fraction of the frame's threshold.
    pub redetect_factor: f32,
    /// Confidence reported on coasting frames.
    pub coast_confidence: f32,
    /// Bootstrap: minimum oracle score for an automatic candidate.
    pub auto_score_floor: f32,
    /// Bootstrap: minimum bbox side, in pixels.
    pub auto_min_bbox_side: f32,
    /// Bootstrap: candidates overlapping an accepted one past this IoU
    /// are dropped.
    pub auto_overlap_iou: f32,
    /// Bootstrap: cap on automatically created instruments.
    pub max_auto_instruments: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            base_threshold: 0.5,
            threshold_min: 0.3,
            threshold_max: 0.7,
            max_lost_frames: 10,
            min_expansion: 50.0,
            max_expansion: 200.0,
            history_window: 10,
            trajectory_capacity: 50,
            redetect_factor: 0.7,
            coast_confidence: 0.3,
            auto_score_floor: 0.7,
            auto_min_bbox_side: 20.0,
            auto_overlap_iou: 0.8,
            max_auto_instruments: 4,
        }
    }
}

impl SessionConfig {
    fn adaptive(&self) -> AdaptiveThreshold {
        AdaptiveThreshold {
            base: self.base_threshold,
            min: self.threshold_min,
            max: self.threshold_max,
        }
    }
}

/// Aggregate counters for the whole session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    pub frames_processed: u64,
    pub detections_emitted: u64,
    pub instruments: Vec<InstrumentStats>,
}

/// Owns the tracked instruments and drives the per-frame loop.
///
/// The oracle handle is constructed by the caller and passed in
/// explicitly; there is no process-wide detector state. Frames must be
/// fed strictly in order: each frame's prompts depend on the accepted
/// state of the previous one.
pub struct TrackingSession {
    config: SessionConfig,
    model: ConfidenceModel,
    instruments: Vec<TrackedInstrument>,
    initialized: bool,
    frames_processed: u64,
    detections_emitted: u64,
}

impl TrackingSession {
    pub fn new(config: SessionConfig, model: ConfidenceModel) -> Self {
        Self {
            config,
            model,
            instruments: Vec::new(),
            initialized: false,
            frames_processed: 0,
            detections_emitted: 0,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn instruments(&self) -> &[TrackedInstrument] {
        &self.instruments
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn statistics(&self) -> SessionStats {
        SessionStats {
            frames_processed: self.frames_processed,
            detections_emitted: self.detections_emitted,
            instruments: self.instruments.iter().map(|i| i.stats()).collect(),
        }
    }

    /// Initialize from user-supplied seeds against the first frame.
    ///
    /// Invalid or empty-segmentation seeds are skipped with a warning and
    /// the rest proceed. Oracle failures here are fatal: the session must
    /// not enter the frame loop without a working oracle. Returns the
    /// first frame's detections.
    pub fn initialize_with_seeds<O: SegmentationOracle>(
        &mut self,
        oracle: &mut O,
        frame: &Frame<'_>,
        seeds: Vec<InstrumentSeed>,
    ) -> Result<Vec<Detection>, TrackError> {
        if self.initialized {
            return Err(TrackError::AlreadyInitialized);
        }
        oracle
            .begin_frame(frame)
            .map_err(|e| TrackError::OracleUnavailable(e.to_string()))?;

        let mut detections = Vec::new();
        for (index, seed) in seeds.into_iter().enumerate() {
            if let Err(err) = seed.validate(frame.width, frame.height) {
                warn!(instrument = seed.id, %err, "skipping seed");
                continue;
            }

            let mut reference_mask = None;
            let candidate = match &seed.selection {
                Selection::Point(p) => oracle
                    .segment_with_points(&[PromptPoint::foreground(*p)])
                    .map_err(|e| TrackError::OracleUnavailable(e.to_string()))?,
                Selection::Box(r) => oracle
                    .segment_with_box(r.clamped(frame.width, frame.height))
                    .map_err(|e| TrackError::OracleUnavailable(e.to_string()))?,
                Selection::Mask(m) => {
                    reference_mask = Some(m.clone());
                    MaskCandidate::new(m.clone(), 1.0)
                }
            };

            let geom = geometry::analyze(&candidate.mask);
            if geom.area == 0 {
                warn!(
                    instrument = seed.id,
                    name = %seed.name,
                    "seed produced an empty segmentation, skipping"
                );
                continue;
            }
            let raw = self
                .model
                .score(&candidate, geom.area as f32, &geom.bbox, frame.area());

            let color = seed.color.unwrap_or(PALETTE[index % PALETTE.len()]);
            let mut inst = TrackedInstrument::new(
                seed.id,
                seed.name,
                color,
                frame.width,
                frame.height,
                self.config.trajectory_capacity,
                self.config.history_window,
            );
            inst.reference_mask = reference_mask;
            inst.record_confidence(raw);
            detections.push(accept_candidate(&mut inst, geom, raw, false));
            info!(
                instrument = inst.id,
                name = %inst.name,
                score = raw,
                "instrument registered"
            );
            self.instruments.push(inst);
        }

        if self.instruments.is_empty() {
            return Err(TrackError::NoInstruments);
        }
        self.initialized = true;
        self.frames_processed += 1;
        self.detections_emitted += detections.len() as u64;
        Ok(detections)
    }

    /// Initialize by running the oracle's unprompted "segment everything"
    /// mode on the first frame. Candidates are score-filtered, size-
    /// filtered, overlap-suppressed, and capped. Returns the first
    /// frame's detections.
    pub fn initialize_automatic<O: SegmentationOracle>(
        &mut self,
        oracle: &mut O,
        frame: &Frame<'_>,
    ) -> Result<Vec<Detection>, TrackError> {
        if self.initialized {
            return Err(TrackError::AlreadyInitialized);
        }
        oracle
            .begin_frame(frame)
            .map_err(|e| TrackError::OracleUnavailable(e.to_string()))?;
        let candidates = oracle
            .segment_automatic()
            .map_err(|e| TrackError::OracleUnavailable(e.to_string()))?;

        let mut survivors: Vec<(MaskCandidate, MaskGeometry, f32)> = Vec::new();
        for candidate in candidates {
            let Some(score) = candidate.score else {
                continue;
            };
            if score < self.config.auto_score_floor {
                continue;
            }
            let geom = geometry::analyze(&candidate.mask);
            if geom.area == 0 || geom.bbox.min_side() < self.config.auto_min_bbox_side {
                continue;
            }
            survivors.push((candidate, geom, score));
        }
        survivors.sort_by(|a, b| b.2.total_cmp(&a.2));

        let mut detections = Vec::new();
        for (candidate, geom, score) in survivors {
            if self.instruments.len() >= self.config.max_auto_instruments {
                break;
            }
            let overlaps = self
                .instruments
                .iter()
                .any(|i| i.last_bbox.iou(&geom.bbox) > self.config.auto_overlap_iou);
            if overlaps {
                continue;
            }

            let id = self.instruments.len() as u32;
            let raw = self
                .model
                .score(&candidate, geom.area as f32, &geom.bbox, frame.area());
            let mut inst = TrackedInstrument::new(
                id,
                format!("instrument-{id}"),
                PALETTE[id as usize % PALETTE.len()],
                frame.width,
                frame.height,
                self.config.trajectory_capacity,
                self.config.history_window,
            );
            inst.record_confidence(raw);
            detections.push(accept_candidate(&mut inst, geom, raw, false));
            info!(instrument = id, score, "instrument bootstrapped");
            self.instruments.push(inst);
        }

        if self.instruments.is_empty() {
            return Err(TrackError::NoInstruments);
        }
        self.initialized = true;
        self.frames_processed += 1;
        self.detections_emitted += detections.len() as u64;
        Ok(detections)
    }

    /// Register instruments for a propagated (whole-video) run without a
    /// promptable oracle. Seeds are validated and recorded; masks arrive
    /// later through [`TrackingSession::ingest_propagated`].
    pub fn register_for_propagation(
        &mut self,
        frame_width: u32,
        frame_height: u32,
        seeds: &[InstrumentSeed],
    ) -> Result<usize, TrackError> {
        if self.initialized {
            return Err(TrackError::AlreadyInitialized);
        }
        for (index, seed) in seeds.iter().enumerate() {
            if let Err(err) = seed.validate(frame_width, frame_height) {
                warn!(instrument = seed.id, %err, "skipping seed");
                continue;
            }
            let color = seed.color.unwrap_or(PALETTE[index % PALETTE.len()]);
            let mut inst = TrackedInstrument::new(
                seed.id,
                seed.name.clone(),
                color,
                frame_width,
                frame_height,
                self.config.trajectory_capacity,
                self.config.history_window,
            );
            if let Selection::Mask(m) = &seed.selection {
                inst.reference_mask = Some(m.clone());
            }
            info!(instrument = inst.id, name = %inst.name, "instrument registered for propagation");
            self.instruments.push(inst);
        }
        if self.instruments.is_empty() {
            return Err(TrackError::NoInstruments);
        }
        self.initialized = true;
        Ok(self.instruments.len())
    }

    /// Run one frame of the tracking loop against a promptable oracle.
    ///
    /// Always returns a well-formed (possibly empty) detection list;
    /// oracle failures mid-run are logged at the adapter boundary and
    /// degrade into empty candidates, never into errors.
    pub fn process_frame<O: SegmentationOracle>(
        &mut self,
        oracle: &mut O,
        frame: &Frame<'_>,
    ) -> Result<Vec<Detection>, TrackError> {
        if !self.initialized {
            return Err(TrackError::NotInitialized);
        }
        self.frames_processed += 1;

        let oracle_ready = match oracle.begin_frame(frame) {
            Ok(()) => true,
            Err(err) => {
                warn!(frame = frame.index, %err, "oracle rejected frame, coasting all instruments");
                false
            }
        };

        let config = self.config.clone();
        let model = self.model;
        let adaptive = config.adaptive();
        let mut detections = Vec::new();

        for inst in self.instruments.iter_mut() {
            if !inst.is_active() {
                continue;
            }

            let candidate = if oracle_ready {
                let points = geometry::tip_biased_prompt(
                    inst.last_tip,
                    inst.last_centroid(),
                    &inst.last_bbox,
                );
                let prompts: Vec<PromptPoint> =
                    points.iter().map(|p| PromptPoint::foreground(*p)).collect();
                match oracle.segment_with_points(&prompts) {
                    Ok(c) => c,
                    Err(err) => {
                        warn!(instrument = inst.id, %err, "point query failed");
                        MaskCandidate::empty(frame.width, frame.height)
                    }
                }
            } else {
                MaskCandidate::empty(frame.width, frame.height)
            };

            let geom = geometry::analyze(&candidate.mask);
            let tau = adaptive.threshold(inst.confidence_history());
            let raw = model.score(&candidate, geom.area as f32, &geom.bbox, frame.area());
            inst.record_confidence(raw);

            let outcome = if raw >= tau && geom.area > 0 {
                detections.push(accept_candidate(inst, geom, raw, false));
                DetectionOutcome::Accepted
            } else if !inst.miss(config.max_lost_frames) {
                warn!(
                    instrument = inst.id,
                    name = %inst.name,
                    lost_frames = inst.lost_frame_count,
                    "instrument abandoned"
                );
                DetectionOutcome::Abandoned
            } else {
                // Expanded-region re-detection at the relaxed bar.
                let expansion = search_expansion(
                    &inst.last_bbox,
                    inst.velocity(),
                    config.min_expansion,
                    config.max_expansion,
                );
                let region = inst
                    .last_bbox
                    .expanded(expansion)
                    .clamped(frame.width, frame.height);
                let recovery = if oracle_ready {
                    match oracle.segment_with_box(region) {
                        Ok(c) => c,
                        Err(err) => {
                            warn!(instrument = inst.id, %err, "box query failed");
                            MaskCandidate::empty(frame.width, frame.height)
                        }
                    }
                } else {
                    MaskCandidate::empty(frame.width, frame.height)
                };

                let re_geom = geometry::analyze(&recovery.mask);
                let re_raw =
                    model.score(&recovery, re_geom.area as f32, &re_geom.bbox, frame.area());
                if re_raw >= config.redetect_factor * tau && re_geom.area > 0 {
                    inst.record_confidence(re_raw);
                    detections.push(accept_candidate(inst, re_geom, re_raw, true));
                    DetectionOutcome::Redetected
                } else {
                    inst.note_coasted();
                    detections.push(coast_record(inst, config.coast_confidence));
                    DetectionOutcome::Coasting
                }
            };
            debug!(instrument = inst.id, frame = frame.index, ?outcome, tau, raw);
        }

        self.detections_emitted += detections.len() as u64;
        Ok(detections)
    }

    /// Feed one frame of propagated masks (whole-video backend) through
    /// the same acceptance step. Instruments with no mask for this frame
    /// receive an empty candidate.
    pub fn ingest_propagated(
        &mut self,
        frame: &Frame<'_>,
        masks: &HashMap<u32, Mask>,
    ) -> Result<Vec<Detection>, TrackError> {
        if !self.initialized {
            return Err(TrackError::NotInitialized);
        }
        self.frames_processed += 1;

        let config = self.config.clone();
        let model = self.model;
        let adaptive = config.adaptive();
        let mut detections = Vec::new();

        for inst in self.instruments.iter_mut() {
            if !inst.is_active() {
                continue;
            }

            let candidate = match masks.get(&inst.id) {
                Some(mask) => MaskCandidate::unscored(mask.clone()),
                None => MaskCandidate::empty(frame.width, frame.height),
            };
            let geom = geometry::analyze(&candidate.mask);
            let tau = adaptive.threshold(inst.confidence_history());
            let raw = model.score(&candidate, geom.area as f32, &geom.bbox, frame.area());
            inst.record_confidence(raw);

            let outcome = if raw >= tau && geom.area > 0 {
                detections.push(accept_candidate(inst, geom, raw, false));
                DetectionOutcome::Accepted
            } else if inst.miss(config.max_lost_frames) {
                // No promptable oracle to re-query; report the last box.
                inst.note_coasted();
                detections.push(coast_record(inst, config.coast_confidence));
                DetectionOutcome::Coasting
            } else {
                warn!(instrument = inst.id, name = %inst.name, "instrument abandoned");
                DetectionOutcome::Abandoned
            };
            debug!(instrument = inst.id, frame = frame.index, ?outcome, tau, raw);
        }

        self.detections_emitted += detections.len() as u64;
        Ok(detections)
    }
}

/// Shared acceptance path: derive oriented box and tip from the cleaned
/// mask, fold the result into the instrument, and build the emitted
/// record.
fn accept_candidate(
    inst: &mut TrackedInstrument,
    geom: MaskGeometry,
    raw: f32,
    redetected: bool,
) -> Detection {
    let oriented = geometry::oriented_rect(&geom.cleaned);
    let tip = geometry::locate_tip(&geom.cleaned, &geom.bbox);
    inst.accept(
        geom.cleaned,
        geom.bbox,
        oriented,
        tip,
        geom.centroid,
        raw,
        redetected,
    );
    Detection {
        instrument_id: inst.id,
        name: inst.name.clone(),
        color: inst.display_color,
        bbox: geom.bbox,
        oriented_bbox: oriented,
        tip,
        confidence: raw,
        trajectory_tail: inst.trajectory_tail(TRAJECTORY_TAIL),
        lost: false,
        redetected,
    }
}

/// Record emitted while an instrument is lost but not yet abandoned: the
/// last accepted geometry at a fixed low-confidence marker.
fn coast_record(inst: &TrackedInstrument, coast_confidence: f32) -> Detection {
    Detection {
        instrument_id: inst.id,
        name: inst.name.clone(),
        color: inst.display_color,
        bbox: inst.last_bbox,
        oriented_bbox: inst.last_oriented,
        tip: inst.last_tip,
        confidence: coast_confidence,
        trajectory_tail: inst.trajectory_tail(TRAJECTORY_TAIL),
        lost: true,
        redetected: false,
    }
}
