//! Drivers coupling a frame source with a tracking session.

use std::collections::HashMap;
use std::fmt::Display;

use tracing::{debug, info};

use crate::error::TrackError;
use crate::oracle::adapter::{FrameData, SegmentationOracle, VideoOracle};
use crate::oracle::seed::InstrumentSeed;
use crate::tracker::{Detection, SessionStats, TrackingSession};

/// Produces the ordered frame sequence the engine consumes lazily, one
/// frame at a time. Retry and integrity checking belong to the source,
/// not the engine.
pub trait FrameSource {
    type Error: Display;

    /// The next frame, or `None` at end of stream.
    fn next_frame(&mut self) -> Result<Option<FrameData>, Self::Error>;
}

/// How the pipeline initializes its session on the first frame.
pub enum SessionInit {
    /// User-supplied seeds, one per instrument.
    Seeds(Vec<InstrumentSeed>),
    /// Unprompted bootstrap detection.
    Automatic,
}

/// A combined driver that bundles a promptable oracle, a frame source,
/// and a tracking session, running the lazy per-frame loop end to end.
pub struct TrackingPipeline<O: SegmentationOracle, F: FrameSource> {
    oracle: O,
    source: F,
    session: TrackingSession,
    init: Option<SessionInit>,
}

impl<O: SegmentationOracle, F: FrameSource> TrackingPipeline<O, F> {
    pub fn new(oracle: O, source: F, session: TrackingSession, init: SessionInit) -> Self {
        Self {
            oracle,
            source,
            session,
            init: Some(init),
        }
    }

    /// Get a reference to the underlying session.
    pub fn session(&self) -> &TrackingSession {
        &self.session
    }

    /// Get a mutable reference to the underlying session.
    pub fn session_mut(&mut self) -> &mut TrackingSession {
        &mut self.session
    }

    /// Get a reference to the underlying oracle.
    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    /// Get a mutable reference to the underlying oracle.
    pub fn oracle_mut(&mut self) -> &mut O {
        &mut self.oracle
    }

    /// Pull and process the next frame. The first frame initializes the
    /// session; subsequent frames run the tracking loop. Returns `None`
    /// at end of stream.
    pub fn process_next(&mut self) -> Result<Option<(u64, Vec<Detection>)>, TrackError> {
        let Some(frame_data) = self
            .source
            .next_frame()
            .map_err(|e| TrackError::FrameSource(e.to_string()))?
        else {
            return Ok(None);
        };
        let frame = frame_data.as_frame();

        let detections = match self.init.take() {
            Some(SessionInit::Seeds(seeds)) => {
                self.session
                    .initialize_with_seeds(&mut self.oracle, &frame, seeds)?
            }
            Some(SessionInit::Automatic) => {
                self.session.initialize_automatic(&mut self.oracle, &frame)?
            }
            None => self.session.process_frame(&mut self.oracle, &frame)?,
        };
        Ok(Some((frame.index, detections)))
    }

    /// Drive the whole stream, handing each frame's detections to the
    /// sink. `stop` is checked between frames; once it fires, no
    /// instrument state is mutated further.
    pub fn run(
        &mut self,
        mut sink: impl FnMut(u64, Vec<Detection>),
        mut stop: impl FnMut() -> bool,
    ) -> Result<SessionStats, TrackError> {
        loop {
            if stop() {
                info!("session cancelled between frames");
                break;
            }
            match self.process_next()? {
                Some((index, detections)) => {
                    debug!(frame = index, detections = detections.len(), "frame complete");
                    sink(index, detections);
                }
                None => break,
            }
        }
        Ok(self.session.statistics())
    }

    /// Consume the pipeline and return its session, e.g. to inspect the
    /// statistics surface after the run.
    pub fn into_session(self) -> TrackingSession {
        self.session
    }
}

/// Drive a whole-video propagation backend: one `propagate` call, then
/// each frame's masks flow through the session's acceptance step. The
/// session should use the geometric confidence model, since propagation
/// yields no per-frame scores.
pub fn run_propagated<V: VideoOracle>(
    oracle: &mut V,
    session: &mut TrackingSession,
    frames: &[FrameData],
    seeds: &[InstrumentSeed],
) -> Result<Vec<(u64, Vec<Detection>)>, TrackError> {
    let Some(first) = frames.first() else {
        return Ok(Vec::new());
    };
    session.register_for_propagation(first.width, first.height, seeds)?;

    let propagated = oracle
        .propagate(frames, seeds)
        .map_err(|e| TrackError::OracleUnavailable(e.to_string()))?;

    let mut results = Vec::with_capacity(frames.len());
    for frame_data in frames {
        let frame = frame_data.as_frame();
        let mut masks = HashMap::new();
        for (id, frame_masks) in &propagated {
            if let Some(fm) = frame_masks.iter().find(|fm| fm.frame_index == frame.index) {
                masks.insert(*id, fm.mask.clone());
            }
        }
        let detections = session.ingest_propagated(&frame, &masks)?;
        results.push((frame.index, detections));
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Mask, Rect};
    use crate::oracle::adapter::{Frame, PromptPoint};
    use crate::tracker::{ConfidenceModel, MaskCandidate, SessionConfig};

    struct BlockOracle {
        width: u32,
        height: u32,
    }

    impl BlockOracle {
        fn block(&self) -> Mask {
            let px: Vec<(u32, u32)> = (20..42)
                .flat_map(|y| (10..40).map(move |x| (x, y)))
                .collect();
            Mask::from_pixels(self.width, self.height, &px)
        }
    }

    impl SegmentationOracle for BlockOracle {
        type Error = std::convert::Infallible;

        fn begin_frame(&mut self, frame: &Frame<'_>) -> Result<(), Self::Error> {
            self.width = frame.width;
            self.height = frame.height;
            Ok(())
        }

        fn segment_with_points(
            &mut self,
            _points: &[PromptPoint],
        ) -> Result<MaskCandidate, Self::Error> {
            Ok(MaskCandidate::new(self.block(), 0.9))
        }

        fn segment_with_box(&mut self, _region: Rect) -> Result<MaskCandidate, Self::Error> {
            Ok(MaskCandidate::new(self.block(), 0.9))
        }

        fn segment_automatic(&mut self) -> Result<Vec<MaskCandidate>, Self::Error> {
            Ok(vec![MaskCandidate::new(self.block(), 0.95)])
        }
    }

    struct CountingSource {
        frames: u64,
        emitted: u64,
    }

    impl FrameSource for CountingSource {
        type Error = std::convert::Infallible;

        fn next_frame(&mut self) -> Result<Option<FrameData>, Self::Error> {
            if self.emitted == self.frames {
                return Ok(None);
            }
            let index = self.emitted;
            self.emitted += 1;
            Ok(Some(FrameData {
                index,
                timestamp: index as f64 / 30.0,
                width: 64,
                height: 64,
                data: vec![0; 64 * 64],
            }))
        }
    }

    #[test]
    fn test_pipeline_runs_to_end_of_stream() {
        let oracle = BlockOracle {
            width: 64,
            height: 64,
        };
        let source = CountingSource {
            frames: 5,
            emitted: 0,
        };
        let session = TrackingSession::new(SessionConfig::default(), ConfidenceModel::OracleScore);
        let mut pipeline = TrackingPipeline::new(oracle, source, session, SessionInit::Automatic);

        let mut seen = Vec::new();
        let stats = pipeline
            .run(|index, dets| seen.push((index, dets.len())), || false)
            .unwrap();

        assert_eq!(seen.len(), 5);
        assert!(seen.iter().all(|&(_, n)| n == 1));
        assert_eq!(stats.frames_processed, 5);
        assert_eq!(stats.detections_emitted, 5);
    }

    #[test]
    fn test_pipeline_stop_between_frames() {
        let oracle = BlockOracle {
            width: 64,
            height: 64,
        };
        let source = CountingSource {
            frames: 100,
            emitted: 0,
        };
        let session = TrackingSession::new(SessionConfig::default(), ConfidenceModel::OracleScore);
        let mut pipeline = TrackingPipeline::new(oracle, source, session, SessionInit::Automatic);

        let processed = std::cell::Cell::new(0u64);
        let stats = pipeline
            .run(
                |_, _| processed.set(processed.get() + 1),
                // Cancel after three frames have been delivered.
                || processed.get() >= 3,
            )
            .unwrap();

        assert_eq!(processed.get(), 3);
        assert_eq!(stats.frames_processed, 3);
    }
}
