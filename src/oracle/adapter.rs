//! Trait contract between the tracking engine and segmentation backends.

use std::collections::HashMap;
use std::fmt::Display;

use crate::geometry::{Mask, Point, Rect};
use crate::oracle::seed::InstrumentSeed;
use crate::tracker::MaskCandidate;

/// A borrowed view of one video frame handed to the oracle.
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    pub index: u64,
    pub timestamp: f64,
    pub width: u32,
    pub height: u32,
    /// Raw image bytes; layout is a contract between the frame source and
    /// the backend, the engine never inspects them.
    pub data: &'a [u8],
}

impl Frame<'_> {
    pub fn area(&self) -> f32 {
        self.width as f32 * self.height as f32
    }
}

/// An owned frame as produced by a frame source.
#[derive(Debug, Clone)]
pub struct FrameData {
    pub index: u64,
    pub timestamp: f64,
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl FrameData {
    pub fn as_frame(&self) -> Frame<'_> {
        Frame {
            index: self.index,
            timestamp: self.timestamp,
            width: self.width,
            height: self.height,
            data: &self.data,
        }
    }
}

/// Prompt point polarity: foreground marks the object, background marks
/// what the oracle should exclude.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptLabel {
    Background,
    Foreground,
}

/// One point of a multi-point oracle prompt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PromptPoint {
    pub x: f32,
    pub y: f32,
    pub label: PromptLabel,
}

impl PromptPoint {
    pub fn foreground(p: Point) -> Self {
        Self {
            x: p.x,
            y: p.y,
            label: PromptLabel::Foreground,
        }
    }

    pub fn background(p: Point) -> Self {
        Self {
            x: p.x,
            y: p.y,
            label: PromptLabel::Background,
        }
    }
}

/// Promptable per-frame segmentation backend.
///
/// `begin_frame` is the scoped acquisition point for per-image backend
/// state (an input-image embedding, typically): each call supersedes the
/// state of the previous frame, and all `segment_*` queries operate on
/// the most recently begun frame. Backends returning several mask
/// hypotheses per prompt must resolve them to the maximum-score one;
/// [`MaskCandidate::best_of`] implements the selection rule.
///
/// A stateless "no object found" answer is not an error: return
/// [`MaskCandidate::empty`] and let the confidence model reject it.
///
/// # Example
///
/// ```ignore
/// use surgitrack_rs::{Frame, MaskCandidate, PromptPoint, Rect, SegmentationOracle};
///
/// struct MyBackend {
///     // Your model handle here
/// }
///
/// impl SegmentationOracle for MyBackend {
///     type Error = std::io::Error;
///
///     fn begin_frame(&mut self, frame: &Frame<'_>) -> Result<(), Self::Error> {
///         // Compute and cache the image embedding
///         Ok(())
///     }
///
///     fn segment_with_points(&mut self, points: &[PromptPoint]) -> Result<MaskCandidate, Self::Error> {
///         // Run the prompt against the cached embedding
///         Ok(MaskCandidate::empty(0, 0))
///     }
///
///     fn segment_with_box(&mut self, region: Rect) -> Result<MaskCandidate, Self::Error> {
///         Ok(MaskCandidate::empty(0, 0))
///     }
///
///     fn segment_automatic(&mut self) -> Result<Vec<MaskCandidate>, Self::Error> {
///         Ok(vec![])
///     }
/// }
/// ```
pub trait SegmentationOracle {
    /// Error type for backend failures.
    type Error: Display;

    /// Acquire per-image state for the given frame, superseding any state
    /// held for a previous frame.
    fn begin_frame(&mut self, frame: &Frame<'_>) -> Result<(), Self::Error>;

    /// Segment with a multi-point prompt against the current frame.
    fn segment_with_points(&mut self, points: &[PromptPoint]) -> Result<MaskCandidate, Self::Error>;

    /// Segment with a box prompt against the current frame.
    fn segment_with_box(&mut self, region: Rect) -> Result<MaskCandidate, Self::Error>;

    /// Unprompted "segment everything" pass; used only at bootstrap.
    fn segment_automatic(&mut self) -> Result<Vec<MaskCandidate>, Self::Error>;
}

/// One propagated mask for one frame.
#[derive(Debug, Clone)]
pub struct FrameMask {
    pub frame_index: u64,
    pub mask: Mask,
}

/// Whole-video segmentation backend with its own temporal memory.
///
/// A single call returns masks for all frames with no per-frame score;
/// confidence is then derived geometrically by the session.
pub trait VideoOracle {
    type Error: Display;

    /// Propagate the seeds through the whole clip, returning per-frame
    /// masks keyed by instrument id.
    fn propagate(
        &mut self,
        frames: &[FrameData],
        seeds: &[InstrumentSeed],
    ) -> Result<HashMap<u32, Vec<FrameMask>>, Self::Error>;
}
