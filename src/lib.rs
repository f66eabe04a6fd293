//! Confidence-adaptive multi-instrument tracking over a promptable
//! segmentation oracle.
//!
//! The engine turns a per-frame, stateless segmentation capability into a
//! stateful multi-object tracker: tip-biased prompts carry each
//! instrument from frame to frame, an adaptive threshold decides
//! acceptance, and lost instruments go through expanded-region
//! re-detection before being abandoned. Segmentation itself is delegated
//! to an injected backend implementing [`SegmentationOracle`] (or
//! [`VideoOracle`] for whole-video propagation, scored geometrically).

pub mod error;
pub mod geometry;
pub mod oracle;
pub mod tracker;

pub use error::TrackError;
pub use geometry::{Mask, OrientedRect, Point, Rect};
pub use oracle::{
    Frame, FrameData, FrameSource, InstrumentSeed, PromptLabel, PromptPoint, SegmentationOracle,
    Selection, SessionInit, TrackingPipeline, VideoOracle,
};
pub use tracker::{
    ConfidenceModel, Detection, GeometricConfidence, MaskCandidate, SessionConfig, SessionStats,
    TrackState, TrackedInstrument, TrackingSession,
};
