//! Boundary module for connecting segmentation backends with the
//! tracking engine.
//!
//! This module holds the oracle trait contracts, the instrument seed
//! format, and the drivers that couple a frame source with a session.

mod adapter;
mod pipeline;
mod seed;

pub use adapter::{
    Frame, FrameData, FrameMask, PromptLabel, PromptPoint, SegmentationOracle, VideoOracle,
};
pub use pipeline::{FrameSource, SessionInit, TrackingPipeline, run_propagated};
pub use seed::{InstrumentSeed, Selection};
