//! Error taxonomy for the tracking engine.

use thiserror::Error;

/// Errors surfaced across the session boundary.
///
/// Degenerate masks, geometry extraction failures, and permanent tracking
/// loss are not errors: they flow through the rejection/fallback paths and
/// the statistics surface instead.
#[derive(Debug, Error)]
pub enum TrackError {
    /// The oracle failed before tracking started. Fatal: the session must
    /// not run the frame loop without a working oracle.
    #[error("segmentation oracle unavailable: {0}")]
    OracleUnavailable(String),

    /// A seed carried malformed or out-of-frame prompt data. Reported per
    /// instrument during initialization; other seeds proceed.
    #[error("invalid seed for instrument {id}: {reason}")]
    InvalidSeed { id: u32, reason: String },

    /// Every seed was rejected or produced an empty segmentation.
    #[error("no instrument could be initialized")]
    NoInstruments,

    /// The frame loop was entered before initialization.
    #[error("session has no registered instruments; initialize before processing frames")]
    NotInitialized,

    /// Initialization ran twice. Bootstrap and user seeding are mutually
    /// exclusive per session and run once before the frame loop.
    #[error("session is already initialized")]
    AlreadyInitialized,

    /// The frame source failed to produce the next frame.
    #[error("frame source failed: {0}")]
    FrameSource(String),
}
