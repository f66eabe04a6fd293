use serde::{Deserialize, Serialize};

/// Per-instrument tracking lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TrackState {
    /// Accepted detection on the last processed frame
    #[default]
    Tracking,
    /// Lost, under active expanded-region recovery
    Searching,
    /// Permanently lost; terminal, no further attempts
    Abandoned,
}
