mod confidence;
mod detection;
mod instrument;
mod session;
mod track_state;

pub use confidence::{AdaptiveThreshold, ConfidenceModel, GeometricConfidence, search_expansion};
pub use detection::{Detection, DetectionOutcome, MaskCandidate};
pub use instrument::{InstrumentStats, TrackedInstrument};
pub use session::{SessionConfig, SessionStats, TrackingSession};
pub use track_state::TrackState;
