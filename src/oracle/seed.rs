//! Instrument seeds: the initialization input naming each instrument and
//! how to find it in the first frame.

use serde::{Deserialize, Serialize};

use crate::error::TrackError;
use crate::geometry::{Mask, Point, Rect};

/// How an instrument is located at initialization, resolved once into an
/// oracle prompt (point, box) or an initial reference mask.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum Selection {
    Point(Point),
    Box(Rect),
    Mask(Mask),
}

/// Initialization input for one instrument.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentSeed {
    pub id: u32,
    pub name: String,
    /// Explicit display color; instruments without one receive a palette
    /// color by registration order.
    pub color: Option<[u8; 3]>,
    pub selection: Selection,
}

impl InstrumentSeed {
    pub fn point(id: u32, name: impl Into<String>, x: f32, y: f32) -> Self {
        Self {
            id,
            name: name.into(),
            color: None,
            selection: Selection::Point(Point::new(x, y)),
        }
    }

    pub fn bbox(id: u32, name: impl Into<String>, rect: Rect) -> Self {
        Self {
            id,
            name: name.into(),
            color: None,
            selection: Selection::Box(rect),
        }
    }

    pub fn mask(id: u32, name: impl Into<String>, mask: Mask) -> Self {
        Self {
            id,
            name: name.into(),
            color: None,
            selection: Selection::Mask(mask),
        }
    }

    pub fn with_color(mut self, color: [u8; 3]) -> Self {
        self.color = Some(color);
        self
    }

    /// Check the selection against the frame it will be resolved on.
    /// Invalid seeds are skipped during initialization with a warning;
    /// they never abort the other seeds.
    pub fn validate(&self, frame_width: u32, frame_height: u32) -> Result<(), TrackError> {
        let fw = frame_width as f32;
        let fh = frame_height as f32;
        match &self.selection {
            Selection::Point(p) => {
                if p.x < 0.0 || p.y < 0.0 || p.x >= fw || p.y >= fh {
                    return Err(TrackError::InvalidSeed {
                        id: self.id,
                        reason: format!("point ({}, {}) outside {}x{} frame", p.x, p.y, fw, fh),
                    });
                }
            }
            Selection::Box(r) => {
                if r.is_degenerate() {
                    return Err(TrackError::InvalidSeed {
                        id: self.id,
                        reason: "box selection has non-positive extent".into(),
                    });
                }
                if r.clamped(frame_width, frame_height).is_degenerate() {
                    return Err(TrackError::InvalidSeed {
                        id: self.id,
                        reason: "box selection lies outside the frame".into(),
                    });
                }
            }
            Selection::Mask(m) => {
                if m.width() != frame_width || m.height() != frame_height {
                    return Err(TrackError::InvalidSeed {
                        id: self.id,
                        reason: format!(
                            "mask is {}x{}, frame is {}x{}",
                            m.width(),
                            m.height(),
                            frame_width,
                            frame_height
                        ),
                    });
                }
                if m.is_empty() {
                    return Err(TrackError::InvalidSeed {
                        id: self.id,
                        reason: "mask selection has no foreground".into(),
                    });
                }
            }
        }
        Ok(())
    }
}
