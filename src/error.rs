use thiserror::Error;

use crate::frame::SkipReason;

/// Per-frame failures. None of these are fatal: the frame is dropped and the
/// next tick starts from scratch.
#[derive(Debug, Error)]
pub enum FrameError {
    /// Zero-width (or non-finite) source extent; the fit cannot compute a scale.
    #[error("degenerate input: source extent {width}x{height}")]
    DegenerateInput { width: f64, height: f64 },

    /// The active source produced no image for the current parameters.
    #[error("upstream source produced no output image")]
    MissingUpstreamOutput,

    /// The presentation or render collaborator failed mid-frame.
    #[error("render backend error: {0}")]
    RenderBackend(anyhow::Error),

    /// The frame budget was closed while waiting for a slot (shutdown).
    #[error("frame budget closed")]
    BudgetClosed,
}

impl FrameError {
    /// Inputs that are dropped as skipped frames rather than counted as
    /// failures.
    pub fn skip_reason(&self) -> Option<SkipReason> {
        match self {
            Self::DegenerateInput { .. } => Some(SkipReason::DegenerateInput),
            Self::MissingUpstreamOutput => Some(SkipReason::MissingUpstreamOutput),
            Self::RenderBackend(_) | Self::BudgetClosed => None,
        }
    }
}
