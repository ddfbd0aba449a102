//! Frame pacing and the collaborator contracts the frame loop drives.

pub mod budget;
pub mod scheduler;

use serde::Deserialize;

use crate::params::FilterParameters;
use crate::processing::fit::{FitPlan, Rect};

pub use budget::{FrameBudget, FrameSlot};
pub use scheduler::{FrameOutcome, FrameScheduler, FrameStats, SkipReason};

/// Pixel layouts a presentation surface may expose.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PixelFormat {
    #[default]
    Rgba8,
    Bgra8,
}

/// Size and format of the drawable for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceInfo {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
}

/// An immutable image produced by an [`ImageSource`].
pub trait SourceImage {
    fn extent(&self) -> Rect;
}

/// Upstream filter: given the current parameters, yields an image or nothing.
pub trait ImageSource {
    type Image: SourceImage + Send + 'static;

    fn name(&self) -> &str;

    /// Parameter values this source starts from when it becomes active.
    fn default_parameters(&self) -> FilterParameters;

    /// Parameters are applied verbatim before output is requested.
    fn output_image(&mut self, params: &FilterParameters) -> Option<Self::Image>;
}

pub trait Drawable {
    fn info(&self) -> SurfaceInfo;
}

/// Display side: hands out the drawable for the next frame, if any.
pub trait PresentationSurface {
    type Drawable: Drawable + Send + 'static;

    /// `None` while the surface is hidden, resizing, or otherwise unavailable.
    fn current_drawable(&mut self) -> Option<Self::Drawable>;
}

/// One-shot completion side effect registered at submission time.
pub type Completion = Box<dyn FnOnce() + Send + 'static>;

/// Work handed to the submitter: the image, how to fit it, and where it goes.
#[derive(Debug)]
pub struct PreparedFrame<I, D> {
    pub index: u64,
    pub image: I,
    pub plan: FitPlan,
    pub drawable: D,
}

/// Renders and presents a prepared frame.
///
/// On `Ok`, `on_complete` must run exactly once after the work has finished,
/// on any thread. On `Err`, it must be dropped without running.
pub trait CommandSubmitter<F> {
    fn submit(&mut self, frame: F, on_complete: Completion) -> anyhow::Result<()>;
}
