use tracing::{debug, trace, warn};

use super::{
    Completion, CommandSubmitter, Drawable, FrameBudget, FrameSlot, ImageSource, PreparedFrame,
    PresentationSurface, SourceImage,
};
use crate::error::FrameError;
use crate::params::Controls;
use crate::processing::fit::{Rounding, fit_to_surface};

/// Why a tick did not produce a presented frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The surface had no drawable this tick; no slot was taken.
    NoSurface,
    /// The drawable had zero width or height; no slot was taken.
    ZeroSizedSurface,
    /// The source extent could not be fitted.
    DegenerateInput,
    /// The source yielded no image.
    MissingUpstreamOutput,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Presented { index: u64 },
    Skipped(SkipReason),
    /// The backend rejected the frame; its slot has already been returned.
    Failed { index: u64 },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub ticks: u64,
    pub presented: u64,
    pub skipped: u64,
    pub failed: u64,
}

impl FrameStats {
    /// Whether a run capped at `max_frames` presented frames should stop.
    /// `Some(0)` is reached before the first tick.
    pub fn limit_reached(&self, max_frames: Option<u64>) -> bool {
        max_frames.is_some_and(|max| self.presented >= max)
    }

    fn record(&mut self, outcome: FrameOutcome) {
        match outcome {
            FrameOutcome::Presented { .. } => self.presented += 1,
            FrameOutcome::Skipped(_) => self.skipped += 1,
            FrameOutcome::Failed { .. } => self.failed += 1,
        }
    }
}

/// Runs one render pass per tick with at most `budget.capacity()` frames
/// between submission and completion.
///
/// `P` is both the presentation surface and the command submitter: the
/// drawable it hands out is the one its submitter presents into.
pub struct FrameScheduler<S, P> {
    controls: Controls<S>,
    presenter: P,
    budget: FrameBudget,
    rounding: Rounding,
    next_index: u64,
    stats: FrameStats,
    underfill_reported: bool,
}

impl<S, P> FrameScheduler<S, P>
where
    S: ImageSource,
    P: PresentationSurface + CommandSubmitter<PreparedFrame<S::Image, P::Drawable>>,
{
    pub fn new(controls: Controls<S>, presenter: P, budget: FrameBudget, rounding: Rounding) -> Self {
        Self {
            controls,
            presenter,
            budget,
            rounding,
            next_index: 0,
            stats: FrameStats::default(),
            underfill_reported: false,
        }
    }

    pub fn controls(&self) -> &Controls<S> {
        &self.controls
    }

    pub fn controls_mut(&mut self) -> &mut Controls<S> {
        &mut self.controls
    }

    pub fn presenter(&self) -> &P {
        &self.presenter
    }

    pub fn presenter_mut(&mut self) -> &mut P {
        &mut self.presenter
    }

    pub fn budget(&self) -> &FrameBudget {
        &self.budget
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    /// One scheduling tick.
    ///
    /// The only await point is the slot acquisition, before anything is
    /// owned by the frame, so dropping this future is harmless. Returns
    /// `Err` only once the budget has been closed.
    pub async fn tick(&mut self) -> Result<FrameOutcome, FrameError> {
        self.stats.ticks += 1;

        let Some(drawable) = self.presenter.current_drawable() else {
            trace!("no drawable available; dropping tick");
            return Ok(self.finish(FrameOutcome::Skipped(SkipReason::NoSurface)));
        };
        let info = drawable.info();
        if info.width == 0 || info.height == 0 {
            trace!(width = info.width, height = info.height, "zero-sized drawable; dropping tick");
            return Ok(self.finish(FrameOutcome::Skipped(SkipReason::ZeroSizedSurface)));
        }

        let slot = self.budget.acquire().await?;
        let index = self.next_index;
        self.next_index += 1;

        let Some(image) = self.controls.render_source() else {
            return Ok(self.drop_frame(index, Some(slot), FrameError::MissingUpstreamOutput));
        };

        let plan = match fit_to_surface(image.extent(), info.width, info.height, self.rounding) {
            Ok(Some(plan)) => plan,
            // Zero-sized drawables returned above, before taking a slot; this
            // arm only has to give the slot back.
            Ok(None) => {
                slot.release();
                return Ok(self.finish(FrameOutcome::Skipped(SkipReason::ZeroSizedSurface)));
            }
            Err(err) => return Ok(self.drop_frame(index, Some(slot), err)),
        };

        if plan.covers_target() {
            self.underfill_reported = false;
        } else if !self.underfill_reported {
            debug!(
                content = ?plan.content,
                width = info.width,
                height = info.height,
                "width-driven fit leaves part of the surface uncovered",
            );
            self.underfill_reported = true;
        }

        let frame = PreparedFrame {
            index,
            image,
            plan,
            drawable,
        };
        let on_complete: Completion = Box::new(move || slot.release());
        match self.presenter.submit(frame, on_complete) {
            Ok(()) => {
                trace!(index, scale = plan.scale, "frame submitted");
                Ok(self.finish(FrameOutcome::Presented { index }))
            }
            // The rejected completion was dropped un-run, returning its slot.
            Err(err) => Ok(self.drop_frame(index, None, FrameError::RenderBackend(err))),
        }
    }

    /// Returns the slot (if still held) and records the dropped frame as a
    /// skip or a failure depending on `err`.
    fn drop_frame(
        &mut self,
        index: u64,
        slot: Option<FrameSlot>,
        err: FrameError,
    ) -> FrameOutcome {
        drop(slot);
        warn!(
            index,
            source = self.controls.active_name(),
            error = %err,
            "dropping frame"
        );
        let outcome = match err.skip_reason() {
            Some(reason) => FrameOutcome::Skipped(reason),
            None => FrameOutcome::Failed { index },
        };
        self.finish(outcome)
    }

    /// [`FrameScheduler::tick`] for host callbacks that are not async.
    pub fn tick_blocking(&mut self) -> Result<FrameOutcome, FrameError> {
        pollster::block_on(self.tick())
    }

    fn finish(&mut self, outcome: FrameOutcome) -> FrameOutcome {
        self.stats.record(outcome);
        outcome
    }
}
