use std::time::Duration;

use anyhow::Result;
use tokio::select;
use tokio::sync::mpsc::Receiver;
use tokio::time::{MissedTickBehavior, interval, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::FrameError;
use crate::events::ControlCommand;
use crate::frame::{
    CommandSubmitter, FrameOutcome, FrameScheduler, FrameStats, ImageSource, PreparedFrame,
    PresentationSurface,
};
use crate::tasks::controls::apply_command;

/// How long shutdown waits for submitted frames to complete.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Drives `scheduler` from a fixed-interval timer.
///
/// Control commands are applied between ticks. Stops on `cancel`, when the
/// budget is closed, or once `max_frames` frames have been presented, then
/// waits for in-flight frames to complete.
pub async fn run<S, P>(
    scheduler: &mut FrameScheduler<S, P>,
    period: Duration,
    mut commands: Receiver<ControlCommand>,
    max_frames: Option<u64>,
    cancel: CancellationToken,
) -> Result<FrameStats>
where
    S: ImageSource,
    P: PresentationSurface + CommandSubmitter<PreparedFrame<S::Image, P::Drawable>>,
{
    let mut ticker = interval(period.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    'frames: loop {
        if scheduler.stats().limit_reached(max_frames) {
            info!(frames = ?max_frames, "requested frame count submitted");
            break;
        }
        select! {
            _ = cancel.cancelled() => break,

            Some(command) = commands.recv() => {
                if let Err(err) = apply_command(scheduler.controls_mut(), &command) {
                    warn!(error = %err, "control command rejected");
                }
            }

            _ = ticker.tick() => {
                let outcome = select! {
                    _ = cancel.cancelled() => break 'frames,
                    outcome = scheduler.tick() => outcome,
                };
                match outcome {
                    Ok(FrameOutcome::Presented { index }) => debug!(index, "frame submitted"),
                    Ok(other) => debug!(outcome = ?other, "frame not presented"),
                    Err(FrameError::BudgetClosed) => {
                        info!("frame budget closed; stopping frame loop");
                        break;
                    }
                    Err(err) => warn!(error = %err, "tick failed"),
                }
            }
        }
    }

    drain(scheduler).await;
    let stats = scheduler.stats();
    info!(
        ticks = stats.ticks,
        presented = stats.presented,
        skipped = stats.skipped,
        failed = stats.failed,
        "frame loop finished",
    );
    Ok(stats)
}

/// Waits until every submitted frame has completed by taking the whole budget.
async fn drain<S, P>(scheduler: &FrameScheduler<S, P>)
where
    S: ImageSource,
    P: PresentationSurface + CommandSubmitter<PreparedFrame<S::Image, P::Drawable>>,
{
    let budget = scheduler.budget().clone();
    let capacity = budget.capacity();
    let waited = timeout(DRAIN_TIMEOUT, async {
        let mut held = Vec::with_capacity(capacity);
        for _ in 0..capacity {
            match budget.acquire().await {
                Ok(slot) => held.push(slot),
                Err(_) => break,
            }
        }
    })
    .await;
    if waited.is_err() {
        warn!(
            in_flight = budget.in_flight(),
            "frames still in flight after shutdown timeout"
        );
    }
}
