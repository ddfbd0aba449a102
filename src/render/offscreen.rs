//! Software presentation backend.
//!
//! Frames are composed on a worker thread, which then fires the frame's
//! completion callback, so completion is asynchronous to submission just as
//! with a GPU queue.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result, anyhow};
use crossbeam_channel::{Sender, unbounded};
use tracing::{debug, warn};

use crate::frame::{
    CommandSubmitter, Completion, Drawable, PixelFormat, PreparedFrame, PresentationSurface,
    SurfaceInfo,
};
use crate::processing::develop::DevelopedImage;
use crate::render::compose::{ComposedFrame, compose};

#[derive(Debug, Clone, Copy)]
pub struct OffscreenDrawable {
    info: SurfaceInfo,
}

impl Drawable for OffscreenDrawable {
    fn info(&self) -> SurfaceInfo {
        self.info
    }
}

struct Job {
    frame: PreparedFrame<DevelopedImage, OffscreenDrawable>,
    on_complete: Completion,
}

#[derive(Debug, Default)]
struct Presented {
    frame: Mutex<Option<ComposedFrame>>,
    count: AtomicU64,
    errors: AtomicU64,
}

pub struct OffscreenPresenter {
    info: SurfaceInfo,
    visible: bool,
    jobs: Option<Sender<Job>>,
    worker: Option<JoinHandle<()>>,
    presented: Arc<Presented>,
}

impl OffscreenPresenter {
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        let (jobs, rx) = unbounded::<Job>();
        let presented = Arc::new(Presented::default());
        let worker = {
            let presented = Arc::clone(&presented);
            thread::Builder::new()
                .name("offscreen-present".into())
                .spawn(move || {
                    while let Ok(Job { frame, on_complete }) = rx.recv() {
                        let index = frame.index;
                        match compose(frame.image.pixels(), &frame.plan, frame.drawable.info.format) {
                            Ok(composed) => {
                                if let Ok(mut slot) = presented.frame.lock() {
                                    *slot = Some(composed);
                                }
                                presented.count.fetch_add(1, Ordering::AcqRel);
                                debug!(index, "offscreen frame presented");
                            }
                            Err(err) => {
                                presented.errors.fetch_add(1, Ordering::AcqRel);
                                warn!(index, error = ?err, "offscreen composition failed");
                            }
                        }
                        on_complete();
                    }
                })
                .ok()
        };
        if worker.is_none() {
            warn!("failed to spawn offscreen present thread; frames will be rejected");
        }
        Self {
            info: SurfaceInfo {
                width,
                height,
                format,
            },
            visible: true,
            jobs: worker.as_ref().map(|_| jobs),
            worker,
            presented,
        }
    }

    pub fn info(&self) -> SurfaceInfo {
        self.info
    }

    /// Takes effect from the next drawable on.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.info.width = width;
        self.info.height = height;
    }

    /// A hidden surface hands out no drawables.
    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    pub fn presented_count(&self) -> u64 {
        self.presented.count.load(Ordering::Acquire)
    }

    pub fn error_count(&self) -> u64 {
        self.presented.errors.load(Ordering::Acquire)
    }

    pub fn last_frame(&self) -> Option<ComposedFrame> {
        self.presented
            .frame
            .lock()
            .ok()
            .and_then(|frame| frame.clone())
    }

    pub fn save_last_frame(&self, path: &Path) -> Result<()> {
        let frame = self
            .last_frame()
            .ok_or_else(|| anyhow!("no frame has been presented yet"))?;
        let image = frame
            .to_rgba_image()
            .context("presented frame has an inconsistent buffer size")?;
        image
            .save(path)
            .with_context(|| format!("failed to write {}", path.display()))
    }
}

impl PresentationSurface for OffscreenPresenter {
    type Drawable = OffscreenDrawable;

    fn current_drawable(&mut self) -> Option<OffscreenDrawable> {
        self.visible.then_some(OffscreenDrawable { info: self.info })
    }
}

impl CommandSubmitter<PreparedFrame<DevelopedImage, OffscreenDrawable>> for OffscreenPresenter {
    fn submit(
        &mut self,
        frame: PreparedFrame<DevelopedImage, OffscreenDrawable>,
        on_complete: Completion,
    ) -> Result<()> {
        let jobs = self
            .jobs
            .as_ref()
            .ok_or_else(|| anyhow!("offscreen present thread is not running"))?;
        jobs.send(Job { frame, on_complete })
            .map_err(|_| anyhow!("offscreen present thread has exited"))
    }
}

impl Drop for OffscreenPresenter {
    fn drop(&mut self) {
        self.jobs.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("offscreen present thread panicked");
            }
        }
    }
}
