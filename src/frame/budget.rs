use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::FrameError;

/// Number of frames allowed between submission and completion by default.
pub const DEFAULT_FRAMES_IN_FLIGHT: usize = 3;

#[derive(Debug)]
struct Inner {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    acquired: AtomicU64,
    released: AtomicU64,
}

/// Bounded count of frames in flight.
///
/// Backed by an owned-permit semaphore, so waiting never spins and a slot can
/// be returned from whichever thread observes the frame's completion.
#[derive(Debug, Clone)]
pub struct FrameBudget {
    inner: Arc<Inner>,
}

impl FrameBudget {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Arc::new(Inner {
                semaphore: Arc::new(Semaphore::new(capacity)),
                capacity,
                acquired: AtomicU64::new(0),
                released: AtomicU64::new(0),
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Frames currently holding a slot. Always within `0..=capacity`.
    pub fn in_flight(&self) -> usize {
        self.inner.capacity - self.inner.semaphore.available_permits()
    }

    /// Total slots handed out since creation.
    pub fn acquired(&self) -> u64 {
        self.inner.acquired.load(Ordering::Acquire)
    }

    /// Total slots returned since creation.
    pub fn released(&self) -> u64 {
        self.inner.released.load(Ordering::Acquire)
    }

    /// Waits until fewer than `capacity` frames are outstanding.
    pub async fn acquire(&self) -> Result<FrameSlot, FrameError> {
        let permit = self
            .inner
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| FrameError::BudgetClosed)?;
        Ok(self.slot(permit))
    }

    /// Blocking flavour of [`FrameBudget::acquire`] for non-async host callbacks.
    pub fn acquire_blocking(&self) -> Result<FrameSlot, FrameError> {
        pollster::block_on(self.acquire())
    }

    /// Wakes every waiter with [`FrameError::BudgetClosed`]. Outstanding slots
    /// still release normally.
    pub fn close(&self) {
        self.inner.semaphore.close();
    }

    fn slot(&self, permit: OwnedSemaphorePermit) -> FrameSlot {
        self.inner.acquired.fetch_add(1, Ordering::AcqRel);
        FrameSlot {
            permit: Some(permit),
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Default for FrameBudget {
    fn default() -> Self {
        Self::new(DEFAULT_FRAMES_IN_FLIGHT)
    }
}

/// One acquired slot. Returned to the budget exactly once, when dropped or
/// when [`FrameSlot::release`] is called.
#[derive(Debug)]
pub struct FrameSlot {
    permit: Option<OwnedSemaphorePermit>,
    inner: Arc<Inner>,
}

impl FrameSlot {
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for FrameSlot {
    fn drop(&mut self) {
        if let Some(permit) = self.permit.take() {
            self.inner.released.fetch_add(1, Ordering::AcqRel);
            drop(permit);
        }
    }
}
