//! Single-slot latest-frame handoff between the producer and the render thread.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::trace;

struct SlotState<H> {
    pending: Option<H>,
    epoch:   u64,
}

/// Holds at most one undelivered frame; publishing overwrites.
///
/// The mutex only guards the swap. Displaced frames are dropped after the
/// guard is released, so returning a buffer to the producer never happens
/// under the lock.
pub struct FrameSlot<H> {
    state:     Mutex<SlotState<H>>,
    published: AtomicU64,
    dropped:   AtomicU64,
}

impl<H> Default for FrameSlot<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> FrameSlot<H> {
    pub fn new() -> Self {
        Self {
            state:     Mutex::new(SlotState { pending: None, epoch: 0 }),
            published: AtomicU64::new(0),
            dropped:   AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SlotState<H>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store `frame` under the current epoch, discarding any pending frame.
    pub fn publish(&self, frame: H) {
        let displaced = {
            let mut state = self.lock();
            state.pending.replace(frame)
        };
        self.note_published(displaced);
    }

    /// Like [`publish`](Self::publish) but only if `epoch` is still current.
    ///
    /// A frame from a stale registration is handed straight back to the
    /// producer and `false` is returned.
    pub fn publish_from(&self, epoch: u64, frame: H) -> bool {
        let displaced = {
            let mut state = self.lock();
            if state.epoch != epoch {
                drop(state);
                trace!(epoch, "Rejected frame from stale sink registration");
                drop(frame);
                return false;
            }
            state.pending.replace(frame)
        };
        self.note_published(displaced);
        true
    }

    fn note_published(&self, displaced: Option<H>) {
        self.published.fetch_add(1, Ordering::Relaxed);
        if let Some(old) = displaced {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            drop(old);
        }
    }

    /// Read and clear the slot.
    pub fn take(&self) -> Option<H> {
        self.lock().pending.take()
    }

    /// Drop any pending frame. Returns whether one was pending.
    pub fn clear(&self) -> bool {
        let pending = self.lock().pending.take();
        pending.is_some()
    }

    /// Clear the slot and start a new epoch in one step; frames still in
    /// flight from the previous registration will be rejected.
    pub fn advance_epoch(&self) -> u64 {
        let (pending, epoch) = {
            let mut state = self.lock();
            state.epoch += 1;
            (state.pending.take(), state.epoch)
        };
        drop(pending);
        epoch
    }

    pub fn epoch(&self) -> u64 {
        self.lock().epoch
    }

    /// Run `f` under the slot lock if `epoch` is still current. An epoch
    /// advance cannot interleave with `f`, so nothing `f` does outlives a reset.
    /// `f` must not block.
    pub fn run_if_current(&self, epoch: u64, f: impl FnOnce()) -> bool {
        let state = self.lock();
        if state.epoch != epoch {
            return false;
        }
        f();
        drop(state);
        true
    }

    pub fn has_pending(&self) -> bool {
        self.lock().pending.is_some()
    }

    /// Frames accepted into the slot since creation.
    pub fn published_frames(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Frames overwritten before the render thread took them.
    pub fn dropped_frames(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
