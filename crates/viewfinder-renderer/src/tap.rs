//! CPU-side frame tap.
//!
//! An observer registered here sees every CPU-mapped frame on the render
//! thread after it is acquired and before it goes back to the producer.
//! Frames imported straight from device memory never reach it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;
use viewfinder_core::{FrameSize, PixelFormat};

use crate::backend::ImportSource;

/// Borrowed view of one mapped frame; only valid for the call.
#[derive(Debug, Clone, Copy)]
pub struct TapFrame<'a> {
    pub data:   &'a [u8],
    pub stride: usize,
    pub size:   FrameSize,
    pub format: PixelFormat,
}

pub trait FrameTap: Send {
    /// Must return quickly; the draw waits for it.
    fn handle_frame(&mut self, frame: &TapFrame<'_>);
}

impl<F> FrameTap for F
where
    F: FnMut(&TapFrame<'_>) + Send,
{
    fn handle_frame(&mut self, frame: &TapFrame<'_>) {
        self(frame)
    }
}

/// Holds at most one tap behind its own lock, so any thread can swap it
/// while the render thread delivers. Clones share the slot.
#[derive(Clone, Default)]
pub struct FrameTapSlot(Arc<Mutex<Option<Box<dyn FrameTap>>>>);

impl FrameTapSlot {
    fn lock(&self) -> MutexGuard<'_, Option<Box<dyn FrameTap>>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Install `tap`, replacing any previous one.
    pub fn set(&self, tap: impl FrameTap + 'static) {
        *self.lock() = Some(Box::new(tap));
        debug!("Frame tap installed");
    }

    /// Remove the tap. Returns whether one was installed.
    pub fn clear(&self) -> bool {
        self.lock().take().is_some()
    }

    pub fn is_set(&self) -> bool {
        self.lock().is_some()
    }

    /// Hand a CPU-visible frame to the tap, if there is one.
    pub(crate) fn deliver(&self, source: &ImportSource<'_>) -> bool {
        let ImportSource::Pixels { data, stride, size, format } = *source else {
            return false;
        };
        let mut tap = self.lock();
        match tap.as_mut() {
            Some(tap) => {
                tap.handle_frame(&TapFrame { data, stride, size, format });
                true
            }
            None => false,
        }
    }
}

impl std::fmt::Debug for FrameTapSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameTapSlot").field("set", &self.is_set()).finish()
    }
}
