//! Sink lifecycle: lazy creation, notification wiring and teardown of the
//! native video sink.
//!
//! The manager *tracks* the sink; the pipeline owns it. Producer-thread
//! notifications go through a [`SinkNotifier`] bound to one registration
//! epoch: frames land in the [`FrameSlot`], everything else is posted as a
//! [`SinkEvent`] and applied on the render thread by [`SinkLifecycle::drain_events`].

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info, trace};
use viewfinder_core::{FrameSize, SinkConfig, SinkError};

use crate::backend::{DisplayHandle, FrameHandle};
use crate::frame_slot::FrameSlot;

/// Asks the UI toolkit for a repaint. Must not block.
pub type RepaintHook = Arc<dyn Fn() + Send + Sync>;

// MARK: - Events

/// Producer-side notifications marshalled onto the render thread.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SinkEvent {
    CapsChanged { epoch: u64, size: FrameSize },
    /// The last reference held outside the manager went away.
    Released { epoch: u64 },
}

// MARK: - Traits

/// Native sink element as seen by the manager.
pub trait NativeSink: Send + 'static {
    /// Reference handed to the capture pipeline.
    type Handle: Clone + Send + 'static;
    type Frame: FrameHandle;

    fn handle(&self) -> Self::Handle;

    /// Route frame-ready, caps-changed and last-reference notifications to
    /// `notifier`. Called once per registration.
    fn connect(&mut self, notifier: SinkNotifier<Self::Frame>);

    /// Undo [`connect`](Self::connect). No notification may reach the old
    /// notifier's handlers once this returns, except ones already running.
    fn disconnect(&mut self);

    fn bind_display(&self, _display: DisplayHandle) {}
}

pub trait SinkFactory {
    type Sink: NativeSink;

    fn create_sink(&self, config: &SinkConfig) -> Result<Self::Sink, SinkError>;
}

pub type SinkHandle<F> = <<F as SinkFactory>::Sink as NativeSink>::Handle;
pub type SinkFrame<F> = <<F as SinkFactory>::Sink as NativeSink>::Frame;

// MARK: - SinkNotifier

/// Producer-facing end of one sink registration. Safe to call from any thread;
/// never blocks beyond the frame slot's swap.
pub struct SinkNotifier<H> {
    epoch:   u64,
    slot:    Arc<FrameSlot<H>>,
    events:  mpsc::UnboundedSender<SinkEvent>,
    repaint: RepaintHook,
}

impl<H> Clone for SinkNotifier<H> {
    fn clone(&self) -> Self {
        Self {
            epoch:   self.epoch,
            slot:    Arc::clone(&self.slot),
            events:  self.events.clone(),
            repaint: Arc::clone(&self.repaint),
        }
    }
}

impl<H> SinkNotifier<H> {
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Publish the newest frame and request a repaint. Returns `false` (and
    /// gives the frame back) when the registration has been reset.
    pub fn frame_ready(&self, frame: H) -> bool {
        if !self.slot.publish_from(self.epoch, frame) {
            return false;
        }
        // A reset between the publish and here already discarded the frame.
        self.slot.run_if_current(self.epoch, || (self.repaint)())
    }

    /// Post new caps. Ignored once the registration has been reset.
    pub fn caps_changed(&self, width: u32, height: u32) -> bool {
        let size = FrameSize::new(width, height);
        trace!(epoch = self.epoch, %size, "Sink caps changed");
        self.post(SinkEvent::CapsChanged { epoch: self.epoch, size })
    }

    pub fn last_reference_dropped(&self) -> bool {
        trace!(epoch = self.epoch, "Sink lost its last external reference");
        self.post(SinkEvent::Released { epoch: self.epoch })
    }

    fn post(&self, event: SinkEvent) -> bool {
        let mut posted = false;
        let current = self.slot.run_if_current(self.epoch, || {
            if self.events.send(event).is_ok() {
                (self.repaint)();
                posted = true;
            }
        });
        if !current {
            trace!(epoch = self.epoch, "Dropped notification from stale sink registration");
        }
        posted
    }
}

// MARK: - SinkLifecycle

struct Tracked<S> {
    sink:          S,
    epoch:         u64,
    display_bound: bool,
}

/// Owns the *tracking* of the native sink and the render-thread end of its
/// notifications.
pub struct SinkLifecycle<F: SinkFactory> {
    factory:   F,
    config:    SinkConfig,
    slot:      Arc<FrameSlot<SinkFrame<F>>>,
    events_tx: mpsc::UnboundedSender<SinkEvent>,
    events_rx: mpsc::UnboundedReceiver<SinkEvent>,
    repaint:   RepaintHook,
    tracked:   Option<Tracked<F::Sink>>,
    created:   u64,
    reinit:    bool,
}

impl<F: SinkFactory> SinkLifecycle<F> {
    pub fn new(factory: F, config: SinkConfig, repaint: RepaintHook) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            factory,
            config,
            slot: Arc::new(FrameSlot::new()),
            events_tx,
            events_rx,
            repaint,
            tracked: None,
            created: 0,
            reinit: true,
        }
    }

    /// Return the tracked sink, creating and wiring it if there is none.
    pub fn ensure_sink(&mut self) -> Result<SinkHandle<F>, SinkError> {
        if let Some(tracked) = &self.tracked {
            return Ok(tracked.sink.handle());
        }

        let mut sink = self.factory.create_sink(&self.config).map_err(|e| {
            error!("Failed to create viewfinder sink '{}': {}", self.config.element, e);
            e
        })?;

        let epoch = self.slot.advance_epoch();
        sink.connect(SinkNotifier {
            epoch,
            slot: Arc::clone(&self.slot),
            events: self.events_tx.clone(),
            repaint: Arc::clone(&self.repaint),
        });

        self.created += 1;
        info!("Viewfinder sink '{}' created (epoch {})", self.config.element, epoch);

        let handle = sink.handle();
        self.tracked = Some(Tracked { sink, epoch, display_bound: false });
        Ok(handle)
    }

    /// Explicit teardown: unregister, forget the sink, drop any pending frame
    /// and ask for GPU state to be re-derived.
    pub fn reset(&mut self) {
        if let Some(mut tracked) = self.tracked.take() {
            tracked.sink.disconnect();
            info!("Viewfinder sink reset (epoch {})", tracked.epoch);
        }
        self.slot.advance_epoch();
        self.reinit = true;
    }

    /// Apply queued producer events. Returns the newest frame size announced
    /// by the current registration, if any.
    pub fn drain_events(&mut self) -> Option<FrameSize> {
        let mut caps = None;
        while let Ok(event) = self.events_rx.try_recv() {
            match event {
                SinkEvent::CapsChanged { epoch, size } if epoch == self.slot.epoch() => {
                    caps = Some(size);
                }
                SinkEvent::Released { epoch } => self.forget_released(epoch),
                SinkEvent::CapsChanged { epoch, .. } => {
                    debug!("Ignoring caps from stale sink registration (epoch {})", epoch);
                }
            }
        }
        caps
    }

    fn forget_released(&mut self, epoch: u64) {
        match &self.tracked {
            Some(tracked) if tracked.epoch == epoch => {}
            _ => {
                debug!("Ignoring release of untracked sink (epoch {})", epoch);
                return;
            }
        }
        if let Some(mut tracked) = self.tracked.take() {
            tracked.sink.disconnect();
            info!("Viewfinder sink released by pipeline, no longer tracked (epoch {})", epoch);
        }
    }

    /// Hand the native display to the sink once per registration.
    pub fn bind_display(&mut self, handle: DisplayHandle) {
        if let Some(tracked) = self.tracked.as_mut().filter(|t| !t.display_bound) {
            tracked.sink.bind_display(handle);
            tracked.display_bound = true;
            debug!("Bound display {:?} to viewfinder sink", handle);
        }
    }

    pub fn take_frame(&self) -> Option<SinkFrame<F>> {
        self.slot.take()
    }

    /// Consume the pending re-initialisation request.
    pub fn take_reinit_request(&mut self) -> bool {
        std::mem::take(&mut self.reinit)
    }

    pub fn sink_handle(&self) -> Option<SinkHandle<F>> {
        self.tracked.as_ref().map(|t| t.sink.handle())
    }

    pub fn is_active(&self) -> bool {
        self.tracked.is_some()
    }

    pub fn epoch(&self) -> u64 {
        self.slot.epoch()
    }

    /// Number of native sinks created over the manager's lifetime.
    pub fn created_count(&self) -> u64 {
        self.created
    }

    pub fn slot(&self) -> &Arc<FrameSlot<SinkFrame<F>>> {
        &self.slot
    }

    pub fn config(&self) -> &SinkConfig {
        &self.config
    }
}

impl<F: SinkFactory> Drop for SinkLifecycle<F> {
    fn drop(&mut self) {
        if let Some(mut tracked) = self.tracked.take() {
            tracked.sink.disconnect();
        }
    }
}
