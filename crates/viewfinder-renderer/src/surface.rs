//! `Viewfinder`: the surface object the UI toolkit paints and resizes.
//!
//! # Flow
//! ```text
//! producer thread ─▶ SinkNotifier ─▶ FrameSlot ──────────────┐
//!                               └─▶ SinkEvent (mpsc) ─┐      │
//!                                                     ▼      ▼
//! UI toolkit ─ paint() ─▶ drain events ─▶ Geometry ─▶ TextureBinder ─▶ GPU
//! ```
//!
//! # State
//! `Uninitialized` → (sink created, first successful paint) → `Active`
//! → (resize or orientation change) → `NeedsReinit` → (next paint) → `Active`;
//! `stop()` returns to `Uninitialized` from anywhere.

use tokio::sync::watch;
use tracing::{debug, info, warn};
use viewfinder_core::{Diagnostic, FrameSize, Rect, Rotation, SinkError, Size, ViewfinderConfig};

use crate::backend::GraphicsBackend;
use crate::binder::TextureBinder;
use crate::geometry::{Geometry, Mat4};
use crate::sink::{RepaintHook, SinkFactory, SinkHandle, SinkLifecycle};
use crate::tap::FrameTapSlot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceState {
    Uninitialized,
    Active,
    NeedsReinit,
}

pub struct Viewfinder<F: SinkFactory, P> {
    lifecycle:         SinkLifecycle<F>,
    binder:            TextureBinder<P>,
    geometry:          Geometry,
    projection:        Mat4,
    background:        [f32; 4],
    rendering_enabled: bool,
    needs_reinit:      bool,
    state:             SurfaceState,
    render_area_tx:    watch::Sender<Rect>,
    frame_size_tx:     watch::Sender<FrameSize>,
    diagnostics_tx:    watch::Sender<Option<Diagnostic>>,
}

impl<F: SinkFactory, P> Viewfinder<F, P> {
    pub fn new(factory: F, config: &ViewfinderConfig, surface: Size, repaint: RepaintHook) -> Self {
        let surface = if surface.is_malformed() { Size::ZERO } else { surface };
        let (render_area_tx, _) = watch::channel(Rect::EMPTY);
        let (frame_size_tx, _) = watch::channel(FrameSize::default());
        let (diagnostics_tx, _) = watch::channel(None);
        let mut geometry = Geometry::new(surface);
        geometry.set_orientation(config.rotation, config.flipped);

        Self {
            lifecycle: SinkLifecycle::new(factory, config.sink.clone(), repaint),
            binder: TextureBinder::new(config.use_fence),
            geometry,
            projection: Mat4::ortho(Rect::from_size(surface)),
            background: config.background,
            rendering_enabled: config.rendering_enabled,
            needs_reinit: true,
            state: SurfaceState::Uninitialized,
            render_area_tx,
            frame_size_tx,
            diagnostics_tx,
        }
    }

    // ── Paint ─────────────────────────────────────────────────────────────

    /// Paint the latest frame. Returns whether a frame was drawn.
    ///
    /// `gpu` must wrap the context that is current on this thread. `world`
    /// is the caller's model transform; the picture orientation is applied
    /// on top of it.
    pub fn paint<G>(&mut self, gpu: &mut G, world: &Mat4) -> bool
    where
        G: GraphicsBackend<Program = P>,
    {
        if !gpu.has_context() {
            warn!("Viewfinder paint requested without a current graphics context");
            self.report(Diagnostic::NoGraphicsContext);
            return false;
        }

        gpu.clear(self.background);
        self.process_events();

        if !self.rendering_enabled || !self.lifecycle.is_active() {
            return false;
        }

        if let Some(display) = gpu.display_handle() {
            self.lifecycle.bind_display(display);
        }

        if self.lifecycle.take_reinit_request() {
            self.needs_reinit = true;
        }
        if self.needs_reinit {
            self.projection = Mat4::ortho(Rect::from_size(self.geometry.surface_size()));
            self.needs_reinit = false;
            if self.state == SurfaceState::NeedsReinit {
                self.state = SurfaceState::Active;
            }
            debug!("Viewfinder GPU state re-derived for {}", self.geometry.surface_size());
        }

        if self.geometry.render_area().is_empty() {
            return false;
        }
        let vertices = self.geometry.vertex_coords();
        let world = world.mul(&self.geometry.orientation_matrix());

        let frame = self.lifecycle.take_frame();
        let drawn = self.binder.draw_frame(gpu, frame, &vertices, &self.projection, &world);

        if let Some(e) = self.binder.take_program_error() {
            self.report(Diagnostic::ProgramUnavailable { log: e.to_string() });
        }
        if drawn {
            self.state = SurfaceState::Active;
        }
        drawn
    }

    /// Apply queued producer events (caps changes, sink release). `paint`
    /// does this itself; the UI thread may call it between paints too.
    pub fn process_events(&mut self) {
        if let Some(size) = self.lifecycle.drain_events() {
            self.apply_frame_size(size);
        }
    }

    fn apply_frame_size(&mut self, size: FrameSize) {
        if !self.geometry.set_frame_size(size) {
            return;
        }
        info!("Viewfinder frame size changed to {}", size);
        self.needs_reinit = true;
        self.publish_render_area();
        self.frame_size_tx.send_replace(size);
    }

    // ── Surface changes ───────────────────────────────────────────────────

    pub fn resize(&mut self, size: Size) {
        if size.is_malformed() {
            warn!("Rejecting viewfinder resize to {}", size);
            self.report(Diagnostic::InvalidSurfaceSize { width: size.width, height: size.height });
            return;
        }
        if !self.geometry.set_surface_size(size) {
            return;
        }
        debug!("Viewfinder surface resized to {}", size);
        self.needs_reinit = true;
        if self.state == SurfaceState::Active {
            self.state = SurfaceState::NeedsReinit;
        }
        self.publish_render_area();
    }

    /// Rotate and/or mirror the picture. Takes effect on the next paint.
    pub fn set_orientation(&mut self, rotation: Rotation, flipped: bool) {
        if !self.geometry.set_orientation(rotation, flipped) {
            return;
        }
        info!("Viewfinder orientation set to {} (flipped: {})", rotation, flipped);
        self.needs_reinit = true;
        if self.state == SurfaceState::Active {
            self.state = SurfaceState::NeedsReinit;
        }
        self.publish_render_area();
    }

    /// Create the sink if needed; failures are surfaced as a diagnostic and
    /// returned, never retried here.
    pub fn ensure_sink(&mut self) -> Result<SinkHandle<F>, SinkError> {
        self.lifecycle.ensure_sink().map_err(|e| {
            self.report(Diagnostic::SinkUnavailable {
                element: self.lifecycle.config().element.clone(),
                reason: e.to_string(),
            });
            e
        })
    }

    /// The upstream capture device was swapped: pick up any release the old
    /// pipeline caused, then make sure a sink is there to wire into the new one.
    pub fn on_device_changed(&mut self) -> Result<SinkHandle<F>, SinkError> {
        self.process_events();
        let handle = self.ensure_sink()?;
        self.needs_reinit = true;
        self.publish_render_area();
        self.frame_size_tx.send_replace(self.geometry.frame_size());
        Ok(handle)
    }

    /// [`stop`](Self::stop) with the graphics context at hand, so the shader
    /// program is deleted instead of left to die with the context.
    pub fn stop_with<G>(&mut self, gpu: &mut G)
    where
        G: GraphicsBackend<Program = P>,
    {
        self.binder.invalidate(gpu);
        self.stop();
    }

    /// Tear down for backgrounding or surface destruction. Geometry and frame
    /// size keep their values until new caps arrive.
    pub fn stop(&mut self) {
        self.lifecycle.reset();
        self.binder.forget_program();
        self.needs_reinit = true;
        self.state = SurfaceState::Uninitialized;
    }

    pub fn reset(&mut self) {
        self.stop();
    }

    // ── Accessors ─────────────────────────────────────────────────────────

    pub fn render_area(&mut self) -> Rect {
        self.geometry.render_area()
    }

    pub fn frame_size(&self) -> FrameSize {
        self.geometry.frame_size()
    }

    pub fn surface_size(&self) -> Size {
        self.geometry.surface_size()
    }

    pub fn sink_handle(&self) -> Option<SinkHandle<F>> {
        self.lifecycle.sink_handle()
    }

    pub fn rotation(&self) -> Rotation {
        self.geometry.rotation()
    }

    pub fn is_flipped(&self) -> bool {
        self.geometry.is_flipped()
    }

    /// Frames the producer handed over since the viewfinder was created.
    pub fn published_frames(&self) -> u64 {
        self.lifecycle.slot().published_frames()
    }

    /// Frames overwritten before a paint could take them.
    pub fn dropped_frames(&self) -> u64 {
        self.lifecycle.slot().dropped_frames()
    }

    /// Observer slot for CPU-mapped frames; see [`FrameTapSlot`].
    pub fn frame_tap(&self) -> FrameTapSlot {
        self.binder.frame_tap()
    }

    pub fn state(&self) -> SurfaceState {
        self.state
    }

    pub fn is_rendering_enabled(&self) -> bool {
        self.rendering_enabled
    }

    pub fn set_rendering_enabled(&mut self, enabled: bool) {
        self.rendering_enabled = enabled;
    }

    pub fn watch_render_area(&self) -> watch::Receiver<Rect> {
        self.render_area_tx.subscribe()
    }

    pub fn watch_frame_size(&self) -> watch::Receiver<FrameSize> {
        self.frame_size_tx.subscribe()
    }

    pub fn watch_diagnostics(&self) -> watch::Receiver<Option<Diagnostic>> {
        self.diagnostics_tx.subscribe()
    }

    pub fn lifecycle(&self) -> &SinkLifecycle<F> {
        &self.lifecycle
    }

    pub fn binder(&self) -> &TextureBinder<P> {
        &self.binder
    }

    fn publish_render_area(&mut self) {
        let area = self.geometry.render_area();
        self.render_area_tx.send_replace(area);
    }

    fn report(&self, diagnostic: Diagnostic) {
        self.diagnostics_tx.send_replace(Some(diagnostic));
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::backend::DisplayHandle;
    use crate::testing::{repaint_counter, FakeFrame, FakeGpu, FakeSinkFactory, FrameLog, GpuCall};

    type TestViewfinder = Viewfinder<FakeSinkFactory, u32>;

    fn viewfinder(factory: &FakeSinkFactory, surface: Size) -> TestViewfinder {
        Viewfinder::new(factory.clone(), &ViewfinderConfig::default(), surface, Arc::new(|| {}))
    }

    fn paint(vf: &mut TestViewfinder, gpu: &mut FakeGpu) -> bool {
        vf.paint(gpu, &Mat4::IDENTITY)
    }

    #[test]
    fn paint_without_sink_only_clears() {
        let factory = FakeSinkFactory::default();
        let mut vf = viewfinder(&factory, Size::new(800.0, 600.0));
        let mut gpu = FakeGpu::default();

        assert!(!paint(&mut vf, &mut gpu));
        assert_eq!(gpu.calls, vec![GpuCall::Clear([0.0, 0.0, 0.0, 1.0])]);
        assert_eq!(vf.state(), SurfaceState::Uninitialized);
    }

    #[test]
    fn paint_without_context_is_rejected() {
        let factory = FakeSinkFactory::default();
        let mut vf = viewfinder(&factory, Size::new(800.0, 600.0));
        let diagnostics = vf.watch_diagnostics();
        let mut gpu = FakeGpu { context: false, ..FakeGpu::default() };

        assert!(!paint(&mut vf, &mut gpu));
        assert!(gpu.calls.is_empty());
        assert_eq!(*diagnostics.borrow(), Some(Diagnostic::NoGraphicsContext));
    }

    #[test]
    fn no_caps_yet_means_empty_area_and_no_draw() {
        let factory = FakeSinkFactory::default();
        let log = FrameLog::default();
        let mut vf = viewfinder(&factory, Size::new(800.0, 600.0));
        vf.ensure_sink().expect("sink");
        factory.notifier().expect("connected").frame_ready(FakeFrame::new(1, &log));

        let mut gpu = FakeGpu::default();
        assert!(!paint(&mut vf, &mut gpu));

        assert!(vf.render_area().is_empty());
        assert_eq!(gpu.clears(), 1);
        assert_eq!(gpu.draws(), 0);
    }

    #[test]
    fn two_frames_before_paint_draw_only_the_latest() {
        let factory = FakeSinkFactory::default();
        let log = FrameLog::default();
        let mut vf = viewfinder(&factory, Size::new(1920.0, 1080.0));
        vf.ensure_sink().expect("sink");
        let producer = factory.notifier().expect("connected");

        producer.caps_changed(640, 480);
        producer.frame_ready(FakeFrame::new(1, &log));
        producer.frame_ready(FakeFrame::new(2, &log));

        let mut gpu = FakeGpu::default();
        assert!(paint(&mut vf, &mut gpu));

        assert_eq!(gpu.draws(), 1);
        assert_eq!(log.discarded(), vec![1]);
        assert_eq!(log.released(), vec![(2, true)]);
        assert_eq!(vf.render_area(), Rect::new(240.0, 0.0, 1440.0, 1080.0));
        assert_eq!(vf.state(), SurfaceState::Active);

        match gpu.last_draw() {
            Some(GpuCall::Draw { vertices, projection, .. }) => {
                assert_eq!(vertices[0], viewfinder_core::Point::new(240.0, 1080.0));
                assert_eq!(*projection, Mat4::ortho(Rect::new(0.0, 0.0, 1920.0, 1080.0)));
            }
            other => panic!("expected a draw, got {other:?}"),
        }

        // Nothing new: the slot is empty until the producer publishes again.
        assert!(!paint(&mut vf, &mut gpu));
        assert_eq!(gpu.draws(), 1);
    }

    #[test]
    fn caps_change_updates_frame_size_and_notifies() {
        let factory = FakeSinkFactory::default();
        let mut vf = viewfinder(&factory, Size::new(1920.0, 1080.0));
        let mut frame_rx = vf.watch_frame_size();
        let mut area_rx = vf.watch_render_area();
        vf.ensure_sink().expect("sink");

        factory.notifier().expect("connected").caps_changed(640, 480);
        vf.process_events();

        assert!(frame_rx.has_changed().expect("sender alive"));
        assert_eq!(*frame_rx.borrow_and_update(), FrameSize::new(640, 480));
        assert!(area_rx.has_changed().expect("sender alive"));
        assert_eq!(*area_rx.borrow_and_update(), Rect::new(240.0, 0.0, 1440.0, 1080.0));
    }

    #[test]
    fn resize_marks_reinit_and_rederives_projection() {
        let factory = FakeSinkFactory::default();
        let log = FrameLog::default();
        let mut vf = viewfinder(&factory, Size::new(800.0, 600.0));
        vf.ensure_sink().expect("sink");
        let producer = factory.notifier().expect("connected");
        producer.caps_changed(800, 600);
        producer.frame_ready(FakeFrame::new(1, &log));

        let mut gpu = FakeGpu::default();
        assert!(paint(&mut vf, &mut gpu));
        assert_eq!(vf.state(), SurfaceState::Active);

        vf.resize(Size::new(1600.0, 600.0));
        assert_eq!(vf.state(), SurfaceState::NeedsReinit);
        assert_eq!(vf.render_area(), Rect::new(400.0, 0.0, 800.0, 600.0));
        assert_eq!(factory.created(), 1);

        producer.frame_ready(FakeFrame::new(2, &log));
        assert!(paint(&mut vf, &mut gpu));
        assert_eq!(vf.state(), SurfaceState::Active);
        match gpu.last_draw() {
            Some(GpuCall::Draw { projection, .. }) => {
                assert_eq!(*projection, Mat4::ortho(Rect::new(0.0, 0.0, 1600.0, 600.0)));
            }
            other => panic!("expected a draw, got {other:?}"),
        }
    }

    #[test]
    fn invalid_resize_is_a_no_op() {
        let factory = FakeSinkFactory::default();
        let mut vf = viewfinder(&factory, Size::new(800.0, 600.0));
        let diagnostics = vf.watch_diagnostics();

        vf.resize(Size::new(-10.0, 600.0));
        assert_eq!(vf.surface_size(), Size::new(800.0, 600.0));
        assert_eq!(
            *diagnostics.borrow(),
            Some(Diagnostic::InvalidSurfaceSize { width: -10.0, height: 600.0 })
        );
    }

    #[test]
    fn reset_keeps_geometry_but_drops_pending_frame() {
        let factory = FakeSinkFactory::default();
        let log = FrameLog::default();
        let mut vf = viewfinder(&factory, Size::new(1920.0, 1080.0));
        vf.ensure_sink().expect("sink");
        let producer = factory.notifier().expect("connected");
        producer.caps_changed(640, 480);
        vf.process_events();
        producer.frame_ready(FakeFrame::new(1, &log));

        vf.reset();

        assert!(vf.lifecycle().take_frame().is_none());
        assert_eq!(log.discarded(), vec![1]);
        assert_eq!(vf.frame_size(), FrameSize::new(640, 480));
        assert_eq!(vf.render_area(), Rect::new(240.0, 0.0, 1440.0, 1080.0));
        assert_eq!(vf.state(), SurfaceState::Uninitialized);
        assert!(vf.sink_handle().is_none());

        // Late producer activity from the torn-down registration is ignored.
        producer.caps_changed(1280, 720);
        producer.frame_ready(FakeFrame::new(2, &log));
        vf.process_events();
        assert_eq!(vf.frame_size(), FrameSize::new(640, 480));

        let mut gpu = FakeGpu::default();
        assert!(!paint(&mut vf, &mut gpu));
        assert_eq!(gpu.draws(), 0);
    }

    #[test]
    fn stop_rebuilds_program_on_next_paint() {
        let factory = FakeSinkFactory::default();
        let log = FrameLog::default();
        let mut vf = viewfinder(&factory, Size::new(800.0, 600.0));
        let mut gpu = FakeGpu::default();

        vf.ensure_sink().expect("sink");
        let producer = factory.notifier().expect("connected");
        producer.caps_changed(800, 600);
        producer.frame_ready(FakeFrame::new(1, &log));
        assert!(paint(&mut vf, &mut gpu));

        vf.stop();
        vf.on_device_changed().expect("sink");
        let producer = factory.notifier().expect("connected");
        producer.frame_ready(FakeFrame::new(2, &log));
        assert!(paint(&mut vf, &mut gpu));

        assert_eq!(gpu.compiles(), 2);
        assert_eq!(factory.created(), 2);
    }

    #[test]
    fn device_change_recreates_released_sink() {
        let factory = FakeSinkFactory::default();
        let mut vf = viewfinder(&factory, Size::new(800.0, 600.0));
        let first = vf.ensure_sink().expect("sink");

        // Old pipeline dropped its reference to the sink.
        factory.notifier().expect("connected").last_reference_dropped();
        let second = vf.on_device_changed().expect("sink");

        assert_ne!(first, second);
        assert_eq!(factory.created(), 2);
        assert_eq!(vf.sink_handle(), Some(second));
    }

    #[test]
    fn device_change_with_live_sink_reuses_it() {
        let factory = FakeSinkFactory::default();
        let mut vf = viewfinder(&factory, Size::new(800.0, 600.0));
        let first = vf.ensure_sink().expect("sink");
        assert_eq!(vf.on_device_changed().expect("sink"), first);
        assert_eq!(factory.created(), 1);
    }

    #[test]
    fn sink_failure_is_reported_and_not_retried() {
        let factory = FakeSinkFactory::failing();
        let mut vf = viewfinder(&factory, Size::new(800.0, 600.0));
        let diagnostics = vf.watch_diagnostics();

        assert!(vf.ensure_sink().is_err());
        assert!(matches!(*diagnostics.borrow(), Some(Diagnostic::SinkUnavailable { .. })));

        let mut gpu = FakeGpu::default();
        assert!(!paint(&mut vf, &mut gpu));
        assert!(!paint(&mut vf, &mut gpu));
        assert_eq!(factory.attempts(), 1);

        factory.set_failing(false);
        assert!(vf.ensure_sink().is_ok());
    }

    #[test]
    fn disabled_rendering_skips_draw() {
        let factory = FakeSinkFactory::default();
        let log = FrameLog::default();
        let mut vf = viewfinder(&factory, Size::new(800.0, 600.0));
        vf.ensure_sink().expect("sink");
        let producer = factory.notifier().expect("connected");
        producer.caps_changed(800, 600);
        producer.frame_ready(FakeFrame::new(1, &log));

        vf.set_rendering_enabled(false);
        let mut gpu = FakeGpu::default();
        assert!(!paint(&mut vf, &mut gpu));
        assert_eq!(gpu.clears(), 1);
        assert_eq!(gpu.draws(), 0);

        vf.set_rendering_enabled(true);
        assert!(paint(&mut vf, &mut gpu));
    }

    #[test]
    fn program_failure_is_reported_once() {
        let factory = FakeSinkFactory::default();
        let log = FrameLog::default();
        let mut vf = viewfinder(&factory, Size::new(800.0, 600.0));
        let mut diagnostics = vf.watch_diagnostics();
        vf.ensure_sink().expect("sink");
        let producer = factory.notifier().expect("connected");
        producer.caps_changed(800, 600);

        let mut gpu = FakeGpu { fail_link: true, ..FakeGpu::default() };
        producer.frame_ready(FakeFrame::new(1, &log));
        assert!(!paint(&mut vf, &mut gpu));
        assert!(diagnostics.has_changed().expect("sender alive"));
        assert!(matches!(
            *diagnostics.borrow_and_update(),
            Some(Diagnostic::ProgramUnavailable { .. })
        ));

        producer.frame_ready(FakeFrame::new(2, &log));
        assert!(!paint(&mut vf, &mut gpu));
        assert!(!diagnostics.has_changed().expect("sender alive"));
        assert_eq!(log.released(), vec![(1, false), (2, false)]);
    }

    #[test]
    fn display_handle_is_forwarded_to_sink() {
        let factory = FakeSinkFactory::default();
        let mut vf = viewfinder(&factory, Size::new(800.0, 600.0));
        vf.ensure_sink().expect("sink");

        let mut gpu = FakeGpu { display: Some(DisplayHandle(42)), ..FakeGpu::default() };
        paint(&mut vf, &mut gpu);
        paint(&mut vf, &mut gpu);
        assert_eq!(factory.displays_bound(), 1);
    }

    #[test]
    fn frame_ready_requests_repaint() {
        let factory = FakeSinkFactory::default();
        let log = FrameLog::default();
        let (hook, repaints) = repaint_counter();
        let mut vf: TestViewfinder =
            Viewfinder::new(factory.clone(), &ViewfinderConfig::default(), Size::new(800.0, 600.0), hook);
        vf.ensure_sink().expect("sink");

        let producer = factory.notifier().expect("connected");
        std::thread::spawn(move || {
            producer.frame_ready(FakeFrame::new(1, &log));
        })
        .join()
        .expect("producer thread");

        assert_eq!(repaints(), 1);
        assert!(vf.lifecycle().slot().has_pending());
    }

    #[test]
    fn stop_with_context_deletes_program() {
        let factory = FakeSinkFactory::default();
        let log = FrameLog::default();
        let mut vf = viewfinder(&factory, Size::new(800.0, 600.0));
        let mut gpu = FakeGpu::default();

        vf.ensure_sink().expect("sink");
        let producer = factory.notifier().expect("connected");
        producer.caps_changed(800, 600);
        producer.frame_ready(FakeFrame::new(1, &log));
        assert!(paint(&mut vf, &mut gpu));

        vf.stop_with(&mut gpu);
        assert!(gpu.calls.contains(&GpuCall::DeleteProgram(1)));
        assert!(!vf.binder().has_program());
        assert_eq!(vf.state(), SurfaceState::Uninitialized);
        assert!(vf.sink_handle().is_none());
    }

    #[test]
    fn orientation_comes_from_config_and_composes_with_world() {
        let factory = FakeSinkFactory::default();
        let log = FrameLog::default();
        let config = ViewfinderConfig { rotation: Rotation::Clockwise90, flipped: true, ..ViewfinderConfig::default() };
        let mut vf: TestViewfinder =
            Viewfinder::new(factory.clone(), &config, Size::new(1920.0, 1080.0), Arc::new(|| {}));
        vf.ensure_sink().expect("sink");
        let producer = factory.notifier().expect("connected");
        producer.caps_changed(640, 480);
        producer.frame_ready(FakeFrame::new(1, &log));

        let mut gpu = FakeGpu::default();
        assert!(paint(&mut vf, &mut gpu));
        assert_eq!(vf.render_area(), Rect::new(555.0, 0.0, 810.0, 1080.0));

        let expected = Mat4::orientation(viewfinder_core::Point::new(960.0, 540.0), Rotation::Clockwise90, true);
        match gpu.last_draw() {
            Some(GpuCall::Draw { world, .. }) => assert_eq!(*world, expected),
            other => panic!("expected a draw, got {other:?}"),
        }
    }

    #[test]
    fn orientation_change_reletterboxes_and_notifies() {
        let factory = FakeSinkFactory::default();
        let log = FrameLog::default();
        let mut vf = viewfinder(&factory, Size::new(1920.0, 1080.0));
        let mut area_rx = vf.watch_render_area();
        vf.ensure_sink().expect("sink");
        let producer = factory.notifier().expect("connected");
        producer.caps_changed(640, 480);
        producer.frame_ready(FakeFrame::new(1, &log));
        let mut gpu = FakeGpu::default();
        assert!(paint(&mut vf, &mut gpu));
        area_rx.borrow_and_update();

        vf.set_orientation(Rotation::Clockwise270, false);
        assert_eq!(vf.state(), SurfaceState::NeedsReinit);
        assert!(area_rx.has_changed().expect("sender alive"));
        assert_eq!(*area_rx.borrow_and_update(), Rect::new(555.0, 0.0, 810.0, 1080.0));

        vf.set_orientation(Rotation::Clockwise270, false);
        assert!(!area_rx.has_changed().expect("sender alive"));
        assert_eq!(vf.rotation(), Rotation::Clockwise270);
        assert!(!vf.is_flipped());
    }

    #[test]
    fn frame_counters_expose_drops() {
        let factory = FakeSinkFactory::default();
        let log = FrameLog::default();
        let mut vf = viewfinder(&factory, Size::new(800.0, 600.0));
        vf.ensure_sink().expect("sink");
        let producer = factory.notifier().expect("connected");
        for id in 0..3 {
            producer.frame_ready(FakeFrame::new(id, &log));
        }
        assert_eq!(vf.published_frames(), 3);
        assert_eq!(vf.dropped_frames(), 2);
    }

    #[test]
    fn tap_is_shared_with_the_binder() {
        let factory = FakeSinkFactory::default();
        let vf = viewfinder(&factory, Size::new(800.0, 600.0));
        vf.frame_tap().set(|_: &crate::tap::TapFrame<'_>| {});
        assert!(vf.binder().frame_tap().is_set());
    }
}
