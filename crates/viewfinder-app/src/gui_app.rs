use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use eframe::{egui_glow, glow};
use egui::{Color32, FontFamily, FontId, Frame, Margin, RichText, ScrollArea, Stroke, Vec2};
use tokio::sync::watch;
use tracing::{info, warn};
use viewfinder_core::{Diagnostic, FrameSize, Rect, Size, ViewfinderConfig};
use viewfinder_gst::GstSinkFactory;
use viewfinder_renderer::{Mat4, RepaintHook, Viewfinder};

use crate::exposure::{LumaMeter, LumaReading};
use crate::gl_backend::{GlProgram, GlResources, GlowBackend};
use crate::pipeline::CapturePipeline;
use crate::state::{Phase, ViewState};

// ── Colours ───────────────────────────────────────────────────────────────────

const BG_PANEL:  Color32 = Color32::from_rgb(28,  30,  36);
const BG_INSET:  Color32 = Color32::from_rgb(20,  22,  28);
const BG_CARD:   Color32 = Color32::from_rgb(36,  38,  46);
const ACCENT:    Color32 = Color32::from_rgb(99, 144, 255);
const TEXT_DIM:  Color32 = Color32::from_rgb(130, 135, 148);
const TEXT_NORM: Color32 = Color32::from_rgb(210, 215, 230);

// ── Shared with the paint callback ────────────────────────────────────────────

/// State the GL paint callback needs; egui runs it on the UI thread after
/// `update`, so the lock is never contended.
struct Shared {
    viewfinder: Viewfinder<GstSinkFactory, GlProgram>,
    resources:  GlResources,
    view:       ViewState,
}

impl Shared {
    /// Stop the viewfinder, deleting its GL objects when a context is at hand.
    fn stop(&mut self, gl: Option<&glow::Context>) {
        match gl {
            Some(gl) => {
                let mut gpu = GlowBackend::new(gl, &mut self.resources);
                self.viewfinder.stop_with(&mut gpu);
            }
            None => self.viewfinder.stop(),
        }
    }
}

type SharedViewfinder = Arc<Mutex<Shared>>;

fn lock(shared: &SharedViewfinder) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── App struct ────────────────────────────────────────────────────────────────

pub struct ViewfinderApp {
    shared:      SharedViewfinder,
    gl:          Option<Arc<glow::Context>>,
    pipeline:    Option<CapturePipeline>,
    sources:     Vec<String>,
    convert:     Option<String>,
    luma:        LumaReading,
    current:     usize,
    diagnostics: watch::Receiver<Option<Diagnostic>>,
    frame_size:  watch::Receiver<FrameSize>,
    render_area: watch::Receiver<Rect>,
}

impl ViewfinderApp {
    pub fn new(
        cc: &eframe::CreationContext<'_>,
        mut config: ViewfinderConfig,
        factory: GstSinkFactory,
        sources: Vec<String>,
        convert: Option<String>,
    ) -> Self {
        let mut visuals = egui::Visuals::dark();
        visuals.window_fill      = BG_PANEL;
        visuals.panel_fill       = BG_PANEL;
        visuals.extreme_bg_color = BG_INSET;
        visuals.faint_bg_color   = BG_CARD;
        visuals.widgets.inactive.bg_fill = BG_CARD;
        cc.egui_ctx.set_visuals(visuals);

        let ctx = cc.egui_ctx.clone();
        let repaint: RepaintHook = Arc::new(move || ctx.request_repaint());

        // The context is current while the app is created.
        let resources = GlResources::new(cc.gl.as_deref());
        if config.sink.zero_copy && !resources.supports_dmabuf() {
            info!("DMA-BUF import unavailable; frames will be copied");
            config.sink.zero_copy = false;
        }
        if config.use_fence && !resources.supports_fences() {
            info!("No EGL fences; buffers are released without waiting on the GPU");
        }

        let viewfinder = Viewfinder::new(factory, &config, Size::ZERO, repaint);
        let (meter, luma) = LumaMeter::new();
        viewfinder.frame_tap().set(meter);
        let diagnostics = viewfinder.watch_diagnostics();
        let frame_size = viewfinder.watch_frame_size();
        let render_area = viewfinder.watch_render_area();

        let mut app = Self {
            shared: Arc::new(Mutex::new(Shared {
                viewfinder,
                resources,
                view: ViewState::default(),
            })),
            gl: cc.gl.clone(),
            pipeline: None,
            sources,
            convert,
            luma,
            current: 0,
            diagnostics,
            frame_size,
            render_area,
        };
        app.start_preview(false);
        app
    }

    fn source(&self) -> &str {
        self.sources.get(self.current).map(String::as_str).unwrap_or("videotestsrc")
    }

    /// Get a sink from the viewfinder and run the current source into it.
    fn start_preview(&mut self, device_changed: bool) {
        let source = self.source().to_string();
        let mut shared = lock(&self.shared);
        let sink = if device_changed {
            shared.viewfinder.on_device_changed()
        } else {
            shared.viewfinder.ensure_sink()
        };

        let result = sink
            .map_err(anyhow::Error::from)
            .and_then(|sink| CapturePipeline::start(&source, self.convert.as_deref(), &sink));
        match result {
            Ok(pipeline) => {
                shared.view.reset_stats();
                shared.view.phase = Phase::Previewing { source: source.clone() };
                shared.view.push_log(format!("[INFO] Previewing {source}"));
                self.pipeline = Some(pipeline);
            }
            Err(e) => {
                warn!("Preview failed: {:#}", e);
                shared.view.phase = Phase::Error(format!("{e:#}"));
                shared.view.push_log(format!("[ERROR] {e:#}"));
                // Leave no half-wired sink behind.
                shared.stop(self.gl.as_deref());
            }
        }
    }

    fn switch_source(&mut self) {
        // Dropping the pipeline unparents the sink before the device change.
        self.pipeline = None;
        self.current = (self.current + 1) % self.sources.len().max(1);
        info!("Switching capture source to '{}'", self.source());
        self.start_preview(true);
    }

    fn stop_preview(&mut self) {
        {
            let mut shared = lock(&self.shared);
            shared.stop(self.gl.as_deref());
            shared.view.phase = Phase::Stopped;
            shared.view.reset_stats();
            shared.view.push_log("[INFO] Preview stopped");
        }
        self.pipeline = None;
        self.luma.clear();
    }

    /// Step the preview a quarter turn clockwise, or toggle the mirror.
    fn set_orientation(&mut self, rotate: bool, mirror: bool) {
        let mut shared = lock(&self.shared);
        let mut rotation = shared.viewfinder.rotation();
        if rotate {
            rotation = rotation.next();
        }
        let flipped = shared.viewfinder.is_flipped() ^ mirror;
        shared.viewfinder.set_orientation(rotation, flipped);
        shared.view.push_log(format!(
            "[INFO] Orientation {}{}",
            rotation,
            if flipped { ", mirrored" } else { "" }
        ));
    }

    /// Fold watch-channel updates and bus errors into the panel state.
    fn poll(&mut self) {
        let bus_error = self.pipeline.as_ref().and_then(CapturePipeline::poll_error);
        if bus_error.is_some() {
            self.pipeline = None;
        }

        let mut shared = lock(&self.shared);
        if let Some(err) = bus_error {
            shared.view.phase = Phase::Error(err.clone());
            shared.view.push_log(format!("[ERROR] {err}"));
        }
        if self.diagnostics.has_changed().unwrap_or(false) {
            if let Some(diagnostic) = self.diagnostics.borrow_and_update().clone() {
                shared.view.push_log(format!("[WARN] {diagnostic}"));
            }
        }
        if self.frame_size.has_changed().unwrap_or(false) {
            shared.view.frame_size = *self.frame_size.borrow_and_update();
        }
        if self.render_area.has_changed().unwrap_or(false) {
            shared.view.render_area = *self.render_area.borrow_and_update();
        }
    }
}

// ── eframe::App implementation ────────────────────────────────────────────────

impl eframe::App for ViewfinderApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.poll();

        egui::SidePanel::right("controls")
            .exact_width(260.0)
            .frame(Frame::none().fill(BG_PANEL).inner_margin(Margin::same(10.0)))
            .show(ctx, |ui| self.render_controls(ui));

        egui::CentralPanel::default()
            .frame(Frame::none().fill(Color32::BLACK))
            .show(ctx, |ui| self.render_viewfinder(ui));
    }

    fn on_exit(&mut self, gl: Option<&glow::Context>) {
        let mut shared = lock(&self.shared);
        shared.stop(gl);
        if let Some(gl) = gl {
            shared.resources.destroy(gl);
        }
        drop(shared);
        self.pipeline = None;
    }
}

// ── Rendering helpers ─────────────────────────────────────────────────────────

impl ViewfinderApp {
    fn render_viewfinder(&mut self, ui: &mut egui::Ui) {
        let (rect, _) = ui.allocate_exact_size(ui.available_size(), egui::Sense::hover());

        {
            let mut shared = lock(&self.shared);
            let size = Size::new(rect.width(), rect.height());
            if shared.viewfinder.surface_size() != size {
                shared.viewfinder.resize(size);
            }
        }

        let shared = Arc::clone(&self.shared);
        let callback = egui_glow::CallbackFn::new(move |_info, painter| {
            let mut shared = lock(&shared);
            let Shared { viewfinder, resources, view } = &mut *shared;
            let mut gpu = GlowBackend::new(painter.gl(), resources);
            if viewfinder.paint(&mut gpu, &Mat4::IDENTITY) {
                view.tick_frame();
            }
        });
        ui.painter().add(egui::PaintCallback { rect, callback: Arc::new(callback) });
    }

    fn render_controls(&mut self, ui: &mut egui::Ui) {
        let (phase, fps, frames, frame_size, area, logs, mut enabled) = {
            let shared = lock(&self.shared);
            (
                shared.view.phase.clone(),
                shared.view.fps,
                shared.view.frames_drawn,
                shared.view.frame_size,
                shared.view.render_area,
                shared.view.logs.iter().cloned().collect::<Vec<_>>(),
                shared.viewfinder.is_rendering_enabled(),
            )
        };
        let (published, dropped, mut mirrored) = {
            let shared = lock(&self.shared);
            (
                shared.viewfinder.published_frames(),
                shared.viewfinder.dropped_frames(),
                shared.viewfinder.is_flipped(),
            )
        };
        let luma = self.luma.get();

        ui.label(
            RichText::new("Viewfinder")
                .font(FontId::new(22.0, FontFamily::Proportional))
                .strong()
                .color(ACCENT),
        );
        ui.add_space(8.0);

        card(ui, |ui| {
            ui.horizontal(|ui| {
                let (dot, _) = ui.allocate_exact_size(Vec2::splat(12.0), egui::Sense::hover());
                ui.painter().circle_filled(dot.center(), 5.0, phase.color());
                ui.label(RichText::new(phase.label()).strong().color(TEXT_NORM));
            });
            match &phase {
                Phase::Previewing { source } => {
                    ui.label(RichText::new(source).color(TEXT_DIM).font(FontId::new(11.5, FontFamily::Monospace)));
                }
                Phase::Error(msg) => {
                    ui.label(RichText::new(msg).color(Color32::from_rgb(220, 100, 100)));
                }
                Phase::Stopped => {}
            }
        });
        ui.add_space(8.0);

        card(ui, |ui| {
            ui.horizontal_wrapped(|ui| {
                stat_chip(ui, "FPS", &format!("{fps:.0}"));
                stat_chip(ui, "Drawn", &frames.to_string());
                stat_chip(ui, "Published", &published.to_string());
                stat_chip(ui, "Dropped", &dropped.to_string());
            });
            ui.add_space(4.0);
            ui.label(RichText::new(format!("Frame  {frame_size}")).color(TEXT_DIM));
            ui.label(RichText::new(format!("Area   {area}")).color(TEXT_DIM));
            let luma = luma.map_or_else(|| "n/a".to_string(), |l| format!("{:.0}%", l * 100.0));
            ui.label(RichText::new(format!("Luma   {luma}")).color(TEXT_DIM));
        });
        ui.add_space(8.0);

        ui.horizontal(|ui| {
            if ui.button("Switch source").clicked() {
                self.switch_source();
            }
            let previewing = matches!(phase, Phase::Previewing { .. });
            if previewing && ui.button("Stop").clicked() {
                self.stop_preview();
            } else if !previewing && ui.button("Start").clicked() {
                self.start_preview(false);
            }
        });
        if ui.checkbox(&mut enabled, "Rendering enabled").changed() {
            lock(&self.shared).viewfinder.set_rendering_enabled(enabled);
        }
        ui.horizontal(|ui| {
            if ui.button("Rotate").clicked() {
                self.set_orientation(true, false);
            }
            if ui.checkbox(&mut mirrored, "Mirror").changed() {
                self.set_orientation(false, true);
            }
        });
        ui.add_space(8.0);

        Frame::none()
            .fill(BG_INSET)
            .inner_margin(Margin::symmetric(8.0, 6.0))
            .rounding(egui::Rounding::same(6.0))
            .show(ui, |ui| {
                ScrollArea::vertical()
                    .id_salt("log_scroll")
                    .auto_shrink([false, false])
                    .stick_to_bottom(true)
                    .show(ui, |ui| {
                        for line in &logs {
                            let color = if line.starts_with("[ERROR]") {
                                Color32::from_rgb(220, 80, 70)
                            } else if line.starts_with("[WARN]") {
                                Color32::from_rgb(220, 165, 50)
                            } else {
                                Color32::from_rgb(160, 170, 185)
                            };
                            ui.label(RichText::new(line).font(FontId::new(11.0, FontFamily::Monospace)).color(color));
                        }
                    });
            });
    }
}

// ── Utilities ─────────────────────────────────────────────────────────────────

fn card(ui: &mut egui::Ui, add_contents: impl FnOnce(&mut egui::Ui)) {
    Frame::none()
        .fill(BG_CARD)
        .inner_margin(Margin::symmetric(12.0, 10.0))
        .rounding(egui::Rounding::same(8.0))
        .stroke(Stroke::new(1.0, Color32::from_rgb(50, 53, 68)))
        .show(ui, |ui| {
            ui.set_min_width(ui.available_width());
            add_contents(ui);
        });
}

fn stat_chip(ui: &mut egui::Ui, label: &str, value: &str) {
    Frame::none()
        .fill(BG_INSET)
        .inner_margin(Margin::symmetric(10.0, 6.0))
        .rounding(egui::Rounding::same(6.0))
        .show(ui, |ui| {
            ui.vertical_centered(|ui| {
                ui.label(
                    RichText::new(value)
                        .font(FontId::new(18.0, FontFamily::Monospace))
                        .strong()
                        .color(Color32::WHITE),
                );
                ui.label(RichText::new(label).font(FontId::new(11.0, FontFamily::Proportional)).color(TEXT_DIM));
            });
        });
}
