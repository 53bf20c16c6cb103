mod egl;
mod exposure;
mod gl_backend;
mod gui_app;
mod pipeline;
mod state;

use anyhow::Context;
use viewfinder_core::ViewfinderConfig;
use viewfinder_gst::GstSinkFactory;

fn main() -> anyhow::Result<()> {
    // ── Logging ───────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .compact()
        .init();

    // ── Configuration ─────────────────────────────────────────────────────
    let config = match std::env::var("VIEWFINDER_CONFIG") {
        Ok(path) => ViewfinderConfig::load(&path)
            .with_context(|| format!("Failed to load viewfinder config from {path}"))?,
        Err(_) => ViewfinderConfig::default(),
    };
    let sources = pipeline::sources_from_env();
    let convert = pipeline::convert_from_env();
    tracing::info!(
        sink = %config.sink.element,
        use_fence = config.use_fence,
        zero_copy = config.sink.zero_copy,
        sources = sources.len(),
        "Viewfinder starting"
    );

    let factory = GstSinkFactory::new().context("GStreamer initialisation failed")?;

    // ── Window options ────────────────────────────────────────────────────
    let window_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title("Viewfinder")
            .with_inner_size([1024.0, 640.0])
            .with_min_inner_size([480.0, 320.0])
            .with_resizable(true),
        renderer: eframe::Renderer::Glow,
        ..Default::default()
    };

    eframe::run_native(
        "Viewfinder",
        window_options,
        Box::new(move |cc| Ok(Box::new(gui_app::ViewfinderApp::new(cc, config, factory, sources, convert)))),
    )
    .map_err(|e| anyhow::anyhow!("Viewfinder window failed: {e}"))
}
