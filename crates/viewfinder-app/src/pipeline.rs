//! Demo capture pipeline feeding the viewfinder sink.
//!
//! ```text
//! [VIEWFINDER_SOURCE bin] → [VIEWFINDER_CONVERT] → viewfinder sink
//! ```
//! The converter defaults to `videoconvert`. `VIEWFINDER_CONVERT=none` links
//! the source straight to the sink so a source producing DMA-BUF keeps its
//! device memory.
//! The pipeline owns the sink while it runs; dropping it unparents the sink,
//! which the viewfinder sees as the sink being released.

use anyhow::Context;
use gstreamer as gst;
use gstreamer::prelude::*;
use tracing::{info, warn};

/// Sources cycled through by "switch device" when `VIEWFINDER_SOURCE` is unset.
const DEFAULT_SOURCES: &[&str] = &[
    "videotestsrc is-live=true",
    "videotestsrc is-live=true pattern=ball",
];

/// `;`-separated launch descriptions, e.g. `v4l2src device=/dev/video0;v4l2src device=/dev/video2`.
pub fn parse_sources(value: Option<&str>) -> Vec<String> {
    let sources: Vec<String> = value
        .unwrap_or_default()
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect();
    if sources.is_empty() {
        DEFAULT_SOURCES.iter().map(|s| s.to_string()).collect()
    } else {
        sources
    }
}

pub fn sources_from_env() -> Vec<String> {
    parse_sources(std::env::var("VIEWFINDER_SOURCE").ok().as_deref())
}

/// Converter element between source and sink; `none` means no converter.
pub fn parse_convert(value: Option<&str>) -> Option<String> {
    match value.map(str::trim) {
        None | Some("") => Some("videoconvert".to_string()),
        Some(v) if v.eq_ignore_ascii_case("none") => None,
        Some(v) => Some(v.to_string()),
    }
}

pub fn convert_from_env() -> Option<String> {
    parse_convert(std::env::var("VIEWFINDER_CONVERT").ok().as_deref())
}

// ── CapturePipeline ───────────────────────────────────────────────────────────

pub struct CapturePipeline {
    pipeline: gst::Pipeline,
    source:   String,
}

impl CapturePipeline {
    /// Build `source ! [convert] ! sink` and set it playing.
    pub fn start(source: &str, convert: Option<&str>, sink: &gst::Element) -> anyhow::Result<Self> {
        let pipeline = gst::Pipeline::with_name("viewfinder-capture");

        let src = gst::parse::bin_from_description(source, true)
            .with_context(|| format!("Invalid capture source '{source}'"))?;
        let convert = convert
            .map(|name| {
                gst::ElementFactory::make(name)
                    .build()
                    .with_context(|| format!("{name} element unavailable"))
            })
            .transpose()?;

        let mut elements = vec![src.upcast_ref::<gst::Element>()];
        elements.extend(convert.as_ref());
        elements.push(sink);
        pipeline.add_many(&elements).context("Failed to assemble capture pipeline")?;
        gst::Element::link_many(&elements).context("Failed to link capture pipeline")?;

        pipeline
            .set_state(gst::State::Playing)
            .with_context(|| format!("Failed to start capture from '{source}'"))?;

        let chain: Vec<String> = elements.iter().skip(1).map(|e| e.name().to_string()).collect();
        info!("Capture pipeline playing: {} ! {}", source, chain.join(" ! "));
        Ok(Self { pipeline, source: source.to_string() })
    }

    /// First pending error or end-of-stream on the bus, if any.
    pub fn poll_error(&self) -> Option<String> {
        let bus = self.pipeline.bus()?;
        while let Some(msg) = bus.pop_filtered(&[gst::MessageType::Error, gst::MessageType::Eos]) {
            match msg.view() {
                gst::MessageView::Error(err) => {
                    let text = format!("{}: {}", self.source, err.error());
                    warn!("Capture pipeline error: {} ({:?})", text, err.debug());
                    return Some(text);
                }
                gst::MessageView::Eos(_) => return Some(format!("{}: end of stream", self.source)),
                _ => {}
            }
        }
        None
    }
}

impl Drop for CapturePipeline {
    fn drop(&mut self) {
        let _ = self.pipeline.set_state(gst::State::Null);
    }
}
