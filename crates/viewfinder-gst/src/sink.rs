//! Appsink-backed viewfinder sink.
//!
//! # Notifications
//! ```text
//! appsink new-sample  ─▶ SinkNotifier::frame_ready
//! sink pad notify::caps ─▶ SinkNotifier::caps_changed
//! element notify::parent (unset) ─▶ SinkNotifier::last_reference_dropped
//! ```
//!
//! # Caps
//! With `zero_copy` set the sink prefers DMA-BUF memory (RGBA, BGRA or NV12)
//! and falls back to mapped RGBA/BGRA. The sink pad answers allocation
//! queries itself so upstream attaches video and crop metas.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use gstreamer as gst;
use gstreamer::glib;
use gstreamer::prelude::*;
use gstreamer_app::{AppSink, AppSinkCallbacks};
use gstreamer_video as gst_video;
use tracing::{debug, info, warn};
use viewfinder_core::{SinkConfig, SinkError};
use viewfinder_renderer::{DisplayHandle, NativeSink, SinkFactory, SinkNotifier};

use crate::frame::{GstFrame, Held, ReleaseQueue};

/// How long teardown waits for fenced buffers before dropping them anyway.
const TEARDOWN_FENCE_TIMEOUT: Duration = Duration::from_millis(50);

const MAPPED_FORMATS: [gst_video::VideoFormat; 4] = [
    gst_video::VideoFormat::Rgba,
    gst_video::VideoFormat::Bgra,
    gst_video::VideoFormat::Rgbx,
    gst_video::VideoFormat::Bgrx,
];

const DEVICE_FORMATS: [&str; 5] = ["RGBA", "BGRA", "RGBx", "BGRx", "NV12"];

/// Caps the appsink accepts, most preferred first.
pub fn sink_caps(zero_copy: bool) -> gst::Caps {
    let mapped = gst_video::VideoCapsBuilder::new().format_list(MAPPED_FORMATS).build();
    if !zero_copy {
        return mapped;
    }
    let mut caps = gst::Caps::builder("video/x-raw")
        .features(["memory:DMABuf"])
        .field("format", gst::List::new(DEVICE_FORMATS))
        .build();
    caps.make_mut().append(mapped);
    caps
}

/// Answer allocation queries on the sink pad, advertising the metas the
/// frame side reads. Without `VideoMeta` most DMA-BUF producers refuse to
/// negotiate.
fn answer_allocation_queries(pad: &gst::Pad) {
    let id = pad.add_probe(gst::PadProbeType::QUERY_DOWNSTREAM, |_pad, info| {
        let Some(gst::PadProbeData::Query(query)) = &mut info.data else {
            return gst::PadProbeReturn::Ok;
        };
        match query.view_mut() {
            gst::QueryViewMut::Allocation(allocation) => {
                allocation.add_allocation_meta::<gst_video::VideoMeta>(None);
                allocation.add_allocation_meta::<gst_video::VideoCropMeta>(None);
                gst::PadProbeReturn::Handled
            }
            _ => gst::PadProbeReturn::Ok,
        }
    });
    if id.is_none() {
        warn!("Could not answer allocation queries; upstream metas stay off");
    }
}

// ── GstSinkFactory ────────────────────────────────────────────────────────────

/// Creates the configured sink element. Initialises GStreamer once.
#[derive(Debug, Clone)]
pub struct GstSinkFactory {
    _private: (),
}

impl GstSinkFactory {
    pub fn new() -> Result<Self, SinkError> {
        gst::init().map_err(|e| SinkError::Init(e.to_string()))?;
        Ok(Self { _private: () })
    }
}

impl SinkFactory for GstSinkFactory {
    type Sink = GstSink;

    fn create_sink(&self, config: &SinkConfig) -> Result<GstSink, SinkError> {
        if gst::ElementFactory::find(&config.element).is_none() {
            return Err(SinkError::ElementUnavailable {
                element: config.element.clone(),
                reason:  "no such element factory".into(),
            });
        }

        let element = gst::ElementFactory::make(&config.element)
            .name(config.name.as_str())
            .build()
            .map_err(|e| SinkError::ElementUnavailable {
                element: config.element.clone(),
                reason:  e.to_string(),
            })?;

        let appsink = element.downcast::<AppSink>().map_err(|_| SinkError::WrongElementType {
            element:  config.element.clone(),
            expected: "GstAppSink",
        })?;

        // Newest frame only; the renderer keeps a single slot anyway.
        appsink.set_max_buffers(1);
        appsink.set_drop(true);
        appsink.set_caps(Some(&sink_caps(config.zero_copy)));
        if let Some(pad) = appsink.static_pad("sink") {
            answer_allocation_queries(&pad);
        }

        debug!(
            zero_copy = config.zero_copy,
            "Created appsink '{}' from '{}'", config.name, config.element
        );
        Ok(GstSink { appsink, releases: ReleaseQueue::default(), handlers: None })
    }
}

// ── GstSink ───────────────────────────────────────────────────────────────────

struct Handlers {
    caps:   Option<(gst::Pad, glib::SignalHandlerId)>,
    parent: glib::SignalHandlerId,
}

pub struct GstSink {
    appsink:  AppSink,
    releases: ReleaseQueue<Held>,
    handlers: Option<Handlers>,
}

impl NativeSink for GstSink {
    type Handle = gst::Element;
    type Frame = GstFrame;

    fn handle(&self) -> gst::Element {
        self.appsink.clone().upcast()
    }

    fn connect(&mut self, notifier: SinkNotifier<GstFrame>) {
        let frames = notifier.clone();
        let releases = self.releases.clone();
        self.appsink.set_callbacks(
            AppSinkCallbacks::builder()
                .new_sample(move |appsink| {
                    releases.reap(Duration::ZERO);
                    let sample = appsink.pull_sample().map_err(|_| gst::FlowError::Eos)?;
                    frames.frame_ready(GstFrame::new(sample, releases.clone()));
                    Ok(gst::FlowSuccess::Ok)
                })
                .build(),
        );

        let caps = match self.appsink.static_pad("sink") {
            Some(pad) => {
                let caps_notifier = notifier.clone();
                let id = pad.connect_notify(Some("caps"), move |pad, _| {
                    let Some(caps) = pad.current_caps() else {
                        return;
                    };
                    match gst_video::VideoInfo::from_caps(&caps) {
                        Ok(info) => {
                            caps_notifier.caps_changed(info.width(), info.height());
                        }
                        Err(e) => warn!("Viewfinder sink caps are not raw video: {}", e),
                    }
                });
                Some((pad, id))
            }
            None => {
                warn!("Appsink has no sink pad; frame size will stay unknown");
                None
            }
        };

        // Parent unset after having been set: the pipeline let go of the sink.
        let parented = Arc::new(AtomicBool::new(self.appsink.parent().is_some()));
        let parent = self.appsink.connect_notify(Some("parent"), move |element, _| {
            if element.parent().is_some() {
                parented.store(true, Ordering::SeqCst);
            } else if parented.swap(false, Ordering::SeqCst) {
                notifier.last_reference_dropped();
            }
        });

        self.handlers = Some(Handlers { caps, parent });
        info!("Appsink '{}' connected", self.appsink.name());
    }

    fn disconnect(&mut self) {
        self.appsink.set_callbacks(AppSinkCallbacks::builder().build());
        if let Some(handlers) = self.handlers.take() {
            if let Some((pad, id)) = handlers.caps {
                pad.disconnect(id);
            }
            self.appsink.disconnect(handlers.parent);
        }

        let outstanding = self.releases.reap(TEARDOWN_FENCE_TIMEOUT);
        if outstanding > 0 {
            warn!("{} fenced buffer(s) still pending at sink teardown", outstanding);
        }
        debug!("Appsink '{}' disconnected", self.appsink.name());
    }

    fn bind_display(&self, handle: DisplayHandle) {
        // Upstream allocates; appsink never needs the display.
        debug!("Appsink ignores display {:?}", handle);
    }
}
