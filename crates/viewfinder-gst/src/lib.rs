//! viewfinder-gst
//!
//! GStreamer side of the viewfinder: an `appsink` tracked as the native sink
//! and its samples exposed as renderer frames.
//!
//! # Pipeline
//! ```text
//! [camera source] → appsink (DMA-BUF or RGBA/BGRA, max-buffers=1, drop)
//! ```
//! The capture pipeline owns the element; the renderer only tracks it.

pub mod frame;
pub mod sink;

pub use frame::{pixel_format, GstBuffer, GstFrame, ReleaseQueue};
pub use sink::{sink_caps, GstSink, GstSinkFactory};
