//! Frames coming out of the appsink and the way their buffers go back.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use gstreamer as gst;
use gstreamer_allocators::DmaBufMemory;
use gstreamer_video as gst_video;
use gst_video::VideoFrameExt;
use tracing::trace;
use viewfinder_core::{CropRect, FrameSize, PixelFormat, RenderError};
use viewfinder_renderer::{DmaBufPlane, FrameBuffer, FrameHandle, GpuFence, ImportSource};

// ── Format mapping ────────────────────────────────────────────────────────────

/// Layout the graphics side understands, if any. NV12 only ever arrives as
/// DMA-BUF; the mapped path rejects it.
pub fn pixel_format(format: gst_video::VideoFormat) -> Option<PixelFormat> {
    use gst_video::VideoFormat;
    match format {
        VideoFormat::Rgba | VideoFormat::Rgbx => Some(PixelFormat::Rgba),
        VideoFormat::Bgra | VideoFormat::Bgrx => Some(PixelFormat::Bgra),
        VideoFormat::Nv12 => Some(PixelFormat::Nv12),
        _ => None,
    }
}

/// `VideoCropMeta` rectangle, ignoring degenerate ones.
pub fn crop_rect((x, y, width, height): (u32, u32, u32, u32)) -> Option<CropRect> {
    let crop = CropRect::new(x, y, width, height);
    (!crop.is_empty()).then_some(crop)
}

// ── Deferred release ──────────────────────────────────────────────────────────

struct Pending<T> {
    held:  T,
    fence: GpuFence,
}

/// Buffers the GPU may still be reading, held until their fence passes.
///
/// The streaming thread reaps it before publishing each new sample, so
/// buffers go back to the pool one frame late at worst.
pub struct ReleaseQueue<T> {
    pending: Arc<Mutex<Vec<Pending<T>>>>,
}

impl<T> Clone for ReleaseQueue<T> {
    fn clone(&self) -> Self {
        Self { pending: Arc::clone(&self.pending) }
    }
}

impl<T> Default for ReleaseQueue<T> {
    fn default() -> Self {
        Self { pending: Arc::new(Mutex::new(Vec::new())) }
    }
}

impl<T> ReleaseQueue<T> {
    /// Release `held` now if the fence already passed, later otherwise.
    pub fn release(&self, held: T, fence: Option<GpuFence>) {
        match fence {
            Some(fence) if !fence.wait(Duration::ZERO) => {
                self.lock().push(Pending { held, fence });
            }
            _ => drop(held),
        }
    }

    /// Drop every held buffer whose fence passed within `timeout`.
    /// Returns how many are still outstanding.
    pub fn reap(&self, timeout: Duration) -> usize {
        let done: Vec<T> = {
            let mut pending = self.lock();
            let mut done = Vec::new();
            let mut i = 0;
            while i < pending.len() {
                if pending[i].fence.wait(timeout) {
                    done.push(pending.swap_remove(i).held);
                } else {
                    i += 1;
                }
            }
            done
        };
        if !done.is_empty() {
            trace!("Returned {} fenced buffer(s) to the pool", done.len());
        }
        drop(done);
        self.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Pending<T>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ── GstFrame ──────────────────────────────────────────────────────────────────

type MappedFrame = gst_video::VideoFrame<gst_video::video_frame::Readable>;

/// What a drawn sample keeps alive until its release.
pub(crate) enum Held {
    Mapped(MappedFrame),
    /// DMA-BUF backed; the buffer owns the fds the importer reads.
    Device(gst::Buffer),
}

/// One sample published by the appsink. Dropping it unrefs the sample.
pub struct GstFrame {
    sample:   gst::Sample,
    releases: ReleaseQueue<Held>,
}

impl GstFrame {
    pub(crate) fn new(sample: gst::Sample, releases: ReleaseQueue<Held>) -> Self {
        Self { sample, releases }
    }
}

fn acquire_failed(reason: impl Into<String>) -> RenderError {
    RenderError::AcquireFailed { reason: reason.into() }
}

/// Per-plane fd, offset and stride of a DMA-BUF buffer, or `None` when the
/// buffer lives in system memory.
///
/// Planes either share the first memory block (told apart by offset) or
/// come one memory block each.
pub(crate) fn dmabuf_planes(buffer: &gst::BufferRef, info: &gst_video::VideoInfo) -> Option<Vec<DmaBufPlane>> {
    let n_memory = buffer.n_memory() as usize;
    if n_memory == 0 || !buffer.peek_memory(0).is_memory_type::<DmaBufMemory>() {
        return None;
    }

    let n_planes = info.n_planes() as usize;
    let multi_fd = n_planes > 1 && n_memory >= n_planes;
    let meta = buffer.meta::<gst_video::VideoMeta>();
    let (offsets, strides) = match &meta {
        Some(meta) => (meta.offset(), meta.stride()),
        None => (info.offset(), info.stride()),
    };

    let mut planes = Vec::with_capacity(n_planes);
    for plane in 0..n_planes {
        let memory = buffer.peek_memory(if multi_fd { plane as _ } else { 0 });
        let dmabuf = memory.downcast_memory_ref::<DmaBufMemory>()?;
        let stride = u32::try_from(*strides.get(plane)?).ok()?;
        let within = if multi_fd { 0 } else { *offsets.get(plane)? };
        let offset = u32::try_from(memory.offset() + within).ok()?;
        planes.push(DmaBufPlane { fd: dmabuf.fd(), offset, stride });
    }
    Some(planes)
}

impl FrameHandle for GstFrame {
    type Buffer = GstBuffer;

    fn acquire(self) -> Result<GstBuffer, RenderError> {
        let caps = self.sample.caps().ok_or_else(|| acquire_failed("sample has no caps"))?;
        let info = gst_video::VideoInfo::from_caps(caps).map_err(|e| acquire_failed(e.to_string()))?;
        let format = pixel_format(info.format())
            .ok_or_else(|| acquire_failed(format!("unsupported sample format {:?}", info.format())))?;
        let buffer = self.sample.buffer_owned().ok_or_else(|| acquire_failed("sample has no buffer"))?;

        let crop = buffer
            .meta::<gst_video::VideoCropMeta>()
            .and_then(|meta| crop_rect(meta.rect()));
        let size = FrameSize::new(info.width(), info.height());

        if let Some(planes) = dmabuf_planes(&buffer, &info) {
            if planes.len() != format.plane_count() {
                return Err(acquire_failed(format!("{} DMA-BUF planes for {}", planes.len(), format)));
            }
            return Ok(GstBuffer {
                contents: Contents::Device { buffer, planes },
                size,
                format,
                crop,
                releases: self.releases,
            });
        }

        if format == PixelFormat::Nv12 {
            return Err(RenderError::UnsupportedFormat(format));
        }
        let frame = gst_video::VideoFrame::from_buffer_readable(buffer, &info)
            .map_err(|_| acquire_failed("buffer not mappable"))?;
        if frame.plane_data(0).is_err() {
            return Err(acquire_failed("first plane not readable"));
        }

        Ok(GstBuffer { contents: Contents::Mapped(frame), size, format, crop, releases: self.releases })
    }
}

// ── GstBuffer ─────────────────────────────────────────────────────────────────

enum Contents {
    Mapped(MappedFrame),
    Device { buffer: gst::Buffer, planes: Vec<DmaBufPlane> },
}

/// A sample held for one draw: mapped into system memory, or left on the
/// device as DMA-BUF planes.
pub struct GstBuffer {
    contents: Contents,
    size:     FrameSize,
    format:   PixelFormat,
    crop:     Option<CropRect>,
    releases: ReleaseQueue<Held>,
}

impl GstBuffer {
    pub fn is_device_memory(&self) -> bool {
        matches!(self.contents, Contents::Device { .. })
    }
}

impl FrameBuffer for GstBuffer {
    fn frame_size(&self) -> FrameSize {
        self.size
    }

    fn crop(&self) -> Option<CropRect> {
        self.crop
    }

    fn import_source(&self) -> ImportSource<'_> {
        match &self.contents {
            Contents::Mapped(frame) => ImportSource::Pixels {
                data:   frame.plane_data(0).unwrap_or(&[]),
                stride: frame.plane_stride().first().copied().unwrap_or(0).max(0) as usize,
                size:   self.size,
                format: self.format,
            },
            Contents::Device { planes, .. } => ImportSource::DmaBuf {
                planes: planes.as_slice(),
                size:   self.size,
                format: self.format,
            },
        }
    }

    fn release(self, fence: Option<GpuFence>) {
        if fence.is_some() {
            trace!("Releasing sample behind a GPU fence");
        }
        let held = match self.contents {
            Contents::Mapped(frame) => Held::Mapped(frame),
            Contents::Device { buffer, .. } => Held::Device(buffer),
        };
        self.releases.release(held, fence);
    }
}
