//! In-memory stand-ins for the producer and the graphics context.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use viewfinder_core::{CropRect, FrameSize, PixelFormat, Point, RenderError, SinkConfig, SinkError};

use crate::backend::{
    DisplayHandle, DmaBufPlane, DrawCall, FenceSync, FrameBuffer, FrameHandle, GpuFence,
    GraphicsBackend, ImportSource, TextureTarget,
};
use crate::geometry::Mat4;
use crate::sink::{NativeSink, RepaintHook, SinkFactory, SinkNotifier};

pub fn repaint_counter() -> (RepaintHook, impl Fn() -> usize) {
    let count = Arc::new(AtomicUsize::new(0));
    let hook_count = Arc::clone(&count);
    let hook: RepaintHook = Arc::new(move || {
        hook_count.fetch_add(1, Ordering::SeqCst);
    });
    (hook, move || count.load(Ordering::SeqCst))
}

// ── Frames ────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct LogInner {
    discarded: Vec<u64>,
    released:  Vec<(u64, bool)>,
}

/// Records how every fake frame went back to the producer.
#[derive(Clone, Default)]
pub struct FrameLog(Arc<Mutex<LogInner>>);

impl FrameLog {
    /// Frames dropped without being drawn (overwritten, rejected, failed acquire).
    pub fn discarded(&self) -> Vec<u64> {
        self.0.lock().unwrap().discarded.clone()
    }

    /// Frames explicitly released after acquire, with whether a fence came along.
    pub fn released(&self) -> Vec<(u64, bool)> {
        self.0.lock().unwrap().released.clone()
    }
}

pub struct FakeFrame {
    pub id:       u64,
    log:          FrameLog,
    size:         FrameSize,
    crop:         Option<CropRect>,
    pixels:       Vec<u8>,
    dmabuf:       bool,
    fail_acquire: bool,
    armed:        bool,
}

impl FakeFrame {
    pub fn new(id: u64, log: &FrameLog) -> Self {
        Self {
            id,
            log: log.clone(),
            size: FrameSize::VGA,
            crop: None,
            pixels: Vec::new(),
            dmabuf: false,
            fail_acquire: false,
            armed: true,
        }
    }

    pub fn with_size(mut self, size: FrameSize) -> Self {
        self.size = size;
        self
    }

    pub fn with_crop(mut self, crop: CropRect) -> Self {
        self.crop = Some(crop);
        self
    }

    pub fn with_pixels(mut self, pixels: Vec<u8>) -> Self {
        self.pixels = pixels;
        self
    }

    /// Offer the frame as a single-plane DMA-BUF instead of mapped pixels.
    pub fn with_dmabuf(mut self) -> Self {
        self.dmabuf = true;
        self
    }

    pub fn failing_acquire(mut self) -> Self {
        self.fail_acquire = true;
        self
    }
}

impl Drop for FakeFrame {
    fn drop(&mut self) {
        if self.armed {
            self.log.0.lock().unwrap().discarded.push(self.id);
        }
    }
}

impl FrameHandle for FakeFrame {
    type Buffer = FakeBuffer;

    fn acquire(mut self) -> Result<FakeBuffer, RenderError> {
        if self.fail_acquire {
            return Err(RenderError::AcquireFailed { reason: "fake".into() });
        }
        self.armed = false;
        let planes = if self.dmabuf {
            vec![DmaBufPlane { fd: 40 + self.id as i32, offset: 0, stride: self.size.width * 4 }]
        } else {
            Vec::new()
        };
        Ok(FakeBuffer {
            id:     self.id,
            log:    self.log.clone(),
            size:   self.size,
            crop:   self.crop,
            pixels: std::mem::take(&mut self.pixels),
            planes,
        })
    }
}

pub struct FakeBuffer {
    id:     u64,
    log:    FrameLog,
    size:   FrameSize,
    crop:   Option<CropRect>,
    pixels: Vec<u8>,
    planes: Vec<DmaBufPlane>,
}

impl FrameBuffer for FakeBuffer {
    fn frame_size(&self) -> FrameSize {
        self.size
    }

    fn crop(&self) -> Option<CropRect> {
        self.crop
    }

    fn import_source(&self) -> ImportSource<'_> {
        if !self.planes.is_empty() {
            return ImportSource::DmaBuf { planes: &self.planes, size: self.size, format: PixelFormat::Rgba };
        }
        ImportSource::Pixels {
            data:   &self.pixels,
            stride: self.size.width as usize * 4,
            size:   self.size,
            format: PixelFormat::Rgba,
        }
    }

    fn release(self, fence: Option<GpuFence>) {
        self.log.0.lock().unwrap().released.push((self.id, fence.is_some()));
    }
}

// ── Sink ──────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct FactoryState {
    fail:           bool,
    attempts:       usize,
    created:        usize,
    connects:       usize,
    disconnects:    usize,
    displays_bound: usize,
    notifier:       Option<SinkNotifier<FakeFrame>>,
}

#[derive(Clone, Default)]
pub struct FakeSinkFactory(Arc<Mutex<FactoryState>>);

impl FakeSinkFactory {
    pub fn failing() -> Self {
        let factory = Self::default();
        factory.0.lock().unwrap().fail = true;
        factory
    }

    pub fn set_failing(&self, fail: bool) {
        self.0.lock().unwrap().fail = fail;
    }

    pub fn attempts(&self) -> usize {
        self.0.lock().unwrap().attempts
    }

    pub fn created(&self) -> usize {
        self.0.lock().unwrap().created
    }

    pub fn connects(&self) -> usize {
        self.0.lock().unwrap().connects
    }

    pub fn disconnects(&self) -> usize {
        self.0.lock().unwrap().disconnects
    }

    pub fn displays_bound(&self) -> usize {
        self.0.lock().unwrap().displays_bound
    }

    /// The notifier of the most recent registration, as the producer sees it.
    pub fn notifier(&self) -> Option<SinkNotifier<FakeFrame>> {
        self.0.lock().unwrap().notifier.clone()
    }
}

impl SinkFactory for FakeSinkFactory {
    type Sink = FakeSink;

    fn create_sink(&self, config: &SinkConfig) -> Result<FakeSink, SinkError> {
        let mut state = self.0.lock().unwrap();
        state.attempts += 1;
        if state.fail {
            return Err(SinkError::ElementUnavailable {
                element: config.element.clone(),
                reason:  "no such element".into(),
            });
        }
        state.created += 1;
        Ok(FakeSink { id: state.created as u64, factory: self.clone() })
    }
}

pub struct FakeSink {
    id:      u64,
    factory: FakeSinkFactory,
}

impl NativeSink for FakeSink {
    type Handle = u64;
    type Frame = FakeFrame;

    fn handle(&self) -> u64 {
        self.id
    }

    fn connect(&mut self, notifier: SinkNotifier<FakeFrame>) {
        let mut state = self.factory.0.lock().unwrap();
        state.connects += 1;
        state.notifier = Some(notifier);
    }

    fn disconnect(&mut self) {
        self.factory.0.lock().unwrap().disconnects += 1;
    }

    fn bind_display(&self, _display: DisplayHandle) {
        self.factory.0.lock().unwrap().displays_bound += 1;
    }
}

// ── Graphics ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum GpuCall {
    Clear([f32; 4]),
    Compile,
    DeleteProgram(u32),
    Import(u32),
    Draw {
        program:    u32,
        texture:    u32,
        projection: Mat4,
        world:      Mat4,
        vertices:   [Point; 4],
        tex_coords: [Point; 4],
    },
    ReleaseTexture(u32),
    Fence,
}

struct FakeFence;

impl FenceSync for FakeFence {
    fn wait(&self, _timeout: Duration) -> bool {
        true
    }
}

pub struct FakeGpu {
    pub calls:         Vec<GpuCall>,
    pub context:       bool,
    pub fences:        bool,
    pub fail_import:   bool,
    pub fail_link:     bool,
    pub target:        TextureTarget,
    pub display:       Option<DisplayHandle>,
    pub last_fragment: String,
    pub(crate) next_program:  u32,
    pub(crate) next_texture:  u32,
    pub(crate) live_textures: usize,
    pub(crate) external:      Vec<u32>,
}

impl Default for FakeGpu {
    fn default() -> Self {
        Self {
            calls:         Vec::new(),
            context:       true,
            fences:        true,
            fail_import:   false,
            fail_link:     false,
            target:        TextureTarget::Texture2D,
            display:       None,
            last_fragment: String::new(),
            next_program:  0,
            next_texture:  100,
            live_textures: 0,
            external:      Vec::new(),
        }
    }
}

impl FakeGpu {
    pub fn draws(&self) -> usize {
        self.calls.iter().filter(|c| matches!(c, GpuCall::Draw { .. })).count()
    }

    pub fn compiles(&self) -> usize {
        self.calls.iter().filter(|c| matches!(c, GpuCall::Compile)).count()
    }

    pub fn clears(&self) -> usize {
        self.calls.iter().filter(|c| matches!(c, GpuCall::Clear(_))).count()
    }

    pub fn textures_live(&self) -> usize {
        self.live_textures
    }

    pub fn last_draw(&self) -> Option<&GpuCall> {
        self.calls.iter().rev().find(|c| matches!(c, GpuCall::Draw { .. }))
    }

    pub fn last_tex_coords(&self) -> Option<[Point; 4]> {
        match self.last_draw() {
            Some(GpuCall::Draw { tex_coords, .. }) => Some(*tex_coords),
            _ => None,
        }
    }
}

impl GraphicsBackend for FakeGpu {
    type Program = u32;
    type Texture = u32;

    fn has_context(&self) -> bool {
        self.context
    }

    fn clear(&mut self, color: [f32; 4]) {
        self.calls.push(GpuCall::Clear(color));
    }

    fn texture_target(&self) -> TextureTarget {
        self.target
    }

    fn compile_program(&mut self, _vertex: &str, fragment: &str) -> Result<u32, RenderError> {
        self.calls.push(GpuCall::Compile);
        self.last_fragment = fragment.to_string();
        if self.fail_link {
            return Err(RenderError::ShaderLink("fake link failure".into()));
        }
        self.next_program += 1;
        Ok(self.next_program)
    }

    fn delete_program(&mut self, program: u32) {
        self.calls.push(GpuCall::DeleteProgram(program));
    }

    fn imported_target(&self, texture: &u32) -> TextureTarget {
        if self.external.contains(texture) {
            TextureTarget::External
        } else {
            self.target
        }
    }

    fn import_frame(&mut self, source: ImportSource<'_>) -> Result<u32, RenderError> {
        if self.fail_import {
            return Err(RenderError::ImportFailed { reason: "fake".into() });
        }
        self.next_texture += 1;
        self.live_textures += 1;
        if matches!(source, ImportSource::DmaBuf { .. }) {
            self.external.push(self.next_texture);
        }
        self.calls.push(GpuCall::Import(self.next_texture));
        Ok(self.next_texture)
    }

    fn draw(&mut self, program: &u32, texture: &u32, call: &DrawCall<'_>) {
        self.calls.push(GpuCall::Draw {
            program:    *program,
            texture:    *texture,
            projection: *call.projection,
            world:      *call.world,
            vertices:   *call.vertices,
            tex_coords: *call.tex_coords,
        });
    }

    fn release_texture(&mut self, texture: u32) {
        self.live_textures -= 1;
        self.external.retain(|t| *t != texture);
        self.calls.push(GpuCall::ReleaseTexture(texture));
    }

    fn create_fence(&mut self) -> Option<GpuFence> {
        if !self.fences {
            return None;
        }
        self.calls.push(GpuCall::Fence);
        Some(Box::new(FakeFence))
    }

    fn display_handle(&self) -> Option<DisplayHandle> {
        self.display
    }
}
