//! Seams to the producer's frame exchange and to the graphics API.
//!
//! Both sides are platform-bound, so the core only talks to them through the
//! traits below. `viewfinder-gst` implements the frame side on top of an
//! appsink; the app implements [`GraphicsBackend`] with glow.

use std::time::Duration;

use viewfinder_core::{CropRect, FrameSize, PixelFormat, Point, RenderError};

use crate::geometry::Mat4;

// MARK: - Frame exchange

/// Opaque, producer-owned reference to one decoded frame.
///
/// Dropping a handle returns its buffer to the producer; that is how frames
/// overwritten in the slot or rejected after a reset are given back.
pub trait FrameHandle: Send + 'static {
    type Buffer: FrameBuffer;

    /// Gain exclusive access to the underlying buffer. On failure the handle
    /// has already been returned to the producer.
    fn acquire(self) -> Result<Self::Buffer, RenderError>;
}

/// A frame buffer the renderer holds exclusively for the duration of a draw.
pub trait FrameBuffer {
    fn frame_size(&self) -> FrameSize;

    /// Producer-supplied crop window, if any.
    fn crop(&self) -> Option<CropRect> {
        None
    }

    fn import_source(&self) -> ImportSource<'_>;

    /// Hand the buffer back to the producer. `fence`, when present, signals
    /// once the GPU has finished reading from it.
    fn release(self, fence: Option<GpuFence>);
}

/// What the graphics backend needs to turn a buffer into a texture.
#[derive(Debug, Clone, Copy)]
pub enum ImportSource<'a> {
    /// CPU-visible first plane.
    Pixels {
        data:   &'a [u8],
        stride: usize,
        size:   FrameSize,
        format: PixelFormat,
    },
    /// A texture name the producer already owns in a shared context.
    Texture { name: u32, size: FrameSize },
    /// Device memory exported as DMA-BUF file descriptors; imported as an
    /// external image without touching the pixels.
    DmaBuf {
        planes: &'a [DmaBufPlane],
        size:   FrameSize,
        format: PixelFormat,
    },
}

impl ImportSource<'_> {
    pub fn size(&self) -> FrameSize {
        match self {
            Self::Pixels { size, .. } | Self::Texture { size, .. } | Self::DmaBuf { size, .. } => *size,
        }
    }
}

/// One plane of a DMA-BUF frame. The fd stays owned by the producer and is
/// valid until the buffer is released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DmaBufPlane {
    pub fd:     i32,
    pub offset: u32,
    pub stride: u32,
}

// MARK: - Fences

/// GPU completion fence handed to the producer with a released buffer.
pub trait FenceSync: Send {
    /// Block up to `timeout` for the GPU to pass the fence.
    fn wait(&self, timeout: Duration) -> bool;
}

pub type GpuFence = Box<dyn FenceSync>;

// MARK: - Graphics backend

/// Sampler the imported textures need in the fragment shader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureTarget {
    Texture2D,
    /// `GL_TEXTURE_EXTERNAL_OES` via an external-image import.
    External,
}

/// Native display the sink may need for its own buffer allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayHandle(pub usize);

/// One textured triangle-fan draw.
#[derive(Debug, Clone, Copy)]
pub struct DrawCall<'a> {
    pub projection: &'a Mat4,
    pub world:      &'a Mat4,
    pub vertices:   &'a [Point; 4],
    pub tex_coords: &'a [Point; 4],
}

/// Graphics-context operations the viewfinder needs, valid only while the
/// context is current on the calling (render) thread.
pub trait GraphicsBackend {
    type Program;
    type Texture;

    /// A context is current and usable.
    fn has_context(&self) -> bool;

    fn clear(&mut self, color: [f32; 4]);

    fn texture_target(&self) -> TextureTarget {
        TextureTarget::Texture2D
    }

    /// Sampler an imported texture needs; external-image imports may differ
    /// from [`texture_target`](Self::texture_target).
    fn imported_target(&self, _texture: &Self::Texture) -> TextureTarget {
        self.texture_target()
    }

    /// Compile, link and set static uniforms (`texture0` = unit 0).
    /// Attribute locations: `inputVertex` = 0, `textureCoord` = 1.
    fn compile_program(&mut self, vertex: &str, fragment: &str) -> Result<Self::Program, RenderError>;

    fn delete_program(&mut self, program: Self::Program);

    fn import_frame(&mut self, source: ImportSource<'_>) -> Result<Self::Texture, RenderError>;

    fn draw(&mut self, program: &Self::Program, texture: &Self::Texture, call: &DrawCall<'_>);

    /// Unbind and delete an imported texture.
    fn release_texture(&mut self, texture: Self::Texture);

    /// A fence after all commands submitted so far, if the platform has them.
    fn create_fence(&mut self) -> Option<GpuFence> {
        None
    }

    fn display_handle(&self) -> Option<DisplayHandle> {
        None
    }
}
