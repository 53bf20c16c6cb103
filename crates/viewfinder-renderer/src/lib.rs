//! Rendering core of the camera viewfinder.
//!
//! The producer (a capture pipeline sink) pushes decoded frames through a
//! [`SinkNotifier`] into a single-entry [`FrameSlot`]; the UI toolkit drives
//! [`Viewfinder::paint`] on its render thread, which letterboxes the latest
//! frame into the surface and hands the buffer back to the producer.
//!
//! Platform pieces stay behind traits: [`NativeSink`]/[`SinkFactory`] for the
//! producer side and [`GraphicsBackend`] for the graphics context.

pub mod backend;
pub mod binder;
pub mod frame_slot;
pub mod geometry;
pub mod sink;
pub mod surface;
pub mod tap;

#[cfg(test)]
pub(crate) mod testing;

pub use backend::{
    DisplayHandle, DmaBufPlane, DrawCall, FenceSync, FrameBuffer, FrameHandle, GpuFence,
    GraphicsBackend, ImportSource, TextureTarget,
};
pub use binder::TextureBinder;
pub use frame_slot::FrameSlot;
pub use geometry::{
    compute_quad_rect, compute_render_area, compute_texture_coords, compute_vertex_coords,
    oriented_frame, Geometry, Mat4,
};
pub use sink::{
    NativeSink, RepaintHook, SinkEvent, SinkFactory, SinkFrame, SinkHandle, SinkLifecycle, SinkNotifier,
};
pub use surface::{SurfaceState, Viewfinder};
pub use tap::{FrameTap, FrameTapSlot, TapFrame};
