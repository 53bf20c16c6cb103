//! EGL entry points the glow backend needs beyond what egui exposes:
//! DMA-BUF images and fence syncs.
//!
//! Resolved once, with the UI context current, through `eglGetProcAddress`.
//! A GLX context has no current EGL display; then none of this is available
//! and frames are copied.

use std::ffi::c_void;
use std::time::Duration;

use khronos_egl as egl;
use tracing::{debug, info};
use viewfinder_core::{FrameSize, PixelFormat};
use viewfinder_renderer::{DmaBufPlane, FenceSync};

type EglDisplay = *mut c_void;
type EglImageKhr = *mut c_void;
type EglSyncKhr = *mut c_void;

type CreateImageFn =
    unsafe extern "system" fn(EglDisplay, *mut c_void, u32, *mut c_void, *const i32) -> EglImageKhr;
type DestroyImageFn = unsafe extern "system" fn(EglDisplay, EglImageKhr) -> u32;
type ImageTargetTextureFn = unsafe extern "system" fn(u32, EglImageKhr);
type CreateSyncFn = unsafe extern "system" fn(EglDisplay, u32, *const i32) -> EglSyncKhr;
type ClientWaitSyncFn = unsafe extern "system" fn(EglDisplay, EglSyncKhr, i32, u64) -> i32;
type DestroySyncFn = unsafe extern "system" fn(EglDisplay, EglSyncKhr) -> u32;

const EGL_NONE: i32 = 0x3038;
const EGL_WIDTH: i32 = 0x3057;
const EGL_HEIGHT: i32 = 0x3056;
const EGL_LINUX_DMA_BUF_EXT: u32 = 0x3270;
const EGL_LINUX_DRM_FOURCC_EXT: i32 = 0x3271;
/// (fd, offset, pitch) attribute names for planes 0..2.
const EGL_DMA_BUF_PLANE_ATTRS: [[i32; 3]; 3] = [
    [0x3272, 0x3273, 0x3274],
    [0x3275, 0x3276, 0x3277],
    [0x3278, 0x3279, 0x327A],
];
const EGL_SYNC_FENCE_KHR: u32 = 0x30F9;
const EGL_CONDITION_SATISFIED_KHR: i32 = 0x30F6;

/// `EGL_LINUX_DMA_BUF_EXT` attribute list for one frame, or `None` when the
/// plane layout does not fit the format.
pub fn dmabuf_image_attribs(size: FrameSize, format: PixelFormat, planes: &[DmaBufPlane]) -> Option<Vec<i32>> {
    if planes.len() != format.plane_count() || planes.len() > EGL_DMA_BUF_PLANE_ATTRS.len() {
        return None;
    }
    let mut attribs = vec![
        EGL_WIDTH,
        i32::try_from(size.width).ok()?,
        EGL_HEIGHT,
        i32::try_from(size.height).ok()?,
        EGL_LINUX_DRM_FOURCC_EXT,
        format.drm_fourcc() as i32,
    ];
    for (plane, [fd, offset, pitch]) in planes.iter().zip(EGL_DMA_BUF_PLANE_ATTRS) {
        attribs.extend_from_slice(&[
            fd,
            plane.fd,
            offset,
            i32::try_from(plane.offset).ok()?,
            pitch,
            i32::try_from(plane.stride).ok()?,
        ]);
    }
    attribs.push(EGL_NONE);
    Some(attribs)
}

/// An `EGLImageKHR`, valid until [`EglExt::destroy_image`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EglImage(usize);

struct ImageFns {
    create:         CreateImageFn,
    destroy:        DestroyImageFn,
    target_texture: ImageTargetTextureFn,
}

#[derive(Clone, Copy)]
struct SyncFns {
    create:  CreateSyncFn,
    wait:    ClientWaitSyncFn,
    destroy: DestroySyncFn,
}

pub struct EglExt {
    // Keeps libEGL mapped for the resolved pointers.
    _instance: egl::DynamicInstance<egl::EGL1_4>,
    display:   usize,
    images:    Option<ImageFns>,
    syncs:     Option<SyncFns>,
}

/// # Safety
/// `T` must be the function pointer type matching `name`'s signature.
unsafe fn resolve<T: Copy>(instance: &egl::DynamicInstance<egl::EGL1_4>, name: &str) -> Option<T> {
    let f = instance.get_proc_address(name)?;
    Some(std::mem::transmute_copy(&f))
}

impl EglExt {
    /// Inspect the current context. `gl_extensions` are the GL context's own.
    pub fn load(gl_extensions: &std::collections::HashSet<String>, embedded: bool) -> Option<Self> {
        let instance = match unsafe { egl::DynamicInstance::<egl::EGL1_4>::load_required() } {
            Ok(instance) => instance,
            Err(e) => {
                debug!("libEGL not available: {}", e);
                return None;
            }
        };
        let Some(display) = instance.get_current_display() else {
            debug!("No current EGL display; zero-copy import and fences disabled");
            return None;
        };
        let extensions = instance
            .query_string(Some(display), egl::EXTENSIONS)
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let has = |name: &str| extensions.split_whitespace().any(|e| e == name);

        let gl_image = if embedded { "GL_OES_EGL_image_external" } else { "GL_OES_EGL_image" };
        let images = if has("EGL_EXT_image_dma_buf_import") && has("EGL_KHR_image_base") && gl_extensions.contains(gl_image) {
            unsafe {
                Some(ImageFns {
                    create:         resolve(&instance, "eglCreateImageKHR")?,
                    destroy:        resolve(&instance, "eglDestroyImageKHR")?,
                    target_texture: resolve(&instance, "glEGLImageTargetTexture2DOES")?,
                })
            }
        } else {
            None
        };
        let syncs = if has("EGL_KHR_fence_sync") {
            unsafe {
                Some(SyncFns {
                    create:  resolve(&instance, "eglCreateSyncKHR")?,
                    wait:    resolve(&instance, "eglClientWaitSyncKHR")?,
                    destroy: resolve(&instance, "eglDestroySyncKHR")?,
                })
            }
        } else {
            None
        };

        info!(dmabuf = images.is_some(), fences = syncs.is_some(), "EGL display found");
        Some(Self { display: display.as_ptr() as usize, _instance: instance, images, syncs })
    }

    pub fn supports_dmabuf(&self) -> bool {
        self.images.is_some()
    }

    pub fn supports_fences(&self) -> bool {
        self.syncs.is_some()
    }

    pub fn display(&self) -> usize {
        self.display
    }

    /// Wrap DMA-BUF planes in an EGL image. The fds are not consumed.
    pub fn create_image(&self, size: FrameSize, format: PixelFormat, planes: &[DmaBufPlane]) -> Result<EglImage, String> {
        let fns = self.images.as_ref().ok_or("EGL DMA-BUF import unsupported")?;
        let attribs = dmabuf_image_attribs(size, format, planes)
            .ok_or_else(|| format!("{} planes do not describe a {} frame", planes.len(), format))?;
        let image = unsafe {
            (fns.create)(
                self.display as EglDisplay,
                std::ptr::null_mut(),
                EGL_LINUX_DMA_BUF_EXT,
                std::ptr::null_mut(),
                attribs.as_ptr(),
            )
        };
        if image.is_null() {
            return Err(format!("eglCreateImageKHR rejected {format} {size}"));
        }
        Ok(EglImage(image as usize))
    }

    /// # Safety
    /// A texture must be bound to `target` on the current context.
    pub unsafe fn bind_image(&self, target: u32, image: EglImage) {
        if let Some(fns) = &self.images {
            (fns.target_texture)(target, image.0 as EglImageKhr);
        }
    }

    pub fn destroy_image(&self, image: EglImage) {
        if let Some(fns) = &self.images {
            unsafe {
                (fns.destroy)(self.display as EglDisplay, image.0 as EglImageKhr);
            }
        }
    }

    /// Fence after the commands submitted so far. The caller flushes.
    pub fn create_fence(&self) -> Option<EglFence> {
        let fns = self.syncs?;
        let sync = unsafe { (fns.create)(self.display as EglDisplay, EGL_SYNC_FENCE_KHR, [EGL_NONE].as_ptr()) };
        if sync.is_null() {
            debug!("eglCreateSyncKHR failed");
            return None;
        }
        Some(EglFence { display: self.display, sync: sync as usize, fns })
    }
}

/// EGL fence sync. Waiting needs no current context, so the producer's
/// streaming thread can poll it.
pub struct EglFence {
    display: usize,
    sync:    usize,
    fns:     SyncFns,
}

impl FenceSync for EglFence {
    fn wait(&self, timeout: Duration) -> bool {
        let nanos = u64::try_from(timeout.as_nanos()).unwrap_or(u64::MAX);
        let status = unsafe { (self.fns.wait)(self.display as EglDisplay, self.sync as EglSyncKhr, 0, nanos) };
        status == EGL_CONDITION_SATISFIED_KHR
    }
}

impl Drop for EglFence {
    fn drop(&mut self) {
        unsafe {
            (self.fns.destroy)(self.display as EglDisplay, self.sync as EglSyncKhr);
        }
    }
}
