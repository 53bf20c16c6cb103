//! Texture binding and the viewfinder draw call.

use tracing::{debug, error};
use viewfinder_core::{Point, RenderError};

use crate::backend::{DrawCall, FrameBuffer, FrameHandle, GraphicsBackend, TextureTarget};
use crate::geometry::{compute_texture_coords, Mat4};
use crate::tap::FrameTapSlot;

pub const VERTEX_SHADER: &str = "\
attribute highp vec4 inputVertex;
attribute lowp vec2 textureCoord;
uniform highp mat4 matrix;
uniform highp mat4 matrixWorld;
varying lowp vec2 fragTexCoord;

void main() {
  gl_Position = matrix * matrixWorld * inputVertex;
  fragTexCoord = textureCoord;
}
";

pub const FRAGMENT_SHADER_2D: &str = "\
uniform sampler2D texture0;
varying lowp vec2 fragTexCoord;

void main() {
  gl_FragColor = texture2D(texture0, fragTexCoord);
}
";

pub const FRAGMENT_SHADER_EXTERNAL: &str = "\
#extension GL_OES_EGL_image_external : require
uniform samplerExternalOES texture0;
varying lowp vec2 fragTexCoord;

void main() {
  gl_FragColor = texture2D(texture0, fragTexCoord);
}
";

pub fn fragment_shader(target: TextureTarget) -> &'static str {
    match target {
        TextureTarget::Texture2D => FRAGMENT_SHADER_2D,
        TextureTarget::External => FRAGMENT_SHADER_EXTERNAL,
    }
}

/// Imports frames, owns the shader program, and issues the draw.
///
/// Render-thread only; the backend passed to each call is the current context.
pub struct TextureBinder<P> {
    program:          Option<P>,
    program_target:   TextureTarget,
    tap:              FrameTapSlot,
    use_fence:        bool,
    failure_reported: bool,
    program_error:    Option<RenderError>,
    frames_drawn:     u64,
    import_failures:  u64,
}

impl<P> TextureBinder<P> {
    pub fn new(use_fence: bool) -> Self {
        Self {
            program: None,
            program_target: TextureTarget::Texture2D,
            tap: FrameTapSlot::default(),
            use_fence,
            failure_reported: false,
            program_error: None,
            frames_drawn: 0,
            import_failures: 0,
        }
    }

    pub fn has_program(&self) -> bool {
        self.program.is_some()
    }

    pub fn frames_drawn(&self) -> u64 {
        self.frames_drawn
    }

    pub fn import_failures(&self) -> u64 {
        self.import_failures
    }

    /// Sampler the current program was built for.
    pub fn program_target(&self) -> Option<TextureTarget> {
        self.program.as_ref().map(|_| self.program_target)
    }

    /// Shared handle to the CPU frame tap.
    pub fn frame_tap(&self) -> FrameTapSlot {
        self.tap.clone()
    }

    /// The first program failure of the current streak, once.
    pub fn take_program_error(&mut self) -> Option<RenderError> {
        self.program_error.take()
    }

    /// Delete the program so the next draw rebuilds it.
    pub fn invalidate<G>(&mut self, gpu: &mut G)
    where
        G: GraphicsBackend<Program = P>,
    {
        if let Some(program) = self.program.take() {
            if gpu.has_context() {
                gpu.delete_program(program);
            } else {
                debug!("Dropping shader program without a current context");
            }
        }
        self.failure_reported = false;
    }

    /// Forget the program without a context; the GL object goes away with
    /// the context it was created in.
    pub fn forget_program(&mut self) {
        if self.program.take().is_some() {
            debug!("Abandoning shader program with its context");
        }
        self.failure_reported = false;
    }

    /// Compile the program for the backend's default sampler if there is none.
    /// Returns the error on failure so the caller can publish it; the error
    /// is logged here once per streak.
    pub fn ensure_program<G>(&mut self, gpu: &mut G) -> Result<(), RenderError>
    where
        G: GraphicsBackend<Program = P>,
    {
        let target = gpu.texture_target();
        self.ensure_program_for(gpu, target)
    }

    /// Like [`ensure_program`](Self::ensure_program), rebuilding when the
    /// current program samples a different target.
    pub fn ensure_program_for<G>(&mut self, gpu: &mut G, target: TextureTarget) -> Result<(), RenderError>
    where
        G: GraphicsBackend<Program = P>,
    {
        if self.program.is_some() && self.program_target == target {
            return Ok(());
        }
        if let Some(old) = self.program.take() {
            debug!("Rebuilding shader program for {:?} textures", target);
            gpu.delete_program(old);
        }
        match gpu.compile_program(VERTEX_SHADER, fragment_shader(target)) {
            Ok(program) => {
                debug!("Viewfinder shader program linked for {:?}", target);
                self.program = Some(program);
                self.program_target = target;
                self.failure_reported = false;
                Ok(())
            }
            Err(e) => {
                if self.failure_reported {
                    debug!("Shader program still unavailable: {}", e);
                } else {
                    error!("Failed to build viewfinder shader program: {}", e);
                    self.failure_reported = true;
                    self.program_error = Some(e.clone());
                }
                Err(e)
            }
        }
    }

    /// Draw `frame` into `vertices`. The frame goes back to its producer on
    /// every path. `false` means "nothing new this time", never a fatal error.
    pub fn draw_frame<G, H>(
        &mut self,
        gpu: &mut G,
        frame: Option<H>,
        vertices: &[Point; 4],
        projection: &Mat4,
        world: &Mat4,
    ) -> bool
    where
        G: GraphicsBackend<Program = P>,
        H: FrameHandle,
    {
        let Some(frame) = frame else {
            return false;
        };

        let buffer = match frame.acquire() {
            Ok(buffer) => buffer,
            Err(e) => {
                debug!("Failed to acquire frame: {}", e);
                return false;
            }
        };

        let tex_coords = compute_texture_coords(buffer.crop(), buffer.frame_size());
        let source = buffer.import_source();
        self.tap.deliver(&source);

        let texture = match gpu.import_frame(source) {
            Ok(texture) => texture,
            Err(e) => {
                self.import_failures += 1;
                debug!("Failed to import frame: {}", e);
                buffer.release(None);
                return false;
            }
        };

        let target = gpu.imported_target(&texture);
        if self.ensure_program_for(gpu, target).is_err() {
            gpu.release_texture(texture);
            buffer.release(None);
            return false;
        }
        let Some(program) = self.program.as_ref() else {
            gpu.release_texture(texture);
            buffer.release(None);
            return false;
        };

        gpu.draw(
            program,
            &texture,
            &DrawCall { projection, world, vertices, tex_coords: &tex_coords },
        );
        gpu.release_texture(texture);

        let fence = if self.use_fence { gpu.create_fence() } else { None };
        buffer.release(fence);

        self.frames_drawn += 1;
        true
    }
}
