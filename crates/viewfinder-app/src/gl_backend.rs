//! glow implementation of the viewfinder's graphics backend.
//!
//! Runs inside an egui paint callback, so the context is always current and
//! egui restores its own GL state afterwards.

use std::num::NonZeroU32;

use eframe::glow::{self, HasContext};
use viewfinder_core::{FrameSize, PixelFormat, RenderError};
use viewfinder_renderer::{
    DisplayHandle, DmaBufPlane, DrawCall, GpuFence, GraphicsBackend, ImportSource, TextureTarget,
};

use crate::egl::{EglExt, EglImage};

// ── Shader dialect ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

/// GLSL flavour of the current context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlslDialect {
    /// OpenGL ES 2/3: sources compile as-is under `#version 100`.
    Es100,
    /// Desktop core profile 3.3.
    Core330,
}

impl GlslDialect {
    pub fn detect(gl: &glow::Context) -> Self {
        if gl.version().is_embedded {
            Self::Es100
        } else {
            Self::Core330
        }
    }

    /// Prefix `source` (written as ES 1.00) so it builds on this dialect.
    /// `#extension` lines stay right after the version line.
    pub fn source(self, stage: ShaderStage, source: &str) -> String {
        let (extensions, body): (Vec<&str>, Vec<&str>) = {
            let mut lines = source.lines().peekable();
            let mut extensions = Vec::new();
            while let Some(line) = lines.next_if(|l| l.trim_start().starts_with("#extension")) {
                extensions.push(line);
            }
            (extensions, lines.collect())
        };

        let mut out = String::new();
        match self {
            Self::Es100 => out.push_str("#version 100\n"),
            Self::Core330 => out.push_str("#version 330 core\n"),
        }
        for line in extensions {
            out.push_str(line);
            out.push('\n');
        }
        match (self, stage) {
            (Self::Es100, ShaderStage::Vertex) => {}
            (Self::Es100, ShaderStage::Fragment) => out.push_str("precision mediump float;\n"),
            (Self::Core330, ShaderStage::Vertex) => {
                out.push_str("#define attribute in\n#define varying out\n");
            }
            (Self::Core330, ShaderStage::Fragment) => {
                out.push_str(
                    "#define varying in\n#define texture2D texture\n\
                     out vec4 fragColor;\n#define gl_FragColor fragColor\n",
                );
            }
        }
        for line in body {
            out.push_str(line);
            out.push('\n');
        }
        out
    }
}

// ── GL objects ────────────────────────────────────────────────────────────────

/// Linked viewfinder program and its per-draw uniforms.
pub struct GlProgram {
    program: glow::Program,
    matrix:  Option<glow::UniformLocation>,
    world:   Option<glow::UniformLocation>,
}

/// Imported frame texture. Borrowed names belong to the producer; images
/// wrap the producer's DMA-BUF and are destroyed with the texture.
pub enum GlTexture {
    Owned(glow::Texture),
    Borrowed(glow::Texture),
    Image { texture: glow::Texture, image: EglImage, target: u32 },
}

impl GlTexture {
    fn name(&self) -> glow::Texture {
        match self {
            Self::Owned(t) | Self::Borrowed(t) => *t,
            Self::Image { texture, .. } => *texture,
        }
    }

    fn gl_target(&self) -> u32 {
        match self {
            Self::Image { target, .. } => *target,
            _ => glow::TEXTURE_2D,
        }
    }
}

/// `GL_TEXTURE_EXTERNAL_OES`.
pub const TEXTURE_EXTERNAL_OES: u32 = 0x8D65;

/// Per-context state kept across frames: the quad's vertex array and
/// buffer (created on first draw) and the EGL extras, if any.
#[derive(Default)]
pub struct GlResources {
    vao: Option<glow::VertexArray>,
    vbo: Option<glow::Buffer>,
    egl: Option<EglExt>,
}

impl GlResources {
    /// Call with `gl` current so the EGL display can be found.
    pub fn new(gl: Option<&glow::Context>) -> Self {
        let egl = gl.and_then(|gl| EglExt::load(gl.supported_extensions(), gl.version().is_embedded));
        Self { egl, ..Self::default() }
    }

    /// Frames can be imported from DMA-BUF without a copy.
    pub fn supports_dmabuf(&self) -> bool {
        self.egl.as_ref().is_some_and(EglExt::supports_dmabuf)
    }

    pub fn supports_fences(&self) -> bool {
        self.egl.as_ref().is_some_and(EglExt::supports_fences)
    }

    pub fn destroy(&mut self, gl: &glow::Context) {
        unsafe {
            if let Some(vbo) = self.vbo.take() {
                gl.delete_buffer(vbo);
            }
            if let Some(vao) = self.vao.take() {
                gl.delete_vertex_array(vao);
            }
        }
    }

    unsafe fn bind_quad(&mut self, gl: &glow::Context) -> Result<(), String> {
        if self.vao.is_none() {
            self.vao = Some(gl.create_vertex_array()?);
        }
        if self.vbo.is_none() {
            self.vbo = Some(gl.create_buffer()?);
        }
        gl.bind_vertex_array(self.vao);
        gl.bind_buffer(glow::ARRAY_BUFFER, self.vbo);
        Ok(())
    }
}

/// Texture target a DMA-BUF import binds to. ES samples external images;
/// desktop GL can only bind RGB images to `TEXTURE_2D`.
pub fn dmabuf_target(dialect: GlslDialect, format: PixelFormat) -> Result<u32, RenderError> {
    match (dialect, format) {
        (GlslDialect::Es100, _) => Ok(TEXTURE_EXTERNAL_OES),
        (GlslDialect::Core330, PixelFormat::Nv12) => Err(RenderError::UnsupportedFormat(format)),
        (GlslDialect::Core330, _) => Ok(glow::TEXTURE_2D),
    }
}

// ── GlowBackend ───────────────────────────────────────────────────────────────

pub struct GlowBackend<'a> {
    gl:      &'a glow::Context,
    res:     &'a mut GlResources,
    dialect: GlslDialect,
}

impl<'a> GlowBackend<'a> {
    pub fn new(gl: &'a glow::Context, res: &'a mut GlResources) -> Self {
        Self { gl, res, dialect: GlslDialect::detect(gl) }
    }

    unsafe fn compile_shader(&self, stage: ShaderStage, source: &str) -> Result<glow::Shader, RenderError> {
        let kind = match stage {
            ShaderStage::Vertex => glow::VERTEX_SHADER,
            ShaderStage::Fragment => glow::FRAGMENT_SHADER,
        };
        let shader = self.gl.create_shader(kind).map_err(RenderError::ShaderCompile)?;
        self.gl.shader_source(shader, &self.dialect.source(stage, source));
        self.gl.compile_shader(shader);
        if !self.gl.get_shader_compile_status(shader) {
            let log = self.gl.get_shader_info_log(shader);
            self.gl.delete_shader(shader);
            return Err(RenderError::ShaderCompile(format!("{stage:?}: {log}")));
        }
        Ok(shader)
    }

    unsafe fn new_texture(&self, target: u32) -> Result<glow::Texture, RenderError> {
        let gl = self.gl;
        let texture = gl
            .create_texture()
            .map_err(|e| RenderError::ImportFailed { reason: e })?;
        gl.active_texture(glow::TEXTURE0);
        gl.bind_texture(target, Some(texture));
        gl.tex_parameter_i32(target, glow::TEXTURE_MIN_FILTER, glow::LINEAR as i32);
        gl.tex_parameter_i32(target, glow::TEXTURE_MAG_FILTER, glow::LINEAR as i32);
        gl.tex_parameter_i32(target, glow::TEXTURE_WRAP_S, glow::CLAMP_TO_EDGE as i32);
        gl.tex_parameter_i32(target, glow::TEXTURE_WRAP_T, glow::CLAMP_TO_EDGE as i32);
        Ok(texture)
    }

    unsafe fn upload(
        &self,
        data: &[u8],
        stride: usize,
        width: i32,
        height: i32,
        format: PixelFormat,
    ) -> Result<glow::Texture, RenderError> {
        let bpp = format.bytes_per_pixel();
        let row = width as usize * bpp;
        if stride < row || stride % bpp != 0 {
            return Err(RenderError::ImportFailed { reason: format!("bad stride {stride} for width {width}") });
        }
        let needed = stride * (height as usize - 1) + row;
        if data.len() < needed {
            return Err(RenderError::ImportFailed {
                reason: format!("plane holds {} bytes, {} needed", data.len(), needed),
            });
        }

        let gl = self.gl;
        let texture = self.new_texture(glow::TEXTURE_2D)?;

        // BGRA is uploaded as RGBA and swizzled back.
        let (red, blue) = match format {
            PixelFormat::Bgra => (glow::BLUE, glow::RED),
            _ => (glow::RED, glow::BLUE),
        };
        gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_SWIZZLE_R, red as i32);
        gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_SWIZZLE_B, blue as i32);

        gl.pixel_store_i32(glow::UNPACK_ALIGNMENT, 4);
        gl.pixel_store_i32(glow::UNPACK_ROW_LENGTH, (stride / bpp) as i32);
        gl.tex_image_2d(
            glow::TEXTURE_2D,
            0,
            glow::RGBA8 as i32,
            width,
            height,
            0,
            glow::RGBA,
            glow::UNSIGNED_BYTE,
            Some(&data[..needed]),
        );
        gl.pixel_store_i32(glow::UNPACK_ROW_LENGTH, 0);
        Ok(texture)
    }

    fn import_dmabuf(
        &self,
        planes: &[DmaBufPlane],
        size: FrameSize,
        format: PixelFormat,
    ) -> Result<GlTexture, RenderError> {
        let egl = self
            .res
            .egl
            .as_ref()
            .filter(|egl| egl.supports_dmabuf())
            .ok_or_else(|| RenderError::ImportFailed { reason: "no EGL DMA-BUF import on this context".into() })?;
        let target = dmabuf_target(self.dialect, format)?;
        let image = egl
            .create_image(size, format, planes)
            .map_err(|reason| RenderError::ImportFailed { reason })?;

        unsafe {
            let texture = match self.new_texture(target) {
                Ok(texture) => texture,
                Err(e) => {
                    egl.destroy_image(image);
                    return Err(e);
                }
            };
            egl.bind_image(target, image);
            let error = self.gl.get_error();
            if error != glow::NO_ERROR {
                self.gl.bind_texture(target, None);
                self.gl.delete_texture(texture);
                egl.destroy_image(image);
                return Err(RenderError::ImportFailed {
                    reason: format!("glEGLImageTargetTexture2DOES failed with 0x{error:04x}"),
                });
            }
            Ok(GlTexture::Image { texture, image, target })
        }
    }
}

impl GraphicsBackend for GlowBackend<'_> {
    type Program = GlProgram;
    type Texture = GlTexture;

    fn has_context(&self) -> bool {
        true
    }

    fn clear(&mut self, [r, g, b, a]: [f32; 4]) {
        unsafe {
            self.gl.clear_color(r, g, b, a);
            self.gl.clear(glow::COLOR_BUFFER_BIT);
        }
    }

    fn imported_target(&self, texture: &GlTexture) -> TextureTarget {
        match texture.gl_target() {
            TEXTURE_EXTERNAL_OES => TextureTarget::External,
            _ => TextureTarget::Texture2D,
        }
    }

    fn compile_program(&mut self, vertex: &str, fragment: &str) -> Result<GlProgram, RenderError> {
        unsafe {
            let vs = self.compile_shader(ShaderStage::Vertex, vertex)?;
            let fs = match self.compile_shader(ShaderStage::Fragment, fragment) {
                Ok(fs) => fs,
                Err(e) => {
                    self.gl.delete_shader(vs);
                    return Err(e);
                }
            };

            let gl = self.gl;
            let program = match gl.create_program() {
                Ok(p) => p,
                Err(e) => {
                    gl.delete_shader(vs);
                    gl.delete_shader(fs);
                    return Err(RenderError::ShaderLink(e));
                }
            };
            gl.attach_shader(program, vs);
            gl.attach_shader(program, fs);
            gl.bind_attrib_location(program, 0, "inputVertex");
            gl.bind_attrib_location(program, 1, "textureCoord");
            gl.link_program(program);

            gl.detach_shader(program, vs);
            gl.detach_shader(program, fs);
            gl.delete_shader(vs);
            gl.delete_shader(fs);

            if !gl.get_program_link_status(program) {
                let log = gl.get_program_info_log(program);
                gl.delete_program(program);
                return Err(RenderError::ShaderLink(log));
            }

            gl.use_program(Some(program));
            if let Some(sampler) = gl.get_uniform_location(program, "texture0") {
                gl.uniform_1_i32(Some(&sampler), 0);
            }
            let matrix = gl.get_uniform_location(program, "matrix");
            let world = gl.get_uniform_location(program, "matrixWorld");
            gl.use_program(None);

            Ok(GlProgram { program, matrix, world })
        }
    }

    fn delete_program(&mut self, program: GlProgram) {
        unsafe { self.gl.delete_program(program.program) }
    }

    fn import_frame(&mut self, source: ImportSource<'_>) -> Result<GlTexture, RenderError> {
        if !source.size().is_valid() {
            return Err(RenderError::ImportFailed { reason: format!("empty frame {}", source.size()) });
        }
        match source {
            ImportSource::Pixels { format: PixelFormat::Nv12, .. } => {
                Err(RenderError::UnsupportedFormat(PixelFormat::Nv12))
            }
            ImportSource::Pixels { data, stride, size, format } => {
                let texture =
                    unsafe { self.upload(data, stride, size.width as i32, size.height as i32, format)? };
                Ok(GlTexture::Owned(texture))
            }
            ImportSource::Texture { name, .. } => NonZeroU32::new(name)
                .map(|n| GlTexture::Borrowed(glow::NativeTexture(n)))
                .ok_or_else(|| RenderError::ImportFailed { reason: "texture name 0".into() }),
            ImportSource::DmaBuf { planes, size, format } => self.import_dmabuf(planes, size, format),
        }
    }

    fn draw(&mut self, program: &GlProgram, texture: &GlTexture, call: &DrawCall<'_>) {
        let mut floats = [0.0f32; 16];
        for (i, p) in call.vertices.iter().enumerate() {
            floats[i * 2] = p.x;
            floats[i * 2 + 1] = p.y;
        }
        for (i, t) in call.tex_coords.iter().enumerate() {
            floats[8 + i * 2] = t.x;
            floats[8 + i * 2 + 1] = t.y;
        }
        let bytes: Vec<u8> = floats.iter().flat_map(|f| f.to_ne_bytes()).collect();

        unsafe {
            let gl = self.gl;
            if let Err(e) = self.res.bind_quad(gl) {
                tracing::warn!("Failed to create viewfinder quad buffers: {}", e);
                return;
            }
            gl.buffer_data_u8_slice(glow::ARRAY_BUFFER, &bytes, glow::STREAM_DRAW);
            gl.vertex_attrib_pointer_f32(0, 2, glow::FLOAT, false, 0, 0);
            gl.vertex_attrib_pointer_f32(1, 2, glow::FLOAT, false, 0, 8 * 4);
            gl.enable_vertex_attrib_array(0);
            gl.enable_vertex_attrib_array(1);

            gl.use_program(Some(program.program));
            gl.uniform_matrix_4_f32_slice(program.matrix.as_ref(), false, call.projection.as_slice());
            gl.uniform_matrix_4_f32_slice(program.world.as_ref(), false, call.world.as_slice());

            gl.active_texture(glow::TEXTURE0);
            gl.bind_texture(texture.gl_target(), Some(texture.name()));
            gl.disable(glow::BLEND);
            gl.draw_arrays(glow::TRIANGLE_FAN, 0, 4);

            gl.disable_vertex_attrib_array(0);
            gl.disable_vertex_attrib_array(1);
            gl.use_program(None);
            gl.bind_vertex_array(None);
        }
    }

    fn release_texture(&mut self, texture: GlTexture) {
        unsafe {
            self.gl.bind_texture(texture.gl_target(), None);
            match texture {
                GlTexture::Owned(t) => self.gl.delete_texture(t),
                GlTexture::Borrowed(_) => {}
                GlTexture::Image { texture, image, .. } => {
                    self.gl.delete_texture(texture);
                    if let Some(egl) = &self.res.egl {
                        egl.destroy_image(image);
                    }
                }
            }
        }
    }

    fn create_fence(&mut self) -> Option<GpuFence> {
        let fence = self.res.egl.as_ref()?.create_fence()?;
        // The sync must reach the GPU before another thread waits on it.
        unsafe { self.gl.flush() };
        Some(Box::new(fence))
    }

    fn display_handle(&self) -> Option<DisplayHandle> {
        self.res.egl.as_ref().map(|egl| DisplayHandle(egl.display()))
    }
}
