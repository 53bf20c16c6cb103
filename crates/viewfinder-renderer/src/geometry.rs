//! Letterbox geometry for the viewfinder quad.
//!
//! Everything here is pure; [`Geometry`] is the render-thread cache that
//! decides when the pure functions need to run again.

use viewfinder_core::{CropRect, FrameSize, Point, Rect, Rotation, Size};

// ── Pure computation ──────────────────────────────────────────────────────────

/// Aspect-preserving, centered placement of `frame` inside `surface`.
///
/// Returns [`Rect::EMPTY`] when either size has a non-positive (or
/// non-finite) dimension.
pub fn compute_render_area(surface: Size, frame: FrameSize) -> Rect {
    if !surface.is_valid() || !frame.is_valid() {
        return Rect::EMPTY;
    }

    let frame_w = frame.width as f32;
    let frame_h = frame.height as f32;
    let scale = (surface.width / frame_w).min(surface.height / frame_h);

    let width = frame_w * scale;
    let height = frame_h * scale;

    Rect::new(
        (surface.width - width) / 2.0,
        (surface.height - height) / 2.0,
        width,
        height,
    )
}

/// Frame size as it appears on screen once rotated.
pub fn oriented_frame(frame: FrameSize, rotation: Rotation) -> FrameSize {
    if rotation.swaps_axes() {
        FrameSize::new(frame.height, frame.width)
    } else {
        frame
    }
}

/// Unrotated quad that covers `area` after rotating about its centre.
pub fn compute_quad_rect(area: Rect, rotation: Rotation) -> Rect {
    if !rotation.swaps_axes() || area.is_empty() {
        return area;
    }
    let center = area.center();
    Rect::new(
        center.x - area.height / 2.0,
        center.y - area.width / 2.0,
        area.height,
        area.width,
    )
}

/// Quad corners in triangle-fan order: bottom-left, bottom-right, top-right,
/// top-left.
pub fn compute_vertex_coords(area: Rect) -> [Point; 4] {
    [
        Point::new(area.left(), area.bottom()),
        Point::new(area.right(), area.bottom()),
        Point::new(area.right(), area.top()),
        Point::new(area.left(), area.top()),
    ]
}

/// Normalised texture coordinates matching [`compute_vertex_coords`].
///
/// Row 0 of the frame sits at `t = 0`, so the top vertices get the crop's
/// top edge. A missing, empty or out-of-frame crop samples the full frame.
pub fn compute_texture_coords(crop: Option<CropRect>, frame: FrameSize) -> [Point; 4] {
    let (mut s0, mut t0, mut s1, mut t1) = (0.0_f32, 0.0_f32, 1.0_f32, 1.0_f32);

    if let Some(crop) = crop.filter(|c| !c.is_empty() && frame.is_valid()) {
        if crop.x < frame.width && crop.y < frame.height {
            let right = crop.x.saturating_add(crop.width).min(frame.width);
            let bottom = crop.y.saturating_add(crop.height).min(frame.height);
            let fw = frame.width as f32;
            let fh = frame.height as f32;
            s0 = crop.x as f32 / fw;
            t0 = crop.y as f32 / fh;
            s1 = right as f32 / fw;
            t1 = bottom as f32 / fh;
        }
    }

    [
        Point::new(s0, t1),
        Point::new(s1, t1),
        Point::new(s1, t0),
        Point::new(s0, t0),
    ]
}

// ── Mat4 ──────────────────────────────────────────────────────────────────────

/// Column-major 4×4 matrix, laid out the way GL uniforms expect it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mat4(pub [f32; 16]);

impl Mat4 {
    pub const IDENTITY: Self = Self([
        1.0, 0.0, 0.0, 0.0, //
        0.0, 1.0, 0.0, 0.0, //
        0.0, 0.0, 1.0, 0.0, //
        0.0, 0.0, 0.0, 1.0,
    ]);

    /// Orthographic projection of `rect` onto clip space; the rect's top edge
    /// maps to +1 so surface y grows downwards on screen.
    pub fn ortho(rect: Rect) -> Self {
        if rect.is_empty() {
            return Self::IDENTITY;
        }
        let (l, r) = (rect.left(), rect.right());
        let (t, b) = (rect.top(), rect.bottom());
        let (near, far) = (-1.0_f32, 1.0_f32);

        let mut m = [0.0_f32; 16];
        m[0] = 2.0 / (r - l);
        m[5] = 2.0 / (t - b);
        m[10] = -2.0 / (far - near);
        m[12] = -(r + l) / (r - l);
        m[13] = -(t + b) / (t - b);
        m[14] = -(far + near) / (far - near);
        m[15] = 1.0;
        Self(m)
    }

    pub fn translation(x: f32, y: f32) -> Self {
        let mut m = Self::IDENTITY;
        m.0[12] = x;
        m.0[13] = y;
        m
    }

    pub fn scale(x: f32, y: f32) -> Self {
        let mut m = Self::IDENTITY;
        m.0[0] = x;
        m.0[5] = y;
        m
    }

    /// Clockwise on screen, given surface y grows downwards.
    pub fn rotation(rotation: Rotation) -> Self {
        let (cos, sin) = match rotation {
            Rotation::None => (1.0, 0.0),
            Rotation::Clockwise90 => (0.0, 1.0),
            Rotation::Half => (-1.0, 0.0),
            Rotation::Clockwise270 => (0.0, -1.0),
        };
        let mut m = Self::IDENTITY;
        m.0[0] = cos;
        m.0[1] = sin;
        m.0[4] = -sin;
        m.0[5] = cos;
        m
    }

    /// Mirror (if `flipped`) then rotate, both about `center`.
    pub fn orientation(center: Point, rotation: Rotation, flipped: bool) -> Self {
        if rotation == Rotation::None && !flipped {
            return Self::IDENTITY;
        }
        let mirror = if flipped { Self::scale(-1.0, 1.0) } else { Self::IDENTITY };
        Self::translation(center.x, center.y)
            .mul(&Self::rotation(rotation))
            .mul(&mirror)
            .mul(&Self::translation(-center.x, -center.y))
    }

    pub fn mul(&self, rhs: &Mat4) -> Mat4 {
        let mut out = [0.0_f32; 16];
        for col in 0..4 {
            for row in 0..4 {
                out[col * 4 + row] = (0..4).map(|k| self.0[k * 4 + row] * rhs.0[col * 4 + k]).sum();
            }
        }
        Mat4(out)
    }

    /// Transform a point with z = 0, w = 1.
    pub fn transform(&self, p: Point) -> Point {
        let m = &self.0;
        Point::new(
            m[0] * p.x + m[4] * p.y + m[12],
            m[1] * p.x + m[5] * p.y + m[13],
        )
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }
}

impl Default for Mat4 {
    fn default() -> Self {
        Self::IDENTITY
    }
}

// ── Geometry cache ────────────────────────────────────────────────────────────

/// Surface/frame sizes and picture orientation plus the lazily derived
/// render area, quad and orientation matrix.
#[derive(Debug, Default)]
pub struct Geometry {
    surface:     Size,
    frame:       FrameSize,
    rotation:    Rotation,
    flipped:     bool,
    area:        Option<Rect>,
    vertices:    Option<[Point; 4]>,
    orientation: Option<Mat4>,
}

impl Geometry {
    pub fn new(surface: Size) -> Self {
        Self { surface, ..Self::default() }
    }

    pub fn surface_size(&self) -> Size {
        self.surface
    }

    pub fn frame_size(&self) -> FrameSize {
        self.frame
    }

    /// Returns `true` when the size changed and the cache was invalidated.
    pub fn set_surface_size(&mut self, size: Size) -> bool {
        if size == self.surface {
            return false;
        }
        self.surface = size;
        self.invalidate();
        true
    }

    pub fn set_frame_size(&mut self, size: FrameSize) -> bool {
        if size == self.frame {
            return false;
        }
        self.frame = size;
        self.invalidate();
        true
    }

    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    pub fn is_flipped(&self) -> bool {
        self.flipped
    }

    pub fn set_orientation(&mut self, rotation: Rotation, flipped: bool) -> bool {
        if rotation == self.rotation && flipped == self.flipped {
            return false;
        }
        self.rotation = rotation;
        self.flipped = flipped;
        self.invalidate();
        true
    }

    pub fn is_dirty(&self) -> bool {
        self.area.is_none() || self.vertices.is_none() || self.orientation.is_none()
    }

    pub fn invalidate(&mut self) {
        self.area = None;
        self.vertices = None;
        self.orientation = None;
    }

    /// Where the picture lands on screen, after orientation.
    pub fn render_area(&mut self) -> Rect {
        let frame = oriented_frame(self.frame, self.rotation);
        *self
            .area
            .get_or_insert_with(|| compute_render_area(self.surface, frame))
    }

    /// Quad in picture space; [`orientation_matrix`](Self::orientation_matrix)
    /// puts it on top of the render area.
    pub fn vertex_coords(&mut self) -> [Point; 4] {
        if let Some(v) = self.vertices {
            return v;
        }
        let v = compute_vertex_coords(compute_quad_rect(self.render_area(), self.rotation));
        self.vertices = Some(v);
        v
    }

    pub fn orientation_matrix(&mut self) -> Mat4 {
        if let Some(m) = self.orientation {
            return m;
        }
        let m = Mat4::orientation(self.render_area().center(), self.rotation, self.flipped);
        self.orientation = Some(m);
        m
    }
}
