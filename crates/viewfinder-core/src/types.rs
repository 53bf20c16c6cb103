use serde::{Deserialize, Serialize};

// MARK: - Size

/// Size of the display surface in toolkit units.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    pub const ZERO: Self = Self { width: 0.0, height: 0.0 };

    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    /// Both dimensions finite and strictly positive.
    pub fn is_valid(&self) -> bool {
        self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0
    }

    /// Negative or non-finite dimensions; a zero size is empty but not malformed.
    pub fn is_malformed(&self) -> bool {
        !self.width.is_finite() || !self.height.is_finite() || self.width < 0.0 || self.height < 0.0
    }
}

impl std::fmt::Display for Size {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}×{}", self.width, self.height)
    }
}

// MARK: - FrameSize

/// Negotiated size of the video frames, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    pub const VGA: Self = Self { width: 640, height: 480 };
    pub const FHD: Self = Self { width: 1920, height: 1080 };

    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0
    }

    pub fn aspect_ratio(&self) -> f64 {
        self.width as f64 / self.height as f64
    }

    pub fn as_size(&self) -> Size {
        Size::new(self.width as f32, self.height as f32)
    }
}

impl std::fmt::Display for FrameSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}×{}", self.width, self.height)
    }
}

// MARK: - Point / Rect

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned rectangle in surface space (y grows downwards).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub const EMPTY: Self = Self { x: 0.0, y: 0.0, width: 0.0, height: 0.0 };

    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    pub fn from_size(size: Size) -> Self {
        Self::new(0.0, 0.0, size.width, size.height)
    }

    pub fn is_empty(&self) -> bool {
        !(self.width > 0.0 && self.height > 0.0)
    }

    pub fn left(&self) -> f32 {
        self.x
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn top(&self) -> f32 {
        self.y
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

impl std::fmt::Display for Rect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}) {}×{}", self.x, self.y, self.width, self.height)
    }
}

// MARK: - CropRect

/// Crop window attached to a frame by the producer, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CropRect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

// MARK: - PixelFormat

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Nv12,
    Rgba,
    Bgra,
}

impl PixelFormat {
    /// Bytes per pixel of the first plane.
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            Self::Nv12 => 1,
            Self::Rgba | Self::Bgra => 4,
        }
    }
}

/// Little-endian DRM fourcc, as Linux DMA-BUF importers expect it.
const fn fourcc(code: &[u8; 4]) -> u32 {
    code[0] as u32 | (code[1] as u32) << 8 | (code[2] as u32) << 16 | (code[3] as u32) << 24
}

impl PixelFormat {
    /// DRM format code describing the same memory layout.
    ///
    /// `Rgba` is R,G,B,A in byte order, which DRM names ABGR8888.
    pub fn drm_fourcc(&self) -> u32 {
        match self {
            Self::Nv12 => fourcc(b"NV12"),
            Self::Rgba => fourcc(b"AB24"),
            Self::Bgra => fourcc(b"AR24"),
        }
    }

    pub fn plane_count(&self) -> usize {
        match self {
            Self::Nv12 => 2,
            Self::Rgba | Self::Bgra => 1,
        }
    }
}

impl std::fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Nv12 => write!(f, "NV12"),
            Self::Rgba => write!(f, "RGBA"),
            Self::Bgra => write!(f, "BGRA"),
        }
    }
}

// MARK: - Rotation

/// Clockwise rotation applied to the picture on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum Rotation {
    #[default]
    None,
    Clockwise90,
    Half,
    Clockwise270,
}

impl Rotation {
    pub fn from_degrees(degrees: u32) -> Option<Self> {
        match degrees {
            0 => Some(Self::None),
            90 => Some(Self::Clockwise90),
            180 => Some(Self::Half),
            270 => Some(Self::Clockwise270),
            _ => None,
        }
    }

    pub fn degrees(&self) -> u32 {
        match self {
            Self::None => 0,
            Self::Clockwise90 => 90,
            Self::Half => 180,
            Self::Clockwise270 => 270,
        }
    }

    /// Width and height trade places on screen.
    pub fn swaps_axes(&self) -> bool {
        matches!(self, Self::Clockwise90 | Self::Clockwise270)
    }

    /// The next quarter turn clockwise.
    pub fn next(&self) -> Self {
        match self {
            Self::None => Self::Clockwise90,
            Self::Clockwise90 => Self::Half,
            Self::Half => Self::Clockwise270,
            Self::Clockwise270 => Self::None,
        }
    }
}

impl TryFrom<u32> for Rotation {
    type Error = String;

    fn try_from(degrees: u32) -> Result<Self, Self::Error> {
        Self::from_degrees(degrees)
            .ok_or_else(|| format!("rotation must be 0, 90, 180 or 270 degrees, got {degrees}"))
    }
}

impl From<Rotation> for u32 {
    fn from(rotation: Rotation) -> u32 {
        rotation.degrees()
    }
}

impl std::fmt::Display for Rotation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}°", self.degrees())
    }
}

// MARK: - Diagnostic

/// Configuration problems and contract violations surfaced to the UI.
///
/// Transient conditions (no frame yet, one failed import) never end up here.
#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostic {
    /// The native sink element could not be created.
    SinkUnavailable { element: String, reason: String },
    /// The shader program failed to compile or link.
    ProgramUnavailable { log: String },
    /// `paint()` was called without a current graphics context.
    NoGraphicsContext,
    /// `resize()` was called with a negative or non-finite size.
    InvalidSurfaceSize { width: f32, height: f32 },
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SinkUnavailable { element, reason } => {
                write!(f, "viewfinder sink '{}' unavailable: {}", element, reason)
            }
            Self::ProgramUnavailable { log } => write!(f, "shader program unavailable: {}", log),
            Self::NoGraphicsContext => write!(f, "paint requested without a graphics context"),
            Self::InvalidSurfaceSize { width, height } => {
                write!(f, "rejected surface size {}×{}", width, height)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_validity() {
        assert!(Size::new(800.0, 600.0).is_valid());
        assert!(!Size::ZERO.is_valid());
        assert!(!Size::ZERO.is_malformed());
        assert!(Size::new(-1.0, 10.0).is_malformed());
        assert!(Size::new(f32::NAN, 10.0).is_malformed());
        assert!(!Size::new(f32::INFINITY, 10.0).is_valid());
    }

    #[test]
    fn rect_edges() {
        let r = Rect::new(240.0, 0.0, 1440.0, 1080.0);
        assert_eq!(r.right(), 1680.0);
        assert_eq!(r.bottom(), 1080.0);
        assert!(!r.is_empty());
        assert!(Rect::EMPTY.is_empty());
        assert!(Rect::new(10.0, 10.0, 0.0, 5.0).is_empty());
    }

    #[test]
    fn rect_center() {
        assert_eq!(Rect::new(240.0, 0.0, 1440.0, 1080.0).center(), Point::new(960.0, 540.0));
    }

    #[test]
    fn drm_codes_match_kernel_values() {
        // drm_fourcc.h: DRM_FORMAT_ABGR8888 0x34324241, ARGB8888 0x34325241, NV12 0x3231564e.
        assert_eq!(PixelFormat::Rgba.drm_fourcc(), 0x3432_4241);
        assert_eq!(PixelFormat::Bgra.drm_fourcc(), 0x3432_5241);
        assert_eq!(PixelFormat::Nv12.drm_fourcc(), 0x3231_564e);
    }

    #[test]
    fn rotation_accepts_quarter_turns_only() {
        assert_eq!(Rotation::from_degrees(270), Some(Rotation::Clockwise270));
        assert_eq!(Rotation::from_degrees(45), None);
        assert!(Rotation::Clockwise90.swaps_axes());
        assert!(!Rotation::Half.swaps_axes());
        assert_eq!(Rotation::Clockwise270.next(), Rotation::None);
    }

    #[test]
    fn frame_size_aspect() {
        assert!((FrameSize::VGA.aspect_ratio() - 4.0 / 3.0).abs() < 1e-9);
        assert!(!FrameSize::new(0, 480).is_valid());
        assert_eq!(FrameSize::FHD.as_size(), Size::new(1920.0, 1080.0));
    }
}
