//! Raw frame and orientation types shared across the pipeline.

use std::sync::Arc;

/// Pixel layouts the pipeline understands. Planar camera formats (NV12 and
/// friends) are not converted here; sources are expected to hand over an
/// interleaved buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    Rgb8,
    Rgba8,
    Bgra8,
    /// Bi-planar YCbCr, unsupported by the converter. Carried so sources
    /// can report it and get a typed `UnsupportedFormat` back.
    Nv12,
}

impl PixelFormat {
    /// Bytes per pixel for interleaved formats.
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Rgb8 => 3,
            PixelFormat::Rgba8 | PixelFormat::Bgra8 => 4,
            PixelFormat::Nv12 => 1,
        }
    }

    pub fn is_interleaved(&self) -> bool {
        !matches!(self, PixelFormat::Nv12)
    }
}

/// Device interface orientation at capture time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Portrait,
    PortraitUpsideDown,
    LandscapeLeft,
    LandscapeRight,
}

impl Orientation {
    /// Capture resolution is reported landscape-relative; portrait-family
    /// orientations swap effective width and height downstream.
    pub fn is_portrait(&self) -> bool {
        matches!(self, Orientation::Portrait | Orientation::PortraitUpsideDown)
    }
}

/// Rotation applied by the preprocessor before inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotation {
    None,
    Cw90,
    Ccw90,
    Half,
}

impl Rotation {
    pub fn degrees_cw(&self) -> u32 {
        match self {
            Rotation::None => 0,
            Rotation::Cw90 => 90,
            Rotation::Half => 180,
            Rotation::Ccw90 => 270,
        }
    }
}

/// Fixed interface-orientation to rotation table. An unknown orientation
/// (`None`) behaves like landscape-right: no rotation.
pub fn rotation_for(orientation: Option<Orientation>) -> Rotation {
    match orientation {
        Some(Orientation::Portrait) => Rotation::Cw90,
        Some(Orientation::PortraitUpsideDown) => Rotation::Ccw90,
        Some(Orientation::LandscapeLeft) => Rotation::Half,
        Some(Orientation::LandscapeRight) | None => Rotation::None,
    }
}

/// A capture resolution in pixels, landscape-relative.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// One captured camera frame as delivered by the frame source.
///
/// Pixel data is shared, not copied: the source keeps its `Arc` and the
/// preprocessor reads it for the duration of a single conversion.
#[derive(Clone)]
pub struct RawFrame {
    pub data: Arc<Vec<u8>>,
    pub format: PixelFormat,
    pub width: u32,
    pub height: u32,
    pub orientation: Option<Orientation>,
}

impl RawFrame {
    pub fn new(
        data: Arc<Vec<u8>>,
        format: PixelFormat,
        width: u32,
        height: u32,
        orientation: Option<Orientation>,
    ) -> Self {
        Self {
            data,
            format,
            width,
            height,
            orientation,
        }
    }

    /// Expected byte length for an interleaved frame of this geometry.
    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * self.format.bytes_per_pixel()
    }
}

impl std::fmt::Debug for RawFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawFrame")
            .field("format", &self.format)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("orientation", &self.orientation)
            .field("bytes", &self.data.len())
            .finish()
    }
}
