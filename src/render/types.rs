//! Core types shared by the render engine

use std::collections::BTreeMap;
use std::ops::Add;

use serde::Serialize;

/// A point in CSS (device-independent) pixels
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Width/height pair, in page points or CSS pixels depending on context
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    #[must_use]
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    #[must_use]
    pub fn scaled(self, factor: f32) -> Self {
        Self::new(self.width * factor, self.height * factor)
    }

    /// Width and height exchanged
    #[must_use]
    pub const fn transposed(self) -> Self {
        Self::new(self.height, self.width)
    }

    #[must_use]
    pub fn area(self) -> f32 {
        self.width * self.height
    }
}

/// Axis-aligned rectangle
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct Rect {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl Rect {
    #[must_use]
    pub const fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    #[must_use]
    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    #[must_use]
    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.x1 <= self.x0 || self.y1 <= self.y0
    }
}

/// Clockwise page rotation in quarter turns
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    /// Normalizes any multiple of 90 degrees, negative values included.
    #[must_use]
    pub fn from_degrees(degrees: i32) -> Option<Self> {
        if degrees % 90 != 0 {
            return None;
        }
        match degrees.rem_euclid(360) {
            0 => Some(Self::Deg0),
            90 => Some(Self::Deg90),
            180 => Some(Self::Deg180),
            270 => Some(Self::Deg270),
            _ => None,
        }
    }

    #[must_use]
    pub const fn degrees(self) -> i32 {
        match self {
            Self::Deg0 => 0,
            Self::Deg90 => 90,
            Self::Deg180 => 180,
            Self::Deg270 => 270,
        }
    }

    /// True when the rotated page has its width and height exchanged
    #[must_use]
    pub const fn swaps_axes(self) -> bool {
        matches!(self, Self::Deg90 | Self::Deg270)
    }
}

impl Add for Rotation {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        let total = self.degrees() + rhs.degrees();
        Self::from_degrees(total).unwrap_or_default()
    }
}

impl std::fmt::Display for Rotation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}°", self.degrees())
    }
}

/// Natural (unscaled) page geometry as reported by the rasterizer
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PageGeometry {
    /// Unrotated page size in points
    pub size: Size,
    /// Rotation the document itself applies to the page
    pub intrinsic_rotation: Rotation,
}

impl PageGeometry {
    #[must_use]
    pub const fn new(width: f32, height: f32) -> Self {
        Self {
            size: Size::new(width, height),
            intrinsic_rotation: Rotation::Deg0,
        }
    }
}

/// Raw rendered page image.
///
/// RGB pixel data, 3 bytes per pixel, rows packed without padding. The
/// surface is never mutated once produced; the engine shares it behind an
/// `Arc` between the cache and the visible frame.
#[derive(Clone, PartialEq, Eq)]
pub struct PixelSurface {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl PixelSurface {
    #[must_use]
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        Self {
            width,
            height,
            pixels,
        }
    }

    /// A surface filled with a single color
    #[must_use]
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let count = width as usize * height as usize;
        let mut pixels = Vec::with_capacity(count * 3);
        for _ in 0..count {
            pixels.extend_from_slice(&rgb);
        }
        Self::new(width, height, pixels)
    }

    #[must_use]
    pub fn pixel_count(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

impl std::fmt::Debug for PixelSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PixelSurface")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}

/// A run of text with its bounding box in unrotated page points
#[derive(Clone, Debug, PartialEq)]
pub struct TextRun {
    pub text: String,
    pub bbox: Rect,
}

/// Text geometry extracted from a page, before layout
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TextGeometry {
    /// Unrotated page size in points
    pub page_size: Size,
    pub runs: Vec<TextRun>,
}

/// Document properties reported by the rasterizer (title, author, ...)
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DocumentProperties(pub BTreeMap<String, String>);

impl DocumentProperties {
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotation_normalizes_degrees() {
        assert_eq!(Rotation::from_degrees(0), Some(Rotation::Deg0));
        assert_eq!(Rotation::from_degrees(450), Some(Rotation::Deg90));
        assert_eq!(Rotation::from_degrees(-90), Some(Rotation::Deg270));
        assert_eq!(Rotation::from_degrees(45), None);
    }

    #[test]
    fn rotation_composes() {
        assert_eq!(Rotation::Deg270 + Rotation::Deg180, Rotation::Deg90);
        assert_eq!(Rotation::Deg90 + Rotation::Deg270, Rotation::Deg0);
        assert!(Rotation::Deg270.swaps_axes());
        assert!(!Rotation::Deg180.swaps_axes());
    }

    #[test]
    fn filled_surface_has_rgb_layout() {
        let surface = PixelSurface::filled(4, 2, [1, 2, 3]);
        assert_eq!(surface.pixels.len(), 4 * 2 * 3);
        assert_eq!(&surface.pixels[3..6], &[1, 2, 3]);
        assert_eq!(surface.pixel_count(), 8);
    }
}
