//! Viewport and zoom arithmetic
//!
//! Pure functions for fit-to-screen zoom, zoom-focus scroll compensation,
//! pan clamping and raster density. Sizes are CSS pixels unless noted.

use super::types::{Point, Rotation, Size};

/// Default lower zoom bound
pub const MIN_ZOOM: f32 = 0.5;
/// Default upper zoom bound
pub const MAX_ZOOM: f32 = 1.5;
/// Default raster pixel ceiling
pub const MAX_RENDER_PIXELS: u64 = 4096 * 4096;
/// Default slack allowed past a content edge while panning
pub const PAN_PADDING: f32 = 10.0;

/// Visible area and its pixel density
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    pub size: Size,
    /// Device pixels per CSS pixel
    pub device_pixel_ratio: f32,
}

impl Viewport {
    #[must_use]
    pub const fn new(width: f32, height: f32, device_pixel_ratio: f32) -> Self {
        Self {
            size: Size::new(width, height),
            device_pixel_ratio,
        }
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new(1080.0, 1920.0, 1.0)
    }
}

/// Clamp zoom to `[min_zoom, max_zoom]`, mapping NaN/Inf to `min_zoom`
#[must_use]
pub fn clamp_zoom(zoom: f32, min_zoom: f32, max_zoom: f32) -> f32 {
    if !zoom.is_finite() {
        return min_zoom;
    }
    zoom.min(max_zoom).max(min_zoom)
}

/// On-screen size of a page at `zoom`, after rotation
#[must_use]
pub fn page_css_size(natural: Size, zoom: f32, rotation: Rotation) -> Size {
    let scaled = natural.scaled(zoom);
    if rotation.swaps_axes() {
        scaled.transposed()
    } else {
        scaled
    }
}

/// Zoom ratio that fits the rotated page into the viewport
#[must_use]
pub fn default_zoom_ratio(
    natural: Size,
    rotation: Rotation,
    viewport: Size,
    min_zoom: f32,
    max_zoom: f32,
) -> f32 {
    let page = page_css_size(natural, 1.0, rotation);
    let fit = (viewport.width / page.width).min(viewport.height / page.height);
    clamp_zoom(fit, min_zoom, max_zoom)
}

/// Scroll delta that keeps `focal` visually fixed when zoom changes from
/// `old_zoom` to `new_zoom`
#[must_use]
pub fn zoom_focus_scroll(focal: Point, old_zoom: f32, new_zoom: f32) -> Point {
    let factor = new_zoom / old_zoom;
    if !factor.is_finite() {
        return Point::default();
    }
    let translation = factor - 1.0;
    Point::new(focal.x * translation, focal.y * translation)
}

/// Clamp the content origin along one axis.
///
/// `offset` is where the content's leading edge sits in viewport
/// coordinates. Content larger than the viewport may be dragged at most
/// `padding` past either edge; smaller content is centered.
#[must_use]
pub fn clamp_pan(offset: f32, content: f32, viewport: f32, padding: f32) -> f32 {
    if content > viewport {
        offset.clamp(viewport - content - padding, padding)
    } else {
        (viewport - content) / 2.0
    }
}

#[must_use]
pub fn clamp_pan_2d(offset: Point, content: Size, viewport: Size, padding: f32) -> Point {
    Point::new(
        clamp_pan(offset.x, content.width, viewport.width, padding),
        clamp_pan(offset.y, content.height, viewport.height, padding),
    )
}

/// Translation that keeps the text overlay aligned with a page that
/// overflows the viewport
#[must_use]
pub fn overlay_offset(page: Size, viewport: Size) -> Point {
    Point::new(
        (page.width - viewport.width).max(0.0) / 2.0,
        (page.height - viewport.height).max(0.0) / 2.0,
    )
}

/// Raster density chosen for a page
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RasterScale {
    /// Device pixels per page point
    pub scale: f32,
    /// True when the pixel ceiling lowered the density
    pub downscaled: bool,
}

/// Raster density for a page shown at `css` size.
///
/// Full density is `zoom * device_pixel_ratio`. When that would exceed
/// `max_render_pixels`, density drops by `sqrt(max / pixels)`; the CSS size
/// stays the same, so only sharpness is lost.
#[must_use]
pub fn raster_scale(css: Size, zoom: f32, device_pixel_ratio: f32, max_render_pixels: u64) -> RasterScale {
    let full = zoom * device_pixel_ratio;
    let pixels = f64::from(css.width * device_pixel_ratio) * f64::from(css.height * device_pixel_ratio);
    let max = max_render_pixels as f64;

    if pixels > max && max > 0.0 {
        let adjust = (max / pixels).sqrt() as f32;
        RasterScale {
            scale: full * adjust,
            downscaled: true,
        }
    } else {
        RasterScale {
            scale: full,
            downscaled: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zoom_focus_keeps_focal_point_fixed() {
        let d = zoom_focus_scroll(Point::new(100.0, 200.0), 1.0, 1.5);
        assert_eq!(d, Point::new(50.0, 100.0));
    }

    #[test]
    fn zoom_focus_out_scrolls_back() {
        let d = zoom_focus_scroll(Point::new(100.0, 200.0), 1.0, 0.5);
        assert_eq!(d, Point::new(-50.0, -100.0));
    }

    #[test]
    fn zoom_focus_ignores_degenerate_zoom() {
        assert_eq!(zoom_focus_scroll(Point::new(1.0, 1.0), 0.0, 1.0), Point::default());
    }

    #[test]
    fn default_zoom_is_clamped() {
        let zoom = default_zoom_ratio(
            Size::new(1000.0, 1000.0),
            Rotation::Deg0,
            Size::new(500.0, 800.0),
            0.5,
            1.5,
        );
        assert_eq!(zoom, 0.5);
    }

    #[test]
    fn default_zoom_swaps_dimensions_when_rotated() {
        let natural = Size::new(600.0, 1000.0);
        let viewport = Size::new(1000.0, 600.0);
        assert_eq!(default_zoom_ratio(natural, Rotation::Deg0, viewport, 0.1, 5.0), 0.6);
        assert_eq!(default_zoom_ratio(natural, Rotation::Deg90, viewport, 0.1, 5.0), 1.0);
    }

    #[test]
    fn default_zoom_respects_upper_bound() {
        let zoom = default_zoom_ratio(
            Size::new(100.0, 100.0),
            Rotation::Deg0,
            Size::new(1000.0, 1000.0),
            0.5,
            1.5,
        );
        assert_eq!(zoom, 1.5);
    }

    #[test]
    fn clamp_zoom_handles_non_finite() {
        assert_eq!(clamp_zoom(f32::NAN, 0.5, 1.5), 0.5);
        assert_eq!(clamp_zoom(f32::INFINITY, 0.5, 1.5), 0.5);
        assert_eq!(clamp_zoom(1.2, 0.5, 1.5), 1.2);
    }

    #[test]
    fn pan_is_bounded_for_large_content() {
        assert_eq!(clamp_pan(50.0, 1000.0, 400.0, 10.0), 10.0);
        assert_eq!(clamp_pan(-900.0, 1000.0, 400.0, 10.0), -610.0);
        assert_eq!(clamp_pan(-300.0, 1000.0, 400.0, 10.0), -300.0);
    }

    #[test]
    fn pan_centers_small_content() {
        assert_eq!(clamp_pan(-300.0, 200.0, 400.0, 10.0), 100.0);
        let p = clamp_pan_2d(
            Point::new(0.0, -5000.0),
            Size::new(200.0, 2000.0),
            Size::new(400.0, 800.0),
            10.0,
        );
        assert_eq!(p, Point::new(100.0, -1210.0));
    }

    #[test]
    fn overlay_offset_only_for_overflow() {
        let offset = overlay_offset(Size::new(1200.0, 500.0), Size::new(1000.0, 800.0));
        assert_eq!(offset, Point::new(100.0, 0.0));
    }

    #[test]
    fn raster_scale_downscales_above_ceiling() {
        let css = Size::new(1000.0, 1000.0);
        let full = raster_scale(css, 1.0, 2.0, 4_000_000);
        assert_eq!(full, RasterScale { scale: 2.0, downscaled: false });

        let reduced = raster_scale(css, 1.0, 2.0, 1_000_000);
        assert!(reduced.downscaled);
        assert!((reduced.scale - 1.0).abs() < 1e-6);
    }

    #[test]
    fn css_size_rotates() {
        let natural = Size::new(100.0, 200.0);
        assert_eq!(page_css_size(natural, 2.0, Rotation::Deg270), Size::new(400.0, 200.0));
        assert_eq!(page_css_size(natural, 2.0, Rotation::Deg180), Size::new(200.0, 400.0));
    }
}
