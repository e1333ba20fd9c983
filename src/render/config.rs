//! Engine configuration

use super::cache::DEFAULT_MAX_CACHED;
use super::viewport::{MAX_RENDER_PIXELS, MAX_ZOOM, MIN_ZOOM, PAN_PADDING, Viewport};

/// Tunables for a render session
#[derive(Clone, Debug, PartialEq)]
pub struct RenderConfig {
    /// Upper bound on cached rendered pages
    pub max_cached: usize,
    pub min_zoom: f32,
    pub max_zoom: f32,
    /// Raster pixel ceiling; denser renders are downscaled
    pub max_render_pixels: u64,
    /// How far content may be dragged past an edge
    pub pan_padding: f32,
    /// Render a neighbouring page after each foreground render
    pub prerender: bool,
    /// Also read one page behind after the look-ahead completes
    pub read_behind: bool,
    pub viewport: Viewport,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            max_cached: DEFAULT_MAX_CACHED,
            min_zoom: MIN_ZOOM,
            max_zoom: MAX_ZOOM,
            max_render_pixels: MAX_RENDER_PIXELS,
            pan_padding: PAN_PADDING,
            prerender: true,
            read_behind: true,
            viewport: Viewport::default(),
        }
    }
}
