//! Visible surface management
//!
//! The sink owns the single frame currently on screen and is the only place
//! that talks to the host about pixels. Every update builds a new [`Frame`]
//! value and swaps it in; frames are never edited in place.

use std::sync::Arc;

use log::{debug, trace};

use super::cache::CacheEntry;
use super::request::{RenderError, RenderRequest};
use super::text_layer::TextOverlay;
use super::types::{PixelSurface, Point, Rotation, Size};
use super::viewport::{overlay_offset, zoom_focus_scroll};

/// What the host composites on screen
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    /// Page number (1-based)
    pub page: usize,
    pub zoom_ratio: f32,
    pub rotation: Rotation,
    pub surface: Arc<PixelSurface>,
    /// Absent while the text layer is pending, or when it failed
    pub overlay: Option<Arc<TextOverlay>>,
    /// Display size of the surface in CSS pixels
    pub css_size: Size,
    /// Translation applied to the overlay
    pub overlay_offset: Point,
    /// The host should scroll back to the origin (page or rotation changed)
    pub reset_scroll: bool,
}

/// Mid-gesture zoom applied to the current frame
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LiveZoom {
    pub page: usize,
    pub zoom_ratio: f32,
    /// Stretched display size of the current surface
    pub css_size: Size,
    /// Scroll delta that keeps the pinch focus stationary
    pub scroll_by: Point,
}

/// Host callbacks
pub trait FrameListener {
    /// A new frame should be shown
    fn on_frame_ready(&mut self, frame: &Frame);

    /// A render failed for a reason other than cancellation
    fn on_render_error(&mut self, page: usize, error: &RenderError);

    /// The display surface changes size; always precedes the first frame at a new zoom
    fn on_surface_resize(&mut self, _css_size: Size) {}

    /// The current frame is being stretched during a gesture; text overlay is hidden
    fn on_live_zoom(&mut self, _zoom: &LiveZoom) {}

    /// A fit-to-screen request resolved to a concrete zoom ratio
    fn on_zoom_resolved(&mut self, _page: usize, _zoom_ratio: f32) {}
}

/// Applies render results to the visible surface
pub struct FrameSink {
    listener: Box<dyn FrameListener>,
    current: Option<Frame>,
    surface_zoom: Option<f32>,
    viewport: Size,
}

impl FrameSink {
    #[must_use]
    pub fn new(listener: Box<dyn FrameListener>, viewport: Size) -> Self {
        Self {
            listener,
            current: None,
            surface_zoom: None,
            viewport,
        }
    }

    /// Frame currently on screen
    #[must_use]
    pub fn current(&self) -> Option<&Frame> {
        self.current.as_ref()
    }

    pub fn set_viewport(&mut self, viewport: Size) {
        self.viewport = viewport;
    }

    /// Show freshly rasterized pixels before the text layer exists
    pub fn show_pixels(&mut self, request: &RenderRequest, surface: Arc<PixelSurface>, css_size: Size) {
        self.present(request, surface, None, css_size);
    }

    /// Show a complete render
    pub fn show_entry(&mut self, request: &RenderRequest, entry: &CacheEntry) {
        self.present(
            request,
            entry.surface.clone(),
            entry.overlay.clone(),
            entry.css_size,
        );
    }

    fn present(
        &mut self,
        request: &RenderRequest,
        surface: Arc<PixelSurface>,
        overlay: Option<Arc<TextOverlay>>,
        css_size: Size,
    ) {
        if self.surface_zoom != Some(request.zoom_ratio) {
            debug!(
                "Resizing surface to {}x{} for zoom {}",
                css_size.width, css_size.height, request.zoom_ratio
            );
            self.listener.on_surface_resize(css_size);
            self.surface_zoom = Some(request.zoom_ratio);
        }

        let reset_scroll = self
            .current
            .as_ref()
            .is_none_or(|c| c.page != request.page || c.rotation != request.rotation);

        let frame = Frame {
            page: request.page,
            zoom_ratio: request.zoom_ratio,
            rotation: request.rotation,
            surface,
            overlay,
            css_size,
            overlay_offset: overlay_offset(css_size, self.viewport),
            reset_scroll,
        };

        trace!("Presenting page {} (overlay: {})", frame.page, frame.overlay.is_some());
        self.listener.on_frame_ready(&frame);
        self.current = Some(frame);
    }

    /// Stretch the current frame to a mid-gesture zoom.
    ///
    /// Returns false when nothing of the requested page is on screen.
    pub fn live_zoom(&mut self, request: &RenderRequest) -> bool {
        let Some(current) = self.current.as_ref().filter(|c| c.page == request.page) else {
            debug!("Live zoom for page {} with nothing to stretch", request.page);
            return false;
        };

        let factor = request.zoom_ratio / current.zoom_ratio;
        if !factor.is_finite() {
            return false;
        }

        let css_size = current.css_size.scaled(factor);
        let scroll_by = request
            .focus
            .map(|focus| zoom_focus_scroll(focus, current.zoom_ratio, request.zoom_ratio))
            .unwrap_or_default();

        let frame = Frame {
            zoom_ratio: request.zoom_ratio,
            overlay: None,
            css_size,
            overlay_offset: overlay_offset(css_size, self.viewport),
            reset_scroll: false,
            ..current.clone()
        };

        self.listener.on_surface_resize(css_size);
        self.surface_zoom = Some(request.zoom_ratio);
        self.listener.on_live_zoom(&LiveZoom {
            page: request.page,
            zoom_ratio: request.zoom_ratio,
            css_size,
            scroll_by,
        });
        self.current = Some(frame);
        true
    }

    pub fn report_error(&mut self, page: usize, error: &RenderError) {
        self.listener.on_render_error(page, error);
    }

    pub fn zoom_resolved(&mut self, page: usize, zoom_ratio: f32) {
        self.listener.on_zoom_resolved(page, zoom_ratio);
    }

    /// Forget the on-screen frame
    pub fn clear(&mut self) {
        self.current = None;
        self.surface_zoom = None;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct Log {
        frames: Vec<Frame>,
        resizes: Vec<Size>,
        live: Vec<LiveZoom>,
    }

    struct Shared(Arc<Mutex<Log>>);

    impl FrameListener for Shared {
        fn on_frame_ready(&mut self, frame: &Frame) {
            self.0.lock().unwrap().frames.push(frame.clone());
        }

        fn on_render_error(&mut self, _page: usize, _error: &RenderError) {}

        fn on_surface_resize(&mut self, css_size: Size) {
            self.0.lock().unwrap().resizes.push(css_size);
        }

        fn on_live_zoom(&mut self, zoom: &LiveZoom) {
            self.0.lock().unwrap().live.push(*zoom);
        }
    }

    fn sink() -> (FrameSink, Arc<Mutex<Log>>) {
        let log = Arc::new(Mutex::new(Log::default()));
        let sink = FrameSink::new(Box::new(Shared(log.clone())), Size::new(500.0, 500.0));
        (sink, log)
    }

    fn surface() -> Arc<PixelSurface> {
        Arc::new(PixelSurface::filled(1, 1, [0, 0, 0]))
    }

    #[test]
    fn resize_precedes_first_frame_and_zoom_changes_only() {
        let (mut sink, log) = sink();
        let req = RenderRequest::foreground(1, 1.0, Rotation::Deg0);

        sink.show_pixels(&req, surface(), Size::new(400.0, 600.0));
        sink.show_pixels(&req, surface(), Size::new(400.0, 600.0));
        let zoomed = RenderRequest::foreground(1, 1.5, Rotation::Deg0);
        sink.show_pixels(&zoomed, surface(), Size::new(600.0, 900.0));

        let log = log.lock().unwrap();
        assert_eq!(log.resizes, vec![Size::new(400.0, 600.0), Size::new(600.0, 900.0)]);
        assert_eq!(log.frames.len(), 3);
        assert_eq!(log.frames[2].overlay_offset, Point::new(50.0, 200.0));
    }

    #[test]
    fn scroll_resets_on_navigation_not_on_zoom() {
        let (mut sink, log) = sink();
        let css = Size::new(100.0, 100.0);
        sink.show_pixels(&RenderRequest::foreground(1, 1.0, Rotation::Deg0), surface(), css);
        sink.show_pixels(&RenderRequest::foreground(1, 1.2, Rotation::Deg0), surface(), css);
        sink.show_pixels(&RenderRequest::foreground(2, 1.2, Rotation::Deg0), surface(), css);
        sink.show_pixels(&RenderRequest::foreground(2, 1.2, Rotation::Deg90), surface(), css);

        let resets: Vec<bool> = log.lock().unwrap().frames.iter().map(|f| f.reset_scroll).collect();
        assert_eq!(resets, vec![true, false, true, true]);
    }

    #[test]
    fn live_zoom_stretches_current_frame() {
        let (mut sink, log) = sink();
        sink.show_pixels(
            &RenderRequest::foreground(3, 1.0, Rotation::Deg0),
            surface(),
            Size::new(200.0, 400.0),
        );

        let live = RenderRequest::live(3, 1.5, Rotation::Deg0, Point::new(100.0, 200.0));
        assert!(sink.live_zoom(&live));

        let current = sink.current().expect("frame");
        assert_eq!(current.css_size, Size::new(300.0, 600.0));
        assert!(current.overlay.is_none());

        let log = log.lock().unwrap();
        assert_eq!(log.live[0].scroll_by, Point::new(50.0, 100.0));
        assert_eq!(log.frames.len(), 1);
    }

    #[test]
    fn live_zoom_without_frame_is_ignored() {
        let (mut sink, _log) = sink();
        let live = RenderRequest::live(1, 1.5, Rotation::Deg0, Point::default());
        assert!(!sink.live_zoom(&live));
    }
}
