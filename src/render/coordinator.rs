//! Render coordinator - owns the render state machine, cache and frame sink
//!
//! At most one render is in flight. Each render runs in two phases (raster,
//! then text layer) against the [`Rasterizer`]; every phase gets a fresh
//! [`RequestId`] and only a response carrying the awaited id is applied.
//! Requests arriving while a render is in flight cancel it and wait as a
//! single pending request, replaced by each newer one.

use std::sync::Arc;
use std::time::{Duration, Instant};

use flume::{Receiver, RecvTimeoutError, Sender};
use log::{debug, error, info, warn};

use super::cache::{CacheEntry, PageCache};
use super::config::RenderConfig;
use super::frame::{Frame, FrameListener, FrameSink};
use super::prerender::PrerenderPlanner;
use super::rasterizer::{RasterJob, Rasterizer, TextJob};
use super::request::{
    Cancellable, RenderError, RenderRequest, RenderResponse, RequestId, ZoomIntent, ZoomPhase,
};
use super::text_layer::TextOverlay;
use super::types::{
    DocumentProperties, PixelSurface, Point, Rotation, Size, TextGeometry,
};
use super::viewport::{
    Viewport, clamp_pan_2d, clamp_zoom, default_zoom_ratio, page_css_size, raster_scale,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Raster,
    TextLayer,
}

/// The render currently awaited
#[derive(Debug)]
struct InFlight {
    request: RenderRequest,
    phase: Phase,
    task: Cancellable,
    cancelled: bool,
    natural_size: Size,
    /// Host rotation plus the page's intrinsic rotation
    rotation: Rotation,
    css_size: Size,
    surface: Option<Arc<PixelSurface>>,
    shown: bool,
}

#[derive(Debug, Default)]
enum RenderState {
    #[default]
    Idle,
    Rendering {
        job: InFlight,
        pending: Option<RenderRequest>,
    },
}

/// Coordinates rendering for one viewing session
pub struct RenderCoordinator<R: Rasterizer> {
    rasterizer: R,
    sink: FrameSink,
    cache: PageCache,
    planner: PrerenderPlanner,
    config: RenderConfig,
    state: RenderState,
    next_request_id: u64,
    response_tx: Sender<RenderResponse>,
    response_rx: Receiver<RenderResponse>,
}

impl<R: Rasterizer> RenderCoordinator<R> {
    #[must_use]
    pub fn new(rasterizer: R, listener: Box<dyn FrameListener>, config: RenderConfig) -> Self {
        let (response_tx, response_rx) = flume::unbounded();

        Self {
            rasterizer,
            sink: FrameSink::new(listener, config.viewport.size),
            cache: PageCache::new(config.max_cached),
            planner: PrerenderPlanner::new(config.prerender, config.read_behind),
            config,
            state: RenderState::Idle,
            next_request_id: 1,
            response_tx,
            response_rx,
        }
    }

    /// Request a foreground render of `page` (1-based).
    ///
    /// Fire-and-forget: the frame arrives through [`FrameListener::on_frame_ready`],
    /// failures through [`FrameListener::on_render_error`].
    pub fn submit_render(
        &mut self,
        page: usize,
        zoom: ZoomIntent,
        rotation: Rotation,
        phase: ZoomPhase,
    ) {
        let Some(zoom_ratio) = self.resolve_zoom(page, zoom, rotation) else {
            return;
        };

        let request = RenderRequest {
            zoom_phase: phase,
            ..RenderRequest::foreground(page, zoom_ratio, rotation)
        };
        self.submit(request);
    }

    /// Mid-gesture zoom around `focus` (content coordinates)
    pub fn submit_live_zoom(&mut self, page: usize, zoom_ratio: f32, rotation: Rotation, focus: Point) {
        let zoom_ratio = clamp_zoom(zoom_ratio, self.config.min_zoom, self.config.max_zoom);
        self.submit(RenderRequest::live(page, zoom_ratio, rotation, focus));
    }

    /// Single entry point for host and read-ahead requests
    pub fn submit(&mut self, request: RenderRequest) {
        if let Err(error) = self.validate(&request) {
            warn!("Rejecting request for page {}: {error}", request.page);
            self.sink.report_error(request.page, &error);
            return;
        }

        let RenderState::Rendering { job, pending } = &mut self.state else {
            self.start(request);
            return;
        };

        if !request.is_foreground() {
            let foreground_busy = job.request.is_foreground() && !job.cancelled;
            let foreground_waiting = pending.as_ref().is_some_and(RenderRequest::is_foreground);
            if foreground_busy || foreground_waiting {
                debug!("Dropping prerender of page {} behind foreground work", request.page);
                return;
            }
        }

        // A pending request only exists behind a cancelled job, so there is
        // nothing to drop here
        if !job.cancelled && !request.is_live() && job.request.key() == request.key() {
            if request.is_foreground() && !job.request.is_foreground() {
                debug!("Upgrading in-flight prerender of {}", request.key());
                job.request = request;

                if let Some(surface) = job.surface.clone().filter(|_| !job.shown) {
                    job.shown = true;
                    let (request, css_size) = (job.request.clone(), job.css_size);
                    self.sink.show_pixels(&request, surface, css_size);
                }
            }
            return;
        }

        if !job.cancelled {
            debug!(
                "Cancelling {} (page {}) for page {}",
                job.task.id(),
                job.request.page,
                request.page
            );
            job.task.cancel();
            job.cancelled = true;
        }

        if let Some(superseded) = pending.replace(request) {
            debug!("Coalesced away request for page {}", superseded.page);
        }
    }

    /// Apply every response delivered so far. Returns how many were handled.
    pub fn poll(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(response) = self.response_rx.try_recv() {
            self.handle_response(response);
            handled += 1;
        }
        handled
    }

    /// Block until the coordinator is idle (read-ahead included) or `timeout`
    /// elapses. Returns true when idle.
    pub fn run_until_idle(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;

        loop {
            self.poll();
            if self.is_idle() {
                return true;
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }

            match self.response_rx.recv_timeout(remaining) {
                Ok(response) => self.handle_response(response),
                Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => {
                    return self.is_idle();
                }
            }
        }
    }

    /// Apply one response from the rasterizer
    pub fn handle_response(&mut self, response: RenderResponse) {
        let id = response.id();
        let RenderState::Rendering { job, .. } = &self.state else {
            debug!("Discarding stale response {id}, nothing in flight");
            return;
        };

        let expected = match job.phase {
            Phase::Raster => matches!(response, RenderResponse::Raster { .. }),
            Phase::TextLayer => matches!(response, RenderResponse::TextLayer { .. }),
        };
        if job.task.id() != id || !expected {
            debug!("Discarding stale response {id}, awaiting {}", job.task.id());
            return;
        }

        if job.cancelled {
            debug!("Cancellation of {id} acknowledged");
            self.settle(None);
            return;
        }

        let page = job.request.page;
        match response {
            RenderResponse::Raster {
                result: Ok(surface),
                ..
            } => self.on_raster(surface),

            RenderResponse::TextLayer {
                result: Ok(geometry),
                ..
            } => self.on_text_layer(Some(geometry)),

            RenderResponse::Raster {
                result: Err(error), ..
            } => {
                if error.is_cancelled() {
                    debug!("Raster {id} cancelled by the rasterizer");
                } else {
                    error!("Rendering page {page} failed: {error}");
                    self.sink.report_error(page, &error);
                }
                self.settle(None);
            }

            RenderResponse::TextLayer {
                result: Err(error), ..
            } => {
                if error.is_cancelled() {
                    debug!("Text layer {id} cancelled by the rasterizer");
                    self.settle(None);
                } else {
                    warn!("Text layer unavailable for page {page}: {error}");
                    self.on_text_layer(None);
                }
            }
        }
    }

    fn start(&mut self, request: RenderRequest) {
        if request.is_live() {
            self.sink.live_zoom(&request);
            return;
        }

        let key = request.key();
        if let Some(entry) = self.cache.lookup(&key) {
            debug!("Cache hit for {key}");
            if request.is_foreground() {
                self.sink.show_entry(&request, &entry);
            }
            self.plan_after(&request);
            return;
        }

        let geometry = match self.rasterizer.page_geometry(request.page) {
            Ok(geometry) => geometry,
            Err(error) => {
                error!("Loading page {} failed: {error}", request.page);
                self.sink.report_error(request.page, &error);
                return;
            }
        };

        let rotation = request.rotation + geometry.intrinsic_rotation;
        let css_size = page_css_size(geometry.size, request.zoom_ratio, rotation);
        let density = raster_scale(
            css_size,
            request.zoom_ratio,
            self.config.viewport.device_pixel_ratio,
            self.config.max_render_pixels,
        );
        if density.downscaled {
            warn!(
                "Page {} at zoom {} exceeds {} pixels, rasterizing at scale {}",
                request.page, request.zoom_ratio, self.config.max_render_pixels, density.scale
            );
        }

        let id = self.next_id();
        let job = RasterJob::new(
            id,
            request.page,
            density.scale,
            rotation,
            self.response_tx.clone(),
        );
        let task = self.rasterizer.render_raster(job);
        debug!("Rendering {key} as {id} ({:?})", request.intent);

        self.state = RenderState::Rendering {
            job: InFlight {
                request,
                phase: Phase::Raster,
                task,
                cancelled: false,
                natural_size: geometry.size,
                rotation,
                css_size,
                surface: None,
                shown: false,
            },
            pending: None,
        };
    }

    fn on_raster(&mut self, surface: PixelSurface) {
        let id = self.next_id();
        let RenderState::Rendering { mut job, pending } = std::mem::take(&mut self.state) else {
            return;
        };

        let surface = Arc::new(surface);
        if job.request.is_foreground() {
            self.sink
                .show_pixels(&job.request, surface.clone(), job.css_size);
            job.shown = true;
        }

        let text = TextJob::new(id, job.request.page, self.response_tx.clone());
        job.task = self.rasterizer.render_text_layer(text);
        job.phase = Phase::TextLayer;
        job.surface = Some(surface);
        debug!("Raster of page {} done, text layer as {id}", job.request.page);

        self.state = RenderState::Rendering { job, pending };
    }

    fn on_text_layer(&mut self, geometry: Option<TextGeometry>) {
        let RenderState::Rendering { job, pending } = std::mem::take(&mut self.state) else {
            return;
        };
        let Some(surface) = job.surface else {
            debug!("Text layer of page {} arrived without pixels", job.request.page);
            self.drain(pending, None);
            return;
        };

        let overlay = geometry.map(|g| {
            Arc::new(TextOverlay::layout(&g, job.request.zoom_ratio, job.rotation))
        });
        let degraded = overlay.is_none();

        let entry = self.cache.insert(CacheEntry {
            key: job.request.key(),
            surface,
            overlay,
            natural_size: job.natural_size,
            css_size: job.css_size,
        });

        // Pixels without a text layer are already on screen
        if job.request.is_foreground() && !(degraded && job.shown) {
            self.sink.show_entry(&job.request, &entry);
        }

        self.drain(pending, Some(job.request));
    }

    /// Leave `Rendering` without a result
    fn settle(&mut self, completed: Option<RenderRequest>) {
        let pending = match std::mem::take(&mut self.state) {
            RenderState::Rendering { pending, .. } => pending,
            RenderState::Idle => None,
        };
        self.drain(pending, completed);
    }

    /// Newer user intent beats read-ahead
    fn drain(&mut self, pending: Option<RenderRequest>, completed: Option<RenderRequest>) {
        match (pending, completed) {
            (Some(next), _) => self.submit(next),
            (None, Some(done)) => self.plan_after(&done),
            (None, None) => {}
        }
    }

    fn plan_after(&mut self, completed: &RenderRequest) {
        if let Some(next) = self.planner.plan(completed, self.rasterizer.page_count()) {
            debug!("Prerendering page {} after page {}", next.page, completed.page);
            self.submit(next);
        }
    }

    fn validate(&self, request: &RenderRequest) -> Result<(), RenderError> {
        let page_count = self.rasterizer.page_count();
        if request.page == 0 || request.page > page_count {
            return Err(RenderError::PageOutOfRange {
                page: request.page,
                page_count,
            });
        }
        if !request.zoom_ratio.is_finite() || request.zoom_ratio <= 0.0 {
            return Err(RenderError::InvalidZoom {
                zoom: request.zoom_ratio,
            });
        }
        Ok(())
    }

    fn resolve_zoom(&mut self, page: usize, zoom: ZoomIntent, rotation: Rotation) -> Option<f32> {
        match zoom {
            ZoomIntent::Ratio(ratio) => {
                Some(clamp_zoom(ratio, self.config.min_zoom, self.config.max_zoom))
            }
            ZoomIntent::Fit => {
                let page_count = self.rasterizer.page_count();
                let geometry = if page == 0 || page > page_count {
                    Err(RenderError::PageOutOfRange { page, page_count })
                } else {
                    self.rasterizer.page_geometry(page)
                };

                match geometry {
                    Ok(geometry) => {
                        let zoom = default_zoom_ratio(
                            geometry.size,
                            rotation + geometry.intrinsic_rotation,
                            self.config.viewport.size,
                            self.config.min_zoom,
                            self.config.max_zoom,
                        );
                        info!("Fit zoom for page {page} resolved to {zoom}");
                        self.sink.zoom_resolved(page, zoom);
                        Some(zoom)
                    }
                    Err(error) => {
                        warn!("Cannot fit page {page}: {error}");
                        self.sink.report_error(page, &error);
                        None
                    }
                }
            }
        }
    }

    /// Cancel in-flight work, drop the pending request and clear the cache
    pub fn reset_session(&mut self) {
        if let RenderState::Rendering { job, pending } = std::mem::take(&mut self.state) {
            debug!(
                "Reset cancels {} (page {}), drops pending {:?}",
                job.task.id(),
                job.request.page,
                pending.map(|p| p.page)
            );
            job.task.cancel();
        }

        let stale = self.response_rx.drain().count();
        if stale > 0 {
            debug!("Reset discarded {stale} undelivered responses");
        }

        self.cache.clear();
        self.sink.clear();
    }

    /// Switch to a new document, returning the previous rasterizer
    pub fn load_document(&mut self, rasterizer: R) -> R {
        self.reset_session();
        info!("Loaded document with {} pages", rasterizer.page_count());
        std::mem::replace(&mut self.rasterizer, rasterizer)
    }

    /// Change the visible area; cached pages stay valid
    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.config.viewport = viewport;
        self.sink.set_viewport(viewport.size);
    }

    /// Bound a scroll offset for the frame on screen
    #[must_use]
    pub fn clamp_scroll(&self, offset: Point) -> Point {
        match self.sink.current() {
            Some(frame) => clamp_pan_2d(
                offset,
                frame.css_size,
                self.config.viewport.size,
                self.config.pan_padding,
            ),
            None => offset,
        }
    }

    pub fn document_properties(&mut self) -> Result<DocumentProperties, RenderError> {
        self.rasterizer.metadata()
    }

    #[must_use]
    pub fn page_count(&self) -> usize {
        self.rasterizer.page_count()
    }

    #[must_use]
    pub fn is_idle(&self) -> bool {
        matches!(self.state, RenderState::Idle)
    }

    /// Request being rendered, if any
    #[must_use]
    pub fn in_flight(&self) -> Option<&RenderRequest> {
        match &self.state {
            RenderState::Rendering { job, .. } => Some(&job.request),
            RenderState::Idle => None,
        }
    }

    /// Request waiting for the in-flight render to wind down
    #[must_use]
    pub fn pending(&self) -> Option<&RenderRequest> {
        match &self.state {
            RenderState::Rendering { pending, .. } => pending.as_ref(),
            RenderState::Idle => None,
        }
    }

    #[must_use]
    pub fn cache(&self) -> &PageCache {
        &self.cache
    }

    #[must_use]
    pub fn current_frame(&self) -> Option<&Frame> {
        self.sink.current()
    }

    #[must_use]
    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    #[must_use]
    pub fn rasterizer(&self) -> &R {
        &self.rasterizer
    }

    pub fn rasterizer_mut(&mut self) -> &mut R {
        &mut self.rasterizer
    }

    fn next_id(&mut self) -> RequestId {
        let id = RequestId::new(self.next_request_id);
        self.next_request_id += 1;
        id
    }
}

impl<R: Rasterizer> Drop for RenderCoordinator<R> {
    fn drop(&mut self) {
        if let RenderState::Rendering { job, .. } = &self.state {
            job.task.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::test_helpers::{ScriptedRasterizer, scripted_session};

    #[test]
    fn text_layer_without_pixels_still_drains_pending() {
        let config = RenderConfig {
            prerender: false,
            ..RenderConfig::default()
        };
        let (mut coordinator, listener) = scripted_session(ScriptedRasterizer::new(5), config);
        coordinator.submit_render(1, ZoomIntent::Ratio(1.0), Rotation::Deg0, ZoomPhase::Committed);

        let RenderState::Rendering { job, pending } = &mut coordinator.state else {
            panic!("expected a render in flight");
        };
        job.phase = Phase::TextLayer;
        *pending = Some(RenderRequest::foreground(3, 1.0, Rotation::Deg0));

        coordinator.on_text_layer(None);

        assert_eq!(coordinator.in_flight().map(|r| r.page), Some(3));
        assert_eq!(coordinator.rasterizer().raster_pages(), vec![1, 3]);
        assert!(listener.frames().is_empty());
        assert!(coordinator.cache().is_empty());
    }
}
