//! Render request, response and error types

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use super::cache::CacheKey;
use super::types::{PixelSurface, Point, Rotation, TextGeometry};

/// Unique identifier for one phase of one render.
///
/// Ids increase monotonically over the lifetime of a coordinator, across
/// session resets, so a late response can always be told apart from the
/// phase currently awaited.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestId(pub u64);

impl RequestId {
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Why a page is being rendered
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Intent {
    /// Triggered by user navigation or zoom, shown as soon as ready
    Foreground,
    /// Speculative read-ahead, never shown unless upgraded
    Prerender,
}

/// Whether the zoom ratio is final or mid-gesture
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ZoomPhase {
    Committed,
    /// Issued during a pinch; never rasterized or cached
    Live,
}

/// Zoom requested by the host
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ZoomIntent {
    /// Fit the rotated page into the viewport
    Fit,
    Ratio(f32),
}

/// An immutable render request
#[derive(Clone, Debug, PartialEq)]
pub struct RenderRequest {
    /// Page number (1-based)
    pub page: usize,
    pub zoom_ratio: f32,
    /// Host orientation; the page's intrinsic rotation is added on top
    pub rotation: Rotation,
    pub intent: Intent,
    pub zoom_phase: ZoomPhase,
    /// Pinch focal point in content coordinates (live requests)
    pub focus: Option<Point>,
    /// Foreground page that caused this prerender
    pub trigger: Option<usize>,
}

impl RenderRequest {
    #[must_use]
    pub fn foreground(page: usize, zoom_ratio: f32, rotation: Rotation) -> Self {
        Self {
            page,
            zoom_ratio,
            rotation,
            intent: Intent::Foreground,
            zoom_phase: ZoomPhase::Committed,
            focus: None,
            trigger: None,
        }
    }

    #[must_use]
    pub fn prerender(page: usize, zoom_ratio: f32, rotation: Rotation, trigger: usize) -> Self {
        Self {
            intent: Intent::Prerender,
            trigger: Some(trigger),
            ..Self::foreground(page, zoom_ratio, rotation)
        }
    }

    #[must_use]
    pub fn live(page: usize, zoom_ratio: f32, rotation: Rotation, focus: Point) -> Self {
        Self {
            zoom_phase: ZoomPhase::Live,
            focus: Some(focus),
            ..Self::foreground(page, zoom_ratio, rotation)
        }
    }

    #[must_use]
    pub fn key(&self) -> CacheKey {
        CacheKey::new(self.page, self.zoom_ratio, self.rotation)
    }

    #[must_use]
    pub fn is_foreground(&self) -> bool {
        self.intent == Intent::Foreground
    }

    #[must_use]
    pub fn is_live(&self) -> bool {
        self.zoom_phase == ZoomPhase::Live
    }
}

/// Errors from rendering
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RenderError {
    #[error("page {page}: rasterization failed: {detail}")]
    RasterFailure { page: usize, detail: String },

    #[error("page {page}: text extraction failed: {detail}")]
    TextLayerFailure { page: usize, detail: String },

    #[error("render cancelled")]
    Cancelled,

    #[error("page {page} out of range (document has {page_count} pages)")]
    PageOutOfRange { page: usize, page_count: usize },

    #[error("invalid zoom ratio {zoom}")]
    InvalidZoom { zoom: f32 },

    #[error("{0}")]
    Backend(String),
}

impl RenderError {
    pub fn raster(page: usize, detail: impl Into<String>) -> Self {
        Self::RasterFailure {
            page,
            detail: detail.into(),
        }
    }

    pub fn text_layer(page: usize, detail: impl Into<String>) -> Self {
        Self::TextLayerFailure {
            page,
            detail: detail.into(),
        }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Cooperative cancellation flag shared between the coordinator and a job
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Handle to an operation submitted to the rasterizer.
///
/// The result itself arrives as a [`RenderResponse`] carrying the same
/// [`RequestId`]. `cancel` may be called any number of times, before or after
/// the operation completes.
#[derive(Debug)]
pub struct Cancellable {
    id: RequestId,
    token: CancelToken,
}

impl Cancellable {
    #[must_use]
    pub fn new(id: RequestId, token: CancelToken) -> Self {
        Self { id, token }
    }

    #[must_use]
    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Response delivered by the rasterizer on the coordinator's channel
#[derive(Debug)]
pub enum RenderResponse {
    /// Phase A finished
    Raster {
        id: RequestId,
        result: Result<PixelSurface, RenderError>,
    },

    /// Phase B finished
    TextLayer {
        id: RequestId,
        result: Result<TextGeometry, RenderError>,
    },
}

impl RenderResponse {
    #[must_use]
    pub fn id(&self) -> RequestId {
        match self {
            Self::Raster { id, .. } | Self::TextLayer { id, .. } => *id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_is_idempotent_and_shared() {
        let token = CancelToken::new();
        let handle = Cancellable::new(RequestId::new(7), token.clone());

        assert!(!token.is_cancelled());
        handle.cancel();
        handle.cancel();
        assert!(token.is_cancelled());
        assert!(handle.is_cancelled());
        assert_eq!(handle.id(), RequestId::new(7));
    }

    #[test]
    fn prerender_carries_trigger() {
        let req = RenderRequest::prerender(3, 1.0, Rotation::Deg0, 2);
        assert_eq!(req.intent, Intent::Prerender);
        assert_eq!(req.trigger, Some(2));
        assert_eq!(req.zoom_phase, ZoomPhase::Committed);
        assert_eq!(req.key(), RenderRequest::foreground(3, 1.0, Rotation::Deg0).key());
    }
}
