//! Page render coordination and caching

#[cfg(feature = "pdf")]
pub mod backend;
mod cache;
mod config;
mod coordinator;
mod frame;
mod prerender;
mod rasterizer;
mod request;
mod text_layer;
mod types;
pub mod viewport;

pub use cache::{CacheEntry, CacheKey, DEFAULT_MAX_CACHED, PageCache};
pub use config::RenderConfig;
pub use coordinator::RenderCoordinator;
pub use frame::{Frame, FrameListener, FrameSink, LiveZoom};
pub use prerender::PrerenderPlanner;
pub use rasterizer::{RasterJob, Rasterizer, TextJob};
pub use request::{
    CancelToken, Cancellable, Intent, RenderError, RenderRequest, RenderResponse, RequestId,
    ZoomIntent, ZoomPhase,
};
pub use text_layer::{TextOverlay, TextSpan};
pub use types::*;
pub use viewport::Viewport;
