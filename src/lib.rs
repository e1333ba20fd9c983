// Export modules for use in tests
pub mod panic_handler;
pub mod render;
pub mod settings;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

// Re-export engine entry points
pub use render::{FrameListener, RenderConfig, RenderCoordinator, Rasterizer};
#[cfg(feature = "pdf")]
pub use render::backend::MupdfRasterizer;
