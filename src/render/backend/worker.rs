//! MuPDF render worker - runs in separate thread(s)

use std::path::Path;

use flume::Receiver;
use log::{debug, error, trace};
use mupdf::text_page::TextBlockType;
use mupdf::{Colorspace, Document, Matrix, Pixmap, TextPageFlags};

use crate::render::{
    PixelSurface, RasterJob, Rect, RenderError, Rotation, Size, TextGeometry, TextJob, TextRun,
};

/// Work handed to the pool
#[derive(Debug)]
pub enum WorkerJob {
    Raster(RasterJob),
    Text(TextJob),
    Shutdown,
}

/// Main worker function - runs in a dedicated thread
#[expect(
    clippy::needless_pass_by_value,
    reason = "Values moved into thread, need ownership"
)]
pub fn render_worker(doc_path: &Path, jobs: Receiver<WorkerJob>) {
    let doc = match Document::open(doc_path.to_string_lossy().as_ref()) {
        Ok(d) => d,
        Err(e) => {
            error!("Worker cannot open {}: {e}", doc_path.display());
            fail_remaining(&jobs, &e.to_string());
            return;
        }
    };

    for job in jobs.iter() {
        match job {
            WorkerJob::Raster(job) => {
                if job.is_cancelled() {
                    job.complete(Err(RenderError::Cancelled));
                    continue;
                }
                let result = rasterize(&doc, job.page, job.scale, job.rotation);
                if job.is_cancelled() {
                    trace!("Raster of page {} finished after cancellation", job.page);
                    job.complete(Err(RenderError::Cancelled));
                } else {
                    job.complete(result);
                }
            }

            WorkerJob::Text(job) => {
                if job.is_cancelled() {
                    job.complete(Err(RenderError::Cancelled));
                    continue;
                }
                let result = extract_text(&doc, job.page);
                if job.is_cancelled() {
                    job.complete(Err(RenderError::Cancelled));
                } else {
                    job.complete(result);
                }
            }

            WorkerJob::Shutdown => break,
        }
    }
    debug!("Render worker for {} exiting", doc_path.display());
}

/// Answer every queued job with an error so the coordinator does not wait forever
fn fail_remaining(jobs: &Receiver<WorkerJob>, detail: &str) {
    for job in jobs.iter() {
        match job {
            WorkerJob::Raster(job) => {
                let page = job.page;
                job.complete(Err(RenderError::raster(page, detail)));
            }
            WorkerJob::Text(job) => {
                let page = job.page;
                job.complete(Err(RenderError::text_layer(page, detail)));
            }
            WorkerJob::Shutdown => break,
        }
    }
}

/// Scale then rotate clockwise; MuPDF places the pixmap at the transformed
/// page bounds, so no translation is needed.
fn transform(scale: f32, rotation: Rotation) -> Matrix {
    match rotation {
        Rotation::Deg0 => Matrix::new(scale, 0.0, 0.0, scale, 0.0, 0.0),
        Rotation::Deg90 => Matrix::new(0.0, scale, -scale, 0.0, 0.0, 0.0),
        Rotation::Deg180 => Matrix::new(-scale, 0.0, 0.0, -scale, 0.0, 0.0),
        Rotation::Deg270 => Matrix::new(0.0, -scale, scale, 0.0, 0.0, 0.0),
    }
}

/// Render a single page (1-based) to RGB
pub fn rasterize(
    doc: &Document,
    page_num: usize,
    scale: f32,
    rotation: Rotation,
) -> Result<PixelSurface, RenderError> {
    let fail = |e: mupdf::error::Error| RenderError::raster(page_num, e.to_string());

    let page = doc.load_page(page_index(page_num)).map_err(fail)?;
    let rgb = Colorspace::device_rgb();
    let pixmap = page
        .to_pixmap(&transform(scale, rotation), &rgb, false, false)
        .map_err(fail)?;

    surface_from_pixmap(&pixmap, page_num)
}

/// Copy the colour channels of `pixmap` into a packed RGB surface, dropping
/// alpha and row padding.
fn surface_from_pixmap(pixmap: &Pixmap, page_num: usize) -> Result<PixelSurface, RenderError> {
    let channels = pixmap.n() as usize;
    if channels < 3 {
        return Err(RenderError::raster(
            page_num,
            format!("pixmap has {channels} channels, need at least 3"),
        ));
    }

    let (width, height) = (pixmap.width(), pixmap.height());
    let stride = pixmap.stride() as usize;
    let row_len = width as usize * channels;
    let samples = pixmap.samples();
    if row_len > stride || samples.len() < stride.saturating_mul(height as usize) {
        return Err(RenderError::raster(
            page_num,
            format!("pixmap buffer too small for {width}x{height}"),
        ));
    }

    let mut pixels = Vec::with_capacity(width as usize * height as usize * 3);
    for row in samples.chunks(stride.max(1)).take(height as usize) {
        pixels.extend(
            row[..row_len]
                .chunks_exact(channels)
                .flat_map(|px| px[..3].iter().copied()),
        );
    }
    Ok(PixelSurface::new(width, height, pixels))
}

/// Text lines of a page (1-based) in unrotated page points
pub fn extract_text(doc: &Document, page_num: usize) -> Result<TextGeometry, RenderError> {
    let fail = |e: mupdf::error::Error| RenderError::text_layer(page_num, e.to_string());

    let page = doc.load_page(page_index(page_num)).map_err(fail)?;
    let bounds = page.bounds().map_err(fail)?;
    let text_page = page.to_text_page(TextPageFlags::empty()).map_err(fail)?;

    let mut runs = Vec::new();
    for block in text_page.blocks() {
        if block.r#type() != TextBlockType::Text {
            continue;
        }
        for line in block.lines() {
            let text: String = line.chars().filter_map(|ch| ch.char()).collect();
            if text.trim().is_empty() {
                continue;
            }
            let bbox = line.bounds();
            runs.push(TextRun {
                text,
                bbox: Rect::new(
                    bbox.x0 - bounds.x0,
                    bbox.y0 - bounds.y0,
                    bbox.x1 - bounds.x0,
                    bbox.y1 - bounds.y0,
                ),
            });
        }
    }

    Ok(TextGeometry {
        page_size: Size::new(bounds.x1 - bounds.x0, bounds.y1 - bounds.y0),
        runs,
    })
}

pub(crate) fn page_index(page_num: usize) -> i32 {
    i32::try_from(page_num.saturating_sub(1)).unwrap_or(i32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_numbers_are_one_based() {
        assert_eq!(page_index(1), 0);
        assert_eq!(page_index(12), 11);
        assert_eq!(page_index(0), 0);
    }

    #[test]
    fn quarter_turn_maps_x_axis_down() {
        let m = transform(2.0, Rotation::Deg90);
        // (1, 0) -> (a, b) = (0, 2): the page's x axis points down after rotation
        assert_eq!((m.a, m.b), (0.0, 2.0));
        assert_eq!((m.c, m.d), (-2.0, 0.0));
    }

    #[test]
    fn alpha_is_dropped_from_rgba_pixmaps() {
        let mut pixmap = Pixmap::new_with_w_h(&Colorspace::device_rgb(), 3, 2, true)
            .expect("pixmap");
        pixmap.clear_with(200).expect("clear");

        let surface = surface_from_pixmap(&pixmap, 4).expect("surface");
        assert_eq!((surface.width, surface.height), (3, 2));
        assert_eq!(surface.pixels, vec![200; 3 * 2 * 3]);
    }

    #[test]
    fn gray_pixmap_is_a_raster_failure() {
        let pixmap = Pixmap::new_with_w_h(&Colorspace::device_gray(), 2, 2, false)
            .expect("pixmap");
        let error = surface_from_pixmap(&pixmap, 7).expect_err("gray");
        assert!(matches!(error, RenderError::RasterFailure { page: 7, .. }));
    }
}
