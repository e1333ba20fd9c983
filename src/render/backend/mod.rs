//! MuPDF rasterizer - worker pool behind the [`Rasterizer`] seam

mod worker;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use flume::Sender;
use log::{debug, info};
use mupdf::{Document, MetadataName};

use super::{
    Cancellable, DocumentProperties, PageGeometry, RasterJob, Rasterizer, RenderError, TextJob,
};
pub use worker::{WorkerJob, extract_text, rasterize};
use worker::{page_index, render_worker};

/// Default number of render threads
pub const DEFAULT_WORKERS: usize = 2;

const METADATA_FIELDS: [(MetadataName, &str); 9] = [
    (MetadataName::Title, "title"),
    (MetadataName::Author, "author"),
    (MetadataName::Subject, "subject"),
    (MetadataName::Keywords, "keywords"),
    (MetadataName::Creator, "creator"),
    (MetadataName::Producer, "producer"),
    (MetadataName::CreationDate, "creation_date"),
    (MetadataName::ModDate, "mod_date"),
    (MetadataName::Format, "format"),
];

/// Renders pages of one document with MuPDF.
///
/// Each worker thread opens its own [`Document`] and pulls jobs from a shared
/// queue. Page geometry and metadata are answered synchronously from a
/// document handle owned by the calling thread.
pub struct MupdfRasterizer {
    path: PathBuf,
    doc: Document,
    page_count: usize,
    geometry: HashMap<usize, PageGeometry>,
    job_tx: Sender<WorkerJob>,
    num_workers: usize,
}

impl MupdfRasterizer {
    pub fn open(path: &Path) -> Result<Self, RenderError> {
        Self::with_workers(path, DEFAULT_WORKERS)
    }

    pub fn with_workers(path: &Path, num_workers: usize) -> Result<Self, RenderError> {
        let doc = Document::open(path.to_string_lossy().as_ref())
            .map_err(|e| RenderError::Backend(format!("{}: {e}", path.display())))?;
        let page_count = doc
            .page_count()
            .map_err(|e| RenderError::Backend(e.to_string()))?;
        let page_count = usize::try_from(page_count).unwrap_or(0);

        // MPMC: every worker clones the receiver and pulls from the same queue
        let (job_tx, job_rx) = flume::unbounded();
        let num_workers = num_workers.max(1);
        for n in 0..num_workers {
            let path = path.to_path_buf();
            let rx = job_rx.clone();
            std::thread::Builder::new()
                .name(format!("render-worker-{n}"))
                .spawn(move || render_worker(&path, rx))
                .map_err(|e| RenderError::Backend(format!("spawning render worker: {e}")))?;
        }

        info!(
            "Opened {} ({page_count} pages, {num_workers} workers)",
            path.display()
        );

        Ok(Self {
            path: path.to_path_buf(),
            doc,
            page_count,
            geometry: HashMap::new(),
            job_tx,
            num_workers,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn dispatch(&self, job: WorkerJob) {
        if let Err(flume::SendError(job)) = self.job_tx.send(job) {
            // Workers are gone; answer directly so the coordinator is not left waiting
            match job {
                WorkerJob::Raster(job) => {
                    let page = job.page;
                    job.complete(Err(RenderError::raster(page, "render workers stopped")));
                }
                WorkerJob::Text(job) => {
                    let page = job.page;
                    job.complete(Err(RenderError::text_layer(page, "render workers stopped")));
                }
                WorkerJob::Shutdown => {}
            }
        }
    }
}

impl Rasterizer for MupdfRasterizer {
    fn page_count(&self) -> usize {
        self.page_count
    }

    fn page_geometry(&mut self, page: usize) -> Result<PageGeometry, RenderError> {
        if let Some(geometry) = self.geometry.get(&page) {
            return Ok(*geometry);
        }

        let fail = |e: mupdf::error::Error| RenderError::raster(page, e.to_string());
        let bounds = self
            .doc
            .load_page(page_index(page))
            .and_then(|p| p.bounds())
            .map_err(fail)?;

        // Bounds already reflect the page's /Rotate entry
        let geometry = PageGeometry::new(bounds.x1 - bounds.x0, bounds.y1 - bounds.y0);
        self.geometry.insert(page, geometry);
        Ok(geometry)
    }

    fn render_raster(&mut self, job: RasterJob) -> Cancellable {
        let handle = job.handle();
        debug!(
            "Queueing raster {} for page {} at scale {}",
            job.id, job.page, job.scale
        );
        self.dispatch(WorkerJob::Raster(job));
        handle
    }

    fn render_text_layer(&mut self, job: TextJob) -> Cancellable {
        let handle = job.handle();
        self.dispatch(WorkerJob::Text(job));
        handle
    }

    fn metadata(&mut self) -> Result<DocumentProperties, RenderError> {
        let mut properties = DocumentProperties::default();
        for (name, key) in METADATA_FIELDS {
            match self.doc.metadata(name) {
                Ok(value) if !value.is_empty() => properties.insert(key, value),
                Ok(_) => {}
                Err(e) => debug!("Metadata {key} unavailable: {e}"),
            }
        }
        properties.insert("page_count", self.page_count.to_string());
        Ok(properties)
    }
}

impl Drop for MupdfRasterizer {
    fn drop(&mut self) {
        for _ in 0..self.num_workers {
            let _ = self.job_tx.send(WorkerJob::Shutdown);
        }
    }
}
