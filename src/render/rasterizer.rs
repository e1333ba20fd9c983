//! Page rasterization collaborator
//!
//! The engine never decodes documents itself. A [`Rasterizer`] accepts raster
//! and text jobs, runs them however it likes (threads, processes, inline) and
//! reports each result on the channel carried by the job.

use flume::Sender;
use log::trace;

use super::request::{CancelToken, Cancellable, RenderError, RenderResponse, RequestId};
use super::types::{DocumentProperties, PageGeometry, PixelSurface, Rotation, TextGeometry};

/// Phase A work item: rasterize a page
#[derive(Debug)]
pub struct RasterJob {
    pub id: RequestId,
    /// Page number (1-based)
    pub page: usize,
    /// Device pixels per page point
    pub scale: f32,
    /// Total clockwise rotation to apply
    pub rotation: Rotation,
    pub token: CancelToken,
    reply: Sender<RenderResponse>,
}

impl RasterJob {
    #[must_use]
    pub fn new(
        id: RequestId,
        page: usize,
        scale: f32,
        rotation: Rotation,
        reply: Sender<RenderResponse>,
    ) -> Self {
        Self {
            id,
            page,
            scale,
            rotation,
            token: CancelToken::new(),
            reply,
        }
    }

    /// Handle the coordinator keeps for this job
    #[must_use]
    pub fn handle(&self) -> Cancellable {
        Cancellable::new(self.id, self.token.clone())
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Deliver the result. A dropped coordinator is not an error.
    pub fn complete(self, result: Result<PixelSurface, RenderError>) {
        self.respond(result);
    }

    /// Deliver a result without giving up the job, for backends that
    /// acknowledge cancellation early and still finish the work later
    pub fn respond(&self, result: Result<PixelSurface, RenderError>) {
        if self
            .reply
            .send(RenderResponse::Raster {
                id: self.id,
                result,
            })
            .is_err()
        {
            trace!("Raster result {} dropped, coordinator gone", self.id);
        }
    }
}

/// Phase B work item: extract text geometry of a page
#[derive(Debug)]
pub struct TextJob {
    pub id: RequestId,
    /// Page number (1-based)
    pub page: usize,
    pub token: CancelToken,
    reply: Sender<RenderResponse>,
}

impl TextJob {
    #[must_use]
    pub fn new(id: RequestId, page: usize, reply: Sender<RenderResponse>) -> Self {
        Self {
            id,
            page,
            token: CancelToken::new(),
            reply,
        }
    }

    #[must_use]
    pub fn handle(&self) -> Cancellable {
        Cancellable::new(self.id, self.token.clone())
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn complete(self, result: Result<TextGeometry, RenderError>) {
        self.respond(result);
    }

    pub fn respond(&self, result: Result<TextGeometry, RenderError>) {
        if self
            .reply
            .send(RenderResponse::TextLayer {
                id: self.id,
                result,
            })
            .is_err()
        {
            trace!("Text result {} dropped, coordinator gone", self.id);
        }
    }
}

/// External page rasterizer
pub trait Rasterizer {
    /// Number of pages in the open document
    fn page_count(&self) -> usize;

    /// Natural size and intrinsic rotation of a page (1-based)
    fn page_geometry(&mut self, page: usize) -> Result<PageGeometry, RenderError>;

    /// Start rasterizing; the result arrives through [`RasterJob::complete`]
    fn render_raster(&mut self, job: RasterJob) -> Cancellable;

    /// Start text extraction; the result arrives through [`TextJob::complete`]
    fn render_text_layer(&mut self, job: TextJob) -> Cancellable;

    /// Document properties
    fn metadata(&mut self) -> Result<DocumentProperties, RenderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complete_sends_tagged_response() {
        let (tx, rx) = flume::unbounded();
        let job = RasterJob::new(RequestId::new(3), 1, 2.0, Rotation::Deg0, tx);
        let handle = job.handle();
        job.complete(Ok(PixelSurface::filled(1, 1, [0; 3])));

        let response = rx.try_recv().expect("response");
        assert_eq!(response.id(), RequestId::new(3));
        assert!(matches!(response, RenderResponse::Raster { result: Ok(_), .. }));
        handle.cancel();
    }

    #[test]
    fn handle_cancels_job() {
        let (tx, _rx) = flume::unbounded();
        let job = TextJob::new(RequestId::new(1), 2, tx);
        job.handle().cancel();
        assert!(job.is_cancelled());
    }

    #[test]
    fn completing_after_coordinator_drop_is_silent() {
        let (tx, rx) = flume::unbounded();
        drop(rx);
        TextJob::new(RequestId::new(1), 1, tx).complete(Err(RenderError::Cancelled));
    }
}
