pub mod test_helpers {
    use std::collections::{HashMap, HashSet, VecDeque};
    use std::sync::{Arc, Mutex, PoisonError};
    use std::time::Duration;

    use crate::render::{
        Cancellable, DocumentProperties, Frame, FrameListener, LiveZoom, PageGeometry,
        PixelSurface, RasterJob, Rasterizer, Rect, RenderCoordinator, RenderError, RequestId,
        Rotation, Size, TextGeometry, TextJob, TextRun,
    };

    #[derive(Debug)]
    enum Job {
        Raster(RasterJob),
        Text(TextJob),
    }

    impl Job {
        fn id(&self) -> RequestId {
            match self {
                Job::Raster(job) => job.id,
                Job::Text(job) => job.id,
            }
        }
    }

    /// Rasterizer whose jobs only finish when the test says so.
    ///
    /// Every job is queued in submission order. Tests complete, fail or
    /// acknowledge them one at a time, which makes races between a late
    /// result and a newer request reproducible.
    pub struct ScriptedRasterizer {
        page_count: usize,
        page_size: Size,
        geometry: HashMap<usize, PageGeometry>,
        failing_raster: HashSet<usize>,
        failing_text: HashSet<usize>,
        failing_geometry: HashSet<usize>,
        jobs: VecDeque<Job>,
        acknowledged: HashSet<RequestId>,
        raster_history: Vec<RasterCall>,
        text_history: Vec<usize>,
        metadata: DocumentProperties,
    }

    /// Arguments of one `render_raster` call
    #[derive(Clone, Copy, Debug, PartialEq)]
    pub struct RasterCall {
        pub id: RequestId,
        pub page: usize,
        pub scale: f32,
        pub rotation: Rotation,
    }

    impl ScriptedRasterizer {
        /// A document of `page_count` US-letter pages
        pub fn new(page_count: usize) -> Self {
            let mut metadata = DocumentProperties::default();
            metadata.insert("title", "Scripted document");
            metadata.insert("page_count", page_count.to_string());

            Self {
                page_count,
                page_size: Size::new(612.0, 792.0),
                geometry: HashMap::new(),
                failing_raster: HashSet::new(),
                failing_text: HashSet::new(),
                failing_geometry: HashSet::new(),
                jobs: VecDeque::new(),
                acknowledged: HashSet::new(),
                raster_history: Vec::new(),
                text_history: Vec::new(),
                metadata,
            }
        }

        pub fn with_page_size(mut self, width: f32, height: f32) -> Self {
            self.page_size = Size::new(width, height);
            self
        }

        pub fn with_page_geometry(mut self, page: usize, geometry: PageGeometry) -> Self {
            self.geometry.insert(page, geometry);
            self
        }

        /// Raster phase of `page` fails
        pub fn fail_raster(mut self, page: usize) -> Self {
            self.failing_raster.insert(page);
            self
        }

        /// Text phase of `page` fails
        pub fn fail_text(mut self, page: usize) -> Self {
            self.failing_text.insert(page);
            self
        }

        /// `page_geometry` fails for `page`
        pub fn fail_geometry(mut self, page: usize) -> Self {
            self.failing_geometry.insert(page);
            self
        }

        /// Ids of jobs not yet completed, oldest first
        pub fn outstanding(&self) -> Vec<RequestId> {
            self.jobs.iter().map(Job::id).collect()
        }

        /// Pages of outstanding raster jobs, oldest first
        pub fn outstanding_raster_pages(&self) -> Vec<usize> {
            self.jobs
                .iter()
                .filter_map(|job| match job {
                    Job::Raster(job) => Some(job.page),
                    Job::Text(_) => None,
                })
                .collect()
        }

        pub fn is_cancelled(&self, id: RequestId) -> bool {
            self.jobs.iter().any(|job| match job {
                Job::Raster(job) => job.id == id && job.is_cancelled(),
                Job::Text(job) => job.id == id && job.is_cancelled(),
            })
        }

        /// Every `render_raster` call so far
        pub fn raster_calls(&self) -> &[RasterCall] {
            &self.raster_history
        }

        /// Pages passed to `render_raster`, in order
        pub fn raster_pages(&self) -> Vec<usize> {
            self.raster_history.iter().map(|call| call.page).collect()
        }

        /// Pages passed to `render_text_layer`, in order
        pub fn text_pages(&self) -> &[usize] {
            &self.text_history
        }

        /// Finish the oldest outstanding job. Cancelled jobs answer `Cancelled`.
        pub fn complete_next(&mut self) -> Option<RequestId> {
            let id = self.jobs.front().map(Job::id)?;
            self.complete(id).then_some(id)
        }

        /// Finish job `id`. Cancelled jobs answer `Cancelled`.
        pub fn complete(&mut self, id: RequestId) -> bool {
            self.finish(id, false)
        }

        /// Finish job `id` with its real result even if it was cancelled
        pub fn complete_late(&mut self, id: RequestId) -> bool {
            self.finish(id, true)
        }

        /// Answer `Cancelled` for every cancelled job but keep the jobs
        /// queued, as a backend that stops waiting before the work stops
        pub fn acknowledge_cancellations(&mut self) -> usize {
            let mut count = 0;
            for job in &self.jobs {
                if self.acknowledged.contains(&job.id()) {
                    continue;
                }
                match job {
                    Job::Raster(job) if job.is_cancelled() => {
                        job.respond(Err(RenderError::Cancelled));
                    }
                    Job::Text(job) if job.is_cancelled() => {
                        job.respond(Err(RenderError::Cancelled));
                    }
                    _ => continue,
                }
                self.acknowledged.insert(job.id());
                count += 1;
            }
            count
        }

        /// Finish every job queued right now
        pub fn complete_all(&mut self) -> usize {
            let ids = self.outstanding();
            ids.into_iter().filter(|id| self.complete(*id)).count()
        }

        fn finish(&mut self, id: RequestId, ignore_cancel: bool) -> bool {
            let Some(index) = self.jobs.iter().position(|job| job.id() == id) else {
                return false;
            };
            let Some(job) = self.jobs.remove(index) else {
                return false;
            };
            self.acknowledged.remove(&id);

            match job {
                Job::Raster(job) => {
                    let result = if job.is_cancelled() && !ignore_cancel {
                        Err(RenderError::Cancelled)
                    } else if self.failing_raster.contains(&job.page) {
                        Err(RenderError::raster(job.page, "scripted raster failure"))
                    } else {
                        Ok(self.surface_for(&job))
                    };
                    job.complete(result);
                }
                Job::Text(job) => {
                    let result = if job.is_cancelled() && !ignore_cancel {
                        Err(RenderError::Cancelled)
                    } else if self.failing_text.contains(&job.page) {
                        Err(RenderError::text_layer(job.page, "scripted text failure"))
                    } else {
                        Ok(self.text_for(job.page))
                    };
                    job.complete(result);
                }
            }
            true
        }

        fn size_of(&self, page: usize) -> Size {
            self.geometry
                .get(&page)
                .map_or(self.page_size, |geometry| geometry.size)
        }

        /// Solid surface whose red channel encodes the page number
        fn surface_for(&self, job: &RasterJob) -> PixelSurface {
            let mut size = self.size_of(job.page).scaled(job.scale);
            if job.rotation.swaps_axes() {
                size = size.transposed();
            }
            let shade = u8::try_from(job.page % 256).unwrap_or(0);
            PixelSurface::filled(
                size.width.ceil().max(1.0) as u32,
                size.height.ceil().max(1.0) as u32,
                [shade, 0, 0],
            )
        }

        fn text_for(&self, page: usize) -> TextGeometry {
            TextGeometry {
                page_size: self.size_of(page),
                runs: vec![
                    TextRun {
                        text: format!("Page {page}"),
                        bbox: Rect::new(72.0, 72.0, 200.0, 90.0),
                    },
                    TextRun {
                        text: "   ".to_string(),
                        bbox: Rect::new(72.0, 100.0, 90.0, 110.0),
                    },
                ],
            }
        }
    }

    impl Rasterizer for ScriptedRasterizer {
        fn page_count(&self) -> usize {
            self.page_count
        }

        fn page_geometry(&mut self, page: usize) -> Result<PageGeometry, RenderError> {
            if self.failing_geometry.contains(&page) {
                return Err(RenderError::Backend(format!("page {page} is damaged")));
            }
            Ok(self
                .geometry
                .get(&page)
                .copied()
                .unwrap_or(PageGeometry::new(self.page_size.width, self.page_size.height)))
        }

        fn render_raster(&mut self, job: RasterJob) -> Cancellable {
            self.raster_history.push(RasterCall {
                id: job.id,
                page: job.page,
                scale: job.scale,
                rotation: job.rotation,
            });
            let handle = job.handle();
            self.jobs.push_back(Job::Raster(job));
            handle
        }

        fn render_text_layer(&mut self, job: TextJob) -> Cancellable {
            self.text_history.push(job.page);
            let handle = job.handle();
            self.jobs.push_back(Job::Text(job));
            handle
        }

        fn metadata(&mut self) -> Result<DocumentProperties, RenderError> {
            Ok(self.metadata.clone())
        }
    }

    /// Everything the coordinator told the host, in order
    #[derive(Clone, Debug, PartialEq)]
    pub enum HostEvent {
        Frame(Frame),
        Error { page: usize, error: RenderError },
        Resize(Size),
        LiveZoom(LiveZoom),
        ZoomResolved { page: usize, zoom_ratio: f32 },
    }

    /// Host double that records callbacks; clones share one log
    #[derive(Clone, Default)]
    pub struct RecordingListener {
        events: Arc<Mutex<Vec<HostEvent>>>,
    }

    impl RecordingListener {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn boxed(&self) -> Box<dyn FrameListener> {
            Box::new(self.clone())
        }

        pub fn events(&self) -> Vec<HostEvent> {
            self.lock().clone()
        }

        pub fn frames(&self) -> Vec<Frame> {
            self.lock()
                .iter()
                .filter_map(|event| match event {
                    HostEvent::Frame(frame) => Some(frame.clone()),
                    _ => None,
                })
                .collect()
        }

        /// Pages of every frame shown, in order
        pub fn frame_pages(&self) -> Vec<usize> {
            self.frames().iter().map(|frame| frame.page).collect()
        }

        pub fn errors(&self) -> Vec<(usize, RenderError)> {
            self.lock()
                .iter()
                .filter_map(|event| match event {
                    HostEvent::Error { page, error } => Some((*page, error.clone())),
                    _ => None,
                })
                .collect()
        }

        pub fn clear(&self) {
            self.lock().clear();
        }

        fn lock(&self) -> std::sync::MutexGuard<'_, Vec<HostEvent>> {
            self.events.lock().unwrap_or_else(PoisonError::into_inner)
        }

        fn push(&self, event: HostEvent) {
            self.lock().push(event);
        }
    }

    impl FrameListener for RecordingListener {
        fn on_frame_ready(&mut self, frame: &Frame) {
            self.push(HostEvent::Frame(frame.clone()));
        }

        fn on_render_error(&mut self, page: usize, error: &RenderError) {
            self.push(HostEvent::Error {
                page,
                error: error.clone(),
            });
        }

        fn on_surface_resize(&mut self, css_size: Size) {
            self.push(HostEvent::Resize(css_size));
        }

        fn on_live_zoom(&mut self, zoom: &LiveZoom) {
            self.push(HostEvent::LiveZoom(*zoom));
        }

        fn on_zoom_resolved(&mut self, page: usize, zoom_ratio: f32) {
            self.push(HostEvent::ZoomResolved { page, zoom_ratio });
        }
    }

    /// Coordinator over a scripted rasterizer plus the listener it reports to
    pub fn scripted_session(
        rasterizer: ScriptedRasterizer,
        config: crate::render::RenderConfig,
    ) -> (RenderCoordinator<ScriptedRasterizer>, RecordingListener) {
        let listener = RecordingListener::new();
        let coordinator = RenderCoordinator::new(rasterizer, listener.boxed(), config);
        (coordinator, listener)
    }

    /// Complete jobs one at a time, oldest first, until the coordinator is idle.
    /// Returns false if it is still busy after `max_steps` completions.
    pub fn drive(coordinator: &mut RenderCoordinator<ScriptedRasterizer>, max_steps: usize) -> bool {
        for _ in 0..max_steps {
            coordinator.poll();
            if coordinator.is_idle() {
                return true;
            }
            if coordinator.rasterizer_mut().complete_next().is_none() {
                break;
            }
        }
        coordinator.run_until_idle(Duration::ZERO)
    }
}

pub use test_helpers::*;
