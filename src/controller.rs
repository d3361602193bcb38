use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::backend::RgbaFrame;
use crate::config::Config;
use crate::delivery::{self, DeliveryChannel};
use crate::error::AppResult;
use crate::geometry::{self, DEFAULT_PAGE_SIZE_PT};
use crate::render::cache::{RenderedPageCache, RenderedPageKey};
use crate::render::scheduler::{EpochParams, EpochPhase, RenderScheduler};
use crate::render::worker::{DocumentLoader, HayroDocumentLoader, RenderResult, RenderWorker};
use crate::session::DocumentSession;
use crate::surface::PresentationSurface;

const PUMP_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Top-level orchestration of one viewing session.
///
/// Lives on the control thread. Opening a document retires any prior session
/// completely before the new one starts; rotation and theme toggles start a
/// fresh epoch; zoom and fit-to-width only recompute presentation geometry.
/// `pump` is the event-loop tick that drains deliveries and tops up worker
/// dispatch.
pub struct SessionController {
    config: Config,
    zoom: f32,
    session: Option<DocumentSession>,
    scheduler: RenderScheduler,
    cache: RenderedPageCache,
    delivery_tx: flume::Sender<RenderResult>,
    // Declared before `worker` so the receiver drops first on teardown and
    // blocked worker sends disconnect instead of wedging the pool.
    delivery: DeliveryChannel,
    worker: Option<RenderWorker>,
}

impl SessionController {
    pub fn new(config: Config) -> Self {
        let (delivery_tx, delivery) = delivery::channel(config.render.delivery_capacity);
        let cache = RenderedPageCache::new(
            config.cache.max_entries,
            config.cache.memory_budget_bytes(),
        );
        Self {
            config,
            zoom: 1.0,
            session: None,
            scheduler: RenderScheduler::default(),
            cache,
            delivery_tx,
            delivery,
            worker: None,
        }
    }

    /// Opens `path` with the hayro backend and starts epoch 0.
    pub fn open(
        &mut self,
        path: impl AsRef<Path>,
        surface: &mut dyn PresentationSurface,
    ) -> AppResult<()> {
        self.open_with_loader(path, Arc::new(HayroDocumentLoader), surface)
    }

    /// Opens a document through an injected loader (alternate backends,
    /// tests). Any prior session is fully retired first: no two documents
    /// ever render concurrently.
    pub fn open_with_loader(
        &mut self,
        path: impl AsRef<Path>,
        loader: Arc<dyn DocumentLoader>,
        surface: &mut dyn PresentationSurface,
    ) -> AppResult<()> {
        self.retire_session();

        let path = path.as_ref().to_path_buf();
        let session = match loader
            .load_shared_bytes(&path)
            .and_then(|bytes| loader.open_with_shared_bytes(&path, bytes))
        {
            Ok(backend) => DocumentSession::from_backend(backend),
            Err(err) => {
                surface.on_load_error(&err.to_string());
                return Err(err);
            }
        };

        let page_count = session.page_count();
        log::info!("opened {} ({page_count} pages)", path.display());

        for page in 0..page_count {
            let (intrinsic_width, intrinsic_height) = session
                .backend()
                .page_intrinsic_size(page)
                .unwrap_or(DEFAULT_PAGE_SIZE_PT);
            let (estimated_width, estimated_height) = geometry::placeholder_size(
                intrinsic_width,
                intrinsic_height,
                session.rotation(),
                self.config.render.base_page_width,
            );
            surface.on_placeholder_ready(page, estimated_width, estimated_height);
        }

        self.worker = Some(RenderWorker::spawn_with_loader(
            path,
            session.doc_id(),
            self.config.render.worker_threads,
            self.delivery_tx.clone(),
            loader,
        ));
        self.session = Some(session);
        self.start_epoch(surface);
        Ok(())
    }

    pub fn close(&mut self) {
        self.retire_session();
    }

    /// Rotates the whole document by `quarter_turns` and re-renders.
    pub fn rotate(&mut self, quarter_turns: i32, surface: &mut dyn PresentationSurface) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let epoch = session.rotate_by(quarter_turns);
        log::debug!(
            "rotation set to {} degrees (epoch {epoch})",
            session.rotation().degrees()
        );
        self.start_epoch(surface);
    }

    /// Flips the theme and re-renders; old-epoch bitmaps are undisplayable.
    pub fn toggle_dark_mode(&mut self, surface: &mut dyn PresentationSurface) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let epoch = session.toggle_dark_mode();
        log::debug!(
            "dark mode {} (epoch {epoch})",
            if session.dark_mode() { "on" } else { "off" }
        );
        self.start_epoch(surface);
    }

    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    pub fn set_zoom(&mut self, zoom: f32) {
        self.zoom = geometry::clamp_zoom(zoom);
    }

    pub fn zoom_by(&mut self, delta: f32) {
        if delta.is_finite() {
            self.set_zoom(self.zoom + delta);
        }
    }

    /// Zoom so a page exactly fills the viewport. Presentation-only: no
    /// scheduler involvement, no new epoch.
    pub fn fit_to_width(&mut self, viewport_width: f32) {
        self.zoom = geometry::fit_to_width_zoom(
            viewport_width,
            self.config.render.fit_margins,
            self.config.render.base_page_width,
        );
    }

    pub fn display_width(&self) -> f32 {
        geometry::display_width(self.config.render.base_page_width, self.zoom)
    }

    /// One control-thread tick: apply fresh deliveries, then top up the
    /// worker pool from the scheduler queue.
    pub fn pump(&mut self, surface: &mut dyn PresentationSurface) {
        while let Some(result) = self.delivery.try_recv() {
            self.apply_incoming(result, surface);
        }
        self.pump_dispatch();
    }

    /// Drives rendering until the current epoch completes or `deadline`
    /// elapses. Returns whether the epoch completed.
    pub fn pump_until_idle(
        &mut self,
        surface: &mut dyn PresentationSurface,
        deadline: Duration,
    ) -> bool {
        let started = Instant::now();
        loop {
            if self.scheduler.is_complete() {
                return true;
            }
            if self.session.is_none() || self.scheduler.phase() == EpochPhase::Cancelled {
                return false;
            }
            let Some(remaining) = deadline.checked_sub(started.elapsed()) else {
                return false;
            };

            self.pump_dispatch();
            if let Some(result) = self.delivery.recv_timeout(remaining.min(PUMP_POLL_INTERVAL)) {
                self.apply_incoming(result, surface);
            }
            self.pump(surface);
        }
    }

    /// Current-epoch bitmap for `page`, if it has been delivered and is
    /// still cached.
    pub fn rendered_frame(&mut self, page: usize) -> Option<RgbaFrame> {
        let session = self.session.as_ref()?;
        let key = RenderedPageKey {
            doc_id: session.doc_id(),
            page,
            epoch: session.current_epoch(),
        };
        self.cache.get_cloned(&key)
    }

    pub fn session(&self) -> Option<&DocumentSession> {
        self.session.as_ref()
    }

    pub fn is_open(&self) -> bool {
        self.session.is_some()
    }

    pub fn page_count(&self) -> usize {
        self.session
            .as_ref()
            .map(DocumentSession::page_count)
            .unwrap_or(0)
    }

    pub fn progress(&self) -> f64 {
        self.scheduler.progress()
    }

    pub fn is_render_complete(&self) -> bool {
        self.scheduler.is_complete()
    }

    pub fn failed_pages(&self) -> usize {
        self.scheduler.failed_jobs()
    }

    pub fn stale_results_dropped(&self) -> u64 {
        self.delivery.stale_dropped()
    }

    fn start_epoch(&mut self, surface: &mut dyn PresentationSurface) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        let snapshot = session.snapshot();
        self.cache.purge_stale(session.doc_id(), snapshot.epoch);
        self.scheduler.begin_epoch(
            EpochParams {
                doc_id: session.doc_id(),
                epoch: snapshot.epoch,
                scale: self.config.render.render_scale,
                dark_mode: snapshot.dark_mode,
                rotation: snapshot.rotation,
            },
            session.page_count(),
        );
        surface.on_progress(self.scheduler.progress());
        self.pump_dispatch();
    }

    fn pump_dispatch(&mut self) {
        let Some(worker) = self.worker.as_ref() else {
            return;
        };
        while worker.available_slots() > 0 {
            let Some(job) = self.scheduler.next_job() else {
                break;
            };
            if !worker.dispatch(job) {
                let _ = self.scheduler.requeue_front(job);
                break;
            }
        }
    }

    fn apply_incoming(&mut self, result: RenderResult, surface: &mut dyn PresentationSurface) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        let doc_id = session.doc_id();
        let epoch = session.current_epoch();
        if let Some(fresh) = self.delivery.admit(result, doc_id, epoch) {
            self.apply_result(fresh, surface);
        }
    }

    fn apply_result(&mut self, result: RenderResult, surface: &mut dyn PresentationSurface) {
        match result.outcome {
            Ok(frame) => {
                self.scheduler.record_completed(result.epoch);
                let key = RenderedPageKey {
                    doc_id: result.doc_id,
                    page: result.page,
                    epoch: result.epoch,
                };
                let (display_width, display_height) = self.display_size_for(&frame);
                self.cache.insert(key, frame.clone());
                surface.on_page_rendered(result.page, frame, display_width, display_height);
            }
            Err(err) => {
                self.scheduler.record_failed(result.epoch);
                surface.on_page_render_error(result.page, &err.to_string());
            }
        }
        surface.on_progress(self.scheduler.progress());
    }

    /// Display size from the bitmap's true aspect ratio and current zoom;
    /// the placeholder estimate is superseded here.
    fn display_size_for(&self, frame: &RgbaFrame) -> (f32, f32) {
        let width = self.display_width();
        let aspect = frame.height as f32 / frame.width.max(1) as f32;
        (width, width * aspect)
    }

    fn retire_session(&mut self) {
        self.scheduler.cancel_epoch();

        // Replace the delivery pair before dropping the pool: orphaned
        // workers see a disconnected sender and exit instead of blocking,
        // and nothing they already produced can reach the next session.
        let (delivery_tx, delivery) = delivery::channel(self.config.render.delivery_capacity);
        self.delivery_tx = delivery_tx;
        self.delivery = delivery;
        self.worker = None;

        if let Some(session) = self.session.take() {
            self.cache.remove_doc(session.doc_id());
            log::info!("closed {}", session.path().display());
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::Arc;
    use std::time::Duration;

    use super::SessionController;
    use crate::backend::RgbaFrame;
    use crate::config::Config;
    use crate::geometry::Rotation;
    use crate::surface::PresentationSurface;
    use crate::test_support::StubLoader;

    const PUMP_DEADLINE: Duration = Duration::from_secs(5);

    #[derive(Default)]
    struct RecordingSurface {
        placeholders: Vec<(usize, f32, f32)>,
        rendered: Vec<(usize, u8, f32, f32)>,
        render_errors: Vec<usize>,
        load_errors: Vec<String>,
        progress: Vec<f64>,
    }

    impl RecordingSurface {
        fn rendered_pages(&self) -> BTreeSet<usize> {
            self.rendered.iter().map(|entry| entry.0).collect()
        }

        fn last_progress(&self) -> f64 {
            self.progress.last().copied().unwrap_or(-1.0)
        }
    }

    impl PresentationSurface for RecordingSurface {
        fn on_placeholder_ready(&mut self, page: usize, width: f32, height: f32) {
            self.placeholders.push((page, width, height));
        }

        fn on_page_rendered(
            &mut self,
            page: usize,
            frame: RgbaFrame,
            display_width: f32,
            display_height: f32,
        ) {
            self.rendered
                .push((page, frame.pixels[0], display_width, display_height));
        }

        fn on_progress(&mut self, fraction: f64) {
            self.progress.push(fraction);
        }

        fn on_load_error(&mut self, message: &str) {
            self.load_errors.push(message.to_string());
        }

        fn on_page_render_error(&mut self, page: usize, _message: &str) {
            self.render_errors.push(page);
        }
    }

    fn controller() -> SessionController {
        let mut config = Config::default();
        config.render.worker_threads = 2;
        config.render.render_scale = 1.0;
        SessionController::new(config)
    }

    #[test]
    fn open_emits_placeholders_then_renders_every_page() {
        let mut controller = controller();
        let mut surface = RecordingSurface::default();

        controller
            .open_with_loader("doc.pdf", Arc::new(StubLoader::new(1, 3)), &mut surface)
            .expect("open should succeed");

        assert_eq!(surface.placeholders.len(), 3);
        // 300x300 page scaled to the 800 base width keeps a square aspect.
        assert_eq!(surface.placeholders[0], (0, 800.0, 800.0));

        assert!(controller.pump_until_idle(&mut surface, PUMP_DEADLINE));
        assert_eq!(surface.rendered.len(), 3);
        assert_eq!(surface.rendered_pages(), BTreeSet::from([0, 1, 2]));
        for &(_page, pixel, display_width, _h) in &surface.rendered {
            assert_eq!(pixel, 255, "light epoch should deliver white pages");
            assert_eq!(display_width, 800.0);
        }
        assert_eq!(surface.last_progress(), 1.0);
        assert!(controller.is_render_complete());
    }

    #[test]
    fn open_renders_a_real_pdf_end_to_end() {
        use crate::test_support::{build_pdf, unique_temp_path};

        let file = unique_temp_path("controller_e2e.pdf");
        std::fs::write(&file, build_pdf(&["alpha", "beta", "gamma"]))
            .expect("test pdf should be created");

        let mut controller = controller();
        let mut surface = RecordingSurface::default();
        controller
            .open(&file, &mut surface)
            .expect("open should succeed");
        assert_eq!(surface.placeholders.len(), 3);

        assert!(controller.pump_until_idle(&mut surface, PUMP_DEADLINE));
        assert_eq!(surface.rendered_pages(), BTreeSet::from([0, 1, 2]));
        for &(_page, pixel, _w, _h) in &surface.rendered {
            assert_eq!(pixel, 255, "paper should stay white in light mode");
        }
        assert!(controller.rendered_frame(1).is_some());

        std::fs::remove_file(&file).expect("test pdf should be removed");
    }

    #[test]
    fn dark_toggle_before_first_delivery_discards_the_light_epoch() {
        let mut controller = controller();
        let mut surface = RecordingSurface::default();
        let loader = StubLoader {
            render_delay: Duration::from_millis(50),
            ..StubLoader::new(1, 3)
        };

        controller
            .open_with_loader("doc.pdf", Arc::new(loader), &mut surface)
            .expect("open should succeed");
        controller.toggle_dark_mode(&mut surface);

        assert!(controller.pump_until_idle(&mut surface, PUMP_DEADLINE));
        assert_eq!(surface.rendered.len(), 3);
        assert_eq!(surface.rendered_pages(), BTreeSet::from([0, 1, 2]));
        for &(_page, pixel, _w, _h) in &surface.rendered {
            assert_eq!(pixel, 0, "every delivered bitmap should be dark");
        }
        // Both light-epoch jobs that were already in flight completed and
        // were dropped on arrival.
        assert_eq!(controller.stale_results_dropped(), 2);
        assert_eq!(
            controller.session().expect("session should be open").current_epoch(),
            1
        );
    }

    #[test]
    fn failing_page_is_reported_while_siblings_complete() {
        let mut controller = controller();
        let mut surface = RecordingSurface::default();
        let loader = StubLoader {
            fail_page: Some(1),
            ..StubLoader::new(1, 3)
        };

        controller
            .open_with_loader("doc.pdf", Arc::new(loader), &mut surface)
            .expect("open should succeed");

        assert!(controller.pump_until_idle(&mut surface, PUMP_DEADLINE));
        assert_eq!(surface.rendered_pages(), BTreeSet::from([0, 2]));
        assert_eq!(surface.render_errors, vec![1]);
        assert_eq!(surface.last_progress(), 1.0);
        assert_eq!(controller.failed_pages(), 1);
    }

    #[test]
    fn rotation_starts_a_new_epoch_with_swapped_geometry() {
        let mut controller = controller();
        let mut surface = RecordingSurface::default();
        let loader = StubLoader {
            page_size: (300.0, 150.0),
            ..StubLoader::new(1, 1)
        };

        controller
            .open_with_loader("doc.pdf", Arc::new(loader), &mut surface)
            .expect("open should succeed");
        assert!(controller.pump_until_idle(&mut surface, PUMP_DEADLINE));
        let (_page, _pixel, _w, flat_height) = surface.rendered[0];
        assert_eq!(flat_height, 400.0);

        controller.rotate(1, &mut surface);
        let session = controller.session().expect("session should be open");
        assert_eq!(session.rotation(), Rotation::Deg90);
        assert_eq!(session.current_epoch(), 1);

        assert!(controller.pump_until_idle(&mut surface, PUMP_DEADLINE));
        let &(_page, _pixel, rotated_width, rotated_height) =
            surface.rendered.last().expect("rotated page should arrive");
        // The 300x150 page rasterizes to 150x300 after a quarter turn, so
        // display height doubles the width.
        assert_eq!(rotated_width, 800.0);
        assert_eq!(rotated_height, 1600.0);
    }

    #[test]
    fn reopening_retires_the_previous_document_completely() {
        let mut controller = controller();
        let mut surface_a = RecordingSurface::default();
        let mut surface_b = RecordingSurface::default();
        let slow_loader = StubLoader {
            render_delay: Duration::from_millis(50),
            ..StubLoader::new(1, 2)
        };

        controller
            .open_with_loader("a.pdf", Arc::new(slow_loader), &mut surface_a)
            .expect("first open should succeed");
        controller
            .open_with_loader("b.pdf", Arc::new(StubLoader::new(2, 3)), &mut surface_b)
            .expect("second open should succeed");

        assert!(controller.pump_until_idle(&mut surface_b, PUMP_DEADLINE));
        assert!(surface_a.rendered.is_empty());
        assert_eq!(surface_b.rendered_pages(), BTreeSet::from([0, 1, 2]));
        assert_eq!(controller.page_count(), 3);
    }

    #[test]
    fn zoom_is_presentation_only_and_always_clamped() {
        let mut controller = controller();
        let mut surface = RecordingSurface::default();

        controller
            .open_with_loader("doc.pdf", Arc::new(StubLoader::new(1, 1)), &mut surface)
            .expect("open should succeed");

        controller.zoom_by(0.25);
        assert_eq!(controller.zoom(), 1.25);
        controller.set_zoom(99.0);
        assert_eq!(controller.zoom(), 5.0);
        controller.zoom_by(-99.0);
        assert_eq!(controller.zoom(), 0.1);
        controller.zoom_by(f32::NAN);
        assert_eq!(controller.zoom(), 0.1);

        controller.fit_to_width(860.0);
        assert_eq!(controller.zoom(), 1.0);
        assert_eq!(controller.display_width(), 800.0);

        let session = controller.session().expect("session should be open");
        assert_eq!(session.current_epoch(), 0, "zoom must never bump the epoch");
    }

    #[test]
    fn load_failure_is_reported_once_and_session_stays_empty() {
        let mut controller = controller();
        let mut surface = RecordingSurface::default();
        let loader = StubLoader {
            fail_open: true,
            ..StubLoader::new(1, 3)
        };

        let result = controller.open_with_loader("doc.pdf", Arc::new(loader), &mut surface);
        assert!(result.is_err());
        assert_eq!(surface.load_errors.len(), 1);
        assert!(!controller.is_open());
        assert_eq!(controller.page_count(), 0);
        assert!(surface.placeholders.is_empty());
    }

    #[test]
    fn rendered_frame_serves_only_the_current_epoch() {
        let mut controller = controller();
        let mut surface = RecordingSurface::default();

        controller
            .open_with_loader("doc.pdf", Arc::new(StubLoader::new(1, 1)), &mut surface)
            .expect("open should succeed");
        assert!(controller.pump_until_idle(&mut surface, PUMP_DEADLINE));
        assert!(controller.rendered_frame(0).is_some());

        controller.toggle_dark_mode(&mut surface);
        assert!(
            controller.rendered_frame(0).is_none(),
            "old-epoch bitmaps must not be served after a theme change"
        );
    }

    #[test]
    fn empty_document_completes_epoch_zero_immediately() {
        let mut controller = controller();
        let mut surface = RecordingSurface::default();

        controller
            .open_with_loader("empty.pdf", Arc::new(StubLoader::new(1, 0)), &mut surface)
            .expect("open should succeed");

        assert!(controller.is_render_complete());
        assert_eq!(controller.progress(), 1.0);
        assert!(controller.pump_until_idle(&mut surface, PUMP_DEADLINE));
        assert!(surface.rendered.is_empty());
        assert_eq!(surface.last_progress(), 1.0);
    }

    #[test]
    fn close_drops_the_session_and_its_cache() {
        let mut controller = controller();
        let mut surface = RecordingSurface::default();

        controller
            .open_with_loader("doc.pdf", Arc::new(StubLoader::new(1, 1)), &mut surface)
            .expect("open should succeed");
        assert!(controller.pump_until_idle(&mut surface, PUMP_DEADLINE));

        controller.close();
        assert!(!controller.is_open());
        assert!(controller.rendered_frame(0).is_none());
    }
}
