use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::runtime::{Builder, Handle, Runtime};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

use crate::backend::{
    load_default_shared_bytes, open_default_backend_with_shared_bytes, DocumentBackend, RgbaFrame,
};
use crate::error::{AppError, AppResult};
use crate::raster::{compose_page, rotate_quarter};
use crate::render::scheduler::RenderJob;

enum RenderWorkerRequest {
    Job(RenderJob),
    Shutdown,
}

/// Opens per-worker backend instances over one shared byte buffer, so the
/// pool never shares a parsed document across threads.
pub trait DocumentLoader: Send + Sync {
    fn load_shared_bytes(&self, path: &Path) -> AppResult<Arc<Vec<u8>>>;
    fn open_with_shared_bytes(
        &self,
        path: &Path,
        bytes: Arc<Vec<u8>>,
    ) -> AppResult<Box<dyn DocumentBackend>>;
}

#[derive(Debug, Default)]
pub struct HayroDocumentLoader;

impl DocumentLoader for HayroDocumentLoader {
    fn load_shared_bytes(&self, path: &Path) -> AppResult<Arc<Vec<u8>>> {
        load_default_shared_bytes(path)
    }

    fn open_with_shared_bytes(
        &self,
        path: &Path,
        bytes: Arc<Vec<u8>>,
    ) -> AppResult<Box<dyn DocumentBackend>> {
        open_default_backend_with_shared_bytes(path, bytes)
    }
}

/// Outcome of one render job, as handed to the delivery channel.
///
/// Failures are converted to the error variant at the worker boundary; they
/// are never thrown across threads and never abort sibling jobs.
#[derive(Debug)]
pub struct RenderResult {
    pub doc_id: u64,
    pub page: usize,
    pub epoch: u64,
    pub outcome: AppResult<RgbaFrame>,
    pub elapsed: Duration,
}

/// Fixed-size pool of blocking render threads.
///
/// All workers pull from one shared request channel and submit results
/// directly to the delivery sender. The pool tracks its in-flight count so
/// the controller only dispatches up to capacity; everything else stays in
/// the scheduler queue where it can still be cancelled.
pub struct RenderWorker {
    request_tx: UnboundedSender<RenderWorkerRequest>,
    in_flight: Arc<AtomicUsize>,
    _runtime: RenderWorkerRuntime,
    workers: Vec<JoinHandle<()>>,
    worker_threads: usize,
}

struct RenderWorkerRuntime {
    _owned: Option<Runtime>,
    handle: Handle,
}

impl RenderWorkerRuntime {
    fn new() -> Self {
        if let Ok(handle) = Handle::try_current() {
            return Self {
                _owned: None,
                handle,
            };
        }

        let runtime = Builder::new_multi_thread()
            .enable_all()
            .thread_name("vellum-render")
            .build()
            .expect("render runtime should initialize");
        let handle = runtime.handle().clone();
        Self {
            _owned: Some(runtime),
            handle,
        }
    }

    fn spawn_blocking<F>(&self, task: F) -> JoinHandle<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.handle.spawn_blocking(task)
    }
}

impl RenderWorker {
    pub fn spawn(
        path: PathBuf,
        doc_id: u64,
        worker_threads: usize,
        delivery_tx: flume::Sender<RenderResult>,
    ) -> Self {
        Self::spawn_with_loader(
            path,
            doc_id,
            worker_threads,
            delivery_tx,
            Arc::new(HayroDocumentLoader),
        )
    }

    pub fn spawn_with_loader(
        path: PathBuf,
        doc_id: u64,
        worker_threads: usize,
        delivery_tx: flume::Sender<RenderResult>,
        loader: Arc<dyn DocumentLoader>,
    ) -> Self {
        let (request_tx, request_rx) = unbounded_channel();
        let runtime = RenderWorkerRuntime::new();
        let worker_threads = worker_threads.max(1);
        let request_rx = Arc::new(Mutex::new(request_rx));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let shared_bytes = loader
            .load_shared_bytes(&path)
            .map_err(|err| err.to_string());

        let mut workers = Vec::with_capacity(worker_threads);
        for _ in 0..worker_threads {
            let path = path.clone();
            let request_rx = Arc::clone(&request_rx);
            let shared_bytes = shared_bytes.clone();
            let loader = Arc::clone(&loader);
            let delivery_tx = delivery_tx.clone();
            let in_flight = Arc::clone(&in_flight);
            let worker = runtime.spawn_blocking(move || {
                render_worker_main(
                    path,
                    doc_id,
                    shared_bytes,
                    request_rx,
                    loader,
                    delivery_tx,
                    in_flight,
                )
            });
            workers.push(worker);
        }

        Self {
            request_tx,
            in_flight,
            _runtime: runtime,
            workers,
            worker_threads,
        }
    }

    /// Hands a job to the pool; refuses when every worker is busy so the
    /// caller keeps undispatched jobs in its cancellable queue.
    pub fn dispatch(&self, job: RenderJob) -> bool {
        if self.in_flight_len() >= self.worker_threads {
            return false;
        }
        if self
            .request_tx
            .send(RenderWorkerRequest::Job(job))
            .is_err()
        {
            return false;
        }
        self.in_flight.fetch_add(1, Ordering::AcqRel);
        true
    }

    pub fn available_slots(&self) -> usize {
        self.worker_threads.saturating_sub(self.in_flight_len())
    }

    pub fn in_flight_len(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn worker_threads(&self) -> usize {
        self.worker_threads
    }

    fn shutdown(&mut self) {
        for _ in 0..self.worker_threads {
            let _ = self.request_tx.send(RenderWorkerRequest::Shutdown);
        }
        while let Some(worker) = self.workers.pop() {
            worker.abort();
        }
    }
}

impl Drop for RenderWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[allow(clippy::too_many_arguments)]
fn render_worker_main(
    path: PathBuf,
    doc_id: u64,
    shared_bytes: Result<Arc<Vec<u8>>, String>,
    request_rx: Arc<Mutex<UnboundedReceiver<RenderWorkerRequest>>>,
    loader: Arc<dyn DocumentLoader>,
    delivery_tx: flume::Sender<RenderResult>,
    in_flight: Arc<AtomicUsize>,
) {
    let doc = match shared_bytes {
        Ok(bytes) => loader.open_with_shared_bytes(&path, bytes),
        Err(message) => Err(AppError::document_load(format!(
            "render worker failed to load shared document bytes: {message}"
        ))),
    };

    loop {
        let request = match request_rx.lock() {
            Ok(mut request_rx) => request_rx.blocking_recv(),
            Err(_) => None,
        };
        let request = match request {
            Some(request) => request,
            None => break,
        };

        match request {
            RenderWorkerRequest::Job(job) => {
                let started = Instant::now();
                // A panicking backend must not take the worker thread (and
                // its pool slot) down with it; treat it as a failed page.
                let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    run_job(&doc, doc_id, &job)
                }))
                .unwrap_or_else(|_| {
                    Err(AppError::page_render_message(
                        job.page,
                        "rasterization panicked",
                    ))
                });
                if let Err(err) = &outcome {
                    log::warn!("render failed for page {}: {err}", job.page + 1);
                }

                let sent = delivery_tx.send(RenderResult {
                    doc_id: job.doc_id,
                    page: job.page,
                    epoch: job.epoch,
                    outcome,
                    elapsed: started.elapsed(),
                });
                in_flight.fetch_sub(1, Ordering::AcqRel);
                if sent.is_err() {
                    // Delivery receiver gone: the session was retired.
                    break;
                }
            }
            RenderWorkerRequest::Shutdown => break,
        }
    }
}

fn run_job(
    doc: &AppResult<Box<dyn DocumentBackend>>,
    doc_id: u64,
    job: &RenderJob,
) -> AppResult<RgbaFrame> {
    let doc = match doc {
        Ok(doc) => doc,
        Err(err) => {
            return Err(AppError::document_load(format!(
                "render worker failed to open active document: {err}"
            )));
        }
    };
    if doc.doc_id() != doc_id || job.doc_id != doc_id {
        return Err(AppError::invalid_argument(
            "render job does not match active document",
        ));
    }

    let raw = doc
        .rasterize(job.page, job.scale)
        .map_err(|err| AppError::page_render(job.page, err))?;
    let oriented = rotate_quarter(&raw, job.rotation);
    Ok(compose_page(&oriented, job.dark_mode))
}
