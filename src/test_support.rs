//! Shared fixtures: minimal hand-built PDFs and a configurable stub backend.

use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::backend::{DocumentBackend, RgbaFrame};
use crate::error::{AppError, AppResult};
use crate::render::worker::DocumentLoader;

pub(crate) fn unique_temp_path(suffix: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock should be after unix epoch")
        .as_nanos();

    let mut path = std::env::temp_dir();
    path.push(format!("vellum_{suffix}_{}_{}", process::id(), nanos));
    path
}

/// In-memory document backend with scriptable failures and latency.
///
/// Rasterizes every page as a fully transparent canvas sized from the page
/// box, so the transform pipeline turns it white in light mode and black in
/// dark mode. Assertions can read one pixel to tell which theme a delivered
/// frame belongs to.
pub(crate) struct StubBackend {
    pub(crate) path: PathBuf,
    pub(crate) doc_id: u64,
    pub(crate) pages: usize,
    pub(crate) page_size: (f32, f32),
    pub(crate) fail_page: Option<usize>,
    pub(crate) render_delay: Duration,
}

impl StubBackend {
    pub(crate) fn new(doc_id: u64, pages: usize) -> Self {
        Self {
            path: PathBuf::from("stub.pdf"),
            doc_id,
            pages,
            page_size: (300.0, 300.0),
            fail_page: None,
            render_delay: Duration::ZERO,
        }
    }
}

impl DocumentBackend for StubBackend {
    fn path(&self) -> &Path {
        &self.path
    }

    fn doc_id(&self) -> u64 {
        self.doc_id
    }

    fn page_count(&self) -> usize {
        self.pages
    }

    fn page_intrinsic_size(&self, page: usize) -> AppResult<(f32, f32)> {
        if page >= self.pages {
            return Err(AppError::invalid_argument("page index is out of range"));
        }
        Ok(self.page_size)
    }

    fn rasterize(&self, page: usize, scale: f32) -> AppResult<RgbaFrame> {
        if !self.render_delay.is_zero() {
            std::thread::sleep(self.render_delay);
        }
        if page >= self.pages {
            return Err(AppError::invalid_argument("page index is out of range"));
        }
        if self.fail_page == Some(page) {
            return Err(AppError::invalid_argument("synthetic rasterize failure"));
        }

        let width = ((self.page_size.0 * scale).round() as u32).max(1);
        let height = ((self.page_size.1 * scale).round() as u32).max(1);
        Ok(RgbaFrame {
            width,
            height,
            pixels: vec![0u8; width as usize * height as usize * 4].into(),
        })
    }
}

/// Loader that mints a fresh [`StubBackend`] per worker.
#[derive(Clone)]
pub(crate) struct StubLoader {
    pub(crate) doc_id: u64,
    pub(crate) pages: usize,
    pub(crate) page_size: (f32, f32),
    pub(crate) fail_page: Option<usize>,
    pub(crate) render_delay: Duration,
    pub(crate) fail_open: bool,
}

impl StubLoader {
    pub(crate) fn new(doc_id: u64, pages: usize) -> Self {
        Self {
            doc_id,
            pages,
            page_size: (300.0, 300.0),
            fail_page: None,
            render_delay: Duration::ZERO,
            fail_open: false,
        }
    }
}

impl DocumentLoader for StubLoader {
    fn load_shared_bytes(&self, _path: &Path) -> AppResult<Arc<Vec<u8>>> {
        if self.fail_open {
            return Err(AppError::document_load("stub load failure"));
        }
        Ok(Arc::new(Vec::new()))
    }

    fn open_with_shared_bytes(
        &self,
        path: &Path,
        _bytes: Arc<Vec<u8>>,
    ) -> AppResult<Box<dyn DocumentBackend>> {
        if self.fail_open {
            return Err(AppError::document_load("stub load failure"));
        }
        Ok(Box::new(StubBackend {
            path: path.to_path_buf(),
            doc_id: self.doc_id,
            pages: self.pages,
            page_size: self.page_size,
            fail_page: self.fail_page,
            render_delay: self.render_delay,
        }))
    }
}

pub(crate) fn build_pdf(page_texts: &[&str]) -> Vec<u8> {
    let page_texts = if page_texts.is_empty() {
        vec![""]
    } else {
        page_texts.to_vec()
    };

    let page_count = page_texts.len();
    let page_ids: Vec<usize> = (0..page_count).map(|i| 4 + i * 2).collect();

    let mut objects = Vec::new();
    objects.push("<< /Type /Catalog /Pages 2 0 R >>".to_string());

    let kids = page_ids
        .iter()
        .map(|id| format!("{id} 0 R"))
        .collect::<Vec<_>>()
        .join(" ");
    objects.push(format!(
        "<< /Type /Pages /Kids [{kids}] /Count {page_count} >>"
    ));
    objects.push("<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string());

    for (index, text) in page_texts.iter().enumerate() {
        let content_id = 5 + index * 2;
        let escaped = escape_literal_string(text);
        let stream = format!("BT /F1 14 Tf 36 260 Td ({escaped}) Tj ET");

        let page_obj = format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 300 300] /Resources << /Font << /F1 3 0 R >> >> /Contents {content_id} 0 R >>"
        );
        let content_obj = format!(
            "<< /Length {} >>\nstream\n{}\nendstream",
            stream.len(),
            stream
        );

        objects.push(page_obj);
        objects.push(content_obj);
    }

    let mut bytes = Vec::new();
    bytes.extend_from_slice(b"%PDF-1.4\n%\xE2\xE3\xCF\xD3\n");

    let mut offsets = Vec::new();
    offsets.push(0_usize);
    for (index, object) in objects.iter().enumerate() {
        let object_id = index + 1;
        offsets.push(bytes.len());
        bytes.extend_from_slice(format!("{object_id} 0 obj\n{object}\nendobj\n").as_bytes());
    }

    let xref_start = bytes.len();
    bytes.extend_from_slice(format!("xref\n0 {}\n", objects.len() + 1).as_bytes());
    bytes.extend_from_slice(b"0000000000 65535 f \n");
    for offset in offsets.iter().skip(1) {
        bytes.extend_from_slice(format!("{offset:010} 00000 n \n").as_bytes());
    }

    bytes.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            objects.len() + 1,
            xref_start
        )
        .as_bytes(),
    );

    bytes
}

fn escape_literal_string(text: &str) -> String {
    let mut out = String::with_capacity(text.len());

    for ch in text.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '(' => out.push_str("\\("),
            ')' => out.push_str("\\)"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(ch),
        }
    }

    out
}
