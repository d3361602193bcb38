use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use hayro::hayro_interpret::InterpreterSettings;
use hayro::hayro_syntax::Pdf;
use hayro::vello_cpu::color::palette::css::WHITE;
use hayro::{render, RenderSettings};

use crate::error::{AppError, AppResult};

use super::traits::{DocumentBackend, RgbaFrame};

/// Hayro-backed document backend.
pub struct PdfDoc {
    path: PathBuf,
    doc_id: u64,
    pdf: Pdf,
}

impl DocumentBackend for PdfDoc {
    fn path(&self) -> &Path {
        PdfDoc::path(self)
    }

    fn doc_id(&self) -> u64 {
        PdfDoc::doc_id(self)
    }

    fn page_count(&self) -> usize {
        PdfDoc::page_count(self)
    }

    fn page_intrinsic_size(&self, page: usize) -> AppResult<(f32, f32)> {
        PdfDoc::page_intrinsic_size(self, page)
    }

    fn rasterize(&self, page: usize, scale: f32) -> AppResult<RgbaFrame> {
        PdfDoc::rasterize(self, page, scale)
    }
}

impl PdfDoc {
    pub fn open(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let bytes = Self::load_shared_bytes(path)?;
        Self::open_with_shared_bytes(path, bytes)
    }

    pub fn load_shared_bytes(path: impl AsRef<Path>) -> AppResult<Arc<Vec<u8>>> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(AppError::document_load("document path must not be empty"));
        }
        if !path.exists() {
            return Err(AppError::io_with_context(
                std::io::Error::new(std::io::ErrorKind::NotFound, "missing file"),
                format!("document not found: {}", path.display()),
            ));
        }
        if !path.is_file() {
            return Err(AppError::document_load(
                "document path must be a regular file",
            ));
        }

        let bytes = Arc::new(std::fs::read(path)?);
        if !bytes.as_slice().starts_with(b"%PDF-") {
            return Err(AppError::document_load("input is not a valid PDF header"));
        }

        Ok(bytes)
    }

    pub fn open_with_shared_bytes(path: impl AsRef<Path>, bytes: Arc<Vec<u8>>) -> AppResult<Self> {
        let path = path.as_ref();
        if !bytes.as_slice().starts_with(b"%PDF-") {
            return Err(AppError::document_load("input is not a valid PDF header"));
        }
        let doc_id = calculate_doc_id(path, bytes.len());
        let pdf = Pdf::new(bytes)
            .map_err(|_| AppError::document_load("failed to parse PDF with hayro"))?;

        Ok(Self {
            path: path.to_path_buf(),
            doc_id,
            pdf,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn doc_id(&self) -> u64 {
        self.doc_id
    }

    pub fn page_count(&self) -> usize {
        self.pdf.pages().len()
    }

    pub fn page_intrinsic_size(&self, page: usize) -> AppResult<(f32, f32)> {
        use hayro::hayro_interpret::util::PageExt;

        let page_ref = self
            .pdf
            .pages()
            .get(page)
            .ok_or(AppError::invalid_argument("page index is out of range"))?;

        Ok(page_ref.render_dimensions())
    }

    pub fn rasterize(&self, page: usize, scale: f32) -> AppResult<RgbaFrame> {
        if !scale.is_finite() || scale <= 0.0 {
            return Err(AppError::invalid_argument(
                "scale must be a positive finite value",
            ));
        }

        let page_ref = self
            .pdf
            .pages()
            .get(page)
            .ok_or(AppError::invalid_argument("page index is out of range"))?;

        let render_settings = RenderSettings {
            x_scale: scale,
            y_scale: scale,
            bg_color: WHITE,
            ..Default::default()
        };
        let interpreter_settings = InterpreterSettings::default();
        let pixmap = render(page_ref, &interpreter_settings, &render_settings);

        Ok(RgbaFrame {
            width: pixmap.width() as u32,
            height: pixmap.height() as u32,
            pixels: pixmap.data_as_u8_slice().to_vec().into(),
        })
    }
}

fn calculate_doc_id(path: &Path, byte_len: usize) -> u64 {
    let mut hasher = DefaultHasher::new();
    path.hash(&mut hasher);
    byte_len.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use std::fs;

    use crate::error::AppError;
    use crate::test_support::{build_pdf, unique_temp_path};

    use super::PdfDoc;

    #[test]
    fn open_rejects_directory_path() {
        let dir = unique_temp_path("dir");
        fs::create_dir_all(&dir).expect("test directory should be created");

        let result = PdfDoc::open(&dir);
        assert!(matches!(
            result,
            Err(AppError::DocumentLoad(message))
                if message == "document path must be a regular file"
        ));

        fs::remove_dir_all(&dir).expect("test directory should be removed");
    }

    #[test]
    fn open_rejects_non_pdf_bytes() {
        let file = unique_temp_path("not_a_pdf.bin");
        fs::write(&file, b"plain text").expect("test file should be created");

        let result = PdfDoc::open(&file);
        assert!(matches!(result, Err(AppError::DocumentLoad(_))));

        fs::remove_file(&file).expect("test file should be removed");
    }

    #[test]
    fn open_accepts_valid_pdf_with_page_count() {
        let file = unique_temp_path("file.pdf");
        fs::write(&file, build_pdf(&["first page", "second page"]))
            .expect("test file should be created");

        let doc = PdfDoc::open(&file).expect("regular file path should be accepted");
        assert_eq!(doc.path(), file.as_path());
        assert_eq!(doc.page_count(), 2);
        assert_ne!(doc.doc_id(), 0);

        fs::remove_file(&file).expect("test file should be removed");
    }

    #[test]
    fn rasterize_rejects_out_of_range_page() {
        let file = unique_temp_path("render.pdf");
        fs::write(&file, build_pdf(&["hello"])).expect("test file should be created");
        let doc = PdfDoc::open(&file).expect("pdf should open");

        let err = doc.rasterize(8, 1.0).expect_err("page should be invalid");
        assert!(matches!(
            err,
            AppError::InvalidArgument(message) if message == "page index is out of range"
        ));

        fs::remove_file(&file).expect("test file should be removed");
    }

    #[test]
    fn page_intrinsic_size_reads_page_box() {
        let file = unique_temp_path("dimensions.pdf");
        fs::write(&file, build_pdf(&["hello"])).expect("test file should be created");
        let doc = PdfDoc::open(&file).expect("pdf should open");

        let (width, height) = doc
            .page_intrinsic_size(0)
            .expect("dimensions should be available");
        assert!((width - 300.0).abs() < f32::EPSILON);
        assert!((height - 300.0).abs() < f32::EPSILON);

        fs::remove_file(&file).expect("test file should be removed");
    }

    #[test]
    fn rasterize_produces_full_rgba_pixmap() {
        let file = unique_temp_path("pixmap.pdf");
        fs::write(&file, build_pdf(&["render me"])).expect("test file should be created");

        let doc = PdfDoc::open(&file).expect("pdf should open");
        let frame = doc.rasterize(0, 1.0).expect("render should succeed");
        assert!(frame.width > 0);
        assert!(frame.height > 0);
        assert_eq!(
            frame.pixels.len(),
            frame.width as usize * frame.height as usize * 4
        );

        fs::remove_file(&file).expect("test file should be removed");
    }
}
