use std::path::Path;
use std::sync::Arc;

use crate::error::AppResult;

mod hayro;
mod traits;

pub use hayro::PdfDoc;
pub use traits::{DocumentBackend, RgbaFrame};

pub fn open_default_backend(path: impl AsRef<Path>) -> AppResult<Box<dyn DocumentBackend>> {
    PdfDoc::open(path).map(|doc| Box::new(doc) as Box<dyn DocumentBackend>)
}

pub fn load_default_shared_bytes(path: impl AsRef<Path>) -> AppResult<Arc<Vec<u8>>> {
    PdfDoc::load_shared_bytes(path)
}

pub fn open_default_backend_with_shared_bytes(
    path: impl AsRef<Path>,
    bytes: Arc<Vec<u8>>,
) -> AppResult<Box<dyn DocumentBackend>> {
    PdfDoc::open_with_shared_bytes(path, bytes).map(|doc| Box::new(doc) as Box<dyn DocumentBackend>)
}
