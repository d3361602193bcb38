use std::path::Path;
use std::sync::Arc;

use crate::error::AppResult;

/// One rasterized page. Pixels are RGBA8, row-major, shared by refcount so
/// cache, delivery, and surface can hold the same buffer without copying.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RgbaFrame {
    pub width: u32,
    pub height: u32,
    pub pixels: Arc<[u8]>,
}

impl RgbaFrame {
    pub fn byte_len(&self) -> usize {
        self.pixels.len()
    }

    pub fn pixels_to_vec(&self) -> Vec<u8> {
        self.pixels.as_ref().to_vec()
    }
}

/// A parsed paginated document, treated as an opaque, possibly slow,
/// synchronous rasterization service.
///
/// `rasterize` renders the untransformed page; orientation, flattening, and
/// theming are applied by the render pipeline from the job's snapshot. Each
/// worker thread owns its own backend instance (opened from shared bytes),
/// so implementations only need to be `Send`.
pub trait DocumentBackend: Send {
    fn path(&self) -> &Path;
    fn doc_id(&self) -> u64;
    fn page_count(&self) -> usize;
    /// Untransformed page box size in points.
    fn page_intrinsic_size(&self, page: usize) -> AppResult<(f32, f32)>;
    fn rasterize(&self, page: usize, scale: f32) -> AppResult<RgbaFrame>;
}
