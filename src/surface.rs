use crate::backend::RgbaFrame;

/// Seam between the render core and the display layer.
///
/// Every callback runs on the control thread during a delivery drain, never
/// concurrently with another callback or with zoom/geometry updates. A
/// surface addresses pages by index and keeps its own typed registry of
/// page views.
pub trait PresentationSurface {
    /// Estimated page geometry, available before any bitmap exists. The
    /// estimate prevents layout shift; the rendered bitmap's true aspect
    /// ratio takes over on delivery.
    fn on_placeholder_ready(&mut self, page: usize, estimated_width: f32, estimated_height: f32);

    /// A fresh bitmap for `page`, with display dimensions under the current
    /// zoom. Ownership of the frame transfers to the surface.
    fn on_page_rendered(
        &mut self,
        page: usize,
        frame: RgbaFrame,
        display_width: f32,
        display_height: f32,
    );

    /// Fraction of the current epoch's pages that are done (rendered or
    /// failed), in `0.0..=1.0`.
    fn on_progress(&mut self, fraction: f64);

    /// The document could not be opened; the session stays empty.
    fn on_load_error(&mut self, message: &str);

    /// One page failed to render. Non-fatal: sibling pages are unaffected.
    fn on_page_render_error(&mut self, page: usize, message: &str);
}
