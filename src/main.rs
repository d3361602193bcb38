use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use log::LevelFilter;
use simplelog::{ColorChoice, Config as LogConfig, TermLogger, TerminalMode};

use vellum::backend::RgbaFrame;
use vellum::config::Config;
use vellum::controller::SessionController;
use vellum::error::{AppError, AppResult};
use vellum::geometry::Rotation;
use vellum::raster;
use vellum::surface::PresentationSurface;

#[derive(Parser, Debug)]
#[command(
    name = "vellum",
    version,
    about = "Headless render driver for paginated documents"
)]
struct Cli {
    /// Document to open.
    file: PathBuf,

    /// Render with inverted page colors.
    #[arg(long)]
    dark: bool,

    /// Whole-document rotation in degrees (0, 90, 180 or 270).
    #[arg(long, default_value_t = 0)]
    rotate: u16,

    /// Display zoom factor, clamped to 0.1..=5.0.
    #[arg(long, conflicts_with = "fit_width")]
    zoom: Option<f32>,

    /// Fit pages to a viewport of this width instead of --zoom.
    #[arg(long)]
    fit_width: Option<f32>,

    /// Export rendered pages as PNGs into this directory, at display size.
    #[arg(long)]
    out_dir: Option<PathBuf>,

    /// Maximum seconds to wait for the render pass.
    #[arg(long, default_value_t = 120)]
    timeout_secs: u64,

    /// Verbose logging.
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();
    init_logger(cli.verbose);
    if let Err(err) = run(cli) {
        log::error!("{err}");
        std::process::exit(1);
    }
}

fn init_logger(verbose: bool) {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    let _ = TermLogger::init(
        level,
        LogConfig::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    );
}

fn run(cli: Cli) -> AppResult<()> {
    let rotation = Rotation::from_degrees(cli.rotate)
        .ok_or_else(|| AppError::invalid_argument("rotation must be one of 0, 90, 180, 270"))?;

    let config = Config::load()?;
    let mut controller = SessionController::new(config);
    let mut surface = CliSurface::new(cli.out_dir)?;

    controller.open(&cli.file, &mut surface)?;
    if rotation != Rotation::Deg0 {
        controller.rotate(rotation.quarter_turns() as i32, &mut surface);
    }
    if cli.dark {
        controller.toggle_dark_mode(&mut surface);
    }
    if let Some(viewport_width) = cli.fit_width {
        controller.fit_to_width(viewport_width);
    } else if let Some(zoom) = cli.zoom {
        controller.set_zoom(zoom);
    }

    let completed =
        controller.pump_until_idle(&mut surface, Duration::from_secs(cli.timeout_secs.max(1)));
    for (page, view) in surface.pages.iter().enumerate() {
        if let PageView::Failed { message } = view {
            log::warn!("page {} was not rendered: {message}", page + 1);
        }
    }
    log::info!(
        "rendered {}/{} pages ({} failed)",
        surface.rendered_count(),
        controller.page_count(),
        controller.failed_pages()
    );
    if !completed {
        return Err(AppError::invalid_argument(
            "render pass did not finish before the timeout",
        ));
    }
    if surface.export_failures > 0 {
        return Err(AppError::invalid_argument(format!(
            "{} page(s) could not be exported",
            surface.export_failures
        )));
    }
    Ok(())
}

enum PageView {
    Placeholder { width: f32, height: f32 },
    Rendered { width: f32, height: f32 },
    Failed { message: String },
}

/// Presentation surface for the headless driver: a typed registry of page
/// views, optionally exporting each delivered bitmap as a PNG.
struct CliSurface {
    out_dir: Option<PathBuf>,
    pages: Vec<PageView>,
    export_failures: usize,
}

impl CliSurface {
    fn new(out_dir: Option<PathBuf>) -> AppResult<Self> {
        if let Some(dir) = &out_dir {
            fs::create_dir_all(dir).map_err(|source| {
                AppError::io_with_context(
                    source,
                    format!("failed to create output directory {}", dir.display()),
                )
            })?;
        }
        Ok(Self {
            out_dir,
            pages: Vec::new(),
            export_failures: 0,
        })
    }

    fn rendered_count(&self) -> usize {
        self.pages
            .iter()
            .filter(|view| matches!(view, PageView::Rendered { .. }))
            .count()
    }

    fn set_page(&mut self, page: usize, view: PageView) {
        while self.pages.len() <= page {
            self.pages.push(PageView::Placeholder {
                width: 0.0,
                height: 0.0,
            });
        }
        self.pages[page] = view;
    }

    fn export(
        &self,
        page: usize,
        frame: &RgbaFrame,
        display_width: f32,
        display_height: f32,
    ) -> AppResult<()> {
        let Some(dir) = &self.out_dir else {
            return Ok(());
        };

        let target_width = (display_width.round() as u32).max(1);
        let target_height = (display_height.round() as u32).max(1);
        let scaled = raster::resize_frame(frame, target_width, target_height)?;

        let image =
            image::RgbaImage::from_raw(scaled.width, scaled.height, scaled.pixels_to_vec()).ok_or(
                AppError::invalid_argument("rgba frame pixels length does not match dimensions"),
            )?;
        let path = dir.join(format!("page-{:03}.png", page + 1));
        image
            .save(&path)
            .map_err(|err| {
                AppError::invalid_argument(format!("failed to write {}: {err}", path.display()))
            })?;
        log::debug!("wrote {}", path.display());
        Ok(())
    }
}

impl PresentationSurface for CliSurface {
    fn on_placeholder_ready(&mut self, page: usize, estimated_width: f32, estimated_height: f32) {
        log::debug!(
            "page {} placeholder {:.0}x{:.0}",
            page + 1,
            estimated_width,
            estimated_height
        );
        self.set_page(
            page,
            PageView::Placeholder {
                width: estimated_width,
                height: estimated_height,
            },
        );
    }

    fn on_page_rendered(
        &mut self,
        page: usize,
        frame: RgbaFrame,
        display_width: f32,
        display_height: f32,
    ) {
        log::info!(
            "page {} rendered at {:.0}x{:.0}",
            page + 1,
            display_width,
            display_height
        );
        if let Some(PageView::Placeholder { width, height }) = self.pages.get(page) {
            log::debug!(
                "page {} placeholder estimate {:.0}x{:.0} superseded",
                page + 1,
                width,
                height
            );
        }
        if let Err(err) = self.export(page, &frame, display_width, display_height) {
            log::error!("{err}");
            self.export_failures += 1;
        }
        self.set_page(
            page,
            PageView::Rendered {
                width: display_width,
                height: display_height,
            },
        );
    }

    fn on_progress(&mut self, fraction: f64) {
        log::debug!("progress {:.0}%", fraction * 100.0);
    }

    fn on_load_error(&mut self, message: &str) {
        log::error!("load failed: {message}");
    }

    fn on_page_render_error(&mut self, page: usize, message: &str) {
        log::warn!("page {} failed: {message}", page + 1);
        self.set_page(
            page,
            PageView::Failed {
                message: message.to_string(),
            },
        );
    }
}
