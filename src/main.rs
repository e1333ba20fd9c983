use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{error, info, warn};
use simplelog::{Config, LevelFilter, WriteLogger};

use pageturn::panic_handler::initialize_panic_handler;
use pageturn::render::{
    Frame, FrameListener, LiveZoom, RenderError, Rotation, Size, ZoomIntent, ZoomPhase,
};
use pageturn::settings::load_settings;
use pageturn::{MupdfRasterizer, RenderCoordinator};

const RENDER_TIMEOUT: Duration = Duration::from_secs(60);

/// Render a PDF page through the pageturn engine
#[derive(Parser, Debug)]
#[command(name = "pageturn", version, about)]
struct Args {
    /// PDF file to open
    file: PathBuf,

    /// Page number (1-based)
    #[arg(long, default_value_t = 1)]
    page: usize,

    /// Zoom ratio, or "fit" to fit the page into the viewport
    #[arg(long, value_parser = parse_zoom, default_value = "fit")]
    zoom: ZoomIntent,

    /// Clockwise rotation in degrees, a multiple of 90
    #[arg(long, value_parser = parse_rotation, default_value = "0", allow_hyphen_values = true)]
    rotation: Rotation,

    /// Viewport width in CSS pixels
    #[arg(long)]
    width: Option<f32>,

    /// Viewport height in CSS pixels
    #[arg(long)]
    height: Option<f32>,

    /// Device pixels per CSS pixel
    #[arg(long)]
    dpr: Option<f32>,

    /// Directory for the rendered image and text layer
    #[arg(long, default_value = ".")]
    out: PathBuf,

    /// Settings file (defaults to the user config directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print document properties as JSON
    #[arg(long)]
    info: bool,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,

    #[arg(long, default_value = "pageturn.log")]
    log_file: PathBuf,
}

fn parse_zoom(value: &str) -> Result<ZoomIntent, String> {
    if value.eq_ignore_ascii_case("fit") {
        return Ok(ZoomIntent::Fit);
    }
    match value.parse::<f32>() {
        Ok(ratio) if ratio.is_finite() && ratio > 0.0 => Ok(ZoomIntent::Ratio(ratio)),
        _ => Err(format!("expected \"fit\" or a positive ratio, got {value:?}")),
    }
}

fn parse_rotation(value: &str) -> Result<Rotation, String> {
    let degrees: i32 = value
        .parse()
        .map_err(|e| format!("invalid rotation {value:?}: {e}"))?;
    Rotation::from_degrees(degrees).ok_or_else(|| format!("{degrees} is not a multiple of 90"))
}

/// Host callbacks for a one-shot render
#[derive(Clone, Default)]
struct CliHost {
    errors: Arc<Mutex<Vec<(usize, RenderError)>>>,
}

impl CliHost {
    /// First error reported for `page`. Read-ahead failures on other pages
    /// only warn.
    fn error_for(&self, page: usize) -> Option<RenderError> {
        let errors = self.errors.lock().unwrap_or_else(PoisonError::into_inner);
        for (other, error) in errors.iter().filter(|(p, _)| *p != page) {
            warn!("Read-ahead of page {other} failed: {error}");
        }
        errors
            .iter()
            .find(|(p, _)| *p == page)
            .map(|(_, error)| error.clone())
    }
}

impl FrameListener for CliHost {
    fn on_frame_ready(&mut self, frame: &Frame) {
        info!(
            "Frame ready: page {} at zoom {} ({}x{} px, text layer: {})",
            frame.page,
            frame.zoom_ratio,
            frame.surface.width,
            frame.surface.height,
            frame.overlay.is_some()
        );
    }

    fn on_render_error(&mut self, page: usize, error: &RenderError) {
        error!("Page {page}: {error}");
        self.errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((page, error.clone()));
    }

    fn on_surface_resize(&mut self, css_size: Size) {
        info!("Surface resized to {}x{}", css_size.width, css_size.height);
    }

    fn on_live_zoom(&mut self, zoom: &LiveZoom) {
        info!("Live zoom to {} on page {}", zoom.zoom_ratio, zoom.page);
    }

    fn on_zoom_resolved(&mut self, page: usize, zoom_ratio: f32) {
        info!("Page {page} fits at zoom {zoom_ratio}");
    }
}

/// Install the file logger.
///
/// Loading settings can log, so the logger starts before the configured
/// level is known and the global max level is narrowed afterwards.
fn start_logging(log_file: &Path, verbose: bool) -> Result<()> {
    WriteLogger::init(
        LevelFilter::Trace,
        Config::default(),
        File::create(log_file)
            .with_context(|| format!("creating log file {}", log_file.display()))?,
    )?;
    log::set_max_level(if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    });
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    start_logging(&args.log_file, args.verbose)?;
    initialize_panic_handler();

    let settings = load_settings(args.config.as_deref());
    if !args.verbose {
        log::set_max_level(settings.log_level());
    }

    info!("Starting pageturn on {}", args.file.display());

    let mut config = settings.render_config();
    if let Some(width) = args.width {
        config.viewport.size.width = width;
    }
    if let Some(height) = args.height {
        config.viewport.size.height = height;
    }
    if let Some(dpr) = args.dpr {
        config.viewport.device_pixel_ratio = dpr;
    }

    let rasterizer = MupdfRasterizer::with_workers(&args.file, settings.workers)
        .with_context(|| format!("opening {}", args.file.display()))?;
    let host = CliHost::default();
    let mut coordinator = RenderCoordinator::new(rasterizer, Box::new(host.clone()), config);

    if args.info {
        let properties = coordinator
            .document_properties()
            .context("reading document properties")?;
        println!("{}", serde_json::to_string_pretty(&properties)?);
    }

    coordinator.submit_render(args.page, args.zoom, args.rotation, ZoomPhase::Committed);
    if !coordinator.run_until_idle(RENDER_TIMEOUT) {
        bail!("rendering page {} timed out", args.page);
    }

    if let Some(error) = host.error_for(args.page) {
        return Err(error).context(format!("rendering page {}", args.page));
    }

    let Some(frame) = coordinator.current_frame() else {
        bail!("page {} produced no frame", args.page);
    };

    fs::create_dir_all(&args.out)
        .with_context(|| format!("creating output directory {}", args.out.display()))?;

    let image_path = args.out.join(format!("page-{}.png", frame.page));
    let surface = &frame.surface;
    let image = image::RgbImage::from_raw(surface.width, surface.height, surface.pixels.clone())
        .context("pixel buffer does not match surface size")?;
    image
        .save(&image_path)
        .with_context(|| format!("writing {}", image_path.display()))?;
    println!("{}", image_path.display());

    if let Some(overlay) = &frame.overlay {
        let text_path = args.out.join(format!("page-{}.text.json", frame.page));
        fs::write(&text_path, serde_json::to_string_pretty(overlay.as_ref())?)
            .with_context(|| format!("writing {}", text_path.display()))?;
        println!("{}", text_path.display());
    }

    let cached: Vec<String> = coordinator
        .cache()
        .keys_lru_first()
        .iter()
        .map(ToString::to_string)
        .collect();
    info!("Cached after render: {}", cached.join(", "));

    info!("Shutting down pageturn");
    Ok(())
}

#[cfg(test)]
mod tests {
    use log::Log;

    use super::*;

    #[test]
    fn neighbour_failure_does_not_fail_the_requested_page() {
        let mut host = CliHost::default();
        host.on_render_error(2, &RenderError::raster(2, "corrupt stream"));

        assert!(host.error_for(1).is_none());
        assert_eq!(host.error_for(2), Some(RenderError::raster(2, "corrupt stream")));
    }

    #[test]
    fn requested_page_error_wins_over_earlier_ones() {
        let mut host = CliHost::default();
        host.on_render_error(4, &RenderError::raster(4, "read-ahead"));
        host.on_render_error(3, &RenderError::raster(3, "foreground"));

        assert_eq!(host.error_for(3), Some(RenderError::raster(3, "foreground")));
    }

    #[test]
    fn settings_problems_reach_the_log_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let log_file = dir.path().join("pageturn.log");
        let config = dir.path().join("config.yaml");
        fs::write(&config, "max_cached: [not, a, number]\n").expect("write config");

        start_logging(&log_file, false).expect("logger");
        let settings = load_settings(Some(&config));
        log::logger().flush();

        assert_eq!(settings.max_cached, 6);
        let logged = fs::read_to_string(&log_file).expect("log file");
        assert!(logged.contains("Failed to parse settings file"));
    }

    #[test]
    fn parses_fit_and_ratio_zoom() {
        assert_eq!(parse_zoom("FIT"), Ok(ZoomIntent::Fit));
        assert_eq!(parse_zoom("1.5"), Ok(ZoomIntent::Ratio(1.5)));
        assert!(parse_zoom("-2").is_err());
        assert!(parse_rotation("45").is_err());
        assert_eq!(parse_rotation("-90"), Ok(Rotation::Deg270));
    }
}
