use log::{LevelFilter, debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::render::{DEFAULT_MAX_CACHED, RenderConfig, Size, Viewport, viewport};

pub const CURRENT_VERSION: u32 = 2;
const SETTINGS_FILENAME: &str = "config.yaml";
const APP_NAME: &str = "pageturn";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default = "default_max_cached")]
    pub max_cached: usize,

    #[serde(default = "default_min_zoom")]
    pub min_zoom: f32,

    #[serde(default = "default_max_zoom")]
    pub max_zoom: f32,

    #[serde(default = "default_max_render_pixels")]
    pub max_render_pixels: u64,

    #[serde(default = "default_pan_padding")]
    pub pan_padding: f32,

    #[serde(default = "default_true")]
    pub prerender: bool,

    #[serde(default = "default_true")]
    pub read_behind: bool,

    /// Render threads used by the MuPDF backend
    #[serde(default = "default_workers")]
    pub workers: usize,

    #[serde(default = "default_viewport_width")]
    pub viewport_width: f32,

    #[serde(default = "default_viewport_height")]
    pub viewport_height: f32,

    #[serde(default = "default_device_pixel_ratio")]
    pub device_pixel_ratio: f32,

    /// off, error, warn, info, debug or trace
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_true() -> bool {
    true
}

fn default_version() -> u32 {
    CURRENT_VERSION
}

fn default_max_cached() -> usize {
    DEFAULT_MAX_CACHED
}

fn default_min_zoom() -> f32 {
    viewport::MIN_ZOOM
}

fn default_max_zoom() -> f32 {
    viewport::MAX_ZOOM
}

fn default_max_render_pixels() -> u64 {
    viewport::MAX_RENDER_PIXELS
}

fn default_pan_padding() -> f32 {
    viewport::PAN_PADDING
}

fn default_workers() -> usize {
    2
}

fn default_viewport_width() -> f32 {
    Viewport::default().size.width
}

fn default_viewport_height() -> f32 {
    Viewport::default().size.height
}

fn default_device_pixel_ratio() -> f32 {
    Viewport::default().device_pixel_ratio
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            max_cached: default_max_cached(),
            min_zoom: default_min_zoom(),
            max_zoom: default_max_zoom(),
            max_render_pixels: default_max_render_pixels(),
            pan_padding: default_pan_padding(),
            prerender: true,
            read_behind: true,
            workers: default_workers(),
            viewport_width: default_viewport_width(),
            viewport_height: default_viewport_height(),
            device_pixel_ratio: default_device_pixel_ratio(),
            log_level: default_log_level(),
        }
    }
}

impl Settings {
    /// Engine configuration described by these settings
    #[must_use]
    pub fn render_config(&self) -> RenderConfig {
        let (min_zoom, max_zoom) = if self.min_zoom <= self.max_zoom {
            (self.min_zoom, self.max_zoom)
        } else {
            warn!(
                "min_zoom {} exceeds max_zoom {}, using defaults",
                self.min_zoom, self.max_zoom
            );
            (default_min_zoom(), default_max_zoom())
        };

        RenderConfig {
            max_cached: self.max_cached.max(1),
            min_zoom,
            max_zoom,
            max_render_pixels: self.max_render_pixels,
            pan_padding: self.pan_padding,
            prerender: self.prerender,
            read_behind: self.read_behind,
            viewport: Viewport {
                size: Size::new(self.viewport_width, self.viewport_height),
                device_pixel_ratio: self.device_pixel_ratio,
            },
        }
    }

    #[must_use]
    pub fn log_level(&self) -> LevelFilter {
        self.log_level.parse().unwrap_or_else(|_| {
            warn!("Unknown log level {:?}, using info", self.log_level);
            LevelFilter::Info
        })
    }
}

pub fn preferred_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|config| config.join(APP_NAME).join(SETTINGS_FILENAME))
}

/// Load settings from `path`, or from the user config directory.
///
/// A missing file is created with defaults. Unreadable or malformed files
/// fall back to defaults without touching the file.
#[must_use]
pub fn load_settings(path: Option<&Path>) -> Settings {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => match preferred_config_path() {
            Some(path) => path,
            None => {
                warn!("Could not determine config directory, using default settings");
                return Settings::default();
            }
        },
    };

    if path.exists() {
        load_settings_from_path(&path)
    } else {
        info!("Settings file not found, creating with defaults at {path:?}");
        let settings = Settings::default();
        save_settings_to_file(&settings, &path);
        settings
    }
}

fn load_settings_from_path(path: &Path) -> Settings {
    match fs::read_to_string(path) {
        Ok(content) => match serde_yaml::from_str::<Settings>(&content) {
            Ok(mut settings) => {
                debug!("Loaded settings from {path:?}");

                if settings.version < CURRENT_VERSION {
                    migrate_settings(&mut settings);
                    save_settings_to_file(&settings, path);
                }
                settings
            }
            Err(e) => {
                error!("Failed to parse settings file {path:?}: {e}");
                Settings::default()
            }
        },
        Err(e) => {
            error!("Failed to read settings file {path:?}: {e}");
            Settings::default()
        }
    }
}

fn migrate_settings(settings: &mut Settings) {
    info!(
        "Migrating settings from v{} to v{}",
        settings.version, CURRENT_VERSION
    );

    // v1 stored a cache size of zero to mean "unbounded"
    if settings.version < 2 && settings.max_cached == 0 {
        settings.max_cached = DEFAULT_MAX_CACHED;
    }

    settings.version = CURRENT_VERSION;
}

pub fn save_settings_to_file(settings: &Settings, path: &Path) {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            if let Err(e) = fs::create_dir_all(parent) {
                error!("Failed to create config directory {parent:?}: {e}");
                return;
            }
        }
    }

    let body = match serde_yaml::to_string(settings) {
        Ok(body) => body,
        Err(e) => {
            error!("Failed to serialize settings: {e}");
            return;
        }
    };

    match fs::write(path, format!("{SETTINGS_HEADER}{body}")) {
        Ok(()) => debug!("Saved settings to {path:?}"),
        Err(e) => error!("Failed to save settings to {path:?}: {e}"),
    }
}

const SETTINGS_HEADER: &str = r"# ============================================================================
# pageturn settings
# ============================================================================
# max_cached         rendered pages kept in memory
# min_zoom/max_zoom  zoom ratio bounds
# max_render_pixels  rasters above this pixel count are rendered at lower density
# prerender          render a neighbouring page after each page shown
# read_behind        also render the previous page after the look-ahead
#
";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_created_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.yaml");

        let settings = load_settings(Some(&path));
        assert_eq!(settings, Settings::default());
        assert!(path.exists());

        let written = fs::read_to_string(&path).unwrap();
        assert!(written.starts_with("# ===="));
        assert!(written.contains("max_cached: 6"));
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "version: 2\nmax_cached: 3\nprerender: false\n").unwrap();

        let settings = load_settings(Some(&path));
        assert_eq!(settings.max_cached, 3);
        assert!(!settings.prerender);
        assert!(settings.read_behind);
        assert_eq!(settings.max_zoom, viewport::MAX_ZOOM);
    }

    #[test]
    fn old_version_is_migrated_and_saved() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "version: 1\nmax_cached: 0\n").unwrap();

        let settings = load_settings(Some(&path));
        assert_eq!(settings.version, CURRENT_VERSION);
        assert_eq!(settings.max_cached, DEFAULT_MAX_CACHED);

        let reloaded = load_settings(Some(&path));
        assert_eq!(reloaded, settings);
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "max_cached: [not, a, number]\n").unwrap();

        assert_eq!(load_settings(Some(&path)), Settings::default());
    }

    #[test]
    fn render_config_mirrors_settings() {
        let settings = Settings {
            max_cached: 4,
            prerender: false,
            viewport_width: 800.0,
            viewport_height: 600.0,
            device_pixel_ratio: 2.0,
            ..Settings::default()
        };
        let config = settings.render_config();

        assert_eq!(config.max_cached, 4);
        assert!(!config.prerender);
        assert_eq!(config.viewport, Viewport::new(800.0, 600.0, 2.0));
    }

    #[test]
    fn inverted_zoom_bounds_are_replaced() {
        let settings = Settings {
            min_zoom: 2.0,
            max_zoom: 1.0,
            ..Settings::default()
        };
        let config = settings.render_config();
        assert_eq!(config.min_zoom, viewport::MIN_ZOOM);
        assert_eq!(config.max_zoom, viewport::MAX_ZOOM);
    }

    #[test]
    fn log_level_parses_case_insensitively() {
        let settings = Settings {
            log_level: "DEBUG".to_string(),
            ..Settings::default()
        };
        assert_eq!(settings.log_level(), LevelFilter::Debug);

        let settings = Settings {
            log_level: "chatty".to_string(),
            ..Settings::default()
        };
        assert_eq!(settings.log_level(), LevelFilter::Info);
    }
}
