//! Configuration structs with defaults and RON persistence.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const CONFIG_FILE: &str = "config.ron";

/// Top-level viewer configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Window settings.
    pub window: WindowConfig,
    /// Renderer settings.
    pub render: RenderConfig,
    /// Debug/development settings.
    pub debug: DebugConfig,
}

/// Window configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WindowConfig {
    /// Window width in logical pixels.
    pub width: u32,
    /// Window height in logical pixels.
    pub height: u32,
    pub fullscreen: bool,
    /// Enable vsync (PresentMode::Fifo).
    pub vsync: bool,
    pub title: String,
}

/// Renderer configuration.
///
/// Flag sets are stored by name (`"stars"`, `"orbits"`, `"planet"`, ...) so the
/// file stays readable; the renderer maps unknown names to nothing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RenderConfig {
    /// Enabled render passes.
    pub render_flags: Vec<String>,
    /// Enabled label categories.
    pub label_flags: Vec<String>,
    /// Vertical field of view in degrees.
    pub fov_degrees: f32,
    /// Ambient light level, 0.0 - 1.0.
    pub ambient_light: f32,
    /// Texture resolution tier: "low", "medium" or "high".
    pub texture_resolution: String,
    /// Orbits smaller than this many pixels across are not drawn.
    pub min_orbit_size: f32,
    /// Stars farther than this many light years are skipped.
    pub distance_limit: f32,
    /// Faintest visible magnitude at a 45 degree field of view.
    pub faintest_magnitude: f32,
    /// Allow per-pixel fragment shading when the device supports it.
    pub fragment_shaders: bool,
    /// Allow vertex program shading when the device supports it.
    pub vertex_shaders: bool,
    /// Maximum number of cached orbit paths (0 = unbounded).
    pub orbit_cache_capacity: usize,
    /// Resample a cached orbit when its parameters change.
    pub invalidate_stale_orbits: bool,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log the render list every frame.
    pub log_render_list: bool,
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            fullscreen: false,
            vsync: true,
            title: "Celestia".to_string(),
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            render_flags: vec![
                "stars".to_string(),
                "planets".to_string(),
                "galaxies".to_string(),
                "cloud_maps".to_string(),
                "orbits".to_string(),
                "night_maps".to_string(),
                "atmospheres".to_string(),
                "eclipse_shadows".to_string(),
                "ring_shadows".to_string(),
                "auto_mag".to_string(),
                "comet_tails".to_string(),
            ],
            label_flags: vec!["planet".to_string()],
            fov_degrees: 45.0,
            ambient_light: 0.1,
            texture_resolution: "medium".to_string(),
            min_orbit_size: 20.0,
            distance_limit: 1.0e6,
            faintest_magnitude: 6.0,
            fragment_shaders: true,
            vertex_shaders: true,
            orbit_cache_capacity: 0,
            invalidate_stale_orbits: true,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_render_list: false,
            log_level: "info".to_string(),
        }
    }
}

/// Platform config directory for the viewer, e.g. `~/.config/celestia`.
pub fn default_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("celestia"))
}

// --- Load / Save / Reload ---

impl Config {
    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE);

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
            let config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(ConfigError::WriteError)?;

        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .separate_tuple_members(true)
            .enumerate_arrays(false);
        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::SerializeError)?;

        std::fs::write(config_dir.join(CONFIG_FILE), serialized)
            .map_err(ConfigError::WriteError)?;
        Ok(())
    }

    /// Re-read the file; `Some(new_config)` only when it differs from `self`.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let contents = std::fs::read_to_string(config_dir.join(CONFIG_FILE))
            .map_err(ConfigError::ReadError)?;
        let new_config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;

        if &new_config != self {
            log::info!("Config reloaded with changes");
            Ok(Some(new_config))
        } else {
            Ok(None)
        }
    }
}
