//! Command-line argument parsing for the viewer.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

/// Celestia command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug)]
#[command(name = "celestia", about = "Real-time space simulation viewer")]
pub struct CliArgs {
    /// Window width.
    #[arg(long)]
    pub width: Option<u32>,

    /// Window height.
    #[arg(long)]
    pub height: Option<u32>,

    /// Start in fullscreen.
    #[arg(long)]
    pub fullscreen: Option<bool>,

    /// Vertical field of view in degrees.
    #[arg(long)]
    pub fov: Option<f32>,

    /// Faintest visible star magnitude.
    #[arg(long)]
    pub faintest_mag: Option<f32>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(w) = args.width {
            self.window.width = w;
        }
        if let Some(h) = args.height {
            self.window.height = h;
        }
        if let Some(fs) = args.fullscreen {
            self.window.fullscreen = fs;
        }
        if let Some(fov) = args.fov {
            self.render.fov_degrees = fov.clamp(0.001, 120.0);
        }
        if let Some(mag) = args.faintest_mag {
            self.render.faintest_magnitude = mag;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_args() -> CliArgs {
        CliArgs {
            width: None,
            height: None,
            fullscreen: None,
            fov: None,
            faintest_mag: None,
            log_level: None,
            config: None,
        }
    }

    #[test]
    fn test_cli_override() {
        let mut config = Config::default();
        let args = CliArgs {
            width: Some(1920),
            fov: Some(30.0),
            log_level: Some("debug".to_string()),
            ..no_args()
        };
        config.apply_cli_overrides(&args);
        assert_eq!(config.window.width, 1920);
        assert_eq!(config.render.fov_degrees, 30.0);
        assert_eq!(config.debug.log_level, "debug");
        assert_eq!(config.window.height, 720);
    }

    #[test]
    fn test_cli_fov_is_clamped() {
        let mut config = Config::default();
        config.apply_cli_overrides(&CliArgs {
            fov: Some(500.0),
            ..no_args()
        });
        assert_eq!(config.render.fov_degrees, 120.0);
    }

    #[test]
    fn test_cli_no_override() {
        let mut config = Config::default();
        config.apply_cli_overrides(&no_args());
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_parse_from_args() {
        let args = CliArgs::parse_from(["celestia", "--width", "640", "--faintest-mag", "7.5"]);
        assert_eq!(args.width, Some(640));
        assert_eq!(args.faintest_mag, Some(7.5));
        assert!(args.config.is_none());
    }
}
