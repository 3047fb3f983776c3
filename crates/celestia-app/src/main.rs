//! The binary entry point for the Celestia viewer.

use celestia_app::platform::PlatformDirs;
use celestia_app::window::run_with_config;
use celestia_config::{CliArgs, Config};
use clap::Parser;

fn main() {
    let args = CliArgs::parse();

    let dirs = match PlatformDirs::resolve_and_create() {
        Ok(dirs) => dirs,
        Err(e) => {
            eprintln!("Failed to initialize platform directories: {e}");
            std::process::exit(1);
        }
    };

    let config_dir = args.config.clone().unwrap_or_else(|| dirs.config_dir.clone());
    let (mut config, load_error) = match Config::load_or_create(&config_dir) {
        Ok(config) => (config, None),
        Err(e) => (Config::default(), Some(e)),
    };
    config.apply_cli_overrides(&args);

    celestia_log::init_logging(Some(&dirs.log_dir), cfg!(debug_assertions), Some(&config));
    if let Some(e) = load_error {
        tracing::warn!("Using default config, {} failed to load: {e}", config_dir.display());
    }
    tracing::info!(
        config = %config_dir.display(),
        data = %dirs.data_dir.display(),
        logs = %dirs.log_dir.display(),
        "Starting Celestia"
    );

    run_with_config(config);
}
