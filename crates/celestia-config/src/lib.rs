//! Configuration for the Celestia renderer and its viewer.
//!
//! Settings persist to disk as a RON file, can be overridden from the command
//! line, and tolerate missing or unknown fields so old files keep loading.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{Config, DebugConfig, RenderConfig, WindowConfig, default_config_dir};
pub use error::ConfigError;
