//! Where the viewer keeps its config, data, cache and logs on each OS.

use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("could not determine OS configuration directory")]
    NoConfigDir,
    #[error("platform I/O error: {0}")]
    Io(#[from] io::Error),
}

/// OS-specific directories for the viewer, following XDG on Linux, Known
/// Folders on Windows and Library on macOS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformDirs {
    /// Holds `config.ron`; the same directory
    /// [`celestia_config::default_config_dir`] reports.
    pub config_dir: PathBuf,
    /// Texture and mesh data.
    pub data_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub log_dir: PathBuf,
}

pub const APP_NAME: &str = "celestia";

impl PlatformDirs {
    /// Resolve directories without creating them.
    pub fn resolve() -> Result<Self, PlatformError> {
        let config_dir = dirs::config_dir()
            .ok_or(PlatformError::NoConfigDir)?
            .join(APP_NAME);

        let data_dir = dirs::data_dir()
            .map(|dir| dir.join(APP_NAME))
            .unwrap_or_else(|| config_dir.join("data"));
        let cache_dir = dirs::cache_dir()
            .map(|dir| dir.join(APP_NAME))
            .unwrap_or_else(|| config_dir.join("cache"));

        Ok(Self {
            log_dir: config_dir.join("logs"),
            config_dir,
            data_dir,
            cache_dir,
        })
    }

    /// Resolve directories and create them on disk.
    pub fn resolve_and_create() -> Result<Self, PlatformError> {
        let dirs = Self::resolve()?;
        dirs.create_dirs()?;
        Ok(dirs)
    }

    /// Directories rooted under `root` instead of the OS locations.
    pub fn resolve_with_root(root: &Path) -> Self {
        let app_dir = root.join(APP_NAME);
        Self {
            config_dir: app_dir.clone(),
            data_dir: app_dir.join("data"),
            cache_dir: app_dir.join("cache"),
            log_dir: app_dir.join("logs"),
        }
    }

    pub fn create_dirs(&self) -> Result<(), PlatformError> {
        for dir in [&self.config_dir, &self.data_dir, &self.cache_dir, &self.log_dir] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_dirs_resolve() {
        let dirs = PlatformDirs::resolve().expect("PlatformDirs::resolve() failed");
        assert!(dirs.config_dir.is_absolute());
        assert!(dirs.data_dir.is_absolute());
        assert!(dirs.cache_dir.is_absolute());
        assert!(dirs.log_dir.starts_with(&dirs.config_dir));
        assert!(dirs.config_dir.ends_with(APP_NAME));
    }

    #[test]
    fn test_config_dir_matches_config_crate() {
        let dirs = PlatformDirs::resolve().expect("resolve failed");
        assert_eq!(Some(dirs.config_dir), celestia_config::default_config_dir());
    }

    #[test]
    fn test_directory_creation() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let dirs = PlatformDirs::resolve_with_root(tmp.path());
        dirs.create_dirs().expect("create_dirs failed for temp root");

        assert!(dirs.config_dir.exists());
        assert!(dirs.data_dir.exists());
        assert!(dirs.cache_dir.exists());
        assert!(dirs.log_dir.exists());
        assert!(dirs.data_dir.starts_with(tmp.path()));
    }

    #[test]
    fn test_create_dirs_is_idempotent() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let dirs = PlatformDirs::resolve_with_root(tmp.path());
        dirs.create_dirs().expect("first create");
        dirs.create_dirs().expect("second create");
    }

    #[test]
    fn test_create_dirs_reports_io_errors() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let blocker = tmp.path().join(APP_NAME);
        std::fs::write(&blocker, b"not a directory").expect("write blocker");

        let dirs = PlatformDirs::resolve_with_root(tmp.path());
        assert!(matches!(dirs.create_dirs(), Err(PlatformError::Io(_))));
    }
}
