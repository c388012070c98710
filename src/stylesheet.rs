//! Stylesheet lookup
//!
//! An explicit `--xslt` path always wins and is never silently replaced. Without
//! one, the default file name is searched in the working directory, next to the
//! installed binary, and finally in the package data directories.

use std::path::{Path, PathBuf};

use crate::config::StylesheetConfig;
use crate::error::{Result, Xml2MdError};

/// Stylesheet file name searched for when none is given
pub const DEFAULT_STYLESHEET: &str = "xform-md.xslt";

/// Ordered set of places a default stylesheet may live
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StylesheetLocator {
    file_name: String,
    cwd: PathBuf,
    install_dirs: Vec<PathBuf>,
    package_dirs: Vec<PathBuf>,
}

impl StylesheetLocator {
    pub fn new(file_name: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            file_name: file_name.into(),
            cwd: cwd.into(),
            install_dirs: Vec::new(),
            package_dirs: Vec::new(),
        }
    }

    /// Locator for the running process: current directory, executable
    /// location, configured search dirs and the platform data directory.
    pub fn from_env(config: &StylesheetConfig) -> Result<Self> {
        let cwd = std::env::current_dir()?;

        let mut install_dirs = Vec::new();
        if let Some(exe_dir) = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
        {
            if let Some(parent) = exe_dir.parent() {
                install_dirs.push(exe_dir.clone());
                install_dirs.push(parent.to_path_buf());
            } else {
                install_dirs.push(exe_dir);
            }
        }

        let mut package_dirs = config.search_dirs.clone();
        if let Some(data_dir) = dirs::data_dir() {
            package_dirs.push(data_dir.join("xml2md"));
        }

        Ok(Self::new(config.file_name.clone(), cwd)
            .with_install_dirs(install_dirs)
            .with_package_dirs(package_dirs))
    }

    pub fn with_install_dirs(mut self, dirs: Vec<PathBuf>) -> Self {
        self.install_dirs = dirs;
        self
    }

    pub fn with_package_dirs(mut self, dirs: Vec<PathBuf>) -> Self {
        self.package_dirs = dirs;
        self
    }

    /// Default-name candidates in search order
    pub fn candidates(&self) -> Vec<PathBuf> {
        std::iter::once(&self.cwd)
            .chain(&self.install_dirs)
            .chain(&self.package_dirs)
            .map(|dir| dir.join(&self.file_name))
            .collect()
    }

    /// Resolve the stylesheet to use.
    pub async fn resolve(&self, explicit: Option<&Path>) -> Result<PathBuf> {
        if let Some(explicit) = explicit {
            let path = self.absolutize(explicit);
            if is_file(&path).await {
                return Ok(path);
            }
            return Err(Xml2MdError::StylesheetNotFound { path });
        }

        let candidates = self.candidates();
        for candidate in &candidates {
            if is_file(candidate).await {
                log::debug!("stylesheet found at {}", candidate.display());
                return Ok(candidate.clone());
            }
            log::trace!("no stylesheet at {}", candidate.display());
        }

        Err(Xml2MdError::NoStylesheet {
            file_name: self.file_name.clone(),
            searched: candidates,
        })
    }

    fn absolutize(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.cwd.join(path)
        }
    }
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}
