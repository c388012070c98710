use std::path::{Path, PathBuf};
use tokio::fs;

use crate::error::{Result, Xml2MdError};

/// Input documents found for one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSet {
    /// Absolute directory that relative output paths are computed from
    pub base: PathBuf,
    /// Absolute document paths in directory enumeration order
    pub files: Vec<PathBuf>,
}

impl FileSet {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }
}

/// Async file discovery for a single file or a directory tree
#[derive(Debug, Clone)]
pub struct FileDiscovery {
    /// Document suffix to include, lowercase and without the dot
    extension: String,
    /// Descend into subdirectories
    recurse: bool,
}

impl FileDiscovery {
    /// Create a new FileDiscovery instance matching `.xml`
    pub fn new() -> Self {
        Self {
            extension: "xml".to_string(),
            recurse: false,
        }
    }

    /// Set the document suffix to discover
    pub fn with_extension(mut self, extension: impl AsRef<str>) -> Self {
        self.extension = extension.as_ref().trim_start_matches('.').to_lowercase();
        self
    }

    /// Set whether subdirectories are walked
    pub fn with_recursion(mut self, recurse: bool) -> Self {
        self.recurse = recurse;
        self
    }

    /// Collect documents from `input`, which may be a file or a directory.
    pub async fn collect(&self, input: &Path) -> Result<FileSet> {
        let input = std::path::absolute(input)?;
        let metadata = fs::metadata(&input).await?;

        if metadata.is_file() {
            if !self.should_process(&input) {
                return Err(Xml2MdError::NotADocument {
                    path: input,
                    extension: self.extension.clone(),
                });
            }
            let base = input
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| input.clone());
            return Ok(FileSet {
                base,
                files: vec![input],
            });
        }

        if !metadata.is_dir() {
            return Err(Xml2MdError::NotFileOrDirectory { path: input });
        }

        let mut files = Vec::new();
        self.walk(&input, 0, &mut files).await?;
        log::debug!(
            "discovered {} document(s) under {}",
            files.len(),
            input.display()
        );

        Ok(FileSet { base: input, files })
    }

    /// Recursive helper for discovering files
    fn walk<'a>(
        &'a self,
        dir: &'a Path,
        depth: usize,
        files: &'a mut Vec<PathBuf>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let mut read_dir = fs::read_dir(dir).await?;

            while let Some(entry) = read_dir.next_entry().await? {
                let entry_path = entry.path();
                // file_type() does not follow symlinks, so links are neither
                // files nor directories here and get skipped
                let file_type = entry.file_type().await?;

                if file_type.is_dir() {
                    if self.recurse {
                        self.walk(&entry_path, depth + 1, files).await?;
                    }
                } else if file_type.is_file() && self.should_process(&entry_path) {
                    files.push(entry_path);
                } else {
                    log::trace!("skipping {} (depth {})", entry_path.display(), depth);
                }
            }

            Ok(())
        })
    }

    /// Check if a file name ends in `.<extension>` (case-insensitive).
    /// A bare `.xml` counts.
    pub fn should_process(&self, path: &Path) -> bool {
        path.file_name()
            .and_then(|name| name.to_str())
            .and_then(|name| strip_document_suffix(name, &self.extension))
            .is_some()
    }
}

/// `name` without its trailing `.<extension>`, compared case-insensitively.
pub fn strip_document_suffix<'a>(name: &'a str, extension: &str) -> Option<&'a str> {
    let extension = extension.trim_start_matches('.');
    let cut = name.len().checked_sub(extension.len() + 1)?;
    if !name.is_char_boundary(cut) {
        return None;
    }
    let (stem, suffix) = name.split_at(cut);
    let ext = suffix.strip_prefix('.')?;
    ext.eq_ignore_ascii_case(extension).then_some(stem)
}

impl Default for FileDiscovery {
    fn default() -> Self {
        Self::new()
    }
}
