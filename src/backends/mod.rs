//! Transform backends
//!
//! Every backend turns one input document into one output file using one
//! stylesheet. They share nothing, so the orchestrator can swap them freely.

pub mod embedded;
pub mod external;
pub mod wasm;

use async_trait::async_trait;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::engine::EngineKind;
use crate::error::{EngineError, EngineResult};

pub use embedded::EmbeddedBackend;
pub use external::ExternalToolkitBackend;
pub use wasm::WasmBackend;

/// Single-document conversion contract
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TransformBackend: Send + Sync {
    /// Engine name used in log lines
    fn name(&self) -> &'static str;

    /// Transform `input` with `stylesheet` and write the result to `output`.
    ///
    /// The parent directory of `output` exists when this is called. On error
    /// no file is left at `output`.
    async fn transform(&self, input: &Path, stylesheet: &Path, output: &Path) -> EngineResult<()>;
}

/// Lazily created backends, keyed by engine
pub struct BackendRegistry {
    config: Config,
    backends: HashMap<EngineKind, Box<dyn TransformBackend>>,
}

impl BackendRegistry {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            backends: HashMap::new(),
        }
    }

    /// Use `backend` whenever `kind` is requested
    pub fn with_backend(mut self, kind: EngineKind, backend: Box<dyn TransformBackend>) -> Self {
        self.backends.insert(kind, backend);
        self
    }

    /// Backend for an engine name; unknown names fail here, per file.
    pub fn resolve(&mut self, name: &str) -> EngineResult<&dyn TransformBackend> {
        let kind: EngineKind = name.parse()?;
        let config = &self.config;
        let backend = self.backends.entry(kind).or_insert_with(|| {
            log::debug!("creating {} backend", kind);
            create_backend(kind, config)
        });
        Ok(&**backend)
    }
}

fn create_backend(kind: EngineKind, config: &Config) -> Box<dyn TransformBackend> {
    match kind {
        EngineKind::Embedded => Box::new(EmbeddedBackend::new()),
        EngineKind::WasmEmbedded => Box::new(WasmBackend::new(config.wasm.module.clone())),
        EngineKind::ExternalToolkit => {
            Box::new(ExternalToolkitBackend::new(config.external.program()))
        }
    }
}

/// Read a whole input file
pub async fn read_input(path: &Path) -> EngineResult<Vec<u8>> {
    tokio::fs::read(path).await.map_err(|source| EngineError::Read {
        path: path.to_path_buf(),
        source,
    })
}

fn output_dir(output: &Path) -> &Path {
    output
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

fn temp_builder() -> tempfile::Builder<'static, 'static> {
    let mut builder = tempfile::Builder::new();
    builder.prefix(".xml2md-").suffix(".tmp");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(std::fs::Permissions::from_mode(0o666));
    }
    builder
}

/// Write `content` next to `output` and rename it into place.
pub fn write_atomic(output: &Path, content: &[u8]) -> EngineResult<()> {
    let write_err = |source: std::io::Error| EngineError::Write {
        path: output.to_path_buf(),
        source,
    };

    let mut temp = temp_builder()
        .tempfile_in(output_dir(output))
        .map_err(write_err)?;
    temp.write_all(content).map_err(write_err)?;
    temp.flush().map_err(write_err)?;
    temp.persist(output).map_err(|e| write_err(e.error))?;
    Ok(())
}

/// Reserve a temporary path beside `output` for a tool that writes by name.
///
/// The file is removed when the returned handle drops unless it is persisted
/// with [`persist_temp`].
pub fn reserve_temp(output: &Path) -> EngineResult<tempfile::TempPath> {
    temp_builder()
        .tempfile_in(output_dir(output))
        .map(tempfile::NamedTempFile::into_temp_path)
        .map_err(|source| EngineError::Write {
            path: output.to_path_buf(),
            source,
        })
}

/// Move a reserved temporary file over `output`
pub fn persist_temp(temp: tempfile::TempPath, output: &Path) -> EngineResult<PathBuf> {
    temp.persist(output).map_err(|e| EngineError::Write {
        path: output.to_path_buf(),
        source: e.error,
    })?;
    Ok(output.to_path_buf())
}
