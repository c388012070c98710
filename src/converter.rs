//! Batch conversion: resolve, collect, mirror, dispatch, summarize

use std::path::{Path, PathBuf};
use tokio::fs;

use crate::backends::BackendRegistry;
use crate::cli::Options;
use crate::config::Config;
use crate::engine::{Platform, choose_engine};
use crate::error::{EngineError, EngineResult, Result, Xml2MdError};
use crate::file_discovery::{FileDiscovery, strip_document_suffix};
use crate::output::{Banner, Output};
use crate::stylesheet::StylesheetLocator;

/// One input document and where its output goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformJob {
    pub input: PathBuf,
    pub stylesheet: PathBuf,
    pub output: PathBuf,
    /// Input path relative to the input base
    pub relative: PathBuf,
    /// Output path relative to the output root
    pub output_relative: PathBuf,
}

impl TransformJob {
    pub fn new(
        input: &Path,
        base: &Path,
        output_root: &Path,
        stylesheet: &Path,
        input_extension: &str,
        output_extension: &str,
    ) -> Self {
        let relative = match input.strip_prefix(base) {
            Ok(rel) => rel.to_path_buf(),
            Err(_) => input
                .file_name()
                .map(PathBuf::from)
                .unwrap_or_else(|| input.to_path_buf()),
        };
        let output_relative = mirror_path(&relative, input_extension, output_extension);

        Self {
            input: input.to_path_buf(),
            stylesheet: stylesheet.to_path_buf(),
            output: output_root.join(&output_relative),
            relative,
            output_relative,
        }
    }
}

/// Same relative path with the document suffix swapped, whatever its case.
pub fn mirror_path(relative: &Path, input_extension: &str, output_extension: &str) -> PathBuf {
    let output_extension = output_extension.trim_start_matches('.');
    let stem = relative
        .file_name()
        .and_then(|name| name.to_str())
        .and_then(|name| strip_document_suffix(name, input_extension));
    match stem {
        Some(stem) => relative.with_file_name(format!("{stem}.{output_extension}")),
        None => relative.with_extension(output_extension),
    }
}

/// A document that could not be converted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFailure {
    pub path: PathBuf,
    pub message: String,
}

/// Outcome of one batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub attempted: usize,
    pub succeeded: usize,
    pub failures: Vec<FileFailure>,
}

impl BatchSummary {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Drives one conversion run
pub struct Converter {
    config: Config,
    locator: StylesheetLocator,
    platform: Platform,
    registry: BackendRegistry,
    output: Output,
}

impl Converter {
    pub fn new(config: Config, locator: StylesheetLocator) -> Self {
        Self {
            registry: BackendRegistry::new(config.clone()),
            platform: Platform::current(),
            output: Output::new(false),
            config,
            locator,
        }
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    pub fn with_registry(mut self, registry: BackendRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_output(mut self, output: Output) -> Self {
        self.output = output;
        self
    }

    /// Convert every document named by `options`.
    ///
    /// Errors returned here are setup failures and happen before any file is
    /// touched. Per-file failures are reported and collected in the summary.
    pub async fn run(&mut self, options: &Options) -> Result<BatchSummary> {
        let out = options.out.as_deref().ok_or(Xml2MdError::MissingOutputDir)?;
        let output_root = std::path::absolute(out)?;

        let stylesheet = self.locator.resolve(options.xslt.as_deref()).await?;

        let input = std::path::absolute(&options.input)?;
        if fs::metadata(&input).await.is_err() {
            return Err(Xml2MdError::InputNotFound { path: input });
        }

        fs::create_dir_all(&output_root)
            .await
            .map_err(|source| Xml2MdError::OutputDir {
                path: output_root.clone(),
                source,
            })?;

        let file_set = FileDiscovery::new()
            .with_extension(&self.config.conversion.input_extension)
            .with_recursion(options.recurse)
            .collect(&input)
            .await?;

        if file_set.is_empty() {
            self.output.no_files();
            return Ok(BatchSummary::default());
        }

        let engine = choose_engine(options.engine.as_deref(), self.platform);
        self.output.banner(&Banner {
            engine: &engine,
            input_base: &file_set.base,
            output_dir: &output_root,
            stylesheet: &stylesheet,
        });

        let mut summary = BatchSummary::default();
        for file in &file_set.files {
            let job = TransformJob::new(
                file,
                &file_set.base,
                &output_root,
                &stylesheet,
                &self.config.conversion.input_extension,
                &self.config.conversion.output_extension,
            );
            summary.attempted += 1;

            match self.run_job(&engine, &job).await {
                Ok(()) => summary.succeeded += 1,
                Err(err) => {
                    self.output.failure(&job.relative, &err);
                    summary.failures.push(FileFailure {
                        path: job.relative.clone(),
                        message: err.to_string(),
                    });
                }
            }
        }

        self.output.summary(&summary);
        Ok(summary)
    }

    async fn run_job(&mut self, engine: &str, job: &TransformJob) -> EngineResult<()> {
        if let Some(parent) = job.output.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|source| EngineError::Write {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }
        self.output.progress(&job.relative, &job.output_relative);
        log::debug!("{} -> {}", job.input.display(), job.output.display());

        let backend = self.registry.resolve(engine)?;
        backend
            .transform(&job.input, &job.stylesheet, &job.output)
            .await
    }
}
