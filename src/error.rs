use std::path::PathBuf;

use thiserror::Error;

/// Setup-phase error: aborts the run before any file is converted
#[derive(Error, Debug)]
pub enum Xml2MdError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Cli(#[from] CliError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Missing required -o/--out output directory")]
    MissingOutputDir,

    #[error("Input not found: {}", .path.display())]
    InputNotFound { path: PathBuf },

    #[error("Input path is neither file nor directory: {}", .path.display())]
    NotFileOrDirectory { path: PathBuf },

    #[error("Input file is not .{extension}: {}", .path.display())]
    NotADocument { path: PathBuf, extension: String },

    #[error("XSLT not found at --xslt path: {}", .path.display())]
    StylesheetNotFound { path: PathBuf },

    #[error(
        "XSLT not found. Pass --xslt <path> or ensure {file_name} is in the current directory or install folder (searched: {})",
        format_searched(.searched)
    )]
    NoStylesheet {
        file_name: String,
        searched: Vec<PathBuf>,
    },

    #[error("Could not create output directory {}: {source}", .path.display())]
    OutputDir {
        path: PathBuf,
        source: std::io::Error,
    },
}

fn format_searched(searched: &[PathBuf]) -> String {
    searched
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Command line errors
#[derive(Error, Debug)]
pub enum CliError {
    #[error("Unknown option: {0}")]
    UnknownOption(String),

    #[error("{0}")]
    Usage(#[from] clap::Error),
}

/// Configuration loading and validation errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error reading {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("TOML parsing error: {0}")]
    TomlParsing(#[from] toml::de::Error),

    #[error("JSON parsing error: {0}")]
    JsonParsing(#[from] serde_json::Error),

    #[error("Unsupported configuration file format: {0}")]
    UnsupportedFormat(String),

    #[error("Environment variable error: {0}")]
    Environment(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),
}

/// Per-file error raised by a transform backend or by dispatch.
///
/// These never abort the batch; the orchestrator reports them and moves on.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Unknown engine: {0}")]
    UnknownEngine(String),

    #[error("Could not read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Could not write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("XML parse error in {}: {details}", .path.display())]
    Parse { path: PathBuf, details: String },

    #[error("Invalid XSLT stylesheet {}: {details}", .path.display())]
    Stylesheet { path: PathBuf, details: String },

    #[error("XSLT transform failed for {}: {details}", .path.display())]
    Transform { path: PathBuf, details: String },

    #[error("{0}")]
    UnsupportedApi(String),

    #[error("WASM module unavailable: {0}")]
    ModuleUnavailable(String),

    #[error("WASM runtime error: {0}")]
    Wasm(#[from] anyhow::Error),

    #[error("Could not start {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("{engine} transform failed ({})", .code.map_or_else(|| "signal".to_string(), |c| c.to_string()))]
    ExternalExit { engine: String, code: Option<i32> },
}

/// libxml2/libxslt error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum XsltError {
    #[error("Invalid input for libxml2: {details}")]
    InvalidInput { details: String },

    #[error("Document parsing failed: {details}")]
    DocumentParse { details: String },

    #[error("Stylesheet compilation failed: {details}")]
    StylesheetParse { details: String },

    #[error("Stylesheet application failed: {details}")]
    TransformFailed { details: String },
}

/// Render an error followed by its `source()` chain, one cause per line.
pub fn error_chain(err: &dyn std::error::Error) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        out.push_str("\n  caused by: ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, Xml2MdError>;

/// Configuration result type alias
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Backend result type alias
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// libxslt result type alias
pub type XsltResult<T> = std::result::Result<T, XsltError>;
