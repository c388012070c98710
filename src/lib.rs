//! # xml2md Library
//!
//! Batch conversion of XML documents to Markdown through an XSLT stylesheet,
//! with a choice of transform engine: libxslt in-process, libxml2/libxslt
//! compiled to WebAssembly, or the .NET toolkit driven through PowerShell.

pub mod backends;
pub mod cli;
pub mod config;
pub mod converter;
pub mod engine;
pub mod error;
pub mod file_discovery;
pub mod libxslt;
pub mod output;
pub mod stylesheet;

pub use backends::{
    BackendRegistry, EmbeddedBackend, ExternalToolkitBackend, TransformBackend, WasmBackend,
};
pub use cli::{Cli, Invocation, Options};
pub use config::{Config, ConfigManager, EnvProvider, SystemEnvProvider};
pub use converter::{BatchSummary, Converter, FileFailure, TransformJob};
pub use engine::{EngineKind, Platform, choose_engine};
pub use error::{CliError, ConfigError, EngineError, Xml2MdError, XsltError};
pub use file_discovery::{FileDiscovery, FileSet};
pub use libxslt::XsltProcessor;
pub use output::Output;
pub use stylesheet::{DEFAULT_STYLESHEET, StylesheetLocator};
