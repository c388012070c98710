use clap::error::{ContextKind, ContextValue, ErrorKind};
use clap::{CommandFactory, Parser};
use std::ffi::OsString;
use std::path::PathBuf;

use crate::error::CliError;

const AFTER_HELP: &str = "\
Notes:
  - Default engine on Windows: external-toolkit (PowerShell + XslCompiledTransform)
  - Default elsewhere: embedded (libxslt, in-process)
  - Without --xslt, xform-md.xslt is looked up in the current directory,
    next to the executable, then in the xml2md data directory.
  - Values of -o, --xslt and --engine are taken verbatim, even when they
    start with a dash. Short flags may be combined (-rv) and values may be
    attached (-oDIR, --out=DIR).

Examples:
  xml2md docs/ -o out/ --recurse
  xml2md topic.xml -o out/ --xslt xform-md.xslt
  xml2md docs/ -o out/ -r --engine embedded
  xml2md docs/ -o out/ -r --engine wasm-embedded
  xml2md docs/ -o out/ -r --engine external-toolkit";

/// Convert XML docs to Markdown via XSLT
#[derive(Parser, Debug, Clone)]
#[command(name = "xml2md")]
#[command(about = "xml2md - Convert XML docs to Markdown via XSLT")]
#[command(version)]
#[command(after_help = AFTER_HELP)]
pub struct Cli {
    /// Input file or directory (only the first positional is used)
    #[arg(value_name = "INPUT")]
    pub inputs: Vec<PathBuf>,

    /// Output directory; the input tree is mirrored below it
    #[arg(short = 'o', long = "out", value_name = "DIR", allow_hyphen_values = true)]
    pub out: Option<PathBuf>,

    /// Descend into subdirectories
    #[arg(short = 'r', long = "recurse", visible_alias = "recursive")]
    pub recurse: bool,

    /// XSLT stylesheet to apply
    #[arg(long = "xslt", value_name = "PATH", allow_hyphen_values = true)]
    pub xslt: Option<PathBuf>,

    /// Transform engine: embedded, wasm-embedded or external-toolkit
    #[arg(long = "engine", value_name = "NAME", allow_hyphen_values = true)]
    pub engine: Option<String>,

    /// Shorthand for --engine dotnet
    #[arg(long = "ps", visible_alias = "dotnet")]
    pub dotnet: bool,

    /// Enable verbose output
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// Configuration file (TOML or JSON)
    #[arg(long = "config", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Exit with status 1 if any file fails to convert
    #[arg(long = "strict")]
    pub strict: bool,
}

/// Invocation arguments, fixed once parsed
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Options {
    pub input: PathBuf,
    pub out: Option<PathBuf>,
    pub recurse: bool,
    pub xslt: Option<PathBuf>,
    pub engine: Option<String>,
    pub verbose: bool,
    pub config: Option<PathBuf>,
    pub strict: bool,
}

/// What the command line asked for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    /// Run a conversion
    Run(Options),
    /// `--help` / `--version`: print and exit successfully
    Print(String),
    /// No input path: print usage and fail
    Usage(String),
}

impl Cli {
    /// Parse the process arguments
    pub fn invocation() -> Result<Invocation, CliError> {
        Self::invocation_from(std::env::args_os())
    }

    /// Parse an explicit argument list (first element is the program name)
    pub fn invocation_from<I, T>(args: I) -> Result<Invocation, CliError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let cli = match Self::try_parse_from(args) {
            Ok(cli) => cli,
            Err(e) => {
                return match e.kind() {
                    ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                        Ok(Invocation::Print(e.to_string()))
                    }
                    ErrorKind::UnknownArgument => Err(unknown_option(e)),
                    _ => Err(CliError::Usage(e)),
                };
            }
        };

        match cli.into_options() {
            Some(options) => Ok(Invocation::Run(options)),
            None => Ok(Invocation::Usage(Self::help_text())),
        }
    }

    /// Rendered long help
    pub fn help_text() -> String {
        Self::command().render_long_help().to_string()
    }

    fn into_options(self) -> Option<Options> {
        let input = self.inputs.into_iter().next()?;
        let engine = if self.dotnet {
            Some("dotnet".to_string())
        } else {
            self.engine
        };

        Some(Options {
            input,
            out: self.out,
            recurse: self.recurse,
            xslt: self.xslt,
            engine,
            verbose: self.verbose,
            config: self.config,
            strict: self.strict,
        })
    }
}

fn unknown_option(e: clap::Error) -> CliError {
    match e.get(ContextKind::InvalidArg) {
        Some(ContextValue::String(arg)) => CliError::UnknownOption(arg.clone()),
        _ => CliError::Usage(e),
    }
}
