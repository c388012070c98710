//! Progress and summary reporting
//!
//! Informational lines go to stdout, failures to stderr. Formatting is kept
//! separate from printing so every line can be checked without capturing the
//! process streams.

use std::error::Error;
use std::path::Path;

use crate::converter::BatchSummary;
use crate::error::error_chain;

/// Header printed before the first file
#[derive(Debug, Clone, Copy)]
pub struct Banner<'a> {
    pub engine: &'a str,
    pub input_base: &'a Path,
    pub output_dir: &'a Path,
    pub stylesheet: &'a Path,
}

/// Human-readable reporter for a conversion run
pub struct Output {
    verbose: bool,
    stdout_colors: bool,
    stderr_colors: bool,
}

impl Output {
    pub fn new(verbose: bool) -> Self {
        Self {
            verbose,
            stdout_colors: atty::is(atty::Stream::Stdout),
            stderr_colors: atty::is(atty::Stream::Stderr),
        }
    }

    /// Reporter that never emits escape sequences
    pub fn plain(verbose: bool) -> Self {
        Self {
            verbose,
            stdout_colors: false,
            stderr_colors: false,
        }
    }

    fn colorize(enabled: bool, text: &str, color: &str) -> String {
        if enabled {
            format!("\x1b[{}m{}\x1b[0m", color, text)
        } else {
            text.to_string()
        }
    }

    pub fn format_banner(&self, banner: &Banner<'_>) -> String {
        let mut output = String::new();
        output.push_str(&format!("Engine: {}\n", banner.engine));
        output.push_str(&format!("Input base: {}\n", banner.input_base.display()));
        output.push_str(&format!("Output dir: {}\n", banner.output_dir.display()));
        if self.verbose {
            output.push_str(&format!("XSLT: {}\n", banner.stylesheet.display()));
        }
        output
    }

    pub fn format_progress(&self, relative: &Path, output_relative: &Path) -> String {
        format!(
            "{} {} -> {}",
            Self::colorize(self.stdout_colors, "→", "36"),
            relative.display(),
            output_relative.display()
        )
    }

    pub fn format_failure(&self, relative: &Path, err: &dyn Error) -> String {
        format!(
            "{} {}\n  {}",
            Self::colorize(self.stderr_colors, "[xml2md] Failed:", "31"),
            relative.display(),
            error_chain(err)
        )
    }

    pub fn format_no_files(&self) -> String {
        Self::colorize(self.stderr_colors, "No XML files found to process.", "33")
    }

    pub fn format_summary(&self, summary: &BatchSummary) -> String {
        let mut output = format!(
            "{} Wrote {} file(s).",
            Self::colorize(self.stdout_colors, "Done.", "32"),
            summary.attempted
        );
        if !summary.failures.is_empty() {
            output.push_str(&format!(
                " {} converted, {} failed.",
                summary.succeeded,
                summary.failures.len()
            ));
        }
        output
    }

    pub fn format_setup_error(&self, err: &dyn Error) -> String {
        format!(
            "{} {}",
            Self::colorize(self.stderr_colors, "[xml2md] Error:", "31"),
            err
        )
    }

    pub fn banner(&self, banner: &Banner<'_>) {
        print!("{}", self.format_banner(banner));
    }

    pub fn progress(&self, relative: &Path, output_relative: &Path) {
        println!("{}", self.format_progress(relative, output_relative));
    }

    pub fn failure(&self, relative: &Path, err: &dyn Error) {
        eprintln!("{}", self.format_failure(relative, err));
    }

    pub fn no_files(&self) {
        eprintln!("{}", self.format_no_files());
    }

    pub fn summary(&self, summary: &BatchSummary) {
        println!("{}", self.format_summary(summary));
    }

    pub fn setup_error(&self, err: &dyn Error) {
        eprintln!("{}", self.format_setup_error(err));
    }
}
