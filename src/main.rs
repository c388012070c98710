use std::process::ExitCode;

use xml2md::cli::{Cli, Invocation, Options};
use xml2md::config::ConfigManager;
use xml2md::converter::Converter;
use xml2md::error::{CliError, Result};
use xml2md::output::Output;
use xml2md::stylesheet::StylesheetLocator;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let options = match Cli::invocation() {
        Ok(Invocation::Run(options)) => options,
        Ok(Invocation::Print(text)) => {
            print!("{}", text);
            return ExitCode::SUCCESS;
        }
        Ok(Invocation::Usage(text)) => {
            print!("{}", text);
            return ExitCode::FAILURE;
        }
        Err(CliError::Usage(e)) => {
            eprint!("{}", e);
            return ExitCode::FAILURE;
        }
        Err(err) => {
            Output::new(false).setup_error(&err);
            return ExitCode::FAILURE;
        }
    };

    init_logging(options.verbose);

    match run(&options).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            log::debug!("setup failed: {:?}", err);
            Output::new(options.verbose).setup_error(&err);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose { "xml2md=debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter))
        .format_timestamp(None)
        .init();
}

/// Run the batch; `Ok(false)` means files failed under strict mode.
async fn run(options: &Options) -> Result<bool> {
    let config = ConfigManager::load_config(options).await?;
    let strict = config.conversion.strict;
    let locator = StylesheetLocator::from_env(&config.stylesheet)?;

    let mut converter = Converter::new(config, locator).with_output(Output::new(options.verbose));
    let summary = converter.run(options).await?;

    Ok(summary.is_success() || !strict)
}
