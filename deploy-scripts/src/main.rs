use std::process::ExitCode;

use clap::Parser;
use deploy_scripts::{cli::Cli, constants::LOG_FILTER_ENV_VAR};
use eyre::Result;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Parse the CLI, set up logging and run the command on a single-threaded runtime
fn main() -> Result<ExitCode> {
    let Cli {
        verbose,
        secrets_file,
        command,
    } = Cli::parse();

    let default_level = match verbose {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::builder()
                .with_default_directive(default_level.into())
                .with_env_var(LOG_FILTER_ENV_VAR)
                .from_env_lossy(),
        )
        .init();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let all_succeeded = runtime.block_on(command.run(secrets_file))?;

    Ok(if all_succeeded {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
