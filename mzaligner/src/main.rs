use std::fs;
use std::io;
use std::path::Path;

use clap::{CommandFactory, FromArgMatches};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use mzaligner::{MZAligner, MZAlignerCommand, MZAlignerError};

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

fn make_filter() -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(tracing::Level::INFO.into())
        .from_env_lossy()
}

fn configure_log(log_file: Option<&Path>) -> Result<Option<WorkerGuard>, MZAlignerError> {
    let (file_layer, guard) = match log_file {
        Some(path) => {
            let handle = fs::File::create(path)?;
            let (writer, guard) = tracing_appender::non_blocking(handle);
            let layer = fmt::layer()
                .compact()
                .with_ansi(false)
                .with_timer(fmt::time::ChronoLocal::rfc_3339())
                .with_writer(writer)
                .with_filter(make_filter());
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let subscriber = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .compact()
                .with_timer(fmt::time::ChronoLocal::rfc_3339())
                .with_writer(io::stderr)
                .with_filter(make_filter()),
        )
        .with(file_layer);

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| MZAlignerError::LoggingError(e.to_string()))?;
    tracing_log::LogTracer::init().map_err(|e| MZAlignerError::LoggingError(e.to_string()))?;
    Ok(guard)
}

fn main() -> Result<(), MZAlignerError> {
    let matches = MZAligner::command().get_matches();
    let args = MZAligner::from_arg_matches(&matches).unwrap_or_else(|e| e.exit());
    let sub_matches = matches.subcommand().map(|(_, m)| m);

    match args.command {
        MZAlignerCommand::Align(command) => {
            let command = command.configure(sub_matches)?;
            let _guard = configure_log(command.log_file.as_deref())?;
            command.main()
        }
        MZAlignerCommand::Correct(command) => {
            let command = command.configure(sub_matches)?;
            let _guard = configure_log(command.log_file.as_deref())?;
            command.main()
        }
        MZAlignerCommand::ReferencePoints(command) => {
            configure_log(None)?;
            command.main()
        }
    }
}
