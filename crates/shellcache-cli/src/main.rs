//! shellcache - keeps an offline copy of a web application's resources in
//! sync with a manifest and serves them when the origin is unreachable.

mod args;
mod commands;
mod config;
mod format;
mod serve;

use std::io;
use std::path::Path;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use args::{Cli, Commands};
use commands::Session;
use config::Config;

/// Log file name prefix inside the configured log directory
const LOG_FILE_PREFIX: &str = "shellcache.log";

/// Initialize the tracing subscriber for logging.
///
/// RUST_LOG takes precedence over `-v`. The returned guard flushes the log
/// file on drop and must be held for the life of the program.
fn init_tracing(verbose: u8, log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| match verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("shellcache=info,shellcache_core=info,warn"),
        _ => EnvFilter::new("shellcache=debug,shellcache_core=debug,info"),
    });

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config.merge(cli.overrides.into_config()),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    let _guard = init_tracing(cli.verbose, config.log_dir.as_deref());
    info!("shellcache starting");

    match run(cli.command, cli.config.as_deref(), config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Commands, config_path: Option<&Path>, config: Config) -> Result<()> {
    if let Commands::Init = command {
        return commands::init(&config, config_path);
    }

    let session = Session::new(config)?;
    match command {
        Commands::Init => Ok(()),
        Commands::Sync => commands::sync(&session).await,
        Commands::Get(args) => commands::get(&session, &args.target, args.output.as_deref()).await,
        Commands::Message(args) => commands::message(&session, &args.signal).await,
        Commands::Status => commands::status(&session).await,
        Commands::Serve => serve::run(session).await,
        Commands::Clear => commands::clear(&session).await,
    }
}
