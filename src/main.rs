use std::process::ExitCode;

use clap::Parser;
use tracing::debug;

use gator::{Command, Config, Database, GatorError, State};

/// A command-line RSS feed aggregator
#[derive(Parser)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command) -> gator::Result<()> {
    let config_path = Config::default_path()?;
    let config = Config::load_with_env(&config_path).map_err(|e| match e {
        GatorError::Io(io) if io.kind() == std::io::ErrorKind::NotFound => GatorError::Config(
            format!(
                "config file {} not found; create it with a line like db_url = \"sqlite://gator.db?mode=rwc\"",
                config_path.display()
            ),
        ),
        other => other,
    })?;
    config.validate()?;

    // Initialize logging
    if let Err(e) = gator::logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        // Fall back to console-only logging
        if let Err(e) = gator::logging::init_console_only(&config.logging.level) {
            eprintln!("Failed to initialize console logging: {e}");
        }
    }
    debug!("Loaded configuration from {}", config_path.display());

    let db = Database::connect(&config.db_url).await?;
    let mut state = State::new(config, config_path, db)?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    gator::execute(&mut state, command, &mut out).await
}
