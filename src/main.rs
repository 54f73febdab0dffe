//! bext - layer manager for image-based systems
//!
//! CLI entry point that dispatches to subcommands.

use bext::cli::args::{LayerArgs, LogFormat};
use bext::cli::{commands, Cli, Commands, LayerAction};
use bext::config::{Config, ConfigManager};
use bext::error::{BextError, BextResult};
use clap::Parser;
use console::style;
use std::fs::OpenOptions;
use std::io::IsTerminal;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Mutex;
use tracing::debug;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> BextResult<()> {
    let cli = Cli::parse();

    // Load configuration
    let config_manager = ConfigManager::resolve(cli.config.as_deref());
    let mut config = config_manager.load().await?;

    // Command line flags win over the config file
    config.general.strict |= cli.strict;
    config.general.no_progress |= cli.no_progress;
    if let Some(format) = cli.log_format {
        config.general.log_format = match format {
            LogFormat::Text => "text".to_string(),
            LogFormat::Json => "json".to_string(),
        };
    }

    init_logging(&cli, &config)?;
    debug!("Loaded configuration from {}", config_manager.path().display());

    // Dispatch to command
    match cli.command {
        Commands::Layer(LayerArgs { action }) => match action {
            LayerAction::Add(args) => commands::add(args, &config).await,
            LayerAction::Activate(args) => commands::activate(args, &config).await,
            LayerAction::Deactivate(args) => commands::deactivate(args, &config).await,
            LayerAction::Remove(args) => commands::remove(args, &config).await,
            LayerAction::Clean(args) => commands::clean(args, &config).await,
            LayerAction::Build(args) => commands::build(args, &config).await,
            LayerAction::List(args) => commands::list(args, &config).await,
        },
        Commands::Mount(args) => commands::mount(args, &config).await,
        Commands::AddToPath(args) => commands::add_to_path(args, &config).await,
        Commands::Config(args) => commands::config(args, &config, &config_manager).await,
    }
}

/// Initialize logging: 0 = warn, 1 = info, 2+ = debug; RUST_LOG wins when set
fn init_logging(cli: &Cli, config: &Config) -> BextResult<()> {
    let filter = if cli.quiet {
        EnvFilter::new("off")
    } else if let Ok(filter) = EnvFilter::try_from_default_env() {
        filter
    } else {
        match cli.verbose {
            0 => EnvFilter::new("bext=warn"),
            1 => EnvFilter::new("bext=info"),
            _ => EnvFilter::new("bext=debug"),
        }
    };

    let (writer, ansi) = match cli.log_file.as_deref() {
        Some(path) if path != Path::new("-") => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| BextError::io(format!("opening log file {}", path.display()), e))?;
            (BoxMakeWriter::new(Mutex::new(file)), false)
        }
        _ => (
            BoxMakeWriter::new(std::io::stderr),
            std::io::stderr().is_terminal(),
        ),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(ansi)
        .with_target(false);

    if config.general.log_format == "json" {
        builder.json().init();
    } else {
        builder.without_time().init();
    }
    Ok(())
}
