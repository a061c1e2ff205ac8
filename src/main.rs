use clap::Parser;

use stalewatch::cli::commands::{init, stamp, watch};
use stalewatch::cli::{Cli, Commands};
use stalewatch::{Settings, logging};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    };
    let settings = loaded.unwrap_or_else(|e| {
        eprintln!("Configuration error: {e}");
        eprintln!("Using default settings.");
        Settings::default()
    });

    logging::init_with_config(&settings.logging);

    match cli.command {
        Commands::Init { force } => init::run_init(force),
        Commands::Config => init::run_config(&settings),
        Commands::Stamp { files } => {
            stamp::run_stamp(&files);
            Ok(())
        }
        Commands::Watch {
            files,
            projects,
            via,
        } => watch::run_watch(files, projects, via, &settings).await,
    }
}
