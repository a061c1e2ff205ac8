//! CLI argument parsing using clap.

use clap::{
    Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use std::path::PathBuf;

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Detect analyzer binaries that changed on disk after being loaded
#[derive(Parser, Debug)]
#[command(
    name = "stalewatch",
    version = env!("CARGO_PKG_VERSION"),
    about = "Detect analyzer binaries that changed on disk after being loaded",
    next_line_help = true,
    styles = clap_cargo_style()
)]
pub struct Cli {
    /// Path to custom settings.toml file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a default .stalewatch/settings.toml
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Display active settings
    Config,

    /// Print the effective timestamp of each file
    Stamp {
        #[arg(value_name = "FILE", required = true)]
        files: Vec<PathBuf>,
    },

    /// Load files as analyzers and report when they change on disk
    Watch {
        #[arg(value_name = "FILE", required = true)]
        files: Vec<PathBuf>,

        /// Project referencing every analyzer (repeatable)
        #[arg(short, long = "project", value_name = "NAME", default_value = "default")]
        projects: Vec<String>,

        /// Treat COPY as a shadow copy loaded on behalf of SOURCE (repeatable)
        #[arg(long, value_name = "COPY=SOURCE", value_parser = parse_via)]
        via: Vec<(PathBuf, PathBuf)>,
    },
}

fn parse_via(value: &str) -> Result<(PathBuf, PathBuf), String> {
    match value.split_once('=') {
        Some((copy, source)) if !copy.is_empty() && !source.is_empty() => {
            Ok((PathBuf::from(copy), PathBuf::from(source)))
        }
        _ => Err(format!("expected COPY=SOURCE, got '{value}'")),
    }
}
