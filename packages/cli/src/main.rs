mod commands;
mod config;
mod document_file;

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::str::FromStr;
use tracing::Level;

#[derive(Parser)]
#[command(name = "massing")]
#[command(about = "Massing document tools", long_about = None)]
#[command(version)]
struct Cli {
    /// Tracing level, overrides the config file
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create an empty document and a config file
    Init(commands::InitArgs),

    /// Check a document's invariants and summarize its contents
    Inspect(commands::InspectArgs),

    /// Apply a log of committed batches to a document
    Replay(commands::ReplayArgs),
}

fn init_tracing(level: &str) {
    let level = Level::from_str(level).unwrap_or(Level::WARN);
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let cwd = std::env::current_dir()?;
    let config = config::Config::load(&cwd)?;
    init_tracing(cli.log_level.as_deref().unwrap_or(&config.log_level));

    match cli.command {
        Command::Init(args) => commands::init(args, &cwd, &config),
        Command::Inspect(args) => commands::inspect(args, &config),
        Command::Replay(args) => commands::replay(args, &config),
    }
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("{} {:?}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}
