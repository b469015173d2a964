use crate::config::{Config, DEFAULT_CONFIG_NAME};
use crate::document_file::DocumentFile;
use anyhow::Result;
use clap::Args;
use colored::Colorize;
use massing_document::Document;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Document file to create
    #[arg(default_value = "document.massing.json")]
    pub document: PathBuf,

    /// Overwrite an existing document
    #[arg(short, long)]
    pub force: bool,
}

pub fn init(args: InitArgs, cwd: &Path, config: &Config) -> Result<()> {
    let document_path = cwd.join(&args.document);
    if document_path.exists() && !args.force {
        println!(
            "{} {} already exists, use --force to overwrite",
            "⚠".yellow(),
            args.document.display()
        );
        return Ok(());
    }

    println!("{}", "Initializing massing document...".cyan().bold());

    let config_path = cwd.join(DEFAULT_CONFIG_NAME);
    if !config_path.exists() {
        fs::write(&config_path, serde_json::to_string_pretty(config)?)?;
        println!("  {} Created {}", "✓".green(), DEFAULT_CONFIG_NAME);
    }

    if let Some(parent) = document_path.parent() {
        fs::create_dir_all(parent)?;
    }
    let document = Document::new(0, config.document.clone())?;
    DocumentFile::from_document(&document).write(&document_path)?;
    info!(path = %document_path.display(), root = document.root_group_id(), "created document");
    println!("  {} Created {}", "✓".green(), args.document.display());

    println!();
    println!("{}", "✨ Document initialized!".green().bold());
    println!("  Inspect it with: {}", format!("massing inspect {}", args.document.display()).cyan());

    Ok(())
}
