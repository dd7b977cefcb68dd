//! Command-line interface.

mod crawl;
mod errors;
mod pages;
mod status;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::CrawlConfig;

#[derive(Parser)]
#[command(name = "linkmap")]
#[command(about = "Resumable, polite web crawler that maps site link graphs")]
#[command(version)]
pub struct Cli {
    /// Config file path (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Database file location (overrides the config file)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl from seed URLs, or resume pending work when none are given
    Crawl(crawl::CrawlArgs),
    /// Show queue status and recent errors
    Status,
    /// List pages in a given status
    Pages(pages::PagesArgs),
    /// Print the crawl error log
    Errors(errors::ErrorsArgs),
}

/// Peek at the raw arguments for the verbose flag before clap runs, so
/// logging can be initialized first.
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = CrawlConfig::load(cli.config.as_deref())?;
    if let Some(db) = cli.db {
        config.database_path = db;
    }

    match cli.command {
        Commands::Crawl(args) => crawl::run(config, args).await,
        Commands::Status => status::run(config),
        Commands::Pages(args) => pages::run(config, args),
        Commands::Errors(args) => errors::run(config, args),
    }
}
