//! The errors subcommand.

use anyhow::Context;

use crate::config::CrawlConfig;
use crate::repository::CrawlStore;

#[derive(clap::Args)]
pub struct ErrorsArgs {
    /// Maximum number of rows to print
    #[arg(short, long, default_value_t = 20)]
    limit: u32,
}

pub fn run(config: CrawlConfig, args: ErrorsArgs) -> anyhow::Result<()> {
    let store = CrawlStore::open(&config.database_path).with_context(|| {
        format!("opening store at {}", config.database_path.display())
    })?;

    let entries = store.recent_errors(args.limit)?;
    if entries.is_empty() {
        println!("error log is empty");
        return Ok(());
    }

    for entry in entries {
        println!(
            "[{}] {} {}: {}",
            entry.occurred_at.to_rfc3339(),
            entry.error_type,
            entry.url,
            entry.error_message.unwrap_or_default()
        );
    }
    Ok(())
}
