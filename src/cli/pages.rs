//! The pages subcommand.

use anyhow::Context;

use crate::config::CrawlConfig;
use crate::models::PageStatus;
use crate::repository::CrawlStore;

#[derive(clap::Args)]
pub struct PagesArgs {
    /// Status to list: queued, processing, completed, or error
    #[arg(short, long, default_value = "completed")]
    status: String,

    /// Maximum number of rows to print
    #[arg(short, long, default_value_t = 20)]
    limit: u32,
}

pub fn run(config: CrawlConfig, args: PagesArgs) -> anyhow::Result<()> {
    let status = PageStatus::parse(&args.status)
        .with_context(|| format!("unknown status {:?}", args.status))?;

    let store = CrawlStore::open(&config.database_path).with_context(|| {
        format!("opening store at {}", config.database_path.display())
    })?;

    let pages = store.pages_by_status(status, args.limit)?;
    if pages.is_empty() {
        println!("no {status} pages");
        return Ok(());
    }

    for page in pages {
        match status {
            PageStatus::Completed => println!(
                "{:>3}  {}  {}  {}",
                page.status_code.unwrap_or_default(),
                page.url,
                page.title.as_deref().unwrap_or("-"),
                page.crawled_at
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "-".to_string()),
            ),
            PageStatus::Error => println!(
                "{}  {}  {}",
                page.url,
                page.last_error_type.as_deref().unwrap_or("-"),
                page.last_error_message.as_deref().unwrap_or(""),
            ),
            _ => println!("{}  added {}", page.url, page.added_at.to_rfc3339()),
        }
    }
    Ok(())
}
