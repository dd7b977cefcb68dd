//! The status subcommand.

use anyhow::Context;

use crate::config::CrawlConfig;
use crate::repository::CrawlStore;

pub fn run(config: CrawlConfig) -> anyhow::Result<()> {
    let store = CrawlStore::open(&config.database_path).with_context(|| {
        format!("opening store at {}", config.database_path.display())
    })?;

    let counts = store.queue_counts()?;
    println!("queue status for {}:", config.database_path.display());
    println!("  queued:     {}", counts.queued);
    println!("  processing: {}", counts.processing);
    println!("  completed:  {}", counts.completed);
    println!("  error:      {}", counts.error);
    println!("  links:      {}", store.link_count()?);

    if let Some(started) = store.get_meta("crawl_started_at")? {
        println!("  last crawl started:  {started}");
    }
    if let Some(finished) = store.get_meta("crawl_finished_at")? {
        println!("  last crawl finished: {finished}");
    }

    let errors = store.recent_errors(10)?;
    if !errors.is_empty() {
        println!("recent errors:");
        for entry in errors {
            println!(
                "  [{}] {} {}: {}",
                entry.occurred_at.to_rfc3339(),
                entry.error_type,
                entry.url,
                entry.error_message.unwrap_or_default()
            );
        }
    }

    Ok(())
}
