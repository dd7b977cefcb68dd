//! linkmapper - resumable, polite web crawler.
//!
//! Crawls pages reachable from seed URLs, recording page metadata and
//! the link graph between pages in an embedded SQLite database.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use linkmapper::cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (before anything else)
    let _ = dotenvy::dotenv();

    // Initialize logging based on verbosity
    let default_filter = if cli::is_verbose() {
        "linkmapper=info"
    } else {
        "linkmapper=warn"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    cli::run().await
}
