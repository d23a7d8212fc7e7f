//! Run a search against a gallery backend and print the results.
//!
//! ```text
//! imagefeed-probe <query> [pages]
//! ```
//!
//! Each result is printed to stdout as one JSON line. Tracing output goes to
//! stderr; set `RUST_LOG=imagefeed_search=debug` to follow pagination.

use std::sync::{Arc, Mutex};

use anyhow::Context;
use imagefeed::{FeedConfig, HttpSearchFetcher};
use imagefeed_search::{
    Image, LoadMoreDecision, ResultDisplay, SearchController, SearchError, SearchOutcome,
    SearchResources,
};

/// Prints results as JSON lines.
#[derive(Default)]
struct JsonLines {
    last_id: Mutex<Option<String>>,
}

impl JsonLines {
    fn print(&self, page: u32, images: &[Image]) -> usize {
        for image in images {
            let line = serde_json::json!({"page": page, "image": image});
            println!("{line}");
        }
        if let Some(last) = images.last() {
            *self.last_id.lock().unwrap_or_else(|e| e.into_inner()) = Some(last.id.clone());
        }
        images.len()
    }
}

impl ResultDisplay for JsonLines {
    fn show_results(&self, _query: &str, images: &[Image]) -> usize {
        self.print(1, images)
    }

    fn append_results(&self, images: &[Image], _has_more: bool, page: u32) -> usize {
        self.print(page, images)
    }

    fn show_error(&self, query: &str, error: &SearchError) {
        eprintln!("search for {query:?} failed: {}", error.user_message());
    }

    fn last_rendered_id(&self) -> Option<String> {
        self.last_id
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("imagefeed=info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let Some(query) = args.get(1) else {
        eprintln!("usage: imagefeed-probe <query> [pages]");
        std::process::exit(2);
    };
    let pages: u32 = match args.get(2) {
        Some(raw) => raw
            .parse()
            .with_context(|| format!("pages must be a positive number, got {raw:?}"))?,
        None => 1,
    };

    let config_path = FeedConfig::default_config_path();
    let config = FeedConfig::load_or_default(&config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;
    config.validate()?;

    let client = imagefeed::http::build_client(&config.feed)?;
    let fetcher = Arc::new(HttpSearchFetcher::new(client, &config.feed)?);
    let resources = SearchResources::new(&config.search.cache);
    let controller = SearchController::new(
        config.search.clone(),
        fetcher,
        Arc::new(JsonLines::default()),
        resources,
    )?;

    tracing::info!(query = %query, pages, base_url = %config.feed.base_url, "probe starting");
    match controller.search(query).await {
        SearchOutcome::Displayed { .. } => {}
        SearchOutcome::Failed { error, .. } => anyhow::bail!("search failed: {error}"),
        other => anyhow::bail!("search did not run: {other:?}"),
    }

    let throttle = config.search.pagination.throttle();
    for _ in 1..pages {
        // Wait out the throttle window so every call is a leading-edge load.
        tokio::time::sleep(throttle).await;
        if controller.load_more().await == LoadMoreDecision::Skipped {
            break;
        }
    }

    let state = controller.snapshot();
    tracing::info!(
        pages = state.current_page,
        total = state.search_counts.total,
        has_more = state.has_more,
        "probe finished"
    );
    Ok(())
}
