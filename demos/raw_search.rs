//! Example: raw-mode search without a browser.
//!
//! Run with: `cargo run --example raw_search -- "rust programming" duckduckgo`

use std::sync::Arc;

use a3s_serp::config::Settings;
use a3s_serp::engines::build_registry;
use a3s_serp::transport::RawTransport;
use a3s_serp::{apply_limit, deduplicate, Query};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let mut args = std::env::args().skip(1);
    let text = args.next().unwrap_or_else(|| "rust programming language".to_string());
    let engine = args.next().unwrap_or_else(|| "duckduckgo".to_string());

    // Raw mode: every engine fetches pages over HTTP instead of driving Chrome
    let mut settings = Settings::default();
    settings.app.raw_requests = true;
    let registry = build_registry(&settings, None, Arc::new(RawTransport::new()), None)?;

    let Some(engine) = registry.get(&engine) else {
        anyhow::bail!("unknown engine '{}', try one of {:?}", engine, registry.names());
    };

    let query = Query::new(text).with_limit(10);
    println!("Searching {} for: {}", engine.name(), query.text);
    println!();

    engine.rate_limiter().acquire().await;
    let results = apply_limit(deduplicate(engine.search(&query).await?), query.limit);

    println!("Found {} results", results.len());
    println!();
    for result in &results {
        println!("{}. {}", result.rank, result.title);
        println!("   URL: {}", result.url);
        if !result.description.is_empty() {
            println!("   {}", result.description);
        }
        println!();
    }

    Ok(())
}
