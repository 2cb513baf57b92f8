//! # a3s-serp
//!
//! Search engine result page scraper with an HTTP front end.
//!
//! Each engine fetches its result page either through a shared headless
//! browser or through a raw HTTP transport whose TLS handshake looks like
//! Chrome's, then extracts ranked results with an ordered list of selector
//! strategies. Features:
//!
//! - Browser session with bounded concurrent pages and clean release
//! - CAPTCHA detection, with an optional external solver
//! - Per-engine token-bucket rate limiting
//! - URL deduplication with dense re-ranking
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use a3s_serp::config::Settings;
//! use a3s_serp::engines::build_registry;
//! use a3s_serp::transport::RawTransport;
//! use a3s_serp::Query;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut settings = Settings::default();
//!     settings.app.raw_requests = true;
//!     let registry = build_registry(&settings, None, Arc::new(RawTransport::new()), None)?;
//!
//!     let brave = registry.get("brave").expect("brave is built in");
//!     brave.rate_limiter().acquire().await;
//!     for result in brave.search(&Query::new("rust programming")).await? {
//!         println!("{}. {}: {}", result.rank, result.title, result.url);
//!     }
//!     Ok(())
//! }
//! ```

mod engine;
mod error;
mod query;
mod result;

pub mod captcha;
pub mod config;
pub mod engines;
pub mod extract;
pub mod page;
pub mod ratelimit;
pub mod search;
pub mod server;
pub mod transport;
pub mod user_agent;

#[cfg(feature = "headless")]
pub mod browser;
#[cfg(feature = "headless")]
pub mod browser_setup;

pub use engine::{Engine, EngineOptions, EngineRegistry, BASELINE_OPTIONS};
pub use error::{Result, SearchError};
pub use query::{days_since_epoch, DateInterval, Query};
pub use result::{apply_limit, deduplicate, ResultSet, SearchResult};
