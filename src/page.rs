//! Abstraction over a driven browser page.
//!
//! Browser-backed engines only talk to these traits. The Chrome
//! implementation lives in `browser`; tests provide scripted pages.

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{sleep, Instant};
use tracing::debug;

use crate::Result;

/// Interval between DOM polls while waiting for a selector.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A DOM element on a live page.
#[async_trait]
pub trait ElementHandle: Send + Sync {
    /// First descendant matching `css`, if any.
    async fn find(&self, css: &str) -> Result<Option<Box<dyn ElementHandle>>>;

    /// Attribute value, if present.
    async fn attribute(&self, name: &str) -> Result<Option<String>>;

    /// Rendered text content.
    async fn text(&self) -> Result<String>;
}

/// One logical page, owned by the search call that opened it.
///
/// `close` consumes the handle so a page cannot be closed twice.
#[async_trait]
pub trait PageHandle: Send + Sync {
    /// URL the page was opened for.
    fn url(&self) -> &str;

    /// All elements matching `css`; empty when nothing matches.
    async fn find_all(&self, css: &str) -> Result<Vec<Box<dyn ElementHandle>>>;

    /// Serialized HTML of the current document.
    async fn content(&self) -> Result<String>;

    /// Runs a script in the page.
    async fn evaluate(&self, script: &str) -> Result<()>;

    /// Closes the page.
    async fn close(self: Box<Self>) -> Result<()>;
}

/// Opens logical pages on a shared browser.
#[async_trait]
pub trait Navigator: Send + Sync {
    /// Opens a page and loads `url`, failing with `NavigationTimeout` if the
    /// page is not ready within `timeout`.
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<Box<dyn PageHandle>>;

    /// Whether the underlying browser is running and accepting pages.
    fn is_live(&self) -> bool;

    /// Debugging aid: keep pages open after extraction.
    fn leave_page_open(&self) -> bool {
        false
    }

    /// Releases the underlying browser after draining open pages. Idempotent.
    async fn release(&self);
}

/// Polls until `css` matches at least one element or `timeout` elapses.
///
/// Returns an empty list on timeout.
pub async fn wait_for_all(
    page: &dyn PageHandle,
    css: &str,
    timeout: Duration,
) -> Result<Vec<Box<dyn ElementHandle>>> {
    wait_for(page, css, None, timeout).await
}

/// Like [`wait_for_all`], but stops early with an empty list as soon as
/// `bail_on` matches.
pub async fn wait_for(
    page: &dyn PageHandle,
    css: &str,
    bail_on: Option<&str>,
    timeout: Duration,
) -> Result<Vec<Box<dyn ElementHandle>>> {
    let deadline = Instant::now() + timeout;
    loop {
        let found = page.find_all(css).await?;
        if !found.is_empty() {
            return Ok(found);
        }
        if let Some(marker) = bail_on {
            if !page.find_all(marker).await?.is_empty() {
                return Ok(found);
            }
        }
        let now = Instant::now();
        if now >= deadline {
            return Ok(found);
        }
        sleep(POLL_INTERVAL.min(deadline - now)).await;
    }
}

/// Like [`wait_for_all`], for a page that may be navigating away. Query
/// errors while the old document is torn down count as no match yet.
pub async fn wait_across_navigation(
    page: &dyn PageHandle,
    css: &str,
    timeout: Duration,
) -> Vec<Box<dyn ElementHandle>> {
    let deadline = Instant::now() + timeout;
    loop {
        match page.find_all(css).await {
            Ok(found) if !found.is_empty() => return found,
            Ok(_) => {}
            Err(e) => debug!(url = page.url(), "Page not queryable yet: {}", e),
        }
        let now = Instant::now();
        if now >= deadline {
            return Vec::new();
        }
        sleep(POLL_INTERVAL.min(deadline - now)).await;
    }
}

/// Whether `css` matches anything within `timeout`.
pub async fn probe(page: &dyn PageHandle, css: &str, timeout: Duration) -> Result<bool> {
    Ok(!wait_for_all(page, css, timeout).await?.is_empty())
}

/// First element among `strategies` that matches under `node`, in order.
pub async fn find_first(
    node: &dyn ElementHandle,
    strategies: &[&str],
) -> Result<Option<Box<dyn ElementHandle>>> {
    for css in strategies {
        if let Some(found) = node.find(css).await? {
            return Ok(Some(found));
        }
    }
    Ok(None)
}
