//! Generic result extraction over ordered selector strategies.
//!
//! Providers describe their markup with a [`ResultSelectors`] table. The same
//! table drives extraction from a parsed document (raw mode) and from a live
//! page (browser mode). A node missing a required part is logged and skipped;
//! it never aborts the search.

use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};

use crate::page::{find_first, ElementHandle};
use crate::result::ResultSet;
use crate::{Result, SearchError, SearchResult};

/// Maps a raw `href` to the URL surfaced to callers, or `None` to drop it.
pub type LinkNormalizer<'a> = &'a (dyn Fn(&str) -> Option<String> + Send + Sync);

/// Selector table for one result layout.
///
/// Each list is tried in order until one strategy matches.
#[derive(Debug, Clone, Copy)]
pub struct ResultSelectors {
    /// Matches one element per result block.
    pub results: &'static str,
    /// Title element; also the link source when `link` is empty.
    pub title: &'static [&'static str],
    /// Element carrying the `href`, when it is not the title.
    pub link: &'static [&'static str],
    pub snippet: &'static [&'static str],
    /// Skip blocks without a snippet instead of emitting an empty description.
    pub snippet_required: bool,
    /// Marker present when the engine serves a bot challenge.
    pub captcha: &'static str,
}

fn parse_selector(css: &str) -> Result<Selector> {
    Selector::parse(css)
        .map_err(|e| SearchError::Parse(format!("Failed to parse selector '{}': {:?}", css, e)))
}

fn parse_all(strategies: &[&str]) -> Result<Vec<Selector>> {
    strategies.iter().map(|css| parse_selector(css)).collect()
}

/// Collapses runs of whitespace and trims.
pub fn clean_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn first_match<'a>(node: ElementRef<'a>, strategies: &[Selector]) -> Option<ElementRef<'a>> {
    strategies.iter().find_map(|sel| node.select(sel).next())
}

fn element_text(el: ElementRef<'_>) -> String {
    clean_text(&el.text().collect::<String>())
}

/// Whether `css` matches anything in `html`.
pub fn has_marker(html: &str, css: &str) -> bool {
    match parse_selector(css) {
        Ok(selector) => Html::parse_document(html).select(&selector).next().is_some(),
        Err(e) => {
            warn!("Invalid marker selector: {}", e);
            false
        }
    }
}

/// Extracts results from a parsed HTML document, in document order.
pub fn extract_document(
    html: &str,
    selectors: &ResultSelectors,
    normalize: LinkNormalizer<'_>,
) -> Result<Vec<SearchResult>> {
    let document = Html::parse_document(html);
    let results = parse_selector(selectors.results)?;
    let titles = parse_all(selectors.title)?;
    let links = parse_all(selectors.link)?;
    let snippets = parse_all(selectors.snippet)?;

    let mut set = ResultSet::new();
    for (i, node) in document.select(&results).enumerate() {
        let Some(title) = first_match(node, &titles) else {
            warn!("Cannot get title for #{} result", i);
            continue;
        };

        let href = if links.is_empty() {
            title.value().attr("href")
        } else {
            first_match(node, &links).and_then(|l| l.value().attr("href"))
        };
        let Some(url) = href.and_then(|h| normalize(h.trim())) else {
            debug!("Skipping #{} result without usable link", i);
            continue;
        };

        let snippet = first_match(node, &snippets).map(element_text);
        if snippet.is_none() && selectors.snippet_required {
            warn!("Cannot get snippet for #{} result", i);
            continue;
        }

        set.push(url, element_text(title), snippet.unwrap_or_default());
    }

    debug!(count = set.len(), bytes = html.len(), "Parsed document");
    Ok(set.into_vec())
}

async fn extract_one(
    node: &dyn ElementHandle,
    selectors: &ResultSelectors,
    normalize: LinkNormalizer<'_>,
) -> Result<Option<(String, String, String)>> {
    let title = find_first(node, selectors.title)
        .await?
        .ok_or_else(|| SearchError::ElementNotFound("title".to_string()))?;

    let href = if selectors.link.is_empty() {
        title.attribute("href").await?
    } else {
        match find_first(node, selectors.link).await? {
            Some(link) => link.attribute("href").await?,
            None => None,
        }
    };
    let Some(url) = href.as_deref().and_then(|h| normalize(h.trim())) else {
        return Ok(None);
    };

    let snippet = match find_first(node, selectors.snippet).await? {
        Some(el) => Some(clean_text(&el.text().await?)),
        None if selectors.snippet_required => {
            return Err(SearchError::ElementNotFound("snippet".to_string()))
        }
        None => None,
    };

    let title = clean_text(&title.text().await?);
    Ok(Some((url, title, snippet.unwrap_or_default())))
}

/// Extracts results from live page elements, in order.
pub async fn extract_elements(
    nodes: &[Box<dyn ElementHandle>],
    selectors: &ResultSelectors,
    normalize: LinkNormalizer<'_>,
) -> Vec<SearchResult> {
    let mut set = ResultSet::new();
    for (i, node) in nodes.iter().enumerate() {
        match extract_one(node.as_ref(), selectors, normalize).await {
            Ok(Some((url, title, snippet))) => {
                set.push(url, title, snippet);
            }
            Ok(None) => debug!("Skipping #{} result without usable link", i),
            Err(e) => warn!("Cannot parse #{} result: {}", i, e),
        }
    }
    set.into_vec()
}
