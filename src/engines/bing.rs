//! Bing web and image search.

use scraper::{Html, Selector};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::extract::{clean_text, ResultSelectors};
use crate::query::days_since_epoch;
use crate::result::ResultSet;
use crate::{EngineOptions, Query, Result, SearchError, SearchResult};

use super::{search_url, Provider};

const IMAGES_PER_PAGE: u32 = 35;
const IMAGE_TILE: &str = "a.iusc";

/// Bing search provider.
pub struct Bing;

const SELECTORS: ResultSelectors = ResultSelectors {
    results: "li.b_algo",
    title: &["h2 a"],
    link: &[],
    snippet: &["div.b_caption p", "p.b_lineclamp2", ".b_algoSlug", "p"],
    snippet_required: false,
    captcha: "#b_captcha, div.captcha, iframe[src*=\"challenges.cloudflare\"]",
};

/// Bing counts results from 1.
fn first_result(query: &Query, per_page: u32) -> Result<u32> {
    query
        .page_offset(per_page)?
        .checked_add(1)
        .ok_or_else(|| SearchError::InvalidRequest(format!("page {} is out of range", query.page)))
}

/// Metadata Bing embeds in each image tile's `m` attribute.
#[derive(Debug, Deserialize)]
struct ImageMeta {
    murl: Option<String>,
    purl: Option<String>,
    #[serde(default)]
    t: String,
}

impl Provider for Bing {
    fn name(&self) -> &'static str {
        "bing"
    }

    fn default_options(&self) -> EngineOptions {
        EngineOptions::new(1_000, 5, 3_000, 20_000)
    }

    fn build_url(&self, query: &Query) -> Result<String> {
        let mut params = vec![("first", first_result(query, 10)?.to_string())];
        if let Some(interval) = &query.date_interval {
            params.push((
                "filters",
                format!(
                    "ex1:\"ez5_{}_{}\"",
                    days_since_epoch(interval.from),
                    days_since_epoch(interval.to)
                ),
            ));
        }
        search_url("https://www.bing.com/search", "q", &query.composed_text(), &params)
    }

    fn selectors(&self) -> &ResultSelectors {
        &SELECTORS
    }

    fn build_image_url(&self, query: &Query) -> Result<String> {
        let first = first_result(query, IMAGES_PER_PAGE)?;
        search_url(
            "https://www.bing.com/images/search",
            "q",
            &query.composed_text(),
            &[("first", first.to_string())],
        )
    }

    fn image_selector(&self) -> Option<&'static str> {
        Some(IMAGE_TILE)
    }

    /// Result URL is the full-size image; the description holds the page it
    /// was found on.
    fn parse_images(&self, html: &str) -> Result<Vec<SearchResult>> {
        let document = Html::parse_document(html);
        let tiles = Selector::parse(IMAGE_TILE)
            .map_err(|e| SearchError::Parse(format!("Failed to parse selector: {:?}", e)))?;

        let mut set = ResultSet::new();
        for (i, tile) in document.select(&tiles).enumerate() {
            let Some(raw) = tile.value().attr("m") else {
                debug!("Image tile #{} has no metadata", i);
                continue;
            };
            let meta: ImageMeta = match serde_json::from_str(raw) {
                Ok(meta) => meta,
                Err(e) => {
                    warn!("Cannot decode metadata for image #{}: {}", i, e);
                    continue;
                }
            };
            let Some(url) = meta.murl.as_deref().and_then(super::absolute_link) else {
                continue;
            };
            set.push(url, clean_text(&meta.t), meta.purl.unwrap_or_default());
        }
        Ok(set.into_vec())
    }
}
