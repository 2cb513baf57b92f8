//! Search engine providers.
//!
//! A provider is the engine-owned part of a search: how to build the result
//! page URL and which selectors pull results out of it. The generic
//! [`BrowserEngine`](crate::search::BrowserEngine) and
//! [`RawEngine`](crate::search::RawEngine) do the fetching.

use std::sync::Arc;

use tracing::{debug, info, warn};
use url::Url;

use crate::captcha::CaptchaSolver;
use crate::config::Settings;
use crate::extract::ResultSelectors;
use crate::page::Navigator;
use crate::search::{BrowserEngine, RawEngine};
use crate::transport::Fetcher;
use crate::{Engine, EngineOptions, EngineRegistry, Query, Result, SearchError, SearchResult};

mod baidu;
mod bing;
mod brave;
mod duckduckgo;
mod google;
mod sogou;
mod yandex;

pub use baidu::Baidu;
pub use bing::Bing;
pub use brave::Brave;
pub use duckduckgo::DuckDuckGo;
pub use google::Google;
pub use sogou::Sogou;
pub use yandex::Yandex;

/// URL construction and markup description for one search engine.
pub trait Provider: Send + Sync {
    /// Stable lowercase identifier.
    fn name(&self) -> &'static str;

    /// Engine defaults, applied beneath user overrides.
    fn default_options(&self) -> EngineOptions;

    /// Builds the result page URL. Fails with `EmptyQuery` when no search
    /// term is left after composing filters.
    fn build_url(&self, query: &Query) -> Result<String>;

    /// Selectors for pages rendered in the browser.
    fn selectors(&self) -> &ResultSelectors;

    /// Selectors for server-rendered HTML fetched in raw mode.
    fn raw_selectors(&self) -> &ResultSelectors {
        self.selectors()
    }

    /// Maps an extracted `href` to a result URL, or drops it.
    fn normalize_link(&self, href: &str) -> Option<String> {
        absolute_link(href)
    }

    /// Builds the image search URL.
    fn build_image_url(&self, _query: &Query) -> Result<String> {
        Err(SearchError::NotSupported(format!(
            "image search for {}",
            self.name()
        )))
    }

    /// Selector that marks a loaded image result page.
    fn image_selector(&self) -> Option<&'static str> {
        None
    }

    /// Parses an image result page.
    fn parse_images(&self, _html: &str) -> Result<Vec<SearchResult>> {
        Err(SearchError::NotSupported(format!(
            "image search for {}",
            self.name()
        )))
    }
}

/// Keeps absolute http(s) links; resolves protocol-relative ones to https.
/// Blank, fragment and relative links are dropped.
pub fn absolute_link(href: &str) -> Option<String> {
    let href = href.trim();
    if href.starts_with("http://") || href.starts_with("https://") {
        Some(href.to_string())
    } else if let Some(rest) = href.strip_prefix("//") {
        Some(format!("https://{}", rest))
    } else {
        None
    }
}

/// Builds `base` with the given query parameters, failing with `EmptyQuery`
/// when `text` is blank.
pub(crate) fn search_url(base: &str, text_param: &str, text: &str, params: &[(&str, String)]) -> Result<String> {
    let text = text.trim();
    if text.is_empty() {
        return Err(SearchError::EmptyQuery);
    }
    let mut url = Url::parse(base)?;
    {
        let mut pairs = url.query_pairs_mut();
        pairs.append_pair(text_param, text);
        for (key, value) in params {
            pairs.append_pair(key, value);
        }
    }
    Ok(url.into())
}

/// Logs a filter the engine cannot express. Unsupported filters are ignored.
pub(crate) fn ignore_date_interval(engine: &str, query: &Query) {
    if query.date_interval.is_some() {
        debug!(engine, "Date interval filter not supported, ignoring");
    }
}

/// All built-in providers.
pub fn providers() -> Vec<Arc<dyn Provider>> {
    vec![
        Arc::new(Baidu),
        Arc::new(Bing),
        Arc::new(Brave),
        Arc::new(DuckDuckGo),
        Arc::new(Google),
        Arc::new(Sogou),
        Arc::new(Yandex::default()),
    ]
}

/// Effective options for `provider`: user overrides, then the provider's
/// defaults, then the crate baseline.
pub fn options_for(provider: &dyn Provider, settings: &Settings) -> EngineOptions {
    let user = settings
        .engines
        .get(provider.name())
        .copied()
        .unwrap_or_default();
    user.merged(provider.default_options().merged(crate::engine::BASELINE_OPTIONS))
}

/// Builds the engine registry.
///
/// Engines drive the browser when a navigator is given and raw mode is off;
/// otherwise every engine issues raw requests through `fetcher`.
pub fn build_registry(
    settings: &Settings,
    navigator: Option<Arc<dyn Navigator>>,
    fetcher: Arc<dyn Fetcher>,
    solver: Option<Arc<dyn CaptchaSolver>>,
) -> Result<EngineRegistry> {
    for name in settings.engines.keys() {
        if !providers().iter().any(|p| p.name() == name.as_str()) {
            warn!(engine = %name, "Options given for unknown engine");
        }
    }

    let navigator = navigator.filter(|_| !settings.app.raw_requests);
    let mut engines: Vec<Arc<dyn Engine>> = Vec::new();
    for provider in providers() {
        let options = options_for(provider.as_ref(), settings);
        let engine: Arc<dyn Engine> = match &navigator {
            Some(nav) => Arc::new(BrowserEngine::new(
                Arc::clone(&provider),
                Arc::clone(nav),
                options,
                solver.clone(),
            )),
            None => Arc::new(
                RawEngine::new(Arc::clone(&provider), Arc::clone(&fetcher), options)
                    .with_proxy(settings.app.proxy_url.clone())
                    .with_insecure(settings.app.insecure),
            ),
        };
        engines.push(engine);
    }

    let mode = if navigator.is_some() { "browser" } else { "raw" };
    info!(count = engines.len(), mode, "Engines registered");
    EngineRegistry::new(engines)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Query string of `url` as key/value pairs.
    pub fn params(url: &str) -> Vec<(String, String)> {
        Url::parse(url)
            .unwrap()
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    pub fn param(url: &str, key: &str) -> Option<String> {
        params(url).into_iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }
}
