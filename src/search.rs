//! The two `Engine` implementations.
//!
//! [`BrowserEngine`] loads result pages in the shared browser session;
//! [`RawEngine`] fetches them over the raw transport. Both are generic over
//! an injected [`Provider`] that owns URL building and selectors.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::captcha::{CaptchaChallenge, CaptchaKind, CaptchaSolver};
use crate::engines::Provider;
use crate::extract::{extract_document, extract_elements, has_marker};
use crate::page::{probe, wait_across_navigation, wait_for, Navigator, PageHandle};
use crate::ratelimit::RateLimiter;
use crate::result::{apply_limit, deduplicate};
use crate::transport::Fetcher;
use crate::{Engine, EngineOptions, Query, Result, SearchError, SearchResult};

/// Engine that drives a logical page in the shared browser.
pub struct BrowserEngine {
    provider: Arc<dyn Provider>,
    navigator: Arc<dyn Navigator>,
    options: EngineOptions,
    limiter: Arc<RateLimiter>,
    solver: Option<Arc<dyn CaptchaSolver>>,
}

impl BrowserEngine {
    pub fn new(
        provider: Arc<dyn Provider>,
        navigator: Arc<dyn Navigator>,
        options: EngineOptions,
        solver: Option<Arc<dyn CaptchaSolver>>,
    ) -> Self {
        Self {
            limiter: Arc::new(RateLimiter::from_options(&options)),
            provider,
            navigator,
            options,
            solver,
        }
    }

    async fn open(&self, url: &str) -> Result<Box<dyn PageHandle>> {
        if !self.navigator.is_live() {
            return Err(SearchError::NotInitialized(format!(
                "browser session for {} is not running",
                self.provider.name()
            )));
        }
        debug!(engine = self.provider.name(), url, "Navigating");
        self.navigator.navigate(url, self.options.timeout()).await
    }

    /// Closes `page` unless the session keeps pages open for debugging.
    async fn finish(&self, page: Box<dyn PageHandle>) {
        if self.navigator.leave_page_open() {
            debug!(engine = self.provider.name(), url = page.url(), "Leaving page open");
            return;
        }
        if let Err(e) = page.close().await {
            warn!(engine = self.provider.name(), "Failed to close page: {}", e);
        }
    }

    async fn scrape(&self, page: &dyn PageHandle, query: &Query) -> Result<Vec<SearchResult>> {
        let name = self.provider.name();
        let selectors = self.provider.selectors();
        let nodes = wait_for(
            page,
            selectors.results,
            Some(selectors.captcha),
            self.options.timeout(),
        )
        .await?;

        if nodes.is_empty() {
            if probe(page, selectors.captcha, self.options.selector_timeout()).await? {
                error!(engine = name, url = page.url(), "Captcha detected");
                return match self.solve_captcha(page).await? {
                    Some(results) => Ok(apply_limit(results, query.limit)),
                    None => Err(SearchError::CaptchaDetected),
                };
            }
            info!(engine = name, url = page.url(), "No results found on page");
            return Ok(Vec::new());
        }

        debug!(engine = name, count = nodes.len(), "Parsing search results");
        let results =
            extract_elements(&nodes, selectors, &|href| self.provider.normalize_link(href)).await;
        Ok(apply_limit(results, query.limit))
    }

    /// Runs the configured solver and retries extraction once. `None` means
    /// the challenge is still in place.
    async fn solve_captcha(&self, page: &dyn PageHandle) -> Result<Option<Vec<SearchResult>>> {
        let Some(solver) = &self.solver else {
            return Ok(None);
        };
        let selectors = self.provider.selectors();

        let mut site_key = None;
        for marker in page.find_all(selectors.captcha).await? {
            site_key = match marker.attribute("data-sitekey").await? {
                Some(key) => Some(key),
                None => match marker.find("[data-sitekey]").await? {
                    Some(inner) => inner.attribute("data-sitekey").await?,
                    None => None,
                },
            };
            if site_key.is_some() {
                break;
            }
        }
        let Some(site_key) = site_key else {
            warn!(engine = self.provider.name(), "Captcha has no site key, cannot solve");
            return Ok(None);
        };

        let challenge = CaptchaChallenge {
            kind: CaptchaKind::detect(selectors.captcha),
            site_key,
            page_url: page.url().to_string(),
        };
        let token = match solver.solve(&challenge).await {
            Ok(token) => token,
            Err(e) => {
                warn!(engine = self.provider.name(), "Captcha solver failed: {}", e);
                return Ok(None);
            }
        };

        // Submitting the token reloads the page.
        page.evaluate(&challenge.injection_script(&token)).await?;
        let nodes = wait_across_navigation(page, selectors.results, self.options.timeout()).await;
        if nodes.is_empty() {
            return Ok(None);
        }
        info!(engine = self.provider.name(), "Captcha solved");
        Ok(Some(
            extract_elements(&nodes, selectors, &|href| self.provider.normalize_link(href)).await,
        ))
    }

    async fn scrape_images(&self, page: &dyn PageHandle, marker: &str) -> Result<Vec<SearchResult>> {
        let captcha = self.provider.selectors().captcha;
        let tiles = wait_for(page, marker, Some(captcha), self.options.timeout()).await?;
        if tiles.is_empty() && probe(page, captcha, self.options.selector_timeout()).await? {
            error!(engine = self.provider.name(), url = page.url(), "Captcha detected");
            return Err(SearchError::CaptchaDetected);
        }
        let html = page.content().await?;
        self.provider.parse_images(&html)
    }
}

#[async_trait]
impl Engine for BrowserEngine {
    fn name(&self) -> &str {
        self.provider.name()
    }

    async fn search(&self, query: &Query) -> Result<Vec<SearchResult>> {
        debug!(engine = self.name(), text = %query.text, page = query.page, "Starting search");
        let url = self.provider.build_url(query)?;
        let page = self.open(&url).await?;
        let outcome = self.scrape(page.as_ref(), query).await;
        self.finish(page).await;
        outcome
    }

    async fn search_image(&self, query: &Query) -> Result<Vec<SearchResult>> {
        let url = self.provider.build_image_url(query)?;
        let Some(marker) = self.provider.image_selector() else {
            return Err(SearchError::NotSupported(format!(
                "image search for {}",
                self.name()
            )));
        };
        let page = self.open(&url).await?;
        let outcome = self.scrape_images(page.as_ref(), marker).await;
        self.finish(page).await;
        outcome.map(|results| apply_limit(results, query.limit))
    }

    fn rate_limiter(&self) -> Arc<RateLimiter> {
        Arc::clone(&self.limiter)
    }

    fn is_initialized(&self) -> bool {
        self.navigator.is_live()
    }

    fn options(&self) -> EngineOptions {
        self.options
    }
}

/// Engine that fetches result pages without a browser.
pub struct RawEngine {
    provider: Arc<dyn Provider>,
    fetcher: Arc<dyn Fetcher>,
    options: EngineOptions,
    limiter: Arc<RateLimiter>,
    proxy_url: Option<String>,
    insecure: bool,
}

impl RawEngine {
    pub fn new(provider: Arc<dyn Provider>, fetcher: Arc<dyn Fetcher>, options: EngineOptions) -> Self {
        Self {
            limiter: Arc::new(RateLimiter::from_options(&options)),
            provider,
            fetcher,
            options,
            proxy_url: None,
            insecure: false,
        }
    }

    /// Proxy used when the query does not name one.
    pub fn with_proxy(mut self, proxy_url: Option<String>) -> Self {
        self.proxy_url = proxy_url;
        self
    }

    pub fn with_insecure(mut self, insecure: bool) -> Self {
        self.insecure = insecure;
        self
    }

    /// Fetches `url` and returns the body. An error status is reported as a
    /// CAPTCHA when the body carries the marker.
    async fn fetch(&self, url: &str, query: &Query) -> Result<String> {
        let name = self.provider.name();
        debug!(engine = name, url, "Raw request");
        let proxy = query.proxy_url.as_deref().or(self.proxy_url.as_deref());
        let response = self
            .fetcher
            .fetch(url, proxy, query.insecure || self.insecure)
            .await?;
        debug!(engine = name, status = response.status, "Raw response");

        if !response.is_success() {
            if has_marker(&response.body, self.provider.raw_selectors().captcha) {
                error!(engine = name, url, "Captcha detected");
                return Err(SearchError::CaptchaDetected);
            }
            return Err(SearchError::RawRequest(format!(
                "{} returned HTTP {}",
                name, response.status
            )));
        }
        Ok(response.body)
    }
}

#[async_trait]
impl Engine for RawEngine {
    fn name(&self) -> &str {
        self.provider.name()
    }

    async fn search(&self, query: &Query) -> Result<Vec<SearchResult>> {
        let url = self.provider.build_url(query)?;
        let html = self.fetch(&url, query).await?;
        let selectors = self.provider.raw_selectors();
        let results = extract_document(&html, selectors, &|href| self.provider.normalize_link(href))?;

        if results.is_empty() {
            if has_marker(&html, selectors.captcha) {
                error!(engine = self.name(), url = %url, "Captcha detected");
                return Err(SearchError::CaptchaDetected);
            }
            info!(engine = self.name(), url = %url, "No results found on page");
        }
        Ok(apply_limit(deduplicate(results), query.limit))
    }

    async fn search_image(&self, query: &Query) -> Result<Vec<SearchResult>> {
        let url = self.provider.build_image_url(query)?;
        let html = self.fetch(&url, query).await?;
        let results = self.provider.parse_images(&html)?;
        if results.is_empty() && has_marker(&html, self.provider.raw_selectors().captcha) {
            error!(engine = self.name(), url = %url, "Captcha detected");
            return Err(SearchError::CaptchaDetected);
        }
        Ok(apply_limit(deduplicate(results), query.limit))
    }

    fn rate_limiter(&self) -> Arc<RateLimiter> {
        Arc::clone(&self.limiter)
    }

    fn is_initialized(&self) -> bool {
        true
    }

    fn options(&self) -> EngineOptions {
        self.options
    }
}
