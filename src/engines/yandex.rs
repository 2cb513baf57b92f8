//! Yandex search.

use crate::extract::ResultSelectors;
use crate::{EngineOptions, Query, Result};

use super::{search_url, Provider};

/// Yandex search provider.
///
/// Date intervals become a `date:` operator in the query text, which Yandex
/// understands natively.
#[derive(Debug, Clone, Copy, Default)]
pub struct Yandex {
    /// Yandex region id sent as `lr`; Yandex guesses from the client IP
    /// when unset.
    region: Option<u32>,
}

impl Yandex {
    pub fn with_region(region: u32) -> Self {
        Self {
            region: Some(region),
        }
    }
}

const SELECTORS: ResultSelectors = ResultSelectors {
    results: "li.serp-item",
    title: &["a.OrganicTitle-Link", "h2 a", ".organic__url"],
    link: &[],
    snippet: &[".OrganicTextContentSpan", ".TextContainer", ".organic__content-wrapper"],
    snippet_required: false,
    captcha: "form#checkbox-captcha-form, .CheckboxCaptcha, .AdvancedCaptcha",
};

impl Provider for Yandex {
    fn name(&self) -> &'static str {
        "yandex"
    }

    fn default_options(&self) -> EngineOptions {
        EngineOptions::new(3_000, 2, 3_000, 20_000)
    }

    fn build_url(&self, query: &Query) -> Result<String> {
        let mut text = query.composed_text();
        if let Some(interval) = query.date_interval.filter(|_| !text.is_empty()) {
            text = format!(
                "{} date:{}..{}",
                text,
                interval.from.format("%Y%m%d"),
                interval.to.format("%Y%m%d")
            );
        }
        // Yandex pages are zero-based.
        let mut params = vec![("p", query.page_offset(1)?.to_string())];
        if let Some(region) = self.region {
            params.push(("lr", region.to_string()));
        }
        search_url("https://yandex.com/search/", "text", &text, &params)
    }

    fn selectors(&self) -> &ResultSelectors {
        &SELECTORS
    }
}
