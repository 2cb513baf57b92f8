//! Baidu search (百度).

use crate::extract::ResultSelectors;
use crate::{EngineOptions, Query, Result};

use super::{ignore_date_interval, search_url, Provider};

/// Baidu search provider. Result links are `baidu.com/link?url=` redirects
/// and are returned as-is.
pub struct Baidu;

const SELECTORS: ResultSelectors = ResultSelectors {
    results: "div.result, div.c-container",
    title: &["h3 a", ".t a"],
    link: &[],
    snippet: &[".c-abstract", ".c-span-last", ".content-right_8Zs40"],
    snippet_required: false,
    captcha: "#wappass, .vcode-spin, .passMod_dialog-body",
};

impl Provider for Baidu {
    fn name(&self) -> &'static str {
        "baidu"
    }

    fn default_options(&self) -> EngineOptions {
        EngineOptions::new(2_000, 3, 3_000, 20_000)
    }

    fn build_url(&self, query: &Query) -> Result<String> {
        ignore_date_interval(self.name(), query);
        search_url(
            "https://www.baidu.com/s",
            "wd",
            &query.composed_text(),
            &[("pn", query.page_offset(10)?.to_string())],
        )
    }

    fn selectors(&self) -> &ResultSelectors {
        &SELECTORS
    }
}
