//! DuckDuckGo search, via the JavaScript-free HTML endpoint.

use crate::extract::ResultSelectors;
use crate::{EngineOptions, Query, Result};

use super::{absolute_link, ignore_date_interval, search_url, Provider};

const REDIRECT_PREFIX: &str = "//duckduckgo.com/l/?";

/// DuckDuckGo search provider.
pub struct DuckDuckGo;

const SELECTORS: ResultSelectors = ResultSelectors {
    results: "div.result",
    title: &["a.result__a", ".result__title a"],
    link: &[],
    snippet: &[".result__snippet"],
    snippet_required: false,
    captcha: "div.anomaly-modal__modal, form#challenge-form",
};

/// Extracts the target of a `//duckduckgo.com/l/?uddg=...` redirect.
fn decode_redirect(href: &str) -> Option<String> {
    let query = href
        .strip_prefix(REDIRECT_PREFIX)
        .or_else(|| href.strip_prefix(&REDIRECT_PREFIX[2..]))
        .or_else(|| href.strip_prefix("https://duckduckgo.com/l/?"))?;
    let encoded = query
        .split('&')
        .find_map(|pair| pair.strip_prefix("uddg="))?;
    urlencoding::decode(encoded).ok().map(|s| s.into_owned())
}

impl Provider for DuckDuckGo {
    fn name(&self) -> &'static str {
        "duckduckgo"
    }

    fn default_options(&self) -> EngineOptions {
        EngineOptions::new(1_500, 3, 3_000, 15_000)
    }

    fn build_url(&self, query: &Query) -> Result<String> {
        ignore_date_interval(self.name(), query);
        search_url(
            "https://html.duckduckgo.com/html/",
            "q",
            &query.composed_text(),
            &[("s", query.page_offset(30)?.to_string())],
        )
    }

    fn selectors(&self) -> &ResultSelectors {
        &SELECTORS
    }

    fn normalize_link(&self, href: &str) -> Option<String> {
        let href = href.trim();
        match decode_redirect(href) {
            Some(target) => absolute_link(&target),
            None => absolute_link(href),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::test_support::param;
    use crate::extract::extract_document;

    #[test]
    fn test_build_url() {
        let url = DuckDuckGo.build_url(&Query::new("cat")).unwrap();
        assert!(url.starts_with("https://html.duckduckgo.com/html/?"));
        assert_eq!(param(&url, "s").as_deref(), Some("0"));
        let url = DuckDuckGo.build_url(&Query::new("cat").with_page(2)).unwrap();
        assert_eq!(param(&url, "s").as_deref(), Some("30"));
    }

    #[test]
    fn test_build_url_rejects_overflowing_page() {
        let err = DuckDuckGo
            .build_url(&Query::new("cat").with_page(u32::MAX))
            .unwrap_err();
        assert!(matches!(err, crate::SearchError::InvalidRequest(_)));
    }

    #[test]
    fn test_decode_redirect() {
        assert_eq!(
            DuckDuckGo
                .normalize_link("//duckduckgo.com/l/?uddg=https%3A%2F%2Fexample.com%2Fpage&rut=abc")
                .as_deref(),
            Some("https://example.com/page")
        );
        assert_eq!(
            DuckDuckGo
                .normalize_link("https://duckduckgo.com/l/?uddg=https%3A%2F%2Fexample.com")
                .as_deref(),
            Some("https://example.com")
        );
        assert_eq!(
            DuckDuckGo.normalize_link("https://direct.example.com").as_deref(),
            Some("https://direct.example.com")
        );
        assert_eq!(DuckDuckGo.normalize_link("//duckduckgo.com/l/?rut=abc"), None);
    }

    #[test]
    fn test_parse_results() {
        let html = r#"
            <div class="result">
                <h2 class="result__title"><a class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fexample.com&rut=x">Example  Title</a></h2>
                <a class="result__snippet">Snippet text</a>
            </div>
            <div class="result"><h2 class="result__title"><a class="result__a" href="https://other.com">Other</a></h2></div>
        "#;
        let results = extract_document(html, DuckDuckGo.selectors(), &|h| {
            DuckDuckGo.normalize_link(h)
        })
        .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].url, "https://example.com");
        assert_eq!(results[0].title, "Example Title");
        assert_eq!(results[0].description, "Snippet text");
    }
}
