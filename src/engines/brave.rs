//! Brave search.

use crate::extract::ResultSelectors;
use crate::{EngineOptions, Query, Result};

use super::{ignore_date_interval, search_url, Provider};

/// Brave search provider.
///
/// Pages are addressed with a zero-based `offset`. Brave has no URL
/// parameter for date ranges.
pub struct Brave;

const BROWSER_SELECTORS: ResultSelectors = ResultSelectors {
    results: "div.snippet",
    title: &["a.heading-serpresult", "a.title"],
    link: &[],
    snippet: &["div.snippet-description", "div.description"],
    snippet_required: true,
    captcha: "div.h-captcha",
};

const RAW_SELECTORS: ResultSelectors = ResultSelectors {
    results: "div.snippet",
    title: &["a.title", "a.heading-serpresult"],
    link: &[],
    snippet: &["div.description", "div.snippet-description", ".generic-snippet .content"],
    snippet_required: false,
    captcha: "div.h-captcha",
};

impl Provider for Brave {
    fn name(&self) -> &'static str {
        "brave"
    }

    fn default_options(&self) -> EngineOptions {
        EngineOptions::new(2_000, 3, 3_000, 20_000)
    }

    fn build_url(&self, query: &Query) -> Result<String> {
        ignore_date_interval(self.name(), query);
        let offset = query.page_offset(1)?;
        search_url(
            "https://search.brave.com/search",
            "q",
            &query.composed_text(),
            &[("offset", offset.to_string()), ("spellcheck", "0".to_string())],
        )
    }

    fn selectors(&self) -> &ResultSelectors {
        &BROWSER_SELECTORS
    }

    fn raw_selectors(&self) -> &ResultSelectors {
        &RAW_SELECTORS
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::test_support::param;
    use crate::extract::extract_document;
    use crate::{DateInterval, SearchError};

    #[test]
    fn test_build_url_first_page() {
        let url = Brave.build_url(&Query::new("cat")).unwrap();
        assert!(url.starts_with("https://search.brave.com/search?"));
        assert_eq!(param(&url, "q").as_deref(), Some("cat"));
        assert_eq!(param(&url, "offset").as_deref(), Some("0"));
        assert_eq!(param(&url, "spellcheck").as_deref(), Some("0"));
    }

    #[test]
    fn test_build_url_page_two() {
        let url = Brave.build_url(&Query::new("cat").with_page(2)).unwrap();
        assert_eq!(param(&url, "offset").as_deref(), Some("1"));
    }

    #[test]
    fn test_build_url_last_page() {
        let url = Brave.build_url(&Query::new("cat").with_page(u32::MAX)).unwrap();
        assert_eq!(param(&url, "offset").as_deref(), Some("4294967294"));
    }

    #[test]
    fn test_build_url_empty() {
        assert!(matches!(
            Brave.build_url(&Query::new("  ")),
            Err(SearchError::EmptyQuery)
        ));
    }

    #[test]
    fn test_build_url_ignores_date_interval() {
        let query = Query::new("cat")
            .with_date_interval(DateInterval::parse("20240101..20240131").unwrap());
        let url = Brave.build_url(&query).unwrap();
        assert_eq!(url, Brave.build_url(&Query::new("cat")).unwrap());
    }

    #[test]
    fn test_build_url_site_filter() {
        let url = Brave.build_url(&Query::new("cat").with_site("wikipedia.org")).unwrap();
        assert_eq!(param(&url, "q").as_deref(), Some("cat site:wikipedia.org"));
    }

    #[test]
    fn test_raw_parse() {
        let html = r##"
            <div class="snippet"><a class="title" href="https://cats.com">Cats</a><div class="description">All about cats</div></div>
            <div class="snippet"><a class="title" href="#">Ad</a></div>
            <div class="snippet"><a class="title" href="https://kittens.org">Kittens</a></div>
        "##;
        let results =
            extract_document(html, Brave.raw_selectors(), &|h| Brave.normalize_link(h)).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].url, "https://cats.com");
        assert_eq!(results[0].description, "All about cats");
        assert_eq!(results[1].rank, 2);
    }

    #[test]
    fn test_browser_selectors_require_snippet() {
        let html = r#"
            <div class="snippet"><a class="heading-serpresult" href="https://a.com">A</a></div>
            <div class="snippet"><a class="heading-serpresult" href="https://b.com">B</a><div class="snippet-description">b</div></div>
        "#;
        let results =
            extract_document(html, Brave.selectors(), &|h| Brave.normalize_link(h)).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].url, "https://b.com");
    }
}
