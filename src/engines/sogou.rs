//! Sogou search (搜狗).

use crate::extract::ResultSelectors;
use crate::{EngineOptions, Query, Result};

use super::{ignore_date_interval, search_url, Provider};

const ORIGIN: &str = "http://www.sogou.com";

/// Sogou search provider. Result links are often site-relative redirects.
pub struct Sogou;

const SELECTORS: ResultSelectors = ResultSelectors {
    results: "div.vrwrap, div.rb",
    title: &["h3 a", "a.pt", ".vr-title a"],
    link: &[],
    snippet: &["div.ft", ".str-text", ".str_info", ".space-txt"],
    snippet_required: false,
    captcha: ".vr-captcha, #seccode",
};

impl Provider for Sogou {
    fn name(&self) -> &'static str {
        "sogou"
    }

    fn default_options(&self) -> EngineOptions {
        EngineOptions::new(2_000, 3, 3_000, 20_000)
    }

    fn build_url(&self, query: &Query) -> Result<String> {
        ignore_date_interval(self.name(), query);
        search_url(
            "https://www.sogou.com/web",
            "query",
            &query.composed_text(),
            &[
                ("page", query.page_or_first().to_string()),
                ("ie", "utf8".to_string()),
            ],
        )
    }

    fn selectors(&self) -> &ResultSelectors {
        &SELECTORS
    }

    fn normalize_link(&self, href: &str) -> Option<String> {
        let href = href.trim();
        if href.is_empty() || href.starts_with('#') {
            return None;
        }
        if href.starts_with("http://") || href.starts_with("https://") {
            Some(href.to_string())
        } else if href.starts_with('/') {
            Some(format!("{}{}", ORIGIN, href))
        } else {
            None
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
        let url = Sogou.build_url(&Query::new("rust").with_page(2)).unwrap();
        assert!(url.starts_with("https://www.sogou.com/web?"));
        assert_eq!(param(&url, "query").as_deref(), Some("rust"));
        assert_eq!(param(&url, "page").as_deref(), Some("2"));
        assert_eq!(param(&url, "ie").as_deref(), Some("utf8"));
    }

    #[test]
    fn test_build_url_last_page() {
        let url = Sogou.build_url(&Query::new("rust").with_page(u32::MAX)).unwrap();
        assert_eq!(param(&url, "page").as_deref(), Some("4294967295"));
    }

    #[test]
    fn test_build_url_filters() {
        let query = Query::new("rust").with_site("rust-lang.org").with_filetype("pdf");
        let url = Sogou.build_url(&query).unwrap();
        assert_eq!(
            param(&url, "query").as_deref(),
            Some("rust site:rust-lang.org filetype:pdf")
        );
    }

    #[test]
    fn test_normalize_link() {
        assert_eq!(
            Sogou.normalize_link("/link?url=abc").as_deref(),
            Some("http://www.sogou.com/link?url=abc")
        );
        assert_eq!(
            Sogou.normalize_link("https://rust-lang.org").as_deref(),
            Some("https://rust-lang.org")
        );
        assert_eq!(Sogou.normalize_link("#"), None);
        assert_eq!(Sogou.normalize_link(""), None);
    }

    #[test]
    fn test_parse_with_fallback_title() {
        let html = r#"
            <div class="vrwrap"><h3><a href="/link?url=1">Rust 编程语言</a></h3><div class="ft">系统编程</div></div>
            <div class="rb"><a class="pt" href="https://doc.rust-lang.org">Rust Book</a></div>
        "#;
        let results =
            extract_document(html, Sogou.raw_selectors(), &|h| Sogou.normalize_link(h)).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].url, "http://www.sogou.com/link?url=1");
        assert_eq!(results[0].title, "Rust 编程语言");
        assert_eq!(results[0].description, "系统编程");
        assert_eq!(results[1].title, "Rust Book");
    }
}
