//! Google search.

use chrono::NaiveDate;

use crate::extract::ResultSelectors;
use crate::{EngineOptions, Query, Result};

use super::{absolute_link, search_url, Provider};

/// Google search provider.
pub struct Google;

const SELECTORS: ResultSelectors = ResultSelectors {
    results: "div.g",
    title: &["h3"],
    link: &["a[href]"],
    snippet: &["div.VwiC3b", "div[data-sncf]", "span.aCOpRe"],
    snippet_required: false,
    captcha: "form#captcha-form, div#recaptcha, iframe[src*=\"recaptcha\"]",
};

fn us_date(date: &NaiveDate) -> String {
    date.format("%-m/%-d/%Y").to_string()
}

impl Provider for Google {
    fn name(&self) -> &'static str {
        "google"
    }

    fn default_options(&self) -> EngineOptions {
        EngineOptions::new(3_000, 2, 3_000, 20_000)
    }

    fn build_url(&self, query: &Query) -> Result<String> {
        let mut params = vec![
            ("start", query.page_offset(10)?.to_string()),
            ("hl", "en".to_string()),
        ];
        if let Some(interval) = &query.date_interval {
            params.push((
                "tbs",
                format!(
                    "cdr:1,cd_min:{},cd_max:{}",
                    us_date(&interval.from),
                    us_date(&interval.to)
                ),
            ));
        }
        search_url(
            "https://www.google.com/search",
            "q",
            &query.composed_text(),
            &params,
        )
    }

    fn selectors(&self) -> &ResultSelectors {
        &SELECTORS
    }

    /// Unwraps `/url?q=` redirects and drops other Google-internal links.
    fn normalize_link(&self, href: &str) -> Option<String> {
        let href = href.trim();
        if let Some(rest) = href.strip_prefix("/url?q=") {
            let target = rest.split('&').next().unwrap_or(rest);
            let decoded = urlencoding::decode(target).ok()?;
            return absolute_link(&decoded);
        }
        absolute_link(href)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::test_support::param;
    use crate::extract::{extract_document, has_marker};
    use crate::{DateInterval, SearchError};

    #[test]
    fn test_build_url_pagination() {
        let first = Google.build_url(&Query::new("cat")).unwrap();
        assert_eq!(param(&first, "start").as_deref(), Some("0"));
        assert_eq!(param(&first, "hl").as_deref(), Some("en"));

        let second = Google.build_url(&Query::new("cat").with_page(2)).unwrap();
        assert_eq!(param(&second, "start").as_deref(), Some("10"));
        assert_eq!(param(&second, "q").as_deref(), Some("cat"));
    }

    #[test]
    fn test_build_url_rejects_overflowing_page() {
        let err = Google
            .build_url(&Query::new("cat").with_page(u32::MAX))
            .unwrap_err();
        assert!(matches!(err, SearchError::InvalidRequest(_)));
    }

    #[test]
    fn test_build_url_date_interval() {
        let query = Query::new("cat")
            .with_date_interval(DateInterval::parse("20240105..20240220").unwrap());
        let url = Google.build_url(&query).unwrap();
        assert_eq!(
            param(&url, "tbs").as_deref(),
            Some("cdr:1,cd_min:1/5/2024,cd_max:2/20/2024")
        );
    }

    #[test]
    fn test_normalize_link() {
        assert_eq!(
            Google
                .normalize_link("/url?q=https://example.com/page&sa=U")
                .as_deref(),
            Some("https://example.com/page")
        );
        assert_eq!(
            Google.normalize_link("/url?q=https%3A%2F%2Fexample.com%2Fa%3Fb%3D1&sa=U").as_deref(),
            Some("https://example.com/a?b=1")
        );
        assert_eq!(Google.normalize_link("/search?q=related"), None);
        assert_eq!(
            Google.normalize_link("https://www.rust-lang.org/").as_deref(),
            Some("https://www.rust-lang.org/")
        );
    }

    #[test]
    fn test_parse_results() {
        let html = r#"
            <div class="g">
                <a href="https://www.rust-lang.org/"><h3>Rust Programming Language</h3></a>
                <div class="VwiC3b">A language empowering everyone</div>
            </div>
            <div class="g">
                <a href="/url?q=https://doc.rust-lang.org/book/&sa=U"><h3>The Book</h3></a>
            </div>
            <div class="g"><a href="https://example.com">No h3 here</a></div>
        "#;
        let results =
            extract_document(html, Google.selectors(), &|h| Google.normalize_link(h)).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].title, "Rust Programming Language");
        assert_eq!(results[0].description, "A language empowering everyone");
        assert_eq!(results[1].url, "https://doc.rust-lang.org/book/");
    }

    #[test]
    fn test_captcha_marker() {
        let html = r#"<form id="captcha-form"><div id="recaptcha"></div></form>"#;
        assert!(has_marker(html, Google.selectors().captcha));
        assert!(!has_marker("<div class='g'></div>", Google.selectors().captcha));
    }
}
