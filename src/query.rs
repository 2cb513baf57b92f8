//! Search query representation.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{Result, SearchError};

const DATE_FORMAT: &str = "%Y%m%d";

/// Inclusive date range filter, written as `YYYYMMDD..YYYYMMDD`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateInterval {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateInterval {
    /// Parses `YYYYMMDD..YYYYMMDD`. Both ends must be real calendar dates.
    pub fn parse(s: &str) -> Result<Self> {
        let invalid = || SearchError::InvalidRequest(format!("invalid date interval '{}'", s));
        let (from, to) = s.trim().split_once("..").ok_or_else(invalid)?;
        let parse = |part: &str| {
            let part = part.trim();
            if part.len() != 8 {
                return None;
            }
            NaiveDate::parse_from_str(part, DATE_FORMAT).ok()
        };
        let from = parse(from).ok_or_else(invalid)?;
        let to = parse(to).ok_or_else(invalid)?;
        if from > to {
            return Err(invalid());
        }
        Ok(Self { from, to })
    }
}

/// Days between 1970-01-01 and `date`.
pub fn days_since_epoch(date: NaiveDate) -> i64 {
    (date - DateTime::<Utc>::UNIX_EPOCH.date_naive()).num_days()
}

/// A search query with all parameters.
///
/// Engines interpret the fields they support and ignore the rest.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Query {
    /// The search terms.
    pub text: String,
    /// Page number (1-indexed, 0 means first page).
    pub page: u32,
    /// Restrict results to this site.
    pub site: Option<String>,
    /// Restrict results to this file type.
    pub filetype: Option<String>,
    /// Publication date range.
    pub date_interval: Option<DateInterval>,
    /// Maximum number of results to return.
    pub limit: Option<usize>,
    /// Proxy for raw requests.
    pub proxy_url: Option<String>,
    /// Skip certificate verification for raw requests.
    pub insecure: bool,
}

impl Query {
    /// Creates a new query for the given terms.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            page: 1,
            ..Default::default()
        }
    }

    /// Sets the page number.
    pub fn with_page(mut self, page: u32) -> Self {
        self.page = page;
        self
    }

    /// Sets the site filter.
    pub fn with_site(mut self, site: impl Into<String>) -> Self {
        self.site = Some(site.into());
        self
    }

    /// Sets the file type filter.
    pub fn with_filetype(mut self, filetype: impl Into<String>) -> Self {
        self.filetype = Some(filetype.into());
        self
    }

    /// Sets the date interval.
    pub fn with_date_interval(mut self, interval: DateInterval) -> Self {
        self.date_interval = Some(interval);
        self
    }

    /// Sets the result limit.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Sets the proxy URL.
    pub fn with_proxy(mut self, proxy_url: impl Into<String>) -> Self {
        self.proxy_url = Some(proxy_url.into());
        self
    }

    /// Disables certificate verification.
    pub fn with_insecure(mut self, insecure: bool) -> Self {
        self.insecure = insecure;
        self
    }

    /// Page number with `0` folded into the first page.
    pub fn page_or_first(&self) -> u32 {
        self.page.max(1)
    }

    /// Zero-based result offset of the requested page, `per_page` results
    /// per page. Fails instead of wrapping for absurd page numbers.
    pub fn page_offset(&self, per_page: u32) -> Result<u32> {
        (self.page_or_first() - 1)
            .checked_mul(per_page)
            .ok_or_else(|| SearchError::InvalidRequest(format!("page {} is out of range", self.page)))
    }

    /// Query text with `site:` and `filetype:` operators appended.
    pub fn composed_text(&self) -> String {
        let mut text = self.text.trim().to_string();
        if let Some(site) = self.site.as_deref().filter(|s| !s.is_empty()) {
            text.push_str(" site:");
            text.push_str(site);
        }
        if let Some(filetype) = self.filetype.as_deref().filter(|s| !s.is_empty()) {
            text.push_str(" filetype:");
            text.push_str(filetype);
        }
        text.trim().to_string()
    }
}
