//! Search result types and URL deduplication.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// A single search result.
///
/// `rank` is 1-based and dense within one response. It is assigned when the
/// result is accepted, never taken from the raw DOM position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub rank: usize,
    pub url: String,
    pub title: String,
    pub description: String,
}

impl SearchResult {
    /// Creates a new search result.
    pub fn new(
        rank: usize,
        url: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            rank,
            url: url.into(),
            title: title.into(),
            description: description.into(),
        }
    }
}

/// Accumulates results, assigning the next dense rank on every push.
#[derive(Debug, Default)]
pub struct ResultSet {
    results: Vec<SearchResult>,
}

impl ResultSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a result; blank URLs are rejected.
    pub fn push(
        &mut self,
        url: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> bool {
        let url = url.into();
        if url.trim().is_empty() {
            return false;
        }
        let rank = self.results.len() + 1;
        self.results.push(SearchResult::new(rank, url, title, description));
        true
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn into_vec(self) -> Vec<SearchResult> {
        self.results
    }
}

/// Removes results with an already-seen URL, keeping the first occurrence,
/// and re-ranks the survivors from 1.
pub fn deduplicate(results: Vec<SearchResult>) -> Vec<SearchResult> {
    let mut seen = HashSet::with_capacity(results.len());
    results
        .into_iter()
        .filter(|r| seen.insert(r.url.clone()))
        .enumerate()
        .map(|(i, mut r)| {
            r.rank = i + 1;
            r
        })
        .collect()
}

/// Truncates to `limit` results if one is given.
pub fn apply_limit(mut results: Vec<SearchResult>, limit: Option<usize>) -> Vec<SearchResult> {
    if let Some(limit) = limit {
        results.truncate(limit);
    }
    results
}
