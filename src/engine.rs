//! Search engine trait, per-engine options and the engine registry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::ratelimit::RateLimiter;
use crate::{Query, Result, SearchError, SearchResult};

/// Baseline applied beneath every engine's own defaults.
pub const BASELINE_OPTIONS: EngineOptions = EngineOptions::new(1_000, 5, 5_000, 30_000);

/// Per-engine limits and timeouts.
///
/// A zero field means "use the default", never "zero timeout".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineOptions {
    /// Token refill interval in milliseconds.
    pub rate_interval_ms: u64,
    /// Token bucket capacity.
    pub rate_burst: u32,
    /// How long to probe for a single element (CAPTCHA marker).
    pub selector_timeout_ms: u64,
    /// Navigation and result-wait timeout.
    pub timeout_ms: u64,
}

impl EngineOptions {
    pub const fn new(
        rate_interval_ms: u64,
        rate_burst: u32,
        selector_timeout_ms: u64,
        timeout_ms: u64,
    ) -> Self {
        Self {
            rate_interval_ms,
            rate_burst,
            selector_timeout_ms,
            timeout_ms,
        }
    }

    /// Fills unset fields from `defaults` and clamps the element wait to the
    /// navigation timeout.
    pub fn merged(self, defaults: EngineOptions) -> Self {
        fn pick<T: Default + PartialEq>(value: T, fallback: T) -> T {
            if value == T::default() {
                fallback
            } else {
                value
            }
        }

        let mut merged = Self {
            rate_interval_ms: pick(self.rate_interval_ms, defaults.rate_interval_ms),
            rate_burst: pick(self.rate_burst, defaults.rate_burst),
            selector_timeout_ms: pick(self.selector_timeout_ms, defaults.selector_timeout_ms),
            timeout_ms: pick(self.timeout_ms, defaults.timeout_ms),
        };
        if merged.selector_timeout_ms > merged.timeout_ms {
            merged.selector_timeout_ms = merged.timeout_ms;
        }
        merged
    }

    pub fn rate_interval(&self) -> Duration {
        Duration::from_millis(self.rate_interval_ms)
    }

    pub fn selector_timeout(&self) -> Duration {
        Duration::from_millis(self.selector_timeout_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Trait every engine implements, whether it drives a browser or issues raw
/// requests.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Stable lowercase identifier used for routing and logging.
    fn name(&self) -> &str;

    /// Runs a web search.
    async fn search(&self, query: &Query) -> Result<Vec<SearchResult>>;

    /// Runs an image search. Engines without image support fail with
    /// `NotSupported` rather than returning an empty list.
    async fn search_image(&self, _query: &Query) -> Result<Vec<SearchResult>> {
        Err(SearchError::NotSupported(format!(
            "image search for {}",
            self.name()
        )))
    }

    /// Engine-scoped limiter; a token must be acquired before every search.
    fn rate_limiter(&self) -> Arc<RateLimiter>;

    /// Whether the engine is ready to serve.
    fn is_initialized(&self) -> bool;

    /// Effective options after merging with defaults.
    fn options(&self) -> EngineOptions;
}

/// Engines keyed by name. Built once at startup, read-only afterwards.
#[derive(Default)]
pub struct EngineRegistry {
    engines: HashMap<String, Arc<dyn Engine>>,
}

impl EngineRegistry {
    /// Builds a registry, rejecting duplicate names.
    pub fn new(engines: Vec<Arc<dyn Engine>>) -> Result<Self> {
        let mut map = HashMap::with_capacity(engines.len());
        for engine in engines {
            let name = engine.name().to_lowercase();
            if map.insert(name.clone(), engine).is_some() {
                return Err(SearchError::Config(format!(
                    "engine '{}' registered twice",
                    name
                )));
            }
        }
        Ok(Self { engines: map })
    }

    /// Looks up an engine by name, case-insensitively.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Engine>> {
        self.engines.get(&name.to_lowercase())
    }

    /// Sorted engine names.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.engines.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Engine>> {
        self.engines.values()
    }

    pub fn len(&self) -> usize {
        self.engines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }
}
