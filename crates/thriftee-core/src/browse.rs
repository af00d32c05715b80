//! Per-view browse state: one fetch per mount, client-side filtering,
//! incremental reveal.
//!
//! A `BrowseView` is owned by exactly one view instance; there is no
//! cross-view sharing. Fetches are tracked by a generation token so a result
//! that arrives after the view refetched (or unmounted and remounted) is
//! discarded instead of being applied to stale state.

use chrono::{DateTime, Utc};

use crate::filter::{Filterable, Searchable};
use crate::reveal::Reveal;
use crate::{FilterConfig, Listing, WantedRequest};

/// Browsable records carry a creation timestamp used for recency ordering.
pub trait Browsable: Filterable + Searchable {
    fn created_at(&self) -> DateTime<Utc>;
}

impl Browsable for Listing {
    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl Browsable for WantedRequest {
    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// Token tying a fetch completion back to the `begin_fetch` that started it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchGeneration(u64);

#[derive(Debug, Clone, Default)]
pub struct BrowseView<R> {
    config: FilterConfig,
    reveal: Reveal,
    records: Vec<R>,
    generation: u64,
}

impl<R: Browsable> BrowseView<R> {
    pub fn new() -> Self {
        Self {
            config: FilterConfig::default(),
            reveal: Reveal::new(),
            records: Vec::new(),
            generation: 0,
        }
    }

    /// Marks the start of a fetch. Each call invalidates tokens handed out
    /// earlier.
    pub fn begin_fetch(&mut self) -> FetchGeneration {
        self.generation += 1;
        FetchGeneration(self.generation)
    }

    /// Applies a fetch result, sorted newest-first, and resets the reveal.
    /// Returns `false` without touching state when the token is stale.
    pub fn complete_fetch(&mut self, generation: FetchGeneration, mut records: Vec<R>) -> bool {
        if generation.0 != self.generation {
            return false;
        }
        records.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
        self.records = records;
        self.reveal.reset();
        true
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: FilterConfig) {
        self.config = config;
    }

    pub fn set_query(&mut self, query: impl Into<String>) {
        self.config.query = query.into();
    }

    /// Back to the default config and the first page.
    pub fn clear_filters(&mut self) {
        self.config = FilterConfig::default();
        self.reveal.reset();
    }

    pub fn load_more(&mut self) {
        self.reveal.load_more();
    }

    pub fn has_more(&self) -> bool {
        self.reveal.has_more(self.filtered().len())
    }

    pub fn total_matching(&self) -> usize {
        self.filtered().len()
    }

    /// The slice the view renders: the first `visible` entries of the
    /// filtered, recency-ordered result.
    pub fn visible(&self) -> Vec<&R> {
        let filtered = self.filtered();
        let shown = self.reveal.shown(filtered.len());
        filtered.into_iter().take(shown).collect()
    }

    fn filtered(&self) -> Vec<&R> {
        self.records
            .iter()
            .filter(|record| self.config.keeps(*record))
            .collect()
    }
}
