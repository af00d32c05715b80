//! Client-side filter predicates and the free-text search matcher.
//!
//! The backend only supports coarse equality predicates, so every richer
//! browse filter runs here, synchronously, over the already-fetched record
//! set. All dimensions compose by AND; a dimension left at its unset default
//! is vacuously true.

use serde::{Deserialize, Serialize};

use crate::{Listing, WantedRequest};

/// One browse view's filter configuration.
///
/// Bounds are `None` when unconstrained; `Default` is the all-vacuous
/// config, which matches every record.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub min_amount: Option<u32>,
    pub max_amount: Option<u32>,
    pub min_quality: u8,
    pub city: Option<String>,
    pub require_receipt: bool,
    pub require_delivery: bool,
    pub require_verified: bool,
    pub query: String,
}

/// Facet view a record exposes to the predicate engine.
///
/// Listings and requests carry semantically different fields (price vs
/// budget, own rating vs acceptance threshold) but are filtered identically,
/// so both map onto this one surface. Flags a record type does not have are
/// reported as `false`.
pub trait Filterable {
    fn amount(&self) -> u32;
    fn quality(&self) -> u8;
    fn city(&self) -> &str;
    fn has_receipt(&self) -> bool;
    fn has_delivery(&self) -> bool;
    fn is_verified(&self) -> bool;
}

/// Text fields the search matcher is confined to.
pub trait Searchable {
    fn primary_text(&self) -> &str;
    fn city_text(&self) -> &str;
}

impl FilterConfig {
    /// Structured-dimension decision for one record.
    pub fn matches<R: Filterable>(&self, record: &R) -> bool {
        if let Some(min) = self.min_amount {
            if record.amount() < min {
                return false;
            }
        }
        if let Some(max) = self.max_amount {
            if record.amount() > max {
                return false;
            }
        }
        if record.quality() < self.min_quality {
            return false;
        }
        if let Some(city) = &self.city {
            if record.city() != city {
                return false;
            }
        }
        if self.require_receipt && !record.has_receipt() {
            return false;
        }
        if self.require_delivery && !record.has_delivery() {
            return false;
        }
        if self.require_verified && !record.is_verified() {
            return false;
        }
        true
    }

    /// Case-insensitive substring match over the declared text fields only.
    /// An empty query matches everything.
    pub fn matches_query<R: Searchable>(&self, record: &R) -> bool {
        if self.query.is_empty() {
            return true;
        }
        let needle = self.query.to_lowercase();
        record.primary_text().to_lowercase().contains(&needle)
            || record.city_text().to_lowercase().contains(&needle)
    }

    /// Full keep/drop decision: structured dimensions AND search.
    pub fn keeps<R: Filterable + Searchable>(&self, record: &R) -> bool {
        self.matches(record) && self.matches_query(record)
    }
}

impl Filterable for Listing {
    fn amount(&self) -> u32 {
        self.price
    }

    fn quality(&self) -> u8 {
        self.quality_rating
    }

    fn city(&self) -> &str {
        &self.city
    }

    fn has_receipt(&self) -> bool {
        self.has_receipt
    }

    fn has_delivery(&self) -> bool {
        self.has_delivery
    }

    fn is_verified(&self) -> bool {
        self.is_verified
    }
}

impl Filterable for WantedRequest {
    fn amount(&self) -> u32 {
        self.budget
    }

    fn quality(&self) -> u8 {
        self.quality_min
    }

    fn city(&self) -> &str {
        &self.city
    }

    // Requests have no receipt or verification facet.
    fn has_receipt(&self) -> bool {
        false
    }

    fn has_delivery(&self) -> bool {
        self.delivery_needed
    }

    fn is_verified(&self) -> bool {
        false
    }
}

impl Searchable for Listing {
    fn primary_text(&self) -> &str {
        &self.name
    }

    fn city_text(&self) -> &str {
        &self.city
    }
}

impl Searchable for WantedRequest {
    fn primary_text(&self) -> &str {
        &self.title
    }

    fn city_text(&self) -> &str {
        &self.city
    }
}
