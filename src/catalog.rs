//! Static product catalog.
//!
//! Catalog entries are read-only configuration, not mutable core state.
//! Prices are snapshotted into an order attempt at selection time and
//! never re-read afterwards.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::types::Amount;

/// One sellable product: a virtual number for a given country.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CatalogEntry {
    /// Stable key used in button payloads (`country_<key>`).
    pub key: String,
    /// Display label, informational only.
    pub label: String,
    /// Price in the smallest currency unit.
    pub price: Amount,
}

/// Read-only catalog index.
#[derive(Debug, Clone)]
pub struct Catalog {
    by_key: FxHashMap<String, CatalogEntry>,
    // Insertion order, for listings.
    keys: Vec<String>,
}

impl Catalog {
    pub fn new(entries: Vec<CatalogEntry>) -> Self {
        let keys: Vec<String> = entries.iter().map(|e| e.key.clone()).collect();
        let by_key = entries.into_iter().map(|e| (e.key.clone(), e)).collect();
        Self { by_key, keys }
    }

    pub fn get(&self, key: &str) -> Option<&CatalogEntry> {
        self.by_key.get(key)
    }

    pub fn entries(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.keys.iter().filter_map(|k| self.by_key.get(k))
    }
}
