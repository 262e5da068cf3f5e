//! Source-address to country resolution.
//!
//! The geographic detector only needs a country code per source address.
//! Deployments plug in a real resolver; tests and the default wiring use the
//! static table or the null resolver.

use parking_lot::RwLock;
use std::collections::HashMap;

/// Resolves a source address to an ISO country code.
pub trait GeoResolver: Send + Sync {
    fn country_for(&self, source_address: &str) -> Option<String>;
}

/// Resolver that knows nothing. Geographic scoring degrades to 0.
#[derive(Debug, Default)]
pub struct NullGeoResolver;

impl GeoResolver for NullGeoResolver {
    fn country_for(&self, _source_address: &str) -> Option<String> {
        None
    }
}

/// In-memory address → country table.
#[derive(Debug, Default)]
pub struct StaticGeoResolver {
    table: RwLock<HashMap<String, String>>,
}

impl StaticGeoResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, source_address: impl Into<String>, country: impl Into<String>) {
        self.table
            .write()
            .insert(source_address.into(), country.into());
    }

    pub fn len(&self) -> usize {
        self.table.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.read().is_empty()
    }
}

impl GeoResolver for StaticGeoResolver {
    fn country_for(&self, source_address: &str) -> Option<String> {
        self.table.read().get(source_address).cloned()
    }
}
