// 📚 Catalog - Read-only access to municipalities and neighborhoods
//
// The resolution pipeline never owns data: it is handed a Catalog.
// Implementations:
// - InMemoryCatalog (registries, tests / embedded data)
// - SqliteCatalog   (db.rs, persistent store)
//
// Ordering contract: every list is sorted by name, so tie-breaks that depend
// on iteration order are reproducible.

use anyhow::Result;
use std::sync::Arc;

use crate::entities::{Municipality, MunicipalityRegistry, Neighborhood, NeighborhoodRegistry};
use crate::normalizer::is_blank;

// ============================================================================
// CATALOG TRAIT
// ============================================================================

pub trait Catalog {
    /// All active municipalities, sorted by name
    fn list_active_municipalities(&self) -> Result<Vec<Municipality>>;

    /// Active neighborhoods of one municipality, sorted by name
    ///
    /// An empty list is a valid answer (municipality uses "/Centro").
    fn list_active_neighborhoods(&self, municipality_id: &str) -> Result<Vec<Neighborhood>>;

    /// Case-insensitive exact match on the trimmed name
    fn find_municipality_by_name(&self, name: &str) -> Result<Option<Municipality>> {
        if is_blank(name) {
            return Ok(None);
        }

        Ok(self
            .list_active_municipalities()?
            .into_iter()
            .find(|m| m.has_name(name)))
    }
}

impl<C: Catalog + ?Sized> Catalog for &C {
    fn list_active_municipalities(&self) -> Result<Vec<Municipality>> {
        (**self).list_active_municipalities()
    }

    fn list_active_neighborhoods(&self, municipality_id: &str) -> Result<Vec<Neighborhood>> {
        (**self).list_active_neighborhoods(municipality_id)
    }

    fn find_municipality_by_name(&self, name: &str) -> Result<Option<Municipality>> {
        (**self).find_municipality_by_name(name)
    }
}

impl<C: Catalog + ?Sized> Catalog for Arc<C> {
    fn list_active_municipalities(&self) -> Result<Vec<Municipality>> {
        (**self).list_active_municipalities()
    }

    fn list_active_neighborhoods(&self, municipality_id: &str) -> Result<Vec<Neighborhood>> {
        (**self).list_active_neighborhoods(municipality_id)
    }

    fn find_municipality_by_name(&self, name: &str) -> Result<Option<Municipality>> {
        (**self).find_municipality_by_name(name)
    }
}

// ============================================================================
// IN-MEMORY CATALOG
// ============================================================================

#[derive(Clone, Default)]
pub struct InMemoryCatalog {
    pub municipalities: MunicipalityRegistry,
    pub neighborhoods: NeighborhoodRegistry,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a municipality together with its neighborhood names
    ///
    /// Returns the registered municipality (with its generated id).
    pub fn add_municipality(
        &self,
        municipality: Municipality,
        neighborhood_names: &[&str],
    ) -> Result<Municipality> {
        for name in neighborhood_names {
            self.neighborhoods
                .register(Neighborhood::new(name, "", &municipality))?;
        }
        self.municipalities.register(municipality.clone())?;
        Ok(municipality)
    }
}

impl Catalog for InMemoryCatalog {
    fn list_active_municipalities(&self) -> Result<Vec<Municipality>> {
        self.municipalities.active()
    }

    fn list_active_neighborhoods(&self, municipality_id: &str) -> Result<Vec<Neighborhood>> {
        self.neighborhoods.active_for(municipality_id)
    }
}
