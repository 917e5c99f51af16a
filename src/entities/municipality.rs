// 🏛️ Municipality Entity - Top-level administrative area of the coverage area
//
// "Municipality name is a VALUE, Municipality id is IDENTITY"
//
// The pipeline only ever reads municipalities. They are maintained by an
// external administrative process and exposed through a Catalog.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};

// ============================================================================
// MUNICIPALITY ENTITY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Municipality {
    /// Stable identity (opaque, UUID when created here)
    pub id: String,

    /// Canonical display name ("Milano", "Sesto San Giovanni")
    pub name: String,

    /// WGS84 latitude of the municipality centre (None = unknown)
    pub latitude: Option<f64>,

    /// WGS84 longitude of the municipality centre (None = unknown)
    pub longitude: Option<f64>,

    /// Only active municipalities take part in resolution
    pub active: bool,
}

impl Municipality {
    /// Create new active municipality with a fresh UUID
    pub fn new(name: &str, latitude: f64, longitude: f64) -> Self {
        Municipality {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.trim().to_string(),
            latitude: Some(latitude),
            longitude: Some(longitude),
            active: true,
        }
    }

    /// Create municipality without known coordinates
    pub fn without_coordinates(name: &str) -> Self {
        Municipality {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.trim().to_string(),
            latitude: None,
            longitude: None,
            active: true,
        }
    }

    /// Both coordinates, if known and finite
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) if lat.is_finite() && lon.is_finite() => Some((lat, lon)),
            _ => None,
        }
    }

    /// Case-insensitive comparison against a (trimmed) name
    pub fn has_name(&self, name: &str) -> bool {
        self.name.trim().to_lowercase() == name.trim().to_lowercase()
    }

    /// Synthetic neighborhood label used when no neighborhoods are configured
    ///
    /// Example: "Bresso" → "Bresso/Centro"
    pub fn centro_label(&self) -> String {
        format!("{}{}", self.name, super::CENTRO_SUFFIX)
    }
}

// ============================================================================
// MUNICIPALITY REGISTRY
// ============================================================================

/// In-memory registry of municipalities
///
/// Backs `InMemoryCatalog`; the SQLite store is the production equivalent.
#[derive(Clone, Default)]
pub struct MunicipalityRegistry {
    municipalities: Arc<RwLock<Vec<Municipality>>>,
}

impl MunicipalityRegistry {
    /// Create new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a municipality (replaces any entry with the same id)
    pub fn register(&self, municipality: Municipality) -> Result<()> {
        let mut municipalities = self
            .municipalities
            .write()
            .map_err(|_| anyhow!("municipality registry lock poisoned"))?;

        municipalities.retain(|m| m.id != municipality.id);
        municipalities.push(municipality);
        Ok(())
    }

    /// Active municipalities, sorted by name
    pub fn active(&self) -> Result<Vec<Municipality>> {
        let municipalities = self
            .municipalities
            .read()
            .map_err(|_| anyhow!("municipality registry lock poisoned"))?;

        let mut active: Vec<Municipality> =
            municipalities.iter().filter(|m| m.active).cloned().collect();
        active.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(active)
    }

    /// Find by id (active or not)
    pub fn find_by_id(&self, id: &str) -> Result<Option<Municipality>> {
        let municipalities = self
            .municipalities
            .read()
            .map_err(|_| anyhow!("municipality registry lock poisoned"))?;

        Ok(municipalities.iter().find(|m| m.id == id).cloned())
    }

    /// Count all registered municipalities
    pub fn count(&self) -> usize {
        self.municipalities.read().map(|m| m.len()).unwrap_or(0)
    }
}

// ============================================================================
// TESTS
// ============================================================================
