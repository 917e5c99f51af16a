// 🏘️ Neighborhood Entity - Named sub-area ("micro-quartiere") of a municipality
//
// A neighborhood name only means something together with its municipality:
// "Centro" exists in many towns. Matching never crosses municipalities.

use anyhow::{anyhow, bail, Result};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};

use super::Municipality;

// ============================================================================
// NEIGHBORHOOD ENTITY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Neighborhood {
    /// Display name, unique within its municipality ("Padova/Loreto")
    pub name: String,

    /// Broader zone label ("Municipio 2"), may be empty
    #[serde(default)]
    pub area: String,

    /// Owning municipality (identity)
    pub municipality_id: String,

    /// Owning municipality name, denormalized for display
    pub municipality_name: String,

    /// Only active neighborhoods are offered as candidates
    pub active: bool,
}

impl Neighborhood {
    /// Create new active neighborhood belonging to `municipality`
    pub fn new(name: &str, area: &str, municipality: &Municipality) -> Self {
        Neighborhood {
            name: name.trim().to_string(),
            area: area.trim().to_string(),
            municipality_id: municipality.id.clone(),
            municipality_name: municipality.name.clone(),
            active: true,
        }
    }

    /// True for the "<Town>/Centro" style catch-all neighborhood
    pub fn is_centro(&self) -> bool {
        self.name.ends_with(super::CENTRO_SUFFIX)
    }
}

// ============================================================================
// NEIGHBORHOOD REGISTRY
// ============================================================================

/// In-memory registry of neighborhoods across all municipalities
#[derive(Clone, Default)]
pub struct NeighborhoodRegistry {
    neighborhoods: Arc<RwLock<Vec<Neighborhood>>>,
}

impl NeighborhoodRegistry {
    /// Create new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a neighborhood
    ///
    /// Fails if the municipality already has a neighborhood with that name.
    pub fn register(&self, neighborhood: Neighborhood) -> Result<()> {
        let mut neighborhoods = self
            .neighborhoods
            .write()
            .map_err(|_| anyhow!("neighborhood registry lock poisoned"))?;

        if neighborhoods.iter().any(|n| {
            n.municipality_id == neighborhood.municipality_id && n.name == neighborhood.name
        }) {
            bail!(
                "Neighborhood already exists: {} ({})",
                neighborhood.name,
                neighborhood.municipality_name
            );
        }

        neighborhoods.push(neighborhood);
        Ok(())
    }

    /// Active neighborhoods of one municipality, sorted by name
    pub fn active_for(&self, municipality_id: &str) -> Result<Vec<Neighborhood>> {
        let neighborhoods = self
            .neighborhoods
            .read()
            .map_err(|_| anyhow!("neighborhood registry lock poisoned"))?;

        let mut active: Vec<Neighborhood> = neighborhoods
            .iter()
            .filter(|n| n.active && n.municipality_id == municipality_id)
            .cloned()
            .collect();
        active.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(active)
    }

    /// Count all registered neighborhoods
    pub fn count(&self) -> usize {
        self.neighborhoods.read().map(|n| n.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_neighborhood_creation() {
        let milano = Municipality::new("Milano", 45.4642, 9.19);
        let isola = Neighborhood::new(" Isola ", "Municipio 9", &milano);

        assert_eq!(isola.name, "Isola");
        assert_eq!(isola.area, "Municipio 9");
        assert_eq!(isola.municipality_id, milano.id);
        assert_eq!(isola.municipality_name, "Milano");
        assert!(isola.active);
        assert!(!isola.is_centro());
    }

    #[test]
    fn test_is_centro() {
        let sesto = Municipality::new("Sesto San Giovanni", 45.53, 9.23);
        let centro = Neighborhood::new("Sesto San Giovanni/Centro", "", &sesto);
        assert!(centro.is_centro());
    }

    #[test]
    fn test_registry_rejects_duplicate_name_in_same_municipality() {
        let registry = NeighborhoodRegistry::new();
        let milano = Municipality::new("Milano", 45.4642, 9.19);
        let monza = Municipality::new("Monza", 45.58, 9.27);

        registry.register(Neighborhood::new("Centro", "", &milano)).unwrap();
        registry.register(Neighborhood::new("Centro", "", &monza)).unwrap();

        let result = registry.register(Neighborhood::new("Centro", "", &milano));
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("already exists"));
        assert_eq!(registry.count(), 2);
    }

    #[test]
    fn test_registry_active_for_filters_and_sorts() {
        let registry = NeighborhoodRegistry::new();
        let milano = Municipality::new("Milano", 45.4642, 9.19);
        let monza = Municipality::new("Monza", 45.58, 9.27);

        registry.register(Neighborhood::new("Isola", "", &milano)).unwrap();
        registry.register(Neighborhood::new("Bovisa", "", &milano)).unwrap();
        registry.register(Neighborhood::new("San Fruttuoso", "", &monza)).unwrap();

        let mut closed = Neighborhood::new("Ortica", "", &milano);
        closed.active = false;
        registry.register(closed).unwrap();

        let names: Vec<String> = registry
            .active_for(&milano.id)
            .unwrap()
            .into_iter()
            .map(|n| n.name)
            .collect();
        assert_eq!(names, vec!["Bovisa", "Isola"]);

        assert!(registry.active_for("unknown").unwrap().is_empty());
    }
}
