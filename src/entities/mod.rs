// Entity Models - Municipalities and their neighborhoods
//
// Each entity has:
// - Stable identity (municipality id) that never changes
// - Read-only values from the pipeline's point of view
// - In-memory registry for tests and embedded catalogs

pub mod municipality;
pub mod neighborhood;

pub use municipality::{Municipality, MunicipalityRegistry};
pub use neighborhood::{Neighborhood, NeighborhoodRegistry};

/// Suffix of the catch-all neighborhood of a municipality ("Bresso/Centro")
pub const CENTRO_SUFFIX: &str = "/Centro";
