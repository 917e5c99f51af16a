// 🧭 Resolution Orchestrator - Raw geographic signal → catalog neighborhood
//
// Cascade, most specific first, every stage degrades to the next:
// 1. Municipality by name (raw city), then by coordinates
// 2. Neighborhood by fuzzy match on: raw neighborhood, raw road, both joined
// 3. Fallbacks: "/Centro" candidate → first candidate → synthetic "<Town>/Centro"
// 4. Outside coverage: raw neighborhood → raw city → unset
//
// Collaborator failures never escape: they are logged, recorded in
// `Resolution::degraded`, and treated as "not found".

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::catalog::Catalog;
use crate::entities::{Municipality, Neighborhood};
use crate::geocoder::{RawAddressSignal, ReverseGeocoder};
use crate::locator::MunicipalityLocator;
use crate::matcher::{match_neighborhood, MatchStrategy};
use crate::normalizer::is_blank;

// ============================================================================
// INPUT / OUTPUT
// ============================================================================

/// One incoming signal: optional coordinates plus geocoder address text
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolutionRequest {
    #[serde(default)]
    pub latitude: Option<f64>,

    #[serde(default)]
    pub longitude: Option<f64>,

    #[serde(default)]
    pub address: RawAddressSignal,
}

impl ResolutionRequest {
    pub fn new(latitude: f64, longitude: f64, address: RawAddressSignal) -> Self {
        ResolutionRequest {
            latitude: Some(latitude),
            longitude: Some(longitude),
            address,
        }
    }

    /// Address text only, no coordinates
    pub fn from_address(address: RawAddressSignal) -> Self {
        ResolutionRequest {
            latitude: None,
            longitude: None,
            address,
        }
    }
}

/// Structured result handed to form-population logic
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolutionResult {
    pub neighborhood: Option<String>,
    pub city: Option<String>,
    pub street: Option<String>,
    pub house_number: Option<String>,
    pub postal_code: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MunicipalitySource {
    ByName,
    ByCoordinates,
    NotFound,
}

/// Which raw text produced a fuzzy match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TextQuery {
    Neighborhood,
    Road,
    NeighborhoodAndRoad,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NeighborhoodSource {
    /// Fuzzy match on one of the raw texts
    Matched { query: TextQuery, strategy: MatchStrategy },

    /// No match; the municipality's "/Centro" neighborhood
    CentroCandidate,

    /// No match and no "/Centro"; first neighborhood in catalog order
    FirstCandidate,

    /// Municipality has no neighborhoods; "<Town>/Centro" synthesized
    SyntheticCentro,

    /// Outside coverage; raw neighborhood text passed through
    RawNeighborhood,

    /// Outside coverage; raw city text used as neighborhood
    RawCity,

    /// Nothing usable
    Unresolved,
}

/// Full outcome of one resolution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub result: ResolutionResult,

    /// Municipality the signal resolved to (None = outside coverage)
    pub municipality: Option<Municipality>,

    pub municipality_source: MunicipalitySource,

    pub neighborhood_source: NeighborhoodSource,

    /// Collaborator failures swallowed along the way
    pub degraded: Vec<String>,
}

// ============================================================================
// RESOLVER
// ============================================================================

pub struct Resolver<C: Catalog> {
    catalog: C,
}

impl<C: Catalog> Resolver<C> {
    pub fn new(catalog: C) -> Self {
        Resolver { catalog }
    }

    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    /// Resolve one signal; never fails
    pub fn resolve(&self, request: &ResolutionRequest) -> Resolution {
        let raw = &request.address;
        let mut degraded = Vec::new();

        let (municipality, municipality_source) = self.locate(request, &mut degraded);

        let (neighborhood, neighborhood_source, city) = match &municipality {
            Some(municipality) => {
                let candidates = match self.catalog.list_active_neighborhoods(&municipality.id) {
                    Ok(candidates) => candidates,
                    Err(e) => {
                        warn!(municipality = %municipality.name, error = %e, "neighborhood lookup failed");
                        degraded.push(format!("neighborhood lookup failed: {}", e));
                        Vec::new()
                    }
                };

                let (name, source) = choose_neighborhood(raw, municipality, &candidates);
                let city = if is_blank(&raw.raw_city) {
                    municipality.name.clone()
                } else {
                    raw.raw_city.clone()
                };
                (Some(name), source, Some(city))
            }
            None => {
                let (name, source) = if !is_blank(&raw.raw_neighborhood) {
                    (Some(raw.raw_neighborhood.clone()), NeighborhoodSource::RawNeighborhood)
                } else if !is_blank(&raw.raw_city) {
                    (Some(raw.raw_city.clone()), NeighborhoodSource::RawCity)
                } else {
                    (None, NeighborhoodSource::Unresolved)
                };
                (name, source, non_blank(&raw.raw_city))
            }
        };

        debug!(
            municipality = ?municipality.as_ref().map(|m| &m.name),
            neighborhood = ?neighborhood,
            source = ?neighborhood_source,
            "signal resolved"
        );

        Resolution {
            result: ResolutionResult {
                neighborhood,
                city,
                street: non_blank(&raw.raw_road),
                house_number: raw.house_number.clone(),
                postal_code: raw.postal_code.clone(),
            },
            municipality,
            municipality_source,
            neighborhood_source,
            degraded,
        }
    }

    /// Reverse-geocode coordinates, then resolve
    ///
    /// A failing geocoder means "no resolution" for this signal.
    pub fn resolve_coordinates<G: ReverseGeocoder + ?Sized>(
        &self,
        lat: f64,
        lon: f64,
        geocoder: &G,
    ) -> Option<Resolution> {
        match geocoder.reverse(lat, lon) {
            Ok(components) => Some(self.resolve(&ResolutionRequest::new(
                lat,
                lon,
                components.into_signal(),
            ))),
            Err(e) => {
                warn!(lat, lon, error = %e, "reverse geocoding failed");
                None
            }
        }
    }

    /// Step 1: municipality by name, then by coordinates
    fn locate(
        &self,
        request: &ResolutionRequest,
        degraded: &mut Vec<String>,
    ) -> (Option<Municipality>, MunicipalitySource) {
        let locator = MunicipalityLocator::new(&self.catalog);

        match locator.find_by_name(&request.address.raw_city) {
            Ok(Some(municipality)) => return (Some(municipality), MunicipalitySource::ByName),
            Ok(None) => {}
            Err(e) => {
                warn!(city = %request.address.raw_city, error = %e, "municipality lookup by name failed");
                degraded.push(format!("municipality lookup by name failed: {}", e));
            }
        }

        if let (Some(lat), Some(lon)) = (request.latitude, request.longitude) {
            match locator.find_by_coordinates(lat, lon) {
                Ok(Some(municipality)) => {
                    return (Some(municipality), MunicipalitySource::ByCoordinates)
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(lat, lon, error = %e, "municipality lookup by coordinates failed");
                    degraded.push(format!("municipality lookup by coordinates failed: {}", e));
                }
            }
        }

        (None, MunicipalitySource::NotFound)
    }
}

/// Step 2: pick a neighborhood inside a known municipality
fn choose_neighborhood(
    raw: &RawAddressSignal,
    municipality: &Municipality,
    candidates: &[Neighborhood],
) -> (String, NeighborhoodSource) {
    let Some(first) = candidates.first() else {
        return (municipality.centro_label(), NeighborhoodSource::SyntheticCentro);
    };

    let combined = format!("{} {}", raw.raw_neighborhood, raw.raw_road);
    let queries = [
        (TextQuery::Neighborhood, raw.raw_neighborhood.as_str()),
        (TextQuery::Road, raw.raw_road.as_str()),
        (TextQuery::NeighborhoodAndRoad, combined.as_str()),
    ];

    for (query, text) in queries {
        if let Some(found) = match_neighborhood(text, candidates) {
            return (
                found.name,
                NeighborhoodSource::Matched {
                    query,
                    strategy: found.strategy,
                },
            );
        }
    }

    match candidates.iter().find(|n| n.is_centro()) {
        Some(centro) => (centro.name.clone(), NeighborhoodSource::CentroCandidate),
        None => (first.name.clone(), NeighborhoodSource::FirstCandidate),
    }
}

fn non_blank(text: &str) -> Option<String> {
    if is_blank(text) {
        None
    } else {
        Some(text.to_string())
    }
}

// ============================================================================
// TESTS
// ============================================================================
