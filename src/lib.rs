// Neighborhood Resolver - Core Library
// Raw geographic signals (coordinates, geocoder address text) → catalog neighborhood
// Exposes all modules for use in CLI, API server, and tests

pub mod normalizer;
pub mod tokenizer;
pub mod entities;
pub mod catalog;
pub mod locator;
pub mod matcher;
pub mod geocoder;
pub mod resolver;
pub mod session;
pub mod db;
pub mod config;

// Re-export commonly used types
pub use normalizer::normalize;
pub use tokenizer::{tokenize, MIN_TOKEN_LEN};
pub use entities::{
    Municipality, MunicipalityRegistry,
    Neighborhood, NeighborhoodRegistry,
    CENTRO_SUFFIX,
};
pub use catalog::{Catalog, InMemoryCatalog};
pub use locator::{
    MunicipalityLocator, approx_distance_km,
    COVERAGE_RADIUS_KM, KM_PER_DEGREE,
};
pub use matcher::{
    match_neighborhood, match_neighborhood_name,
    MatchStrategy, NeighborhoodMatch, MIN_MATCH_SCORE,
};
pub use geocoder::{
    AddressComponents, RawAddressSignal, ReverseGeocoder,
    parse_provider_response,
};
pub use resolver::{
    Resolver, Resolution, ResolutionRequest, ResolutionResult,
    MunicipalitySource, NeighborhoodSource, TextQuery,
};
pub use session::{ResolutionSession, RequestTicket, SessionRegistry};
pub use db::{
    SqliteCatalog, ResolutionEvent, ImportStats,
    MunicipalityRow, NeighborhoodRow,
    setup_database, load_municipalities_csv, load_neighborhoods_csv,
    insert_municipalities, insert_neighborhoods,
    count_municipalities, count_neighborhoods,
    insert_resolution_event, get_recent_events,
};
pub use config::Config;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
