// 🌍 Reverse Geocoder boundary - Unstructured address components in
//
// The provider is an external collaborator: this module only defines the
// contract it must satisfy and how its JSON is read. No transport here.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ============================================================================
// ADDRESS COMPONENTS (provider contract)
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AddressComponents {
    pub neighborhood: Option<String>,
    pub road: Option<String>,
    pub city: Option<String>,
    pub house_number: Option<String>,
    pub postal_code: Option<String>,
}

impl AddressComponents {
    /// Convert into the signal the resolver consumes
    pub fn into_signal(self) -> RawAddressSignal {
        RawAddressSignal {
            raw_neighborhood: self.neighborhood.unwrap_or_default(),
            raw_road: self.road.unwrap_or_default(),
            raw_city: self.city.unwrap_or_default(),
            house_number: non_blank(self.house_number),
            postal_code: non_blank(self.postal_code),
        }
    }
}

// ============================================================================
// RAW ADDRESS SIGNAL
// ============================================================================

/// Geocoder output as seen by the pipeline (ephemeral, never persisted)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawAddressSignal {
    #[serde(default)]
    pub raw_neighborhood: String,

    #[serde(default)]
    pub raw_road: String,

    #[serde(default)]
    pub raw_city: String,

    #[serde(default)]
    pub house_number: Option<String>,

    #[serde(default)]
    pub postal_code: Option<String>,
}

// ============================================================================
// PROVIDER RESPONSE PARSING
// ============================================================================

// Keys read for each component, first non-blank wins
const NEIGHBORHOOD_KEYS: &[&str] = &["neighborhood", "neighbourhood", "quarter", "suburb"];
const ROAD_KEYS: &[&str] = &["road", "pedestrian"];
const CITY_KEYS: &[&str] = &["city", "town", "village", "municipality"];
const HOUSE_NUMBER_KEYS: &[&str] = &["house_number"];
const POSTAL_CODE_KEYS: &[&str] = &["postal_code", "postcode"];

/// Parse a provider JSON response
///
/// Accepts the flat contract object or an envelope `{ "address": { .. } }`.
pub fn parse_provider_response(json: &str) -> Result<AddressComponents> {
    let value: Value = serde_json::from_str(json).context("Malformed geocoder response")?;

    let address = match value.get("address") {
        Some(Value::Object(address)) => address,
        Some(_) => bail!("Geocoder response has a non-object \"address\" field"),
        None => match &value {
            Value::Object(flat) => flat,
            _ => bail!("Geocoder response is not a JSON object"),
        },
    };

    Ok(AddressComponents {
        neighborhood: first_text(address, NEIGHBORHOOD_KEYS),
        road: first_text(address, ROAD_KEYS),
        city: first_text(address, CITY_KEYS),
        house_number: first_text(address, HOUSE_NUMBER_KEYS),
        postal_code: first_text(address, POSTAL_CODE_KEYS),
    })
}

fn first_text(address: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| address.get(*key))
        .filter_map(|value| match value {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .find(|s| !s.is_empty())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

// ============================================================================
// GEOCODER TRAIT
// ============================================================================

/// Coordinates → address components
pub trait ReverseGeocoder {
    fn reverse(&self, lat: f64, lon: f64) -> Result<AddressComponents>;
}
