// 📍 Municipality Locator - Name lookup and nearest-centre search
//
// Two entry points:
// 1. find_by_name        → case-insensitive exact match via the Catalog
// 2. find_by_coordinates → nearest active municipality within COVERAGE_RADIUS_KM
//
// Distance is an equirectangular approximation, good enough at town scale:
//   dx = Δlat · 111
//   dy = Δlon · 111 · cos(lat)
//   d  = √(dx² + dy²)

use anyhow::Result;
use tracing::debug;

use crate::catalog::Catalog;
use crate::entities::Municipality;
use crate::normalizer::is_blank;

/// Kilometres per degree of latitude
pub const KM_PER_DEGREE: f64 = 111.0;

/// Points farther than this from every municipality are outside coverage
pub const COVERAGE_RADIUS_KM: f64 = 5.0;

/// Approximate planar distance in km between a municipality centre and a point
///
/// The longitude scale uses the query point's latitude.
pub fn approx_distance_km(center_lat: f64, center_lon: f64, lat: f64, lon: f64) -> f64 {
    let dx = (center_lat - lat) * KM_PER_DEGREE;
    let dy = (center_lon - lon) * KM_PER_DEGREE * lat.to_radians().cos();
    (dx * dx + dy * dy).sqrt()
}

/// True for finite WGS84 coordinates
pub fn valid_coordinates(lat: f64, lon: f64) -> bool {
    lat.is_finite()
        && lon.is_finite()
        && (-90.0..=90.0).contains(&lat)
        && (-180.0..=180.0).contains(&lon)
}

// ============================================================================
// LOCATOR
// ============================================================================

pub struct MunicipalityLocator<'a, C: Catalog + ?Sized> {
    catalog: &'a C,
}

impl<'a, C: Catalog + ?Sized> MunicipalityLocator<'a, C> {
    pub fn new(catalog: &'a C) -> Self {
        MunicipalityLocator { catalog }
    }

    /// Find an active municipality by name
    ///
    /// Blank input returns None without touching the catalog.
    pub fn find_by_name(&self, name: &str) -> Result<Option<Municipality>> {
        if is_blank(name) {
            return Ok(None);
        }

        let found = self.catalog.find_municipality_by_name(name.trim())?;
        debug!(name = name.trim(), found = found.is_some(), "municipality lookup by name");
        Ok(found)
    }

    /// Find the nearest active municipality within coverage
    ///
    /// Ties keep the first municipality in catalog order (sorted by name).
    pub fn find_by_coordinates(&self, lat: f64, lon: f64) -> Result<Option<Municipality>> {
        if !valid_coordinates(lat, lon) {
            return Ok(None);
        }

        let mut nearest: Option<(Municipality, f64)> = None;

        for municipality in self.catalog.list_active_municipalities()? {
            let Some((center_lat, center_lon)) = municipality.coordinates() else {
                continue;
            };

            let distance = approx_distance_km(center_lat, center_lon, lat, lon);
            let closer = match &nearest {
                Some((_, best)) => distance < *best,
                None => true,
            };
            if closer {
                nearest = Some((municipality, distance));
            }
        }

        match nearest {
            Some((municipality, distance)) if distance < COVERAGE_RADIUS_KM => {
                debug!(
                    municipality = %municipality.name,
                    distance_km = distance,
                    "municipality located by coordinates"
                );
                Ok(Some(municipality))
            }
            Some((municipality, distance)) => {
                debug!(
                    nearest = %municipality.name,
                    distance_km = distance,
                    "point outside coverage area"
                );
                Ok(None)
            }
            None => Ok(None),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::InMemoryCatalog;
    use crate::entities::Neighborhood;
    use anyhow::anyhow;
    use std::cell::Cell;

    const LAT: f64 = 45.0;
    const LON: f64 = 9.0;

    fn catalog_with(municipalities: Vec<Municipality>) -> InMemoryCatalog {
        let catalog = InMemoryCatalog::new();
        for m in municipalities {
            catalog.add_municipality(m, &[]).unwrap();
        }
        catalog
    }

    /// Catalog that counts lookups and always fails
    #[derive(Default)]
    struct CountingCatalog {
        calls: Cell<usize>,
    }

    impl Catalog for CountingCatalog {
        fn list_active_municipalities(&self) -> Result<Vec<Municipality>> {
            self.calls.set(self.calls.get() + 1);
            Err(anyhow!("store offline"))
        }

        fn list_active_neighborhoods(&self, _municipality_id: &str) -> Result<Vec<Neighborhood>> {
            self.calls.set(self.calls.get() + 1);
            Err(anyhow!("store offline"))
        }

        fn find_municipality_by_name(&self, _name: &str) -> Result<Option<Municipality>> {
            self.calls.set(self.calls.get() + 1);
            Err(anyhow!("store offline"))
        }
    }

    #[test]
    fn test_distance_formula() {
        // One degree of latitude north is exactly KM_PER_DEGREE
        assert!((approx_distance_km(46.0, LON, LAT, LON) - 111.0).abs() < 1e-9);

        // Longitude shrinks with cos(lat)
        let expected = 111.0 * LAT.to_radians().cos();
        assert!((approx_distance_km(LAT, 10.0, LAT, LON) - expected).abs() < 1e-9);

        assert_eq!(approx_distance_km(LAT, LON, LAT, LON), 0.0);
    }

    #[test]
    fn test_within_coverage_radius() {
        let near = Municipality::new("Vicino", LAT + 4.9 / KM_PER_DEGREE, LON);
        let catalog = catalog_with(vec![near]);
        let locator = MunicipalityLocator::new(&catalog);

        let found = locator.find_by_coordinates(LAT, LON).unwrap();
        assert_eq!(found.unwrap().name, "Vicino");
    }

    #[test]
    fn test_outside_coverage_radius() {
        let far = Municipality::new("Lontano", LAT + 6.0 / KM_PER_DEGREE, LON);
        let catalog = catalog_with(vec![far]);
        let locator = MunicipalityLocator::new(&catalog);

        assert!(locator.find_by_coordinates(LAT, LON).unwrap().is_none());
    }

    #[test]
    fn test_picks_nearest() {
        let catalog = catalog_with(vec![
            Municipality::new("Alpha", LAT + 3.0 / KM_PER_DEGREE, LON),
            Municipality::new("Beta", LAT + 1.0 / KM_PER_DEGREE, LON),
            Municipality::new("Gamma", LAT - 2.0 / KM_PER_DEGREE, LON),
        ]);
        let locator = MunicipalityLocator::new(&catalog);

        let found = locator.find_by_coordinates(LAT, LON).unwrap();
        assert_eq!(found.unwrap().name, "Beta");
    }

    #[test]
    fn test_tie_keeps_first_in_name_order() {
        let catalog = catalog_with(vec![
            Municipality::new("Zeta", LAT + 1.0 / KM_PER_DEGREE, LON),
            Municipality::new("Eta", LAT + 1.0 / KM_PER_DEGREE, LON),
        ]);
        let locator = MunicipalityLocator::new(&catalog);

        let found = locator.find_by_coordinates(LAT, LON).unwrap();
        assert_eq!(found.unwrap().name, "Eta");
    }

    #[test]
    fn test_skips_municipalities_without_coordinates() {
        let catalog = catalog_with(vec![
            Municipality::without_coordinates("Ignoto"),
            Municipality::new("Noto", LAT + 2.0 / KM_PER_DEGREE, LON),
        ]);
        let locator = MunicipalityLocator::new(&catalog);

        let found = locator.find_by_coordinates(LAT, LON).unwrap();
        assert_eq!(found.unwrap().name, "Noto");
    }

    #[test]
    fn test_invalid_coordinates_short_circuit() {
        let catalog = catalog_with(vec![Municipality::new("Milano", 45.4642, 9.19)]);
        let locator = MunicipalityLocator::new(&catalog);

        assert!(locator.find_by_coordinates(f64::NAN, 9.19).unwrap().is_none());
        assert!(locator.find_by_coordinates(45.46, f64::INFINITY).unwrap().is_none());
        assert!(locator.find_by_coordinates(95.0, 9.19).unwrap().is_none());
    }

    #[test]
    fn test_find_by_name() {
        let catalog = catalog_with(vec![Municipality::new("Milano", 45.4642, 9.19)]);
        let locator = MunicipalityLocator::new(&catalog);

        assert_eq!(locator.find_by_name(" MILANO ").unwrap().unwrap().name, "Milano");
        assert!(locator.find_by_name("").unwrap().is_none());
        assert!(locator.find_by_name("Torino").unwrap().is_none());
    }

    #[test]
    fn test_blank_name_never_reaches_catalog() {
        let catalog = CountingCatalog::default();
        let locator = MunicipalityLocator::new(&catalog);

        assert!(locator.find_by_name("").unwrap().is_none());
        assert!(locator.find_by_name("   ").unwrap().is_none());
        assert!(locator.find_by_name("\t\n").unwrap().is_none());
        assert_eq!(catalog.calls.get(), 0);

        // a real name does hit the store
        assert!(locator.find_by_name("Milano").is_err());
        assert_eq!(catalog.calls.get(), 1);
    }
}
