use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::Mutex;
use tracing::{info, warn};

use crate::catalog::Catalog;
use crate::entities::{Municipality, Neighborhood};
use crate::resolver::{Resolution, ResolutionRequest};

// ============================================================================
// CSV ROWS
// ============================================================================

/// municipalities.csv: name,latitude,longitude[,active]
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MunicipalityRow {
    pub name: String,

    #[serde(default)]
    pub latitude: Option<f64>,

    #[serde(default)]
    pub longitude: Option<f64>,

    #[serde(default = "default_active")]
    pub active: bool,
}

/// neighborhoods.csv: municipality,name[,area][,active]
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct NeighborhoodRow {
    /// Owning municipality, by name
    pub municipality: String,

    pub name: String,

    #[serde(default)]
    pub area: String,

    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl From<MunicipalityRow> for Municipality {
    fn from(row: MunicipalityRow) -> Self {
        Municipality {
            id: uuid::Uuid::new_v4().to_string(),
            name: row.name.trim().to_string(),
            latitude: row.latitude,
            longitude: row.longitude,
            active: row.active,
        }
    }
}

/// Outcome of one import run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportStats {
    pub inserted: usize,
    pub duplicates: usize,
    /// Rows referencing an unknown municipality
    pub skipped: usize,
}

// ============================================================================
// RESOLUTION EVENTS (audit trail)
// ============================================================================

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ResolutionEvent {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    /// SHA-256 of the incoming request, groups repeated signals
    pub signal_hash: String,
    pub municipality: Option<String>,
    pub neighborhood: Option<String>,
    pub outcome: serde_json::Value,
}

impl ResolutionEvent {
    pub fn new(request: &ResolutionRequest, resolution: &Resolution) -> Result<Self> {
        Ok(Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            signal_hash: compute_signal_hash(request)?,
            municipality: resolution.municipality.as_ref().map(|m| m.name.clone()),
            neighborhood: resolution.result.neighborhood.clone(),
            outcome: serde_json::to_value(resolution)?,
        })
    }
}

/// Hash of a request, stable across runs
pub fn compute_signal_hash(request: &ResolutionRequest) -> Result<String> {
    let mut hasher = Sha256::new();
    hasher.update(serde_json::to_vec(request)?);
    Ok(format!("{:x}", hasher.finalize()))
}

// ============================================================================
// SCHEMA
// ============================================================================

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS municipalities (
            id TEXT PRIMARY KEY,
            name TEXT UNIQUE NOT NULL,
            latitude REAL,
            longitude REAL,
            active INTEGER NOT NULL DEFAULT 1,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS neighborhoods (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            municipality_id TEXT NOT NULL REFERENCES municipalities(id),
            name TEXT NOT NULL,
            area TEXT NOT NULL DEFAULT '',
            active INTEGER NOT NULL DEFAULT 1,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            UNIQUE(municipality_id, name)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            signal_hash TEXT NOT NULL,
            municipality TEXT,
            neighborhood TEXT,
            outcome TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_neighborhoods_municipality ON neighborhoods(municipality_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_signal ON events(signal_hash)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_timestamp ON events(timestamp)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// CSV IMPORT
// ============================================================================

pub fn load_municipalities_csv(csv_path: &Path) -> Result<Vec<MunicipalityRow>> {
    let mut rdr = csv::Reader::from_path(csv_path)
        .with_context(|| format!("Failed to open municipalities CSV {:?}", csv_path))?;

    let mut rows = Vec::new();
    for result in rdr.deserialize() {
        let row: MunicipalityRow = result.context("Failed to deserialize municipality")?;
        rows.push(row);
    }

    Ok(rows)
}

pub fn load_neighborhoods_csv(csv_path: &Path) -> Result<Vec<NeighborhoodRow>> {
    let mut rdr = csv::Reader::from_path(csv_path)
        .with_context(|| format!("Failed to open neighborhoods CSV {:?}", csv_path))?;

    let mut rows = Vec::new();
    for result in rdr.deserialize() {
        let row: NeighborhoodRow = result.context("Failed to deserialize neighborhood")?;
        rows.push(row);
    }

    Ok(rows)
}

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _) if err.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

/// Insert municipalities; names already present are skipped
pub fn insert_municipalities(conn: &Connection, municipalities: &[Municipality]) -> Result<ImportStats> {
    let mut stats = ImportStats::default();

    for m in municipalities {
        let result = conn.execute(
            "INSERT INTO municipalities (id, name, latitude, longitude, active)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![m.id, m.name, m.latitude, m.longitude, m.active],
        );

        match result {
            Ok(_) => stats.inserted += 1,
            Err(e) if is_constraint_violation(&e) => stats.duplicates += 1,
            Err(e) => return Err(e.into()),
        }
    }

    info!(
        inserted = stats.inserted,
        duplicates = stats.duplicates,
        "municipalities imported"
    );
    Ok(stats)
}

/// Insert neighborhoods, attaching each to its municipality by name
pub fn insert_neighborhoods(conn: &Connection, rows: &[NeighborhoodRow]) -> Result<ImportStats> {
    let municipalities = all_municipalities(conn)?;
    let mut stats = ImportStats::default();

    for row in rows {
        let Some(municipality) = municipalities.iter().find(|m| m.has_name(&row.municipality)) else {
            warn!(municipality = %row.municipality, neighborhood = %row.name, "unknown municipality, row skipped");
            stats.skipped += 1;
            continue;
        };

        let result = conn.execute(
            "INSERT INTO neighborhoods (municipality_id, name, area, active)
             VALUES (?1, ?2, ?3, ?4)",
            params![municipality.id, row.name.trim(), row.area.trim(), row.active],
        );

        match result {
            Ok(_) => stats.inserted += 1,
            Err(e) if is_constraint_violation(&e) => stats.duplicates += 1,
            Err(e) => return Err(e.into()),
        }
    }

    info!(
        inserted = stats.inserted,
        duplicates = stats.duplicates,
        skipped = stats.skipped,
        "neighborhoods imported"
    );
    Ok(stats)
}

// ============================================================================
// QUERIES
// ============================================================================

fn municipality_from_row(row: &rusqlite::Row) -> rusqlite::Result<Municipality> {
    Ok(Municipality {
        id: row.get(0)?,
        name: row.get(1)?,
        latitude: row.get(2)?,
        longitude: row.get(3)?,
        active: row.get(4)?,
    })
}

/// Every municipality, active or not, sorted by name
pub fn all_municipalities(conn: &Connection) -> Result<Vec<Municipality>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, latitude, longitude, active
         FROM municipalities
         ORDER BY name",
    )?;

    let municipalities = stmt
        .query_map([], municipality_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(municipalities)
}

pub fn active_municipalities(conn: &Connection) -> Result<Vec<Municipality>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, latitude, longitude, active
         FROM municipalities
         WHERE active = 1
         ORDER BY name",
    )?;

    let municipalities = stmt
        .query_map([], municipality_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(municipalities)
}

pub fn active_neighborhoods(conn: &Connection, municipality_id: &str) -> Result<Vec<Neighborhood>> {
    let mut stmt = conn.prepare(
        "SELECT n.name, n.area, n.municipality_id, m.name, n.active
         FROM neighborhoods n
         JOIN municipalities m ON m.id = n.municipality_id
         WHERE n.municipality_id = ?1 AND n.active = 1
         ORDER BY n.name",
    )?;

    let neighborhoods = stmt
        .query_map([municipality_id], |row| {
            Ok(Neighborhood {
                name: row.get(0)?,
                area: row.get(1)?,
                municipality_id: row.get(2)?,
                municipality_name: row.get(3)?,
                active: row.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(neighborhoods)
}

pub fn count_municipalities(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM municipalities", [], |row| row.get(0))?;
    Ok(count)
}

pub fn count_neighborhoods(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM neighborhoods", [], |row| row.get(0))?;
    Ok(count)
}

// ============================================================================
// EVENTS
// ============================================================================

pub fn insert_resolution_event(conn: &Connection, event: &ResolutionEvent) -> Result<()> {
    let outcome_json = serde_json::to_string(&event.outcome)?;

    conn.execute(
        "INSERT INTO events (
            event_id, timestamp, signal_hash, municipality, neighborhood, outcome
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            event.event_id,
            event.timestamp.to_rfc3339(),
            event.signal_hash,
            event.municipality,
            event.neighborhood,
            outcome_json,
        ],
    )?;

    Ok(())
}

/// Most recent events first
pub fn get_recent_events(conn: &Connection, limit: usize) -> Result<Vec<ResolutionEvent>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, signal_hash, municipality, neighborhood, outcome
         FROM events
         ORDER BY timestamp DESC, id DESC
         LIMIT ?1",
    )?;

    let events = stmt
        .query_map([limit as i64], |row| {
            let timestamp_str: String = row.get(1)?;
            let outcome_json: String = row.get(5)?;

            Ok(ResolutionEvent {
                event_id: row.get(0)?,
                timestamp: DateTime::parse_from_rfc3339(&timestamp_str)
                    .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e)))?
                    .with_timezone(&Utc),
                signal_hash: row.get(2)?,
                municipality: row.get(3)?,
                neighborhood: row.get(4)?,
                outcome: serde_json::from_str(&outcome_json)
                    .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(events)
}

// ============================================================================
// SQLITE CATALOG
// ============================================================================

/// Catalog backed by the SQLite store
pub struct SqliteCatalog {
    conn: Mutex<Connection>,
}

impl SqliteCatalog {
    /// Open (or create) the database file and ensure the schema exists
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database {:?}", path))?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    pub fn from_connection(conn: Connection) -> Result<Self> {
        setup_database(&conn)?;
        Ok(SqliteCatalog {
            conn: Mutex::new(conn),
        })
    }

    /// Run `f` with exclusive access to the connection
    pub fn with_connection<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| anyhow::anyhow!("database connection lock poisoned"))?;
        f(&conn)
    }

    /// Record a resolution in the audit trail
    pub fn record(&self, request: &ResolutionRequest, resolution: &Resolution) -> Result<()> {
        let event = ResolutionEvent::new(request, resolution)?;
        self.with_connection(|conn| insert_resolution_event(conn, &event))
    }
}

impl Catalog for SqliteCatalog {
    fn list_active_municipalities(&self) -> Result<Vec<Municipality>> {
        self.with_connection(active_municipalities)
    }

    fn list_active_neighborhoods(&self, municipality_id: &str) -> Result<Vec<Neighborhood>> {
        self.with_connection(|conn| active_neighborhoods(conn, municipality_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geocoder::RawAddressSignal;
    use crate::resolver::Resolver;
    use std::io::Write;

    fn neighborhood_row(municipality: &str, name: &str) -> NeighborhoodRow {
        NeighborhoodRow {
            municipality: municipality.to_string(),
            name: name.to_string(),
            area: String::new(),
            active: true,
        }
    }

    fn seeded_catalog() -> SqliteCatalog {
        let catalog = SqliteCatalog::open_in_memory().unwrap();
        catalog
            .with_connection(|conn| {
                insert_municipalities(
                    conn,
                    &[
                        Municipality::new("Milano", 45.4642, 9.19),
                        Municipality::new("Bresso", 45.5398, 9.1872),
                    ],
                )?;
                insert_neighborhoods(
                    conn,
                    &[
                        neighborhood_row("Milano", "Padova/Loreto"),
                        neighborhood_row("milano", "Isola"),
                        neighborhood_row("Milano", "Bovisa"),
                    ],
                )?;
                Ok(())
            })
            .unwrap();
        catalog
    }

    #[test]
    fn test_import_twice_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        let municipalities = vec![
            Municipality::new("Milano", 45.4642, 9.19),
            Municipality::new("Monza", 45.5845, 9.2744),
        ];
        let first = insert_municipalities(&conn, &municipalities).unwrap();
        assert_eq!(first.inserted, 2);

        // same names, fresh ids
        let again: Vec<Municipality> = vec![
            Municipality::new("Milano", 45.4642, 9.19),
            Municipality::new("Monza", 45.5845, 9.2744),
        ];
        let second = insert_municipalities(&conn, &again).unwrap();
        assert_eq!(second.inserted, 0);
        assert_eq!(second.duplicates, 2);
        assert_eq!(count_municipalities(&conn).unwrap(), 2);

        let rows = vec![neighborhood_row("Milano", "Isola"), neighborhood_row("Monza", "Centro")];
        assert_eq!(insert_neighborhoods(&conn, &rows).unwrap().inserted, 2);
        assert_eq!(insert_neighborhoods(&conn, &rows).unwrap().duplicates, 2);
        assert_eq!(count_neighborhoods(&conn).unwrap(), 2);
    }

    #[test]
    fn test_neighborhood_with_unknown_municipality_is_skipped() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        insert_municipalities(&conn, &[Municipality::new("Milano", 45.4642, 9.19)]).unwrap();

        let stats = insert_neighborhoods(&conn, &[neighborhood_row("Atlantide", "Centro")]).unwrap();
        assert_eq!(stats.skipped, 1);
        assert_eq!(count_neighborhoods(&conn).unwrap(), 0);
    }

    #[test]
    fn test_sqlite_catalog_lists_sorted_active() {
        let catalog = seeded_catalog();

        let municipalities = catalog.list_active_municipalities().unwrap();
        let names: Vec<&str> = municipalities.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["Bresso", "Milano"]);

        let milano = catalog.find_municipality_by_name("MILANO").unwrap().unwrap();
        let neighborhoods = catalog.list_active_neighborhoods(&milano.id).unwrap();
        let names: Vec<&str> = neighborhoods.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["Bovisa", "Isola", "Padova/Loreto"]);
        assert!(neighborhoods.iter().all(|n| n.municipality_name == "Milano"));

        let bresso = catalog.find_municipality_by_name("Bresso").unwrap().unwrap();
        assert!(catalog.list_active_neighborhoods(&bresso.id).unwrap().is_empty());
    }

    #[test]
    fn test_inactive_rows_are_hidden() {
        let catalog = seeded_catalog();
        catalog
            .with_connection(|conn| {
                conn.execute("UPDATE municipalities SET active = 0 WHERE name = 'Bresso'", [])?;
                conn.execute("UPDATE neighborhoods SET active = 0 WHERE name = 'Isola'", [])?;
                Ok(())
            })
            .unwrap();

        assert!(catalog.find_municipality_by_name("Bresso").unwrap().is_none());

        let milano = catalog.find_municipality_by_name("Milano").unwrap().unwrap();
        let names: Vec<String> = catalog
            .list_active_neighborhoods(&milano.id)
            .unwrap()
            .into_iter()
            .map(|n| n.name)
            .collect();
        assert_eq!(names, vec!["Bovisa", "Padova/Loreto"]);
    }

    #[test]
    fn test_load_csv_files() {
        let dir = std::env::temp_dir().join(format!("resolver-csv-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();

        let municipalities_path = dir.join("municipalities.csv");
        let mut file = std::fs::File::create(&municipalities_path).unwrap();
        writeln!(file, "name,latitude,longitude,active").unwrap();
        writeln!(file, "Milano,45.4642,9.19,true").unwrap();
        writeln!(file, "Pero,,,false").unwrap();

        let neighborhoods_path = dir.join("neighborhoods.csv");
        let mut file = std::fs::File::create(&neighborhoods_path).unwrap();
        writeln!(file, "municipality,name,area,active").unwrap();
        writeln!(file, "Milano,Isola,Municipio 9,true").unwrap();
        writeln!(file, "Milano,Padova/Loreto,Municipio 2,true").unwrap();

        let municipalities = load_municipalities_csv(&municipalities_path).unwrap();
        assert_eq!(municipalities.len(), 2);
        assert_eq!(municipalities[0].latitude, Some(45.4642));
        assert_eq!(municipalities[1].latitude, None);
        assert!(!municipalities[1].active);

        let neighborhoods = load_neighborhoods_csv(&neighborhoods_path).unwrap();
        assert_eq!(neighborhoods.len(), 2);
        assert_eq!(neighborhoods[1].area, "Municipio 2");

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_missing_csv_reports_path() {
        let err = load_municipalities_csv(Path::new("/nonexistent/municipalities.csv")).unwrap_err();
        assert!(err.to_string().contains("Failed to open municipalities CSV"));
    }

    #[test]
    fn test_resolver_over_sqlite_and_event_log() {
        let catalog = seeded_catalog();
        let request = ResolutionRequest::from_address(RawAddressSignal {
            raw_neighborhood: String::new(),
            raw_road: "Via Padova".to_string(),
            raw_city: "Milano".to_string(),
            house_number: None,
            postal_code: None,
        });

        let resolver = Resolver::new(&catalog);
        let resolution = resolver.resolve(&request);
        assert_eq!(resolution.result.neighborhood.as_deref(), Some("Padova/Loreto"));

        catalog.record(&request, &resolution).unwrap();
        catalog.record(&request, &resolution).unwrap();

        let events = catalog.with_connection(|conn| get_recent_events(conn, 10)).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].signal_hash, events[1].signal_hash);
        assert_eq!(events[0].neighborhood.as_deref(), Some("Padova/Loreto"));
        assert_eq!(events[0].municipality.as_deref(), Some("Milano"));
        assert_eq!(events[0].outcome["municipality_source"], "ByName");
    }

    #[test]
    fn test_signal_hash_differs_per_signal() {
        let a = ResolutionRequest::new(45.46, 9.19, RawAddressSignal::default());
        let b = ResolutionRequest::new(45.47, 9.19, RawAddressSignal::default());

        assert_eq!(compute_signal_hash(&a).unwrap(), compute_signal_hash(&a).unwrap());
        assert_ne!(compute_signal_hash(&a).unwrap(), compute_signal_hash(&b).unwrap());
        assert_eq!(compute_signal_hash(&a).unwrap().len(), 64);
    }
}
