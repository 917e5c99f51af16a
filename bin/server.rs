// Neighborhood Resolver - Web Server
// REST API with Axum

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

use neighborhood_resolver::config::{init_logging, Config};
use neighborhood_resolver::{
    parse_provider_response, AddressComponents, Catalog, Municipality, Neighborhood, RequestTicket,
    Resolution, ResolutionRequest, ResolutionSession, Resolver, SessionRegistry, SqliteCatalog,
};

/// How often idle sessions are swept
const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// A session-scoped request's place in line
type Claim = (ResolutionSession, RequestTicket);

/// Shared application state
#[derive(Clone)]
struct AppState {
    catalog: Arc<SqliteCatalog>,
    sessions: Arc<SessionRegistry>,
}

impl AppState {
    /// Begin a request in the caller's session; earlier ones become stale
    fn claim(&self, session_id: Option<&str>) -> Option<Claim> {
        let id = session_id?;
        match self.sessions.session(id) {
            Ok(session) => {
                let ticket = session.begin();
                Some((session, ticket))
            }
            Err(e) => {
                warn!(session = id, error = %e, "session unavailable, resolving unscoped");
                None
            }
        }
    }

    /// Validate the body, then claim the session
    ///
    /// None for an unusable geocoder response; no session is touched then.
    fn prepare(&self, body: ResolveBody) -> Option<(ResolutionRequest, Option<Claim>)> {
        let session_id = body.session_id.clone();
        let request = body.into_request()?;
        Some((request, self.claim(session_id.as_deref())))
    }
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

fn failure(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ApiResponse::<()>::err(message))).into_response()
}

/// POST /api/resolve body
#[derive(Deserialize)]
struct ResolveBody {
    /// Last request wins per session
    #[serde(default)]
    session_id: Option<String>,

    #[serde(default)]
    latitude: Option<f64>,

    #[serde(default)]
    longitude: Option<f64>,

    /// Address components already extracted by the caller
    #[serde(default)]
    address: Option<AddressComponents>,

    /// Or the raw geocoder response, parsed here
    #[serde(default)]
    provider_response: Option<serde_json::Value>,
}

impl ResolveBody {
    fn into_request(self) -> Option<ResolutionRequest> {
        let components = match (self.address, self.provider_response) {
            (Some(address), _) => address,
            (None, Some(raw)) => match parse_provider_response(&raw.to_string()) {
                Ok(components) => components,
                Err(e) => {
                    warn!(error = %e, "unusable geocoder response");
                    return None;
                }
            },
            (None, None) => AddressComponents::default(),
        };

        Some(ResolutionRequest {
            latitude: self.latitude,
            longitude: self.longitude,
            address: components.into_signal(),
        })
    }
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/municipalities - Active municipalities
async fn get_municipalities(State(state): State<AppState>) -> Response {
    let catalog = state.catalog.clone();
    let result = tokio::task::spawn_blocking(move || catalog.list_active_municipalities()).await;

    match result {
        Ok(Ok(municipalities)) => {
            (StatusCode::OK, Json(ApiResponse::<Vec<Municipality>>::ok(municipalities))).into_response()
        }
        Ok(Err(e)) => {
            error!(error = %e, "failed to list municipalities");
            failure(StatusCode::INTERNAL_SERVER_ERROR, "catalog unavailable")
        }
        Err(e) => {
            error!(error = %e, "municipality listing task failed");
            failure(StatusCode::INTERNAL_SERVER_ERROR, "catalog unavailable")
        }
    }
}

/// GET /api/municipalities/:name/neighborhoods - Neighborhoods of one municipality
async fn get_neighborhoods(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    let decoded_name = urlencoding::decode(&name)
        .unwrap_or_else(|_| name.clone().into())
        .into_owned();

    let catalog = state.catalog.clone();
    let lookup_name = decoded_name.clone();
    let result = tokio::task::spawn_blocking(move || -> anyhow::Result<Option<Vec<Neighborhood>>> {
        match catalog.find_municipality_by_name(&lookup_name)? {
            Some(municipality) => Ok(Some(catalog.list_active_neighborhoods(&municipality.id)?)),
            None => Ok(None),
        }
    })
    .await;

    match result {
        Ok(Ok(Some(neighborhoods))) => {
            (StatusCode::OK, Json(ApiResponse::ok(neighborhoods))).into_response()
        }
        Ok(Ok(None)) => failure(
            StatusCode::NOT_FOUND,
            format!("Municipality not found: {}", decoded_name),
        ),
        Ok(Err(e)) => {
            error!(municipality = %decoded_name, error = %e, "failed to list neighborhoods");
            failure(StatusCode::INTERNAL_SERVER_ERROR, "catalog unavailable")
        }
        Err(e) => {
            error!(error = %e, "neighborhood listing task failed");
            failure(StatusCode::INTERNAL_SERVER_ERROR, "catalog unavailable")
        }
    }
}

/// Resolve and record, unless a newer request in the same session took over
fn run_resolution(
    catalog: &SqliteCatalog,
    request: &ResolutionRequest,
    claim: Option<&Claim>,
) -> Option<Resolution> {
    let current = || claim.map_or(true, |(session, ticket)| session.is_current(ticket));

    if !current() {
        return None;
    }
    let resolution = Resolver::new(catalog).resolve(request);
    if !current() {
        return None;
    }

    if let Err(e) = catalog.record(request, &resolution) {
        warn!(error = %e, "failed to record resolution event");
    }
    Some(resolution)
}

/// POST /api/resolve - Resolve one signal
async fn resolve(State(state): State<AppState>, Json(body): Json<ResolveBody>) -> Response {
    // Malformed geocoder output means no resolution, not an error
    let Some((request, claim)) = state.prepare(body) else {
        return (StatusCode::OK, Json(ApiResponse::<Option<Resolution>>::ok(None))).into_response();
    };

    let catalog = state.catalog.clone();
    let task_claim = claim.clone();
    let result =
        tokio::task::spawn_blocking(move || run_resolution(&catalog, &request, task_claim.as_ref()))
            .await;

    let resolution = match result {
        Ok(Some(resolution)) => resolution,
        Ok(None) => return failure(StatusCode::CONFLICT, "superseded by a newer request"),
        Err(e) => {
            error!(error = %e, "resolution task failed");
            return failure(StatusCode::INTERNAL_SERVER_ERROR, "resolution failed");
        }
    };

    if let Some((session, ticket)) = claim {
        if !session.complete(ticket, resolution.clone()) {
            return failure(StatusCode::CONFLICT, "superseded by a newer request");
        }
    }

    (StatusCode::OK, Json(ApiResponse::ok(Some(resolution)))).into_response()
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let config = Config::load()?;
    init_logging(&config.log_filter);

    let catalog = SqliteCatalog::open(&config.database_path)?;
    info!(path = ?config.database_path, "catalog opened");

    // Create shared state
    let state = AppState {
        catalog: Arc::new(catalog),
        sessions: Arc::new(SessionRegistry::new(
            Duration::from_secs(config.session_idle_secs),
            config.max_sessions,
        )),
    };

    let sweeper = state.sessions.clone();
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(SESSION_SWEEP_INTERVAL);
        loop {
            tick.tick().await;
            match sweeper.evict_idle() {
                Ok(0) => {}
                Ok(evicted) => info!(evicted, "idle sessions evicted"),
                Err(e) => warn!(error = %e, "session sweep failed"),
            }
        }
    });

    // Build API routes
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/municipalities", get(get_municipalities))
        .route("/municipalities/:name/neighborhoods", get(get_neighborhoods))
        .route("/resolve", post(resolve))
        .with_state(state);

    let app = Router::new()
        .nest("/api", api_routes)
        .layer(ServiceBuilder::new().layer(CorsLayer::permissive()));

    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    info!(address = %config.bind_address, "server running");

    axum::serve(listener, app).await?;
    Ok(())
}
