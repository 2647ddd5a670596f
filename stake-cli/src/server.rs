use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::{self, Next},
    response::Response,
    routing::{delete, get, post, put},
    Router,
};
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use stake_core::config::StakeConfig;
use stake_core::coordinator::Coordinator;
use stake_core::error::{Result, StakeError};

use crate::handlers::*;

pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<Coordinator>,
    pub admin_token: Option<String>,
}

impl AppState {
    pub fn new(coordinator: Coordinator, admin_token: Option<String>) -> Self {
        Self {
            coordinator: Arc::new(coordinator),
            admin_token: admin_token.filter(|t| !t.is_empty()),
        }
    }
}

pub struct ServeOptions {
    pub host: String,
    pub port: u16,
    pub storage: String,
    pub config: StakeConfig,
    pub admin_token: Option<String>,
    pub max_inflight: usize,
    pub seed: Option<usize>,
}

pub fn router(state: AppState, max_inflight: usize) -> Router {
    let admin = Router::new()
        .route("/admin/overview", get(overview))
        .route("/admin/resources/{key}", put(put_resource))
        .route("/admin/assignments/{id}", delete(delete_assignment))
        .route("/admin/sweep", post(sweep))
        .route_layer(middleware::from_fn_with_state(state.clone(), admin_middleware));

    Router::new()
        .route("/health", get(health))
        .route("/resources", get(list_resources))
        .route("/leases", post(acquire_lease).delete(release_lease))
        .route("/assignments", post(commit_assignment))
        .merge(admin)
        .layer(ConcurrencyLimitLayer::new(max_inflight.max(1)))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn run(opts: ServeOptions) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let coordinator = create_coordinator(&opts.storage, opts.config)?;

    if let Some(count) = opts.seed {
        let created = coordinator.seed_catalog(count)?;
        if created > 0 {
            tracing::info!("🌱 Seeded {} resources", created);
        }
    }

    let state = AppState::new(coordinator, opts.admin_token);

    if state.admin_token.is_some() {
        tracing::info!("🔐 Admin token required for /admin routes");
    } else {
        tracing::warn!("⚠️  No STAKE_ADMIN_TOKEN set, admin routes are open (dev mode)");
    }

    let app = router(state, opts.max_inflight);
    let addr = format!("{}:{}", opts.host, opts.port);

    tracing::info!(
        lease_ttl_secs = opts.config.lease_ttl_ms / 1000,
        heartbeat_secs = opts.config.heartbeat_ms / 1000,
        "🔒 Stake server starting on http://{}",
        addr
    );

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

// ─── Admin Middleware ───────────────────────────────────────────────────────

async fn admin_middleware(
    State(state): State<AppState>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> std::result::Result<Response, StatusCode> {
    // No token configured: admin routes are open (dev mode)
    let Some(expected) = state.admin_token.as_deref() else {
        return Ok(next.run(request).await);
    };

    let supplied = headers
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if tokens_match(supplied, expected) {
        Ok(next.run(request).await)
    } else {
        tracing::warn!("🚫 Unauthorized request to {}", request.uri().path());
        Err(StatusCode::UNAUTHORIZED)
    }
}

/// Compares every byte regardless of where the first mismatch is.
pub(crate) fn tokens_match(supplied: &str, expected: &str) -> bool {
    if supplied.len() != expected.len() {
        return false;
    }
    supplied
        .bytes()
        .zip(expected.bytes())
        .fold(0u8, |diff, (a, b)| diff | (a ^ b))
        == 0
}

// ─── Storage Backend Selection ──────────────────────────────────────────────

pub fn create_coordinator(storage: &str, config: StakeConfig) -> Result<Coordinator> {
    config.validate()?;

    if storage == "memory" {
        tracing::info!("💾 Storage backend: in-memory (state will not persist)");
        Ok(Coordinator::with_store(
            Box::new(stake_core::infrastructure_in_memory::InMemoryStore::new()),
            config,
        ))
    } else if let Some(path) = storage.strip_prefix("sqlite:") {
        #[cfg(feature = "sqlite")]
        {
            tracing::info!("💾 Storage backend: SQLite ({})", path);
            Coordinator::with_sqlite(path, config)
        }
        #[cfg(not(feature = "sqlite"))]
        {
            Err(StakeError::Invalid(format!(
                "SQLite storage requested for '{}' but the `sqlite` feature is not enabled",
                path
            )))
        }
    } else {
        Err(StakeError::Invalid(format!(
            "Unknown storage backend: '{}'. Use 'memory' or 'sqlite:<path>'",
            storage
        )))
    }
}
