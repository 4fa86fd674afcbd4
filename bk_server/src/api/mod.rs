//! HTTP API for the tournament server.
//!
//! # Architecture
//!
//! The API is built with:
//! - **Axum**: Async web framework
//! - **Tower**: Middleware for CORS and request ids
//! - **TournamentEngine**: every handler is a thin call into the engine;
//!   engine errors map onto status codes in [`error`]
//!
//! # Modules
//!
//! - [`brackets`]: bracket generation and inspection
//! - [`matches`]: results, confirmations, disputes, resolutions
//! - [`registrations`]: registration policy, registrations, payments
//! - [`request_id`]: `x-request-id` propagation and HTTP metrics

pub mod brackets;
pub mod error;
pub mod matches;
pub mod registrations;
pub mod request_id;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
};
use bracketeer::{TournamentEngine, TournamentStore, db::Database};
use serde_json::json;
use tower_http::cors::CorsLayer;

/// Shared application state
pub struct AppState<S> {
    pub engine: TournamentEngine<S>,
    /// Pool probed by `/health`; `None` when serving from memory
    pub database: Option<Database>,
}

impl<S> AppState<S> {
    /// Storage backend name reported by the health check
    pub fn storage(&self) -> &'static str {
        if self.database.is_some() {
            "postgres"
        } else {
            "memory"
        }
    }
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
            database: self.database.clone(),
        }
    }
}

/// Create the application router
///
/// # Endpoint Summary
///
/// ```text
/// GET  /health                                  - Health check (503 when the database is down)
/// POST /api/v1/tournaments/{id}/bracket         - Generate bracket
/// GET  /api/v1/tournaments/{id}/bracket         - Get bracket
/// PUT  /api/v1/tournaments/{id}/policy          - Set registration policy
/// POST /api/v1/tournaments/{id}/registrations   - Register
/// POST /api/v1/registrations/{id}/withdraw      - Withdraw
/// POST /api/v1/registrations/{id}/payments      - Submit payment
/// POST /api/v1/matches/{id}/results             - Submit result
/// POST /api/v1/submissions/{id}/confirm         - Confirm result
/// POST /api/v1/submissions/{id}/dispute         - Dispute result
/// POST /api/v1/submissions/{id}/resolve         - Resolve dispute (staff)
/// ```
///
/// # Example
///
/// ```rust,no_run
/// # use bk_server::api::{create_router, AppState};
/// # use bracketeer::{LogNotifier, MemoryStore, TournamentEngine};
/// # use std::sync::Arc;
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let engine = TournamentEngine::new(Arc::new(MemoryStore::new()), Arc::new(LogNotifier));
/// let app = create_router(AppState { engine, database: None });
/// let listener = tokio::net::TcpListener::bind("127.0.0.1:6969").await?;
/// axum::serve(listener, app).await?;
/// # Ok(())
/// # }
/// ```
pub fn create_router<S: TournamentStore>(state: AppState<S>) -> Router {
    Router::new()
        .route("/health", get(health_check::<S>))
        .nest("/api/v1", create_v1_router::<S>())
        .layer(axum::middleware::from_fn(request_id::request_id_middleware))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn create_v1_router<S: TournamentStore>() -> Router<AppState<S>> {
    Router::new()
        .route(
            "/tournaments/{tournament_id}/bracket",
            post(brackets::generate_bracket::<S>).get(brackets::get_bracket::<S>),
        )
        .route(
            "/tournaments/{tournament_id}/policy",
            put(registrations::set_policy::<S>),
        )
        .route(
            "/tournaments/{tournament_id}/registrations",
            post(registrations::register::<S>),
        )
        .route(
            "/registrations/{registration_id}/withdraw",
            post(registrations::withdraw::<S>),
        )
        .route(
            "/registrations/{registration_id}/payments",
            post(registrations::submit_payment::<S>),
        )
        .route("/matches/{match_id}/results", post(matches::submit_result::<S>))
        .route(
            "/submissions/{submission_id}/confirm",
            post(matches::confirm_result::<S>),
        )
        .route(
            "/submissions/{submission_id}/dispute",
            post(matches::dispute_result::<S>),
        )
        .route(
            "/submissions/{submission_id}/resolve",
            post(matches::resolve_dispute::<S>),
        )
}

/// Health check endpoint for monitoring and load balancers.
async fn health_check<S: TournamentStore>(State(state): State<AppState<S>>) -> impl IntoResponse {
    // Check database connectivity
    let db_healthy = match &state.database {
        Some(db) => match db.health_check().await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "Database health check failed");
                false
            }
        },
        None => true,
    };

    let status_code = if db_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = json!({
        "status": if db_healthy { "healthy" } else { "unhealthy" },
        "version": env!("CARGO_PKG_VERSION"),
        "storage": state.storage(),
        "database": db_healthy,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });

    (status_code, Json(response))
}
