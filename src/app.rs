use std::sync::Arc;

use axum::http::Method;
use axum::routing::{get, post};
use axum::Router;
use sqlx::SqlitePool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::authz::AccessControl;
use crate::db::RbacRepository;
use crate::errors::AppError;
use crate::events::{self, EventBus};
use crate::jwt::JwtConfig;
use crate::routes::{auth, health, rbac};
use crate::services::RbacService;

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub jwt: Arc<JwtConfig>,
    pub event_bus: EventBus,
    pub access: AccessControl,
    pub rbac: RbacService,
}

impl AppState {
    pub fn new(pool: SqlitePool, jwt: JwtConfig) -> Self {
        let (event_bus, _) = events::init_event_bus();
        let repo = RbacRepository::new(pool.clone());

        Self {
            access: AccessControl::with_store(Arc::new(repo.clone())),
            rbac: RbacService::new(repo, event_bus.clone()),
            pool,
            jwt: Arc::new(jwt),
            event_bus,
        }
    }
}

/// Builds the router with JWT settings from the environment and starts the
/// audit listener.
pub async fn create_app(pool: SqlitePool) -> Result<Router, AppError> {
    let jwt_config = JwtConfig::from_env()?;
    let state = AppState::new(pool, jwt_config);
    spawn_audit_listener(&state);

    Ok(router(state))
}

pub fn spawn_audit_listener(state: &AppState) {
    tokio::spawn(events::start_audit_listener(
        state.event_bus.subscribe(),
        state.pool.clone(),
    ));
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_origin(Any)
        .allow_headers(Any);

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/me", get(auth::me));

    Router::new()
        .route("/api/health", get(health::health))
        .nest("/auth", auth_routes)
        .nest("/rbac", rbac::routes(state.clone()))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
