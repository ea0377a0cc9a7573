//! Route guard middleware.
//!
//! Per request: no identity -> 401; identity -> one resolution -> requirement
//! met -> handler runs with a `Principal` in extensions, otherwise 403.
//!
//! ```ignore
//! Router::new()
//!     .route("/roles", post(create_role))
//!     .route_layer(middleware::from_fn_with_state(
//!         RouteGuard::permission(state.clone(), Resource::Role, Action::Manage),
//!         enforce,
//!     ))
//! ```

use axum::async_trait;
use axum::extract::{FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::Response;

use crate::app::AppState;
use crate::errors::AppError;
use crate::models::rbac::{Action, Resource, UserPermissions};

use super::{Principal, PolicyEvaluator};

/// What a guarded route demands of its caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement {
    /// Any authenticated caller.
    Authenticated,
    Permission(Resource, Action),
    /// Every listed capability; used where one route touches two resources.
    AllPermissions(Vec<(Resource, Action)>),
    Role(String),
    /// At least one of the listed roles.
    AnyRole(Vec<String>),
}

impl Requirement {
    pub fn is_met(&self, resolved: &UserPermissions, evaluator: &dyn PolicyEvaluator) -> bool {
        match self {
            Requirement::Authenticated => true,
            Requirement::Permission(resource, action) => evaluator.can(resolved, *resource, *action),
            Requirement::AllPermissions(needed) => needed
                .iter()
                .all(|(resource, action)| evaluator.can(resolved, *resource, *action)),
            Requirement::Role(role) => resolved.role_names().any(|name| name == role),
            Requirement::AnyRole(roles) => resolved
                .role_names()
                .any(|name| roles.iter().any(|role| role == name)),
        }
    }
}

#[derive(Clone)]
pub struct RouteGuard {
    state: AppState,
    requirement: Requirement,
}

impl RouteGuard {
    pub fn new(state: AppState, requirement: Requirement) -> Self {
        Self { state, requirement }
    }

    pub fn authenticated(state: AppState) -> Self {
        Self::new(state, Requirement::Authenticated)
    }

    pub fn permission(state: AppState, resource: Resource, action: Action) -> Self {
        Self::new(state, Requirement::Permission(resource, action))
    }

    pub fn all_permissions(state: AppState, needed: &[(Resource, Action)]) -> Self {
        Self::new(state, Requirement::AllPermissions(needed.to_vec()))
    }

    pub fn any_role(state: AppState, roles: &[&str]) -> Self {
        Self::new(
            state,
            Requirement::AnyRole(roles.iter().map(|r| r.to_string()).collect()),
        )
    }
}

pub async fn enforce(
    State(guard): State<RouteGuard>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let caller = guard.state.jwt.caller_from_headers(request.headers())?;

    let resolved = guard
        .state
        .access
        .get_user_permissions_with_fallback(caller.user_id)
        .await;

    if !guard.requirement.is_met(&resolved, guard.state.access.evaluator()) {
        tracing::info!(
            user_id = %caller.user_id,
            requirement = ?guard.requirement,
            path = %request.uri().path(),
            "access denied"
        );
        return Err(AppError::forbidden("insufficient permissions"));
    }

    request
        .extensions_mut()
        .insert(Principal::new(caller, resolved));

    Ok(next.run(request).await)
}

#[async_trait]
impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Principal>()
            .cloned()
            .ok_or_else(|| AppError::unauthenticated("route is not guarded"))
    }
}
