//! RBAC admin API routes
//!
//! Endpoints for managing roles, permissions, grants and user assignments,
//! plus caller introspection. Each group sits behind its own route guard.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    routing::{delete, get, post, put},
    Json, Router,
};
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{enforce, roles, Principal, RouteGuard};
use crate::db::users;
use crate::errors::{AppError, AppResult};
use crate::models::rbac::*;
use crate::models::user::User;

// =============================================================================
// ROUTER
// =============================================================================

pub fn routes(state: AppState) -> Router<AppState> {
    let guard = |route_guard: RouteGuard| middleware::from_fn_with_state(route_guard, enforce);

    let me = Router::new()
        .route("/me/permissions", get(my_permissions))
        .route("/me/can", get(check_my_access))
        .route_layer(guard(RouteGuard::authenticated(state.clone())));

    let roles_read = Router::new()
        .route("/roles", get(list_roles))
        .route("/roles/:role_id", get(get_role))
        .route("/roles/:role_id/permissions", get(get_role_permissions))
        .route_layer(guard(RouteGuard::permission(state.clone(), Resource::Role, Action::Read)));

    let roles_write = Router::new()
        .route("/roles", post(create_role))
        .route("/roles/:role_id", put(update_role).delete(delete_role))
        .route("/roles/:role_id/permissions", post(assign_permission_to_role))
        .route("/roles/:role_id/permissions/bulk", post(bulk_assign_permissions).delete(bulk_remove_permissions))
        .route("/roles/:role_id/permissions/:permission_id", delete(remove_permission_from_role))
        .route_layer(guard(RouteGuard::permission(state.clone(), Resource::Role, Action::Manage)));

    let permissions_read = Router::new()
        .route("/permissions", get(list_permissions))
        .route_layer(guard(RouteGuard::permission(state.clone(), Resource::Permission, Action::Read)));

    let permissions_write = Router::new()
        .route("/permissions", post(create_permission))
        .route("/permissions/:permission_id", delete(delete_permission))
        .route_layer(guard(RouteGuard::permission(state.clone(), Resource::Permission, Action::Manage)));

    // Needs ROLE:MANAGE as well, so USER:MANAGE alone cannot grant itself a stronger role.
    let user_roles_write = Router::new()
        .route("/users/:user_id/roles", post(assign_role_to_user))
        .route("/users/:user_id/roles/:role_id", delete(revoke_role_from_user))
        .route("/users/:user_id/default-role", put(set_default_role))
        .route_layer(guard(RouteGuard::all_permissions(
            state.clone(),
            &[(Resource::User, Action::Manage), (Resource::Role, Action::Manage)],
        )));

    let user_read = Router::new()
        .route("/users/:user_id/roles", get(get_user_roles))
        .route("/users/:user_id/effective-permissions", get(get_effective_permissions))
        .route_layer(guard(RouteGuard::permission(state.clone(), Resource::User, Action::Read)));

    let seed = Router::new()
        .route("/seed", post(seed_defaults))
        .route_layer(guard(RouteGuard::any_role(state, &[roles::SUPER_ADMIN, roles::ADMIN])));

    Router::new()
        .merge(me)
        .merge(roles_read)
        .merge(roles_write)
        .merge(permissions_read)
        .merge(permissions_write)
        .merge(user_roles_write)
        .merge(user_read)
        .merge(seed)
}

// =============================================================================
// CALLER
// =============================================================================

/// Effective roles and permissions of the caller
#[utoipa::path(
    get,
    path = "/rbac/me/permissions",
    tag = "RBAC",
    responses(
        (status = 200, description = "Resolved permission set", body = UserPermissions),
        (status = 401, description = "Missing or invalid token"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn my_permissions(principal: Principal) -> Json<UserPermissions> {
    Json(principal.permissions)
}

/// Whether the caller may perform `action` on `resource`
#[utoipa::path(
    get,
    path = "/rbac/me/can",
    tag = "RBAC",
    params(
        ("resource" = Resource, Query, description = "Resource name, e.g. COURSE"),
        ("action" = Action, Query, description = "Action name, e.g. READ"),
    ),
    responses(
        (status = 200, description = "Access decision", body = AccessCheckResponse),
        (status = 400, description = "Unknown resource or action"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn check_my_access(
    State(state): State<AppState>,
    principal: Principal,
    Query(query): Query<AccessCheckQuery>,
) -> Json<AccessCheckResponse> {
    let allowed = state
        .access
        .evaluator()
        .can(&principal.permissions, query.resource, query.action);

    Json(AccessCheckResponse {
        resource: query.resource,
        action: query.action,
        allowed,
    })
}

// =============================================================================
// ROLE ENDPOINTS
// =============================================================================

/// List all roles
#[utoipa::path(
    get,
    path = "/rbac/roles",
    tag = "RBAC",
    responses(
        (status = 200, description = "List of roles", body = Vec<Role>),
        (status = 403, description = "Missing ROLE:READ"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn list_roles(State(state): State<AppState>) -> AppResult<Json<Vec<Role>>> {
    Ok(Json(state.rbac.list_roles().await?))
}

/// Get a single role
#[utoipa::path(
    get,
    path = "/rbac/roles/{role_id}",
    tag = "RBAC",
    params(("role_id" = Uuid, Path, description = "Role ID")),
    responses(
        (status = 200, description = "Role", body = Role),
        (status = 404, description = "Role not found"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_role(State(state): State<AppState>, Path(role_id): Path<Uuid>) -> AppResult<Json<Role>> {
    Ok(Json(state.rbac.get_role(role_id).await?))
}

/// Create a new role
#[utoipa::path(
    post,
    path = "/rbac/roles",
    tag = "RBAC",
    request_body = RoleCreateRequest,
    responses(
        (status = 201, description = "Role created", body = Role),
        (status = 400, description = "Invalid role name"),
        (status = 409, description = "Role name already exists"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_role(
    State(state): State<AppState>,
    principal: Principal,
    Json(payload): Json<RoleCreateRequest>,
) -> AppResult<(StatusCode, Json<Role>)> {
    let role = state
        .rbac
        .create_role(Some(principal.user_id()), &payload.name, payload.description.as_deref())
        .await?;

    Ok((StatusCode::CREATED, Json(role)))
}

/// Rename, re-describe or (de)activate a role
#[utoipa::path(
    put,
    path = "/rbac/roles/{role_id}",
    tag = "RBAC",
    params(("role_id" = Uuid, Path, description = "Role ID")),
    request_body = RoleUpdateRequest,
    responses(
        (status = 200, description = "Role updated", body = Role),
        (status = 404, description = "Role not found"),
        (status = 409, description = "Role name already exists"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn update_role(
    State(state): State<AppState>,
    principal: Principal,
    Path(role_id): Path<Uuid>,
    Json(payload): Json<RoleUpdateRequest>,
) -> AppResult<Json<Role>> {
    let role = state
        .rbac
        .update_role(Some(principal.user_id()), role_id, payload)
        .await?;

    Ok(Json(role))
}

/// Delete a role together with its grants and assignments
#[utoipa::path(
    delete,
    path = "/rbac/roles/{role_id}",
    tag = "RBAC",
    params(("role_id" = Uuid, Path, description = "Role ID")),
    responses(
        (status = 204, description = "Role deleted"),
        (status = 400, description = "Role is protected"),
        (status = 404, description = "Role not found"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn delete_role(
    State(state): State<AppState>,
    principal: Principal,
    Path(role_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    state.rbac.delete_role(Some(principal.user_id()), role_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Permissions granted to a role
#[utoipa::path(
    get,
    path = "/rbac/roles/{role_id}/permissions",
    tag = "RBAC",
    params(("role_id" = Uuid, Path, description = "Role ID")),
    responses(
        (status = 200, description = "Granted permissions", body = Vec<Permission>),
        (status = 404, description = "Role not found"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_role_permissions(
    State(state): State<AppState>,
    Path(role_id): Path<Uuid>,
) -> AppResult<Json<Vec<Permission>>> {
    Ok(Json(state.rbac.role_permissions(role_id).await?))
}

/// Grant a permission to a role
#[utoipa::path(
    post,
    path = "/rbac/roles/{role_id}/permissions",
    tag = "RBAC",
    params(("role_id" = Uuid, Path, description = "Role ID")),
    request_body = AssignPermissionToRoleRequest,
    responses(
        (status = 201, description = "Permission granted", body = RolePermission),
        (status = 404, description = "Role or permission not found"),
        (status = 409, description = "Already granted"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn assign_permission_to_role(
    State(state): State<AppState>,
    principal: Principal,
    Path(role_id): Path<Uuid>,
    Json(payload): Json<AssignPermissionToRoleRequest>,
) -> AppResult<(StatusCode, Json<RolePermission>)> {
    let grant = state
        .rbac
        .assign_permission_to_role(Some(principal.user_id()), role_id, payload.permission_id)
        .await?;

    Ok((StatusCode::CREATED, Json(grant)))
}

/// Revoke a permission from a role
#[utoipa::path(
    delete,
    path = "/rbac/roles/{role_id}/permissions/{permission_id}",
    tag = "RBAC",
    params(
        ("role_id" = Uuid, Path, description = "Role ID"),
        ("permission_id" = Uuid, Path, description = "Permission ID"),
    ),
    responses((status = 200, description = "Removal result", body = RemovalResult)),
    security(("bearerAuth" = []))
)]
pub async fn remove_permission_from_role(
    State(state): State<AppState>,
    principal: Principal,
    Path((role_id, permission_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<RemovalResult>> {
    let removed = state
        .rbac
        .remove_permission_from_role(Some(principal.user_id()), role_id, permission_id)
        .await?;

    Ok(Json(RemovalResult { removed }))
}

/// Grant several permissions at once; existing grants are skipped
#[utoipa::path(
    post,
    path = "/rbac/roles/{role_id}/permissions/bulk",
    tag = "RBAC",
    params(("role_id" = Uuid, Path, description = "Role ID")),
    request_body = BulkPermissionsRequest,
    responses(
        (status = 200, description = "Number of grants created", body = BulkResult),
        (status = 404, description = "Role or a permission not found"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn bulk_assign_permissions(
    State(state): State<AppState>,
    principal: Principal,
    Path(role_id): Path<Uuid>,
    Json(payload): Json<BulkPermissionsRequest>,
) -> AppResult<Json<BulkResult>> {
    let affected = state
        .rbac
        .bulk_assign_permissions_to_role(Some(principal.user_id()), role_id, &payload.permission_ids)
        .await?;

    Ok(Json(BulkResult { affected }))
}

/// Revoke several permissions at once
#[utoipa::path(
    delete,
    path = "/rbac/roles/{role_id}/permissions/bulk",
    tag = "RBAC",
    params(("role_id" = Uuid, Path, description = "Role ID")),
    request_body = BulkPermissionsRequest,
    responses((status = 200, description = "Number of grants removed", body = BulkResult)),
    security(("bearerAuth" = []))
)]
pub async fn bulk_remove_permissions(
    State(state): State<AppState>,
    principal: Principal,
    Path(role_id): Path<Uuid>,
    Json(payload): Json<BulkPermissionsRequest>,
) -> AppResult<Json<BulkResult>> {
    let affected = state
        .rbac
        .bulk_remove_permissions_from_role(Some(principal.user_id()), role_id, &payload.permission_ids)
        .await?;

    Ok(Json(BulkResult { affected }))
}

// =============================================================================
// PERMISSION ENDPOINTS
// =============================================================================

/// List permissions, optionally for one resource
#[utoipa::path(
    get,
    path = "/rbac/permissions",
    tag = "RBAC",
    params(("resource" = Option<Resource>, Query, description = "Only permissions on this resource")),
    responses((status = 200, description = "List of permissions", body = Vec<Permission>)),
    security(("bearerAuth" = []))
)]
pub async fn list_permissions(
    State(state): State<AppState>,
    Query(query): Query<PermissionListQuery>,
) -> AppResult<Json<Vec<Permission>>> {
    Ok(Json(state.rbac.list_permissions(query.resource).await?))
}

/// Create a new permission
#[utoipa::path(
    post,
    path = "/rbac/permissions",
    tag = "RBAC",
    request_body = PermissionCreateRequest,
    responses(
        (status = 201, description = "Permission created", body = Permission),
        (status = 409, description = "Name or resource/action pair already exists"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_permission(
    State(state): State<AppState>,
    principal: Principal,
    Json(payload): Json<PermissionCreateRequest>,
) -> AppResult<(StatusCode, Json<Permission>)> {
    let permission = state
        .rbac
        .create_permission(
            Some(principal.user_id()),
            &payload.name,
            payload.resource,
            payload.action,
            payload.description.as_deref(),
        )
        .await?;

    Ok((StatusCode::CREATED, Json(permission)))
}

/// Delete a permission and every grant of it
#[utoipa::path(
    delete,
    path = "/rbac/permissions/{permission_id}",
    tag = "RBAC",
    params(("permission_id" = Uuid, Path, description = "Permission ID")),
    responses(
        (status = 204, description = "Permission deleted"),
        (status = 404, description = "Permission not found"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn delete_permission(
    State(state): State<AppState>,
    principal: Principal,
    Path(permission_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    state
        .rbac
        .delete_permission(Some(principal.user_id()), permission_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// USER ROLE ENDPOINTS
// =============================================================================

/// Role assignments of a user, including revoked ones
#[utoipa::path(
    get,
    path = "/rbac/users/{user_id}/roles",
    tag = "RBAC",
    params(("user_id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "Assignments", body = Vec<RoleAssignment>),
        (status = 404, description = "User not found"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_user_roles(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<Vec<RoleAssignment>>> {
    Ok(Json(state.rbac.user_assignments(user_id).await?))
}

/// Assign a role to a user
#[utoipa::path(
    post,
    path = "/rbac/users/{user_id}/roles",
    tag = "RBAC",
    params(("user_id" = Uuid, Path, description = "User ID")),
    request_body = AssignRoleRequest,
    responses(
        (status = 201, description = "Role assigned", body = RoleAssignment),
        (status = 403, description = "Missing USER:MANAGE or ROLE:MANAGE"),
        (status = 404, description = "User or role not found"),
        (status = 409, description = "Role already assigned"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn assign_role_to_user(
    State(state): State<AppState>,
    principal: Principal,
    Path(user_id): Path<Uuid>,
    Json(payload): Json<AssignRoleRequest>,
) -> AppResult<(StatusCode, Json<RoleAssignment>)> {
    let assignment = state
        .rbac
        .assign_role(Some(principal.user_id()), user_id, payload.role_id)
        .await?;

    Ok((StatusCode::CREATED, Json(assignment)))
}

/// Revoke a role from a user
#[utoipa::path(
    delete,
    path = "/rbac/users/{user_id}/roles/{role_id}",
    tag = "RBAC",
    params(
        ("user_id" = Uuid, Path, description = "User ID"),
        ("role_id" = Uuid, Path, description = "Role ID"),
    ),
    responses((status = 200, description = "Removal result", body = RemovalResult)),
    security(("bearerAuth" = []))
)]
pub async fn revoke_role_from_user(
    State(state): State<AppState>,
    principal: Principal,
    Path((user_id, role_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<RemovalResult>> {
    let removed = state
        .rbac
        .remove_role(Some(principal.user_id()), user_id, role_id)
        .await?;

    Ok(Json(RemovalResult { removed }))
}

/// Change the role a user falls back to without assignments
#[utoipa::path(
    put,
    path = "/rbac/users/{user_id}/default-role",
    tag = "RBAC",
    params(("user_id" = Uuid, Path, description = "User ID")),
    request_body = DefaultRoleRequest,
    responses(
        (status = 200, description = "User updated", body = User),
        (status = 403, description = "Missing USER:MANAGE or ROLE:MANAGE"),
        (status = 404, description = "User not found"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn set_default_role(
    State(state): State<AppState>,
    principal: Principal,
    Path(user_id): Path<Uuid>,
    Json(payload): Json<DefaultRoleRequest>,
) -> AppResult<Json<User>> {
    let user = state
        .rbac
        .set_default_role(Some(principal.user_id()), user_id, &payload.default_role)
        .await?;

    Ok(Json(user))
}

/// Effective permissions of a user, default-role fallback included
#[utoipa::path(
    get,
    path = "/rbac/users/{user_id}/effective-permissions",
    tag = "RBAC",
    params(("user_id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "Resolved permission set", body = UserPermissions),
        (status = 404, description = "User not found"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_effective_permissions(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<UserPermissions>> {
    if !users::user_exists(&state.pool, user_id).await? {
        return Err(AppError::not_found("user not found"));
    }

    Ok(Json(state.access.get_user_permissions_with_fallback(user_id).await))
}

// =============================================================================
// SEED
// =============================================================================

/// Install the default roles, permissions and grants
#[utoipa::path(
    post,
    path = "/rbac/seed",
    tag = "RBAC",
    responses(
        (status = 200, description = "Rows created by this run", body = SeedReport),
        (status = 403, description = "Caller is neither SUPER_ADMIN nor ADMIN"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn seed_defaults(
    State(state): State<AppState>,
    principal: Principal,
) -> AppResult<Json<SeedReport>> {
    Ok(Json(state.rbac.seed_defaults(Some(principal.user_id())).await?))
}
