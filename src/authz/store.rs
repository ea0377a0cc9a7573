use async_trait::async_trait;
use uuid::Uuid;

use crate::errors::AppResult;
use crate::models::rbac::{Permission, Role};

/// Read side of the permission store consumed by the resolver.
///
/// Implementations return store errors as-is; folding them into "no
/// permissions" is the resolver's job.
#[async_trait]
pub trait PermissionStore: Send + Sync {
    /// Roles reachable through active assignments whose role is also active.
    async fn active_roles_for_user(&self, user_id: Uuid) -> AppResult<Vec<Role>>;

    /// The user's `default_role` column, `None` when the user does not exist.
    async fn default_role_name(&self, user_id: Uuid) -> AppResult<Option<String>>;

    async fn role_by_name(&self, name: &str) -> AppResult<Option<Role>>;

    /// Permissions granted to any of `role_ids`.
    async fn permissions_for_roles(&self, role_ids: &[Uuid]) -> AppResult<Vec<Permission>>;
}
