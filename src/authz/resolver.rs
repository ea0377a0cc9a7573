use std::collections::HashSet;
use std::sync::Arc;

use uuid::Uuid;

use crate::errors::AppResult;
use crate::models::rbac::{Permission, Role, UserPermissions};

use super::PermissionStore;

/// Computes a user's effective roles and permissions.
///
/// Every call re-reads the store so a revoked grant is visible on the next
/// request. Store failures never escape: they resolve to the empty set.
#[derive(Clone)]
pub struct PermissionResolver {
    store: Arc<dyn PermissionStore>,
}

impl PermissionResolver {
    pub fn new(store: Arc<dyn PermissionStore>) -> Self {
        Self { store }
    }

    /// Active assignments only, no default-role fallback.
    pub async fn get_user_permissions(&self, user_id: Uuid) -> UserPermissions {
        match self.resolve_assigned(user_id).await {
            Ok(Some(resolved)) => resolved,
            Ok(None) => UserPermissions::empty(user_id),
            Err(err) => fail_closed(user_id, &err),
        }
    }

    /// Active assignments, falling back to the user's `default_role` when
    /// there are none.
    pub async fn get_user_permissions_with_fallback(&self, user_id: Uuid) -> UserPermissions {
        let resolved = match self.resolve_assigned(user_id).await {
            Ok(Some(resolved)) => Ok(resolved),
            Ok(None) => self.resolve_default_role(user_id).await,
            Err(err) => Err(err),
        };

        resolved.unwrap_or_else(|err| fail_closed(user_id, &err))
    }

    async fn resolve_assigned(&self, user_id: Uuid) -> AppResult<Option<UserPermissions>> {
        let roles = self.store.active_roles_for_user(user_id).await?;
        if roles.is_empty() {
            return Ok(None);
        }

        let mut seen = HashSet::new();
        let roles: Vec<Role> = roles.into_iter().filter(|r| seen.insert(r.id)).collect();
        let permissions = self.permissions_for(&roles).await?;

        Ok(Some(UserPermissions {
            user_id,
            roles,
            permissions,
        }))
    }

    async fn resolve_default_role(&self, user_id: Uuid) -> AppResult<UserPermissions> {
        let Some(name) = self.store.default_role_name(user_id).await? else {
            return Ok(UserPermissions::empty(user_id));
        };

        let name = name.trim();
        if name.is_empty() {
            return Ok(UserPermissions::empty(user_id));
        }

        match self.store.role_by_name(name).await? {
            Some(role) if role.is_active => {
                let roles = vec![role];
                let permissions = self.permissions_for(&roles).await?;
                Ok(UserPermissions {
                    user_id,
                    roles,
                    permissions,
                })
            }
            Some(_) => {
                tracing::debug!(%user_id, default_role = name, "default role is inactive");
                Ok(UserPermissions::empty(user_id))
            }
            None => {
                tracing::debug!(%user_id, default_role = name, "default role has no row; nominal role only");
                Ok(UserPermissions {
                    user_id,
                    roles: vec![Role::synthetic(name)],
                    permissions: Vec::new(),
                })
            }
        }
    }

    async fn permissions_for(&self, roles: &[Role]) -> AppResult<Vec<Permission>> {
        let role_ids: Vec<Uuid> = roles.iter().map(|r| r.id).collect();
        let permissions = self.store.permissions_for_roles(&role_ids).await?;

        let mut seen = HashSet::new();
        Ok(permissions.into_iter().filter(|p| seen.insert(p.id)).collect())
    }
}

fn fail_closed(user_id: Uuid, err: &crate::errors::AppError) -> UserPermissions {
    tracing::warn!(%user_id, error = %err, "permission resolution failed; denying");
    UserPermissions::empty(user_id)
}
