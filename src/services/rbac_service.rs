//! Administrative mutations over roles, permissions, grants and assignments.
//!
//! Every mutation validates its input, checks that referenced rows exist and
//! publishes an audit event once the store accepted the change.

use serde_json::json;
use uuid::Uuid;

use crate::authz::{catalog, roles};
use crate::db::{users, RbacRepository};
use crate::errors::{AppError, AppResult};
use crate::events::{self, DomainEvent, EventBus};
use crate::models::rbac::{
    Action, Permission, Resource, Role, RoleAssignment, RolePermission, RoleUpdateRequest, SeedReport,
};
use crate::models::user::User;

const MAX_ROLE_NAME: usize = 64;
const MAX_PERMISSION_NAME: usize = 128;

#[derive(Clone)]
pub struct RbacService {
    repo: RbacRepository,
    event_bus: EventBus,
}

impl RbacService {
    pub fn new(repo: RbacRepository, event_bus: EventBus) -> Self {
        Self { repo, event_bus }
    }

    pub fn repository(&self) -> &RbacRepository {
        &self.repo
    }

    // =========================================================================
    // ROLES
    // =========================================================================

    pub async fn list_roles(&self) -> AppResult<Vec<Role>> {
        self.repo.list_roles().await
    }

    pub async fn get_role(&self, role_id: Uuid) -> AppResult<Role> {
        self.repo
            .find_role(role_id)
            .await?
            .ok_or_else(|| AppError::not_found("role not found"))
    }

    pub async fn create_role(
        &self,
        actor: Option<Uuid>,
        name: &str,
        description: Option<&str>,
    ) -> AppResult<Role> {
        let name = validate_role_name(name)?;
        let role = self.repo.insert_role(name, description).await?;

        tracing::info!(role_id = %role.id, role = %role.name, "role created");
        events::log_activity(&self.event_bus, "created", actor, &role);
        Ok(role)
    }

    /// Renames, re-describes or (de)activates a role. Deactivation removes the
    /// role's grants from every holder on their next resolution.
    pub async fn update_role(
        &self,
        actor: Option<Uuid>,
        role_id: Uuid,
        changes: RoleUpdateRequest,
    ) -> AppResult<Role> {
        let old = self.get_role(role_id).await?;

        let name = match changes.name.as_deref() {
            Some(name) => Some(validate_role_name(name)?),
            None => None,
        };
        if name.is_some_and(|n| n != old.name) && roles::is_protected(&old.name) {
            return Err(AppError::validation(format!("role '{}' cannot be renamed", old.name)));
        }

        let role = self
            .repo
            .update_role(role_id, name, changes.description.as_deref(), changes.is_active)
            .await?
            .ok_or_else(|| AppError::not_found("role not found"))?;

        tracing::info!(role_id = %role.id, role = %role.name, is_active = role.is_active, "role updated");
        events::log_change(&self.event_bus, "updated", actor, &role, Some(&old));
        Ok(role)
    }

    /// Removes the role together with its grants and assignments.
    pub async fn delete_role(&self, actor: Option<Uuid>, role_id: Uuid) -> AppResult<()> {
        let role = self.get_role(role_id).await?;
        if roles::is_protected(&role.name) {
            return Err(AppError::validation(format!("role '{}' is protected", role.name)));
        }

        if !self.repo.delete_role_cascade(role_id).await? {
            return Err(AppError::not_found("role not found"));
        }

        tracing::info!(role_id = %role.id, role = %role.name, "role deleted");
        events::log_activity(&self.event_bus, "deleted", actor, &role);
        Ok(())
    }

    // =========================================================================
    // PERMISSIONS
    // =========================================================================

    pub async fn list_permissions(&self, resource: Option<Resource>) -> AppResult<Vec<Permission>> {
        self.repo.list_permissions(resource).await
    }

    pub async fn create_permission(
        &self,
        actor: Option<Uuid>,
        name: &str,
        resource: Resource,
        action: Action,
        description: Option<&str>,
    ) -> AppResult<Permission> {
        let name = validate_permission_name(name)?;
        let permission = self
            .repo
            .insert_permission(name, resource, action, description)
            .await?;

        tracing::info!(permission = %permission.name, %resource, %action, "permission created");
        events::log_activity(&self.event_bus, "created", actor, &permission);
        Ok(permission)
    }

    pub async fn delete_permission(&self, actor: Option<Uuid>, permission_id: Uuid) -> AppResult<()> {
        let permission = self
            .repo
            .find_permission(permission_id)
            .await?
            .ok_or_else(|| AppError::not_found("permission not found"))?;

        self.repo.delete_permission_cascade(permission_id).await?;

        tracing::info!(permission = %permission.name, "permission deleted");
        events::log_activity(&self.event_bus, "deleted", actor, &permission);
        Ok(())
    }

    // =========================================================================
    // GRANTS
    // =========================================================================

    pub async fn role_permissions(&self, role_id: Uuid) -> AppResult<Vec<Permission>> {
        self.get_role(role_id).await?;
        self.repo.role_permissions(role_id).await
    }

    pub async fn assign_permission_to_role(
        &self,
        actor: Option<Uuid>,
        role_id: Uuid,
        permission_id: Uuid,
    ) -> AppResult<RolePermission> {
        self.get_role(role_id).await?;
        self.ensure_permission(permission_id).await?;

        let grant = self.repo.insert_grant(role_id, permission_id).await?;

        tracing::info!(%role_id, %permission_id, "permission granted to role");
        events::log_activity(&self.event_bus, "granted", actor, &grant);
        Ok(grant)
    }

    /// Hard-deletes the grant. Returns false when there was nothing to remove.
    pub async fn remove_permission_from_role(
        &self,
        actor: Option<Uuid>,
        role_id: Uuid,
        permission_id: Uuid,
    ) -> AppResult<bool> {
        let Some(grant) = self.repo.find_grant(role_id, permission_id).await? else {
            return Ok(false);
        };

        let removed = self.repo.delete_grant(role_id, permission_id).await?;
        if removed {
            tracing::info!(%role_id, %permission_id, "permission revoked from role");
            events::log_activity(&self.event_bus, "revoked", actor, &grant);
        }
        Ok(removed)
    }

    /// Grants every listed permission; pairs that already exist are skipped.
    /// Returns how many grants were created.
    pub async fn bulk_assign_permissions_to_role(
        &self,
        actor: Option<Uuid>,
        role_id: Uuid,
        permission_ids: &[Uuid],
    ) -> AppResult<u64> {
        self.get_role(role_id).await?;

        let mut unique = permission_ids.to_vec();
        unique.sort();
        unique.dedup();

        if self.repo.count_existing_permissions(&unique).await? != unique.len() {
            return Err(AppError::not_found("one or more permissions not found"));
        }

        let inserted = self.repo.insert_grants_ignoring_duplicates(role_id, &unique).await?;

        tracing::info!(%role_id, requested = unique.len(), inserted, "bulk permission grant");
        if inserted > 0 {
            self.publish(
                "role_permission.bulk_granted",
                actor,
                role_id,
                json!({ "permission_ids": unique, "inserted": inserted }),
            );
        }
        Ok(inserted)
    }

    /// Removes each listed grant that exists. Returns how many were removed.
    pub async fn bulk_remove_permissions_from_role(
        &self,
        actor: Option<Uuid>,
        role_id: Uuid,
        permission_ids: &[Uuid],
    ) -> AppResult<u64> {
        let mut removed = 0;
        for permission_id in permission_ids {
            if self.repo.delete_grant(role_id, *permission_id).await? {
                removed += 1;
            }
        }

        tracing::info!(%role_id, requested = permission_ids.len(), removed, "bulk permission revoke");
        if removed > 0 {
            self.publish(
                "role_permission.bulk_revoked",
                actor,
                role_id,
                json!({ "permission_ids": permission_ids, "removed": removed }),
            );
        }
        Ok(removed)
    }

    // =========================================================================
    // ASSIGNMENTS
    // =========================================================================

    pub async fn user_assignments(&self, user_id: Uuid) -> AppResult<Vec<RoleAssignment>> {
        self.ensure_user(user_id).await?;
        self.repo.user_assignments(user_id).await
    }

    /// Assigns a role to a user. A soft-revoked assignment for the same pair
    /// is switched back on; an active one is a conflict.
    pub async fn assign_role(
        &self,
        actor: Option<Uuid>,
        user_id: Uuid,
        role_id: Uuid,
    ) -> AppResult<RoleAssignment> {
        self.ensure_user(user_id).await?;
        self.get_role(role_id).await?;

        let assignment = match self.repo.find_assignment(user_id, role_id).await? {
            Some(existing) if existing.is_active => {
                return Err(AppError::conflict("role already assigned to user"));
            }
            Some(existing) => {
                self.repo.reactivate_assignment(existing.id, actor).await?;
                self.repo
                    .find_assignment(user_id, role_id)
                    .await?
                    .ok_or_else(|| AppError::not_found("assignment not found"))?
            }
            None => self.repo.insert_assignment(user_id, role_id, actor).await?,
        };

        tracing::info!(%user_id, %role_id, "role assigned to user");
        events::log_activity(&self.event_bus, "assigned", actor, &assignment);
        Ok(assignment)
    }

    /// Soft-revokes the assignment. Idempotent: returns false when no active
    /// assignment existed.
    pub async fn remove_role(&self, actor: Option<Uuid>, user_id: Uuid, role_id: Uuid) -> AppResult<bool> {
        let changed = self.repo.deactivate_assignment(user_id, role_id).await?;
        if !changed {
            return Ok(false);
        }

        tracing::info!(%user_id, %role_id, "role revoked from user");
        if let Some(assignment) = self.repo.find_assignment(user_id, role_id).await? {
            events::log_activity(&self.event_bus, "revoked", actor, &assignment);
        }
        Ok(true)
    }

    /// Changes the coarse role used when the user has no active assignment.
    pub async fn set_default_role(&self, actor: Option<Uuid>, user_id: Uuid, role_name: &str) -> AppResult<User> {
        let role_name = validate_role_name(role_name)?;
        let pool = self.repo.pool();

        let old: User = users::fetch_user_by_id(pool, user_id).await?.into();
        if !users::set_default_role(pool, user_id, role_name).await? {
            return Err(AppError::not_found("user not found"));
        }
        let user: User = users::fetch_user_by_id(pool, user_id).await?.into();

        tracing::info!(%user_id, default_role = role_name, "default role changed");
        events::log_change(&self.event_bus, "updated", actor, &user, Some(&old));
        Ok(user)
    }

    // =========================================================================
    // SEEDING
    // =========================================================================

    /// Installs the default catalog. Running it again changes nothing.
    pub async fn seed_defaults(&self, actor: Option<Uuid>) -> AppResult<SeedReport> {
        let permissions = catalog::default_permissions();
        let role_seeds = catalog::default_roles();

        let report = self.repo.seed(&permissions, &role_seeds).await?;

        tracing::info!(
            roles_created = report.roles_created,
            permissions_created = report.permissions_created,
            grants_created = report.grants_created,
            "default catalog seeded"
        );
        if report != SeedReport::default() {
            let event = DomainEvent::new("rbac.seeded", actor, None, json!(report));
            events::publish(&self.event_bus, &event);
        }
        Ok(report)
    }

    async fn ensure_permission(&self, permission_id: Uuid) -> AppResult<()> {
        match self.repo.find_permission(permission_id).await? {
            Some(_) => Ok(()),
            None => Err(AppError::not_found("permission not found")),
        }
    }

    async fn ensure_user(&self, user_id: Uuid) -> AppResult<()> {
        if users::user_exists(self.repo.pool(), user_id).await? {
            Ok(())
        } else {
            Err(AppError::not_found("user not found"))
        }
    }

    fn publish(&self, name: &str, actor: Option<Uuid>, subject: Uuid, payload: serde_json::Value) {
        let event = DomainEvent::new(
            name,
            actor,
            Some(subject),
            json!({ "new": payload, "severity": events::Severity::Critical }),
        );
        events::publish(&self.event_bus, &event);
    }
}

/// Trimmed, non-empty, at most 64 characters, no inner whitespace.
pub fn validate_role_name(name: &str) -> AppResult<&str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::validation("role name must not be empty"));
    }
    if name.chars().count() > MAX_ROLE_NAME {
        return Err(AppError::validation(format!(
            "role name must be at most {MAX_ROLE_NAME} characters"
        )));
    }
    if name.chars().any(char::is_whitespace) {
        return Err(AppError::validation("role name must not contain whitespace"));
    }
    Ok(name)
}

pub fn validate_permission_name(name: &str) -> AppResult<&str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::validation("permission name must not be empty"));
    }
    if name.chars().count() > MAX_PERMISSION_NAME {
        return Err(AppError::validation(format!(
            "permission name must be at most {MAX_PERMISSION_NAME} characters"
        )));
    }
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_names_are_trimmed_and_checked() {
        assert_eq!(validate_role_name("  INSTRUCTOR ").unwrap(), "INSTRUCTOR");
        assert!(matches!(validate_role_name("   "), Err(AppError::Validation(_))));
        assert!(matches!(validate_role_name("HEAD COACH"), Err(AppError::Validation(_))));
        assert!(validate_role_name(&"R".repeat(64)).is_ok());
        assert!(validate_role_name(&"R".repeat(65)).is_err());
    }

    #[test]
    fn permission_names_allow_spaces_but_not_blank() {
        assert_eq!(validate_permission_name("course:read").unwrap(), "course:read");
        assert!(validate_permission_name("approve enrollment").is_ok());
        assert!(validate_permission_name("").is_err());
        assert!(validate_permission_name(&"p".repeat(129)).is_err());
    }
}
