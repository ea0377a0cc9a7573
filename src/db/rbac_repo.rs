//! SQLite persistence for roles, permissions, assignments and grants.
//!
//! Uniqueness is enforced by the schema's unique indexes; violations surface
//! as `AppError::Conflict`. Join rows are removed explicitly before their
//! parent so cascades do not depend on the connection's foreign-key pragma.

use async_trait::async_trait;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use uuid::Uuid;

use crate::authz::catalog::{PermissionSeed, RoleSeed};
use crate::authz::PermissionStore;
use crate::db::row_parsers::{assignment_from_row, grant_from_row, permission_from_row, role_from_row};
use crate::errors::{AppError, AppResult};
use crate::models::rbac::{Action, Permission, Resource, Role, RoleAssignment, RolePermission, SeedReport};
use crate::utils::utc_now;

const ROLE_COLUMNS: &str = "r.id, r.name, r.description, r.is_active, r.created_at, r.updated_at";
const PERMISSION_COLUMNS: &str =
    "p.id, p.name, p.resource, p.action, p.description, p.created_at, p.updated_at";
const ASSIGNMENT_COLUMNS: &str = "id, user_id, role_id, assigned_at, assigned_by, is_active";

#[derive(Clone)]
pub struct RbacRepository {
    pool: SqlitePool,
}

impl RbacRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // =========================================================================
    // ROLES
    // =========================================================================

    pub async fn list_roles(&self) -> AppResult<Vec<Role>> {
        let sql = format!("SELECT {ROLE_COLUMNS} FROM roles r ORDER BY r.name");
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(role_from_row).collect()
    }

    pub async fn find_role(&self, role_id: Uuid) -> AppResult<Option<Role>> {
        let sql = format!("SELECT {ROLE_COLUMNS} FROM roles r WHERE r.id = ?");
        let row = sqlx::query(&sql)
            .bind(role_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(role_from_row).transpose()
    }

    pub async fn find_role_by_name(&self, name: &str) -> AppResult<Option<Role>> {
        let sql = format!("SELECT {ROLE_COLUMNS} FROM roles r WHERE r.name = ?");
        let row = sqlx::query(&sql).bind(name).fetch_optional(&self.pool).await?;
        row.as_ref().map(role_from_row).transpose()
    }

    pub async fn insert_role(&self, name: &str, description: Option<&str>) -> AppResult<Role> {
        let now = utc_now();
        let role = Role {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: description.map(str::to_string),
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            "INSERT INTO roles (id, name, description, is_active, created_at, updated_at) VALUES (?, ?, ?, 1, ?, ?)",
        )
        .bind(role.id.to_string())
        .bind(&role.name)
        .bind(&role.description)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::from_unique(e, format!("role '{}' already exists", name)))?;

        Ok(role)
    }

    pub async fn update_role(
        &self,
        role_id: Uuid,
        name: Option<&str>,
        description: Option<&str>,
        is_active: Option<bool>,
    ) -> AppResult<Option<Role>> {
        let result = sqlx::query(
            r#"
            UPDATE roles
            SET name = COALESCE(?, name),
                description = COALESCE(?, description),
                is_active = COALESCE(?, is_active),
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(name)
        .bind(description)
        .bind(is_active)
        .bind(utc_now())
        .bind(role_id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::from_unique(e, "role name already exists"))?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        self.find_role(role_id).await
    }

    /// Removes the role's grants, then its assignments, then the role itself,
    /// in one transaction. Returns false when the role did not exist.
    pub async fn delete_role_cascade(&self, role_id: Uuid) -> AppResult<bool> {
        let id = role_id.to_string();
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM role_permissions WHERE role_id = ?")
            .bind(&id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM user_roles WHERE role_id = ?")
            .bind(&id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("UPDATE users SET role_id = NULL WHERE role_id = ?")
            .bind(&id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM roles WHERE id = ?")
            .bind(&id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    // PERMISSIONS
    // =========================================================================

    pub async fn list_permissions(&self, resource: Option<Resource>) -> AppResult<Vec<Permission>> {
        let rows = match resource {
            Some(resource) => {
                let sql = format!(
                    "SELECT {PERMISSION_COLUMNS} FROM permissions p WHERE p.resource = ? ORDER BY p.name"
                );
                sqlx::query(&sql)
                    .bind(resource.as_str())
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                let sql = format!("SELECT {PERMISSION_COLUMNS} FROM permissions p ORDER BY p.name");
                sqlx::query(&sql).fetch_all(&self.pool).await?
            }
        };

        rows.iter().map(permission_from_row).collect()
    }

    pub async fn find_permission(&self, permission_id: Uuid) -> AppResult<Option<Permission>> {
        let sql = format!("SELECT {PERMISSION_COLUMNS} FROM permissions p WHERE p.id = ?");
        let row = sqlx::query(&sql)
            .bind(permission_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(permission_from_row).transpose()
    }

    pub async fn find_permission_by_pair(
        &self,
        resource: Resource,
        action: Action,
    ) -> AppResult<Option<Permission>> {
        let sql = format!(
            "SELECT {PERMISSION_COLUMNS} FROM permissions p WHERE p.resource = ? AND p.action = ?"
        );
        let row = sqlx::query(&sql)
            .bind(resource.as_str())
            .bind(action.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(permission_from_row).transpose()
    }

    pub async fn count_existing_permissions(&self, permission_ids: &[Uuid]) -> AppResult<usize> {
        if permission_ids.is_empty() {
            return Ok(0);
        }

        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT COUNT(DISTINCT id) FROM permissions WHERE id IN (");
        let mut separated = qb.separated(", ");
        for id in permission_ids {
            separated.push_bind(id.to_string());
        }
        separated.push_unseparated(")");

        let count = qb.build_query_scalar::<i64>().fetch_one(&self.pool).await?;
        Ok(count as usize)
    }

    pub async fn insert_permission(
        &self,
        name: &str,
        resource: Resource,
        action: Action,
        description: Option<&str>,
    ) -> AppResult<Permission> {
        let now = utc_now();
        let permission = Permission {
            id: Uuid::new_v4(),
            name: name.to_string(),
            resource,
            action,
            description: description.map(str::to_string),
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            "INSERT INTO permissions (id, name, resource, action, description, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(permission.id.to_string())
        .bind(&permission.name)
        .bind(resource.as_str())
        .bind(action.as_str())
        .bind(&permission.description)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::from_unique(
                e,
                format!("permission '{}' or {}:{} already exists", name, resource, action),
            )
        })?;

        Ok(permission)
    }

    pub async fn delete_permission_cascade(&self, permission_id: Uuid) -> AppResult<bool> {
        let id = permission_id.to_string();
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM role_permissions WHERE permission_id = ?")
            .bind(&id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM permissions WHERE id = ?")
            .bind(&id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    // ROLE-PERMISSION GRANTS
    // =========================================================================

    pub async fn role_permissions(&self, role_id: Uuid) -> AppResult<Vec<Permission>> {
        let sql = format!(
            r#"
            SELECT {PERMISSION_COLUMNS}
            FROM permissions p
            INNER JOIN role_permissions rp ON p.id = rp.permission_id
            WHERE rp.role_id = ?
            ORDER BY p.name
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(role_id.to_string())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(permission_from_row).collect()
    }

    pub async fn insert_grant(&self, role_id: Uuid, permission_id: Uuid) -> AppResult<RolePermission> {
        let grant = RolePermission {
            id: Uuid::new_v4(),
            role_id,
            permission_id,
            created_at: utc_now(),
        };

        sqlx::query(
            "INSERT INTO role_permissions (id, role_id, permission_id, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(grant.id.to_string())
        .bind(role_id.to_string())
        .bind(permission_id.to_string())
        .bind(grant.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::from_unique(e, "permission already granted to role"))?;

        Ok(grant)
    }

    /// Inserts every missing grant; existing pairs are skipped. Returns the
    /// number of rows inserted.
    pub async fn insert_grants_ignoring_duplicates(
        &self,
        role_id: Uuid,
        permission_ids: &[Uuid],
    ) -> AppResult<u64> {
        let now = utc_now();
        let role = role_id.to_string();
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;

        for permission_id in permission_ids {
            let result = sqlx::query(
                "INSERT OR IGNORE INTO role_permissions (id, role_id, permission_id, created_at) VALUES (?, ?, ?, ?)",
            )
            .bind(Uuid::new_v4().to_string())
            .bind(&role)
            .bind(permission_id.to_string())
            .bind(now)
            .execute(&mut *tx)
            .await?;
            inserted += result.rows_affected();
        }

        tx.commit().await?;
        Ok(inserted)
    }

    pub async fn delete_grant(&self, role_id: Uuid, permission_id: Uuid) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM role_permissions WHERE role_id = ? AND permission_id = ?")
            .bind(role_id.to_string())
            .bind(permission_id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn find_grant(&self, role_id: Uuid, permission_id: Uuid) -> AppResult<Option<RolePermission>> {
        let row = sqlx::query(
            "SELECT id, role_id, permission_id, created_at FROM role_permissions WHERE role_id = ? AND permission_id = ?",
        )
        .bind(role_id.to_string())
        .bind(permission_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(grant_from_row).transpose()
    }

    // =========================================================================
    // USER-ROLE ASSIGNMENTS
    // =========================================================================

    pub async fn user_assignments(&self, user_id: Uuid) -> AppResult<Vec<RoleAssignment>> {
        let sql = format!(
            "SELECT {ASSIGNMENT_COLUMNS} FROM user_roles WHERE user_id = ? ORDER BY assigned_at"
        );
        let rows = sqlx::query(&sql)
            .bind(user_id.to_string())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(assignment_from_row).collect()
    }

    pub async fn find_assignment(&self, user_id: Uuid, role_id: Uuid) -> AppResult<Option<RoleAssignment>> {
        let sql = format!("SELECT {ASSIGNMENT_COLUMNS} FROM user_roles WHERE user_id = ? AND role_id = ?");
        let row = sqlx::query(&sql)
            .bind(user_id.to_string())
            .bind(role_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(assignment_from_row).transpose()
    }

    pub async fn insert_assignment(
        &self,
        user_id: Uuid,
        role_id: Uuid,
        assigned_by: Option<Uuid>,
    ) -> AppResult<RoleAssignment> {
        let assignment = RoleAssignment {
            id: Uuid::new_v4(),
            user_id,
            role_id,
            assigned_at: utc_now(),
            assigned_by,
            is_active: true,
        };

        sqlx::query(
            "INSERT INTO user_roles (id, user_id, role_id, assigned_at, assigned_by, is_active) VALUES (?, ?, ?, ?, ?, 1)",
        )
        .bind(assignment.id.to_string())
        .bind(user_id.to_string())
        .bind(role_id.to_string())
        .bind(assignment.assigned_at)
        .bind(assigned_by.map(|id| id.to_string()))
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::from_unique(e, "role already assigned to user"))?;

        Ok(assignment)
    }

    /// Flips a soft-revoked assignment back on, recording who re-assigned it.
    pub async fn reactivate_assignment(
        &self,
        assignment_id: Uuid,
        assigned_by: Option<Uuid>,
    ) -> AppResult<()> {
        sqlx::query("UPDATE user_roles SET is_active = 1, assigned_at = ?, assigned_by = ? WHERE id = ?")
            .bind(utc_now())
            .bind(assigned_by.map(|id| id.to_string()))
            .bind(assignment_id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Soft-revokes an assignment. Returns true only if an active row changed.
    pub async fn deactivate_assignment(&self, user_id: Uuid, role_id: Uuid) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE user_roles SET is_active = 0 WHERE user_id = ? AND role_id = ? AND is_active = 1",
        )
        .bind(user_id.to_string())
        .bind(role_id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    // SEEDING
    // =========================================================================

    /// Creates missing catalog roles and permissions (matched by unique name)
    /// and every missing grant. Safe to run any number of times.
    pub async fn seed(&self, permissions: &[PermissionSeed], roles: &[RoleSeed]) -> AppResult<SeedReport> {
        let now = utc_now();
        let mut report = SeedReport::default();
        let mut tx = self.pool.begin().await?;

        for seed in permissions {
            let result = sqlx::query(
                "INSERT OR IGNORE INTO permissions (id, name, resource, action, description, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(Uuid::new_v4().to_string())
            .bind(&seed.name)
            .bind(seed.resource.as_str())
            .bind(seed.action.as_str())
            .bind(&seed.description)
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await?;
            report.permissions_created += result.rows_affected();
        }

        for seed in roles {
            let result = sqlx::query(
                "INSERT OR IGNORE INTO roles (id, name, description, is_active, created_at, updated_at) VALUES (?, ?, ?, 1, ?, ?)",
            )
            .bind(Uuid::new_v4().to_string())
            .bind(seed.name)
            .bind(seed.description)
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await?;
            report.roles_created += result.rows_affected();
        }

        for seed in roles {
            let role_id: String = sqlx::query_scalar("SELECT id FROM roles WHERE name = ?")
                .bind(seed.name)
                .fetch_one(&mut *tx)
                .await?;

            for (resource, action) in &seed.grants {
                let permission_id: Option<String> =
                    sqlx::query_scalar("SELECT id FROM permissions WHERE resource = ? AND action = ?")
                        .bind(resource.as_str())
                        .bind(action.as_str())
                        .fetch_optional(&mut *tx)
                        .await?;

                let Some(permission_id) = permission_id else {
                    tracing::warn!(role = seed.name, %resource, %action, "seed grant references a missing permission");
                    continue;
                };

                let result = sqlx::query(
                    "INSERT OR IGNORE INTO role_permissions (id, role_id, permission_id, created_at) VALUES (?, ?, ?, ?)",
                )
                .bind(Uuid::new_v4().to_string())
                .bind(&role_id)
                .bind(&permission_id)
                .bind(now)
                .execute(&mut *tx)
                .await?;
                report.grants_created += result.rows_affected();
            }
        }

        tx.commit().await?;
        Ok(report)
    }
}

#[async_trait]
impl PermissionStore for RbacRepository {
    async fn active_roles_for_user(&self, user_id: Uuid) -> AppResult<Vec<Role>> {
        let sql = format!(
            r#"
            SELECT {ROLE_COLUMNS}
            FROM roles r
            INNER JOIN user_roles ur ON r.id = ur.role_id
            WHERE ur.user_id = ? AND ur.is_active = 1 AND r.is_active = 1
            ORDER BY r.name
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(user_id.to_string())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(role_from_row).collect()
    }

    async fn default_role_name(&self, user_id: Uuid) -> AppResult<Option<String>> {
        let name: Option<String> =
            sqlx::query_scalar("SELECT default_role FROM users WHERE id = ? AND deleted_at IS NULL")
                .bind(user_id.to_string())
                .fetch_optional(&self.pool)
                .await?;
        Ok(name)
    }

    async fn role_by_name(&self, name: &str) -> AppResult<Option<Role>> {
        self.find_role_by_name(name).await
    }

    async fn permissions_for_roles(&self, role_ids: &[Uuid]) -> AppResult<Vec<Permission>> {
        if role_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            "SELECT DISTINCT {PERMISSION_COLUMNS} FROM permissions p INNER JOIN role_permissions rp ON p.id = rp.permission_id WHERE rp.role_id IN ("
        ));
        let mut separated = qb.separated(", ");
        for id in role_ids {
            separated.push_bind(id.to_string());
        }
        separated.push_unseparated(") ORDER BY p.resource, p.action");

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(permission_from_row).collect()
    }
}
