use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::rbac::{Action, Permission, Resource, Role, RoleAssignment, RolePermission};
use crate::models::user::DbUser;

pub(crate) fn parse_datetime(s: &str) -> Result<DateTime<Utc>, AppError> {
    let s = s.trim();

    // Try RFC3339 first (e.g. 2025-11-19T12:34:56Z)
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    // SQLite CURRENT_TIMESTAMP format: "YYYY-MM-DD HH:MM:SS" (with optional fractional seconds)
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return Ok(Utc.from_utc_datetime(&naive));
    }

    if let Ok(naive_date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        let ndt = naive_date
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| AppError::internal("invalid datetime: date out of range".to_string()))?;
        return Ok(Utc.from_utc_datetime(&ndt));
    }

    Err(AppError::internal(format!("invalid datetime: {}", s)))
}

pub(crate) fn parse_uuid(s: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(s.trim()).map_err(|e| AppError::internal(format!("invalid uuid: {}", e)))
}

fn parse_opt_uuid(s: Option<String>) -> Result<Option<Uuid>, AppError> {
    match s {
        Some(s) if !s.trim().is_empty() => Ok(Some(parse_uuid(&s)?)),
        _ => Ok(None),
    }
}

fn column<'r, T>(row: &'r SqliteRow, name: &str) -> Result<T, AppError>
where
    T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(name)
        .map_err(|e| AppError::internal(format!("missing {}: {}", name, e)))
}

pub fn role_from_row(row: &SqliteRow) -> Result<Role, AppError> {
    let id_s: String = column(row, "id")?;
    let created_at_s: String = column(row, "created_at")?;
    let updated_at_s: String = column(row, "updated_at")?;

    Ok(Role {
        id: parse_uuid(&id_s)?,
        name: column(row, "name")?,
        description: column(row, "description")?,
        is_active: column(row, "is_active")?,
        created_at: parse_datetime(&created_at_s)?,
        updated_at: parse_datetime(&updated_at_s)?,
    })
}

pub fn permission_from_row(row: &SqliteRow) -> Result<Permission, AppError> {
    let id_s: String = column(row, "id")?;
    let resource_s: String = column(row, "resource")?;
    let action_s: String = column(row, "action")?;
    let created_at_s: String = column(row, "created_at")?;
    let updated_at_s: String = column(row, "updated_at")?;

    let resource: Resource = resource_s.parse().map_err(AppError::internal)?;
    let action: Action = action_s.parse().map_err(AppError::internal)?;

    Ok(Permission {
        id: parse_uuid(&id_s)?,
        name: column(row, "name")?,
        resource,
        action,
        description: column(row, "description")?,
        created_at: parse_datetime(&created_at_s)?,
        updated_at: parse_datetime(&updated_at_s)?,
    })
}

pub fn assignment_from_row(row: &SqliteRow) -> Result<RoleAssignment, AppError> {
    let id_s: String = column(row, "id")?;
    let user_id_s: String = column(row, "user_id")?;
    let role_id_s: String = column(row, "role_id")?;
    let assigned_at_s: String = column(row, "assigned_at")?;
    let assigned_by_s: Option<String> = column(row, "assigned_by")?;

    Ok(RoleAssignment {
        id: parse_uuid(&id_s)?,
        user_id: parse_uuid(&user_id_s)?,
        role_id: parse_uuid(&role_id_s)?,
        assigned_at: parse_datetime(&assigned_at_s)?,
        assigned_by: parse_opt_uuid(assigned_by_s)?,
        is_active: column(row, "is_active")?,
    })
}

pub fn grant_from_row(row: &SqliteRow) -> Result<RolePermission, AppError> {
    let id_s: String = column(row, "id")?;
    let role_id_s: String = column(row, "role_id")?;
    let permission_id_s: String = column(row, "permission_id")?;
    let created_at_s: String = column(row, "created_at")?;

    Ok(RolePermission {
        id: parse_uuid(&id_s)?,
        role_id: parse_uuid(&role_id_s)?,
        permission_id: parse_uuid(&permission_id_s)?,
        created_at: parse_datetime(&created_at_s)?,
    })
}

pub fn db_user_from_row(row: &SqliteRow) -> Result<DbUser, AppError> {
    let id_s: String = column(row, "id")?;
    let role_id_s: Option<String> = column(row, "role_id")?;
    let created_at_s: String = column(row, "created_at")?;
    let updated_at_s: String = column(row, "updated_at")?;

    Ok(DbUser {
        id: parse_uuid(&id_s)?,
        name: column(row, "name")?,
        email: column(row, "email")?,
        password_hash: column(row, "password_hash")?,
        default_role: column(row, "default_role")?,
        role_id: parse_opt_uuid(role_id_s)?,
        created_at: parse_datetime(&created_at_s)?,
        updated_at: parse_datetime(&updated_at_s)?,
    })
}
