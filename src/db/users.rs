use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::row_parsers;
use crate::errors::{AppError, AppResult};
use crate::models::user::DbUser;
use crate::utils::utc_now;

const USER_COLUMNS: &str =
    "id, name, email, password_hash, default_role, role_id, created_at, updated_at";

pub const DEFAULT_ROLE: &str = "MEMBER";

pub async fn email_in_use(pool: &SqlitePool, email: &str) -> AppResult<bool> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM users WHERE email = ? AND deleted_at IS NULL")
        .bind(email)
        .fetch_one(pool)
        .await?;

    Ok(count > 0)
}

pub async fn insert_user(
    pool: &SqlitePool,
    name: &str,
    email: &str,
    password_hash: &str,
    default_role: &str,
) -> AppResult<DbUser> {
    let now = utc_now();
    let user_id = Uuid::new_v4();

    sqlx::query(
        "INSERT INTO users (id, name, email, password_hash, default_role, role_id, created_at, updated_at) VALUES (?, ?, ?, ?, ?, NULL, ?, ?)",
    )
    .bind(user_id.to_string())
    .bind(name)
    .bind(email)
    .bind(password_hash)
    .bind(default_role)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .map_err(|e| AppError::from_unique(e, "email already in use"))?;

    fetch_user_by_id(pool, user_id).await
}

pub async fn fetch_user_by_id(pool: &SqlitePool, user_id: Uuid) -> AppResult<DbUser> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ? AND deleted_at IS NULL");
    let row = sqlx::query(&sql)
        .bind(user_id.to_string())
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("user not found"))?;

    row_parsers::db_user_from_row(&row)
}

pub async fn fetch_user_by_email(pool: &SqlitePool, email: &str) -> AppResult<Option<DbUser>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = ? AND deleted_at IS NULL");
    let row = sqlx::query(&sql).bind(email).fetch_optional(pool).await?;

    row.as_ref().map(row_parsers::db_user_from_row).transpose()
}

pub async fn user_exists(pool: &SqlitePool, user_id: Uuid) -> AppResult<bool> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM users WHERE id = ? AND deleted_at IS NULL")
        .bind(user_id.to_string())
        .fetch_one(pool)
        .await?;

    Ok(count > 0)
}

pub async fn set_default_role(pool: &SqlitePool, user_id: Uuid, default_role: &str) -> AppResult<bool> {
    let result = sqlx::query("UPDATE users SET default_role = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL")
        .bind(default_role)
        .bind(utc_now())
        .bind(user_id.to_string())
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}
