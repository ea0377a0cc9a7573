use std::sync::Arc;

use anyhow::Result;
use sqlx::SqlitePool;
use uuid::Uuid;

use dojo_rbac::authz::{catalog, AccessControl};
use dojo_rbac::db::RbacRepository;
use dojo_rbac::errors::AppError;
use dojo_rbac::events;
use dojo_rbac::models::rbac::{Action, Resource, RoleUpdateRequest, SeedReport};
use dojo_rbac::services::RbacService;

mod common;

fn service(pool: &SqlitePool) -> RbacService {
    RbacService::new(RbacRepository::new(pool.clone()), common::event_bus())
}

async fn count(pool: &SqlitePool, table: &str) -> Result<i64> {
    let sql = format!("SELECT COUNT(1) FROM {table}");
    Ok(sqlx::query_scalar(&sql).fetch_one(pool).await?)
}

#[tokio::test]
async fn seeding_twice_leaves_the_same_state() -> Result<()> {
    let (_dir, pool) = common::test_pool().await?;
    let rbac = service(&pool);

    let first = rbac.seed_defaults(None).await?;
    let expected_grants: usize = catalog::default_roles().iter().map(|r| r.grants.len()).sum();
    assert_eq!(first.roles_created as usize, catalog::default_roles().len());
    assert_eq!(first.permissions_created as usize, catalog::default_permissions().len());
    assert_eq!(first.grants_created as usize, expected_grants);

    let snapshot = (
        count(&pool, "roles").await?,
        count(&pool, "permissions").await?,
        count(&pool, "role_permissions").await?,
    );

    let second = rbac.seed_defaults(None).await?;
    assert_eq!(second, SeedReport::default());
    assert_eq!(
        snapshot,
        (
            count(&pool, "roles").await?,
            count(&pool, "permissions").await?,
            count(&pool, "role_permissions").await?,
        )
    );

    Ok(())
}

#[tokio::test]
async fn seeding_fills_in_around_existing_rows() -> Result<()> {
    let (_dir, pool) = common::test_pool().await?;
    let rbac = service(&pool);

    let member = rbac.create_role(None, "MEMBER", Some("custom")).await?;
    let report = rbac.seed_defaults(None).await?;
    assert_eq!(report.roles_created as usize, catalog::default_roles().len() - 1);

    let kept = rbac.get_role(member.id).await?;
    assert_eq!(kept.description.as_deref(), Some("custom"));
    assert!(!rbac.role_permissions(member.id).await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn remove_then_assign_restores_permissions() -> Result<()> {
    let (_dir, pool) = common::test_pool().await?;
    let rbac = service(&pool);
    let access = AccessControl::with_store(Arc::new(RbacRepository::new(pool.clone())));
    rbac.seed_defaults(None).await?;

    let user = common::insert_user(&pool, "sensei@example.com", "NOBODY").await?;
    let instructor = rbac
        .repository()
        .find_role_by_name("INSTRUCTOR")
        .await?
        .expect("seeded");

    rbac.assign_role(None, user.id, instructor.id).await?;
    let before = access.get_user_permissions(user.id).await;
    assert!(!before.permissions.is_empty());

    assert!(rbac.remove_role(None, user.id, instructor.id).await?);
    assert!(access.get_user_permissions(user.id).await.permissions.is_empty());
    // second removal is a no-op, not an error
    assert!(!rbac.remove_role(None, user.id, instructor.id).await?);

    let reassigned = rbac.assign_role(None, user.id, instructor.id).await?;
    assert!(reassigned.is_active);
    assert_eq!(access.get_user_permissions(user.id).await, before);

    // the soft-revoked row was reused
    assert_eq!(rbac.user_assignments(user.id).await?.len(), 1);

    Ok(())
}

#[tokio::test]
async fn assigning_an_active_role_twice_conflicts() -> Result<()> {
    let (_dir, pool) = common::test_pool().await?;
    let rbac = service(&pool);
    let user = common::insert_user(&pool, "twice@example.com", "MEMBER").await?;
    let role = rbac.create_role(None, "VOLUNTEER", None).await?;

    rbac.assign_role(None, user.id, role.id).await?;
    let err = rbac.assign_role(None, user.id, role.id).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)), "got {err:?}");

    Ok(())
}

#[tokio::test]
async fn assignment_targets_must_exist() -> Result<()> {
    let (_dir, pool) = common::test_pool().await?;
    let rbac = service(&pool);
    let user = common::insert_user(&pool, "lonely@example.com", "MEMBER").await?;
    let role = rbac.create_role(None, "VOLUNTEER", None).await?;

    let err = rbac.assign_role(None, user.id, Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    let err = rbac.assign_role(None, Uuid::new_v4(), role.id).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    let err = rbac
        .assign_permission_to_role(None, role.id, Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    Ok(())
}

#[tokio::test]
async fn duplicate_names_and_pairs_conflict() -> Result<()> {
    let (_dir, pool) = common::test_pool().await?;
    let rbac = service(&pool);

    rbac.create_role(None, "INSTRUCTOR", None).await?;
    let err = rbac.create_role(None, " INSTRUCTOR ", None).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    rbac.create_permission(None, "course:read", Resource::Course, Action::Read, None)
        .await?;

    let same_pair = rbac
        .create_permission(None, "course:view", Resource::Course, Action::Read, None)
        .await
        .unwrap_err();
    assert!(matches!(same_pair, AppError::Conflict(_)));

    let same_name = rbac
        .create_permission(None, "course:read", Resource::Course, Action::Update, None)
        .await
        .unwrap_err();
    assert!(matches!(same_name, AppError::Conflict(_)));

    Ok(())
}

#[tokio::test]
async fn malformed_names_are_rejected() -> Result<()> {
    let (_dir, pool) = common::test_pool().await?;
    let rbac = service(&pool);

    for bad in ["", "   ", "HEAD COACH"] {
        let err = rbac.create_role(None, bad, None).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)), "{bad:?} gave {err:?}");
    }

    let err = rbac
        .create_permission(None, " ", Resource::Blog, Action::Read, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
    assert_eq!(count(&pool, "roles").await?, 0);

    Ok(())
}

#[tokio::test]
async fn duplicate_single_grant_conflicts_but_bulk_skips() -> Result<()> {
    let (_dir, pool) = common::test_pool().await?;
    let rbac = service(&pool);
    let role = rbac.create_role(None, "EDITOR", None).await?;

    let blog_create = rbac
        .create_permission(None, "blog:create", Resource::Blog, Action::Create, None)
        .await?;
    let blog_update = rbac
        .create_permission(None, "blog:update", Resource::Blog, Action::Update, None)
        .await?;
    let media_create = rbac
        .create_permission(None, "media:create", Resource::Media, Action::Create, None)
        .await?;

    rbac.assign_permission_to_role(None, role.id, blog_create.id).await?;
    let err = rbac
        .assign_permission_to_role(None, role.id, blog_create.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    let inserted = rbac
        .bulk_assign_permissions_to_role(
            None,
            role.id,
            &[blog_create.id, blog_update.id, media_create.id, media_create.id],
        )
        .await?;
    assert_eq!(inserted, 2);
    assert_eq!(rbac.role_permissions(role.id).await?.len(), 3);

    let err = rbac
        .bulk_assign_permissions_to_role(None, role.id, &[blog_update.id, Uuid::new_v4()])
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    let removed = rbac
        .bulk_remove_permissions_from_role(None, role.id, &[blog_update.id, media_create.id, Uuid::new_v4()])
        .await?;
    assert_eq!(removed, 2);

    let remaining = rbac.role_permissions(role.id).await?;
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, blog_create.id);

    assert!(rbac.remove_permission_from_role(None, role.id, blog_create.id).await?);
    assert!(!rbac.remove_permission_from_role(None, role.id, blog_create.id).await?);

    Ok(())
}

#[tokio::test]
async fn deleting_a_role_leaves_no_join_rows() -> Result<()> {
    let (_dir, pool) = common::test_pool().await?;
    let rbac = service(&pool);
    let user = common::insert_user(&pool, "temp@example.com", "MEMBER").await?;

    let role = rbac.create_role(None, "TEMP", None).await?;
    let permission = rbac
        .create_permission(None, "gallery:read", Resource::Gallery, Action::Read, None)
        .await?;
    rbac.assign_permission_to_role(None, role.id, permission.id).await?;
    rbac.assign_role(None, user.id, role.id).await?;

    rbac.delete_role(None, role.id).await?;

    let grants: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM role_permissions WHERE role_id = ?")
        .bind(role.id.to_string())
        .fetch_one(&pool)
        .await?;
    let assignments: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM user_roles WHERE role_id = ?")
        .bind(role.id.to_string())
        .fetch_one(&pool)
        .await?;
    assert_eq!(grants, 0);
    assert_eq!(assignments, 0);

    // the permission itself survives
    assert!(rbac.repository().find_permission(permission.id).await?.is_some());
    assert!(matches!(rbac.get_role(role.id).await.unwrap_err(), AppError::NotFound(_)));
    assert!(matches!(
        rbac.delete_role(None, role.id).await.unwrap_err(),
        AppError::NotFound(_)
    ));

    Ok(())
}

#[tokio::test]
async fn user_role_id_must_reference_a_role_and_clears_on_delete() -> Result<()> {
    let (_dir, pool) = common::test_pool().await?;
    let rbac = service(&pool);
    let user = common::insert_user(&pool, "linked@example.com", "MEMBER").await?;

    let dangling = sqlx::query("UPDATE users SET role_id = ? WHERE id = ?")
        .bind(Uuid::new_v4().to_string())
        .bind(user.id.to_string())
        .execute(&pool)
        .await;
    assert!(dangling.is_err(), "role_id accepted an id with no role row");

    let role = rbac.create_role(None, "LINKED", None).await?;
    sqlx::query("UPDATE users SET role_id = ? WHERE id = ?")
        .bind(role.id.to_string())
        .bind(user.id.to_string())
        .execute(&pool)
        .await?;

    rbac.delete_role(None, role.id).await?;

    let role_id: Option<String> = sqlx::query_scalar("SELECT role_id FROM users WHERE id = ?")
        .bind(user.id.to_string())
        .fetch_one(&pool)
        .await?;
    assert_eq!(role_id, None);

    Ok(())
}

#[tokio::test]
async fn deleting_a_permission_drops_its_grants() -> Result<()> {
    let (_dir, pool) = common::test_pool().await?;
    let rbac = service(&pool);
    let role = rbac.create_role(None, "TEMP", None).await?;
    let permission = rbac
        .create_permission(None, "event:read", Resource::Event, Action::Read, None)
        .await?;
    rbac.assign_permission_to_role(None, role.id, permission.id).await?;

    rbac.delete_permission(None, permission.id).await?;

    assert!(rbac.role_permissions(role.id).await?.is_empty());
    assert_eq!(count(&pool, "permissions").await?, 0);

    Ok(())
}

#[tokio::test]
async fn protected_roles_cannot_be_deleted_or_renamed() -> Result<()> {
    let (_dir, pool) = common::test_pool().await?;
    let rbac = service(&pool);
    rbac.seed_defaults(None).await?;

    for name in ["SUPER_ADMIN", "ADMIN", "USER"] {
        let role = rbac.repository().find_role_by_name(name).await?.expect("seeded");

        let err = rbac.delete_role(None, role.id).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)), "{name}: {err:?}");

        let err = rbac
            .update_role(
                None,
                role.id,
                RoleUpdateRequest {
                    name: Some(format!("{name}_OLD")),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    let member = rbac.repository().find_role_by_name("MEMBER").await?.expect("seeded");
    rbac.delete_role(None, member.id).await?;

    Ok(())
}

#[tokio::test]
async fn set_default_role_changes_fallback() -> Result<()> {
    let (_dir, pool) = common::test_pool().await?;
    let rbac = service(&pool);
    let access = AccessControl::with_store(Arc::new(RbacRepository::new(pool.clone())));
    rbac.seed_defaults(None).await?;

    let user = common::insert_user(&pool, "promote@example.com", "USER").await?;
    assert!(!access.has_permission(user.id, Resource::Enrollment, Action::Create).await);

    let updated = rbac.set_default_role(None, user.id, "MEMBER").await?;
    assert_eq!(updated.default_role, "MEMBER");
    assert!(access.has_permission(user.id, Resource::Enrollment, Action::Create).await);

    let err = rbac.set_default_role(None, Uuid::new_v4(), "MEMBER").await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    Ok(())
}

#[tokio::test]
async fn mutations_are_written_to_a_verifiable_audit_chain() -> Result<()> {
    let (_dir, pool) = common::test_pool().await?;
    let (bus, mut rx) = events::init_event_bus();
    let rbac = RbacService::new(RbacRepository::new(pool.clone()), bus);
    let actor = Uuid::new_v4();

    let role = rbac.create_role(Some(actor), "AUDITED", None).await?;
    let permission = rbac
        .create_permission(Some(actor), "report:read", Resource::Report, Action::Read, None)
        .await?;
    rbac.assign_permission_to_role(Some(actor), role.id, permission.id).await?;
    rbac.delete_role(Some(actor), role.id).await?;

    let mut names = Vec::new();
    while let Ok(event) = rx.try_recv() {
        names.push(event["name"].as_str().unwrap_or_default().to_string());
        events::record_event(&pool, &event).await?;
    }
    assert_eq!(
        names,
        ["role.created", "permission.created", "role_permission.granted", "role.deleted"]
    );

    assert_eq!(events::verify_chain(&pool).await?, None);

    let severity: String = sqlx::query_scalar("SELECT severity FROM audit_log WHERE seq = 4")
        .fetch_one(&pool)
        .await?;
    assert_eq!(severity, "critical");

    sqlx::query("UPDATE audit_log SET payload = '{}' WHERE seq = 2")
        .execute(&pool)
        .await?;
    assert_eq!(events::verify_chain(&pool).await?, Some(2));

    Ok(())
}
