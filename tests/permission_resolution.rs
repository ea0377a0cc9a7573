use std::sync::Arc;

use anyhow::Result;
use sqlx::SqlitePool;
use uuid::Uuid;

use dojo_rbac::authz::{AccessControl, CallerContext};
use dojo_rbac::db::RbacRepository;
use dojo_rbac::models::rbac::{Action, Resource, Role, RoleUpdateRequest};
use dojo_rbac::services::RbacService;

mod common;

struct Fixture {
    service: RbacService,
    access: AccessControl,
}

fn fixture(pool: &SqlitePool) -> Fixture {
    let repo = RbacRepository::new(pool.clone());
    Fixture {
        service: RbacService::new(repo.clone(), common::event_bus()),
        access: AccessControl::with_store(Arc::new(repo)),
    }
}

impl Fixture {
    async fn role_with(&self, name: &str, grants: &[(Resource, Action)]) -> Result<Role> {
        let role = self.service.create_role(None, name, None).await?;
        for &(resource, action) in grants {
            let permission = match self
                .service
                .repository()
                .find_permission_by_pair(resource, action)
                .await?
            {
                Some(p) => p,
                None => {
                    let name = dojo_rbac::models::rbac::permission_name(resource, action);
                    self.service
                        .create_permission(None, &name, resource, action, None)
                        .await?
                }
            };
            self.service
                .assign_permission_to_role(None, role.id, permission.id)
                .await?;
        }
        Ok(role)
    }
}

#[tokio::test]
async fn manage_grant_covers_every_action_on_its_resource_only() -> Result<()> {
    let (_dir, pool) = common::test_pool().await?;
    let fx = fixture(&pool);
    let user = common::insert_user(&pool, "curator@example.com", "NOBODY").await?;

    let role = fx.role_with("CURATOR", &[(Resource::Gallery, Action::Manage)]).await?;
    fx.service.assign_role(None, user.id, role.id).await?;

    for action in Action::ALL {
        assert!(
            fx.access.has_permission(user.id, Resource::Gallery, action).await,
            "GALLERY:{action} should be covered by MANAGE"
        );
    }

    for resource in Resource::ALL.into_iter().filter(|r| *r != Resource::Gallery) {
        for action in Action::ALL {
            assert!(
                !fx.access.has_permission(user.id, resource, action).await,
                "{resource}:{action} leaked from GALLERY:MANAGE"
            );
        }
    }

    Ok(())
}

#[tokio::test]
async fn permissions_are_the_union_of_active_roles() -> Result<()> {
    let (_dir, pool) = common::test_pool().await?;
    let fx = fixture(&pool);
    let user = common::insert_user(&pool, "writer@example.com", "NOBODY").await?;

    let reader = fx.role_with("READER", &[(Resource::Course, Action::Read)]).await?;
    let writer = fx.role_with("WRITER", &[(Resource::Blog, Action::Create)]).await?;
    fx.service.assign_role(None, user.id, reader.id).await?;
    fx.service.assign_role(None, user.id, writer.id).await?;

    assert!(fx.access.has_permission(user.id, Resource::Course, Action::Read).await);
    assert!(fx.access.has_permission(user.id, Resource::Blog, Action::Create).await);
    assert!(!fx.access.has_permission(user.id, Resource::Course, Action::Create).await);
    assert!(!fx.access.has_permission(user.id, Resource::Blog, Action::Read).await);
    assert!(!fx.access.has_permission(user.id, Resource::Payment, Action::Verify).await);

    let resolved = fx.access.get_user_permissions(user.id).await;
    assert_eq!(resolved.roles.len(), 2);
    assert_eq!(resolved.permissions.len(), 2);

    Ok(())
}

#[tokio::test]
async fn shared_grant_is_listed_once() -> Result<()> {
    let (_dir, pool) = common::test_pool().await?;
    let fx = fixture(&pool);
    let user = common::insert_user(&pool, "both@example.com", "NOBODY").await?;

    let a = fx.role_with("A", &[(Resource::Event, Action::Read)]).await?;
    let b = fx.role_with("B", &[(Resource::Event, Action::Read)]).await?;
    fx.service.assign_role(None, user.id, a.id).await?;
    fx.service.assign_role(None, user.id, b.id).await?;

    let resolved = fx.access.get_user_permissions(user.id).await;
    assert_eq!(resolved.permissions.len(), 1);

    Ok(())
}

#[tokio::test]
async fn deactivating_a_role_removes_its_grants_on_next_resolution() -> Result<()> {
    let (_dir, pool) = common::test_pool().await?;
    let fx = fixture(&pool);
    let user = common::insert_user(&pool, "coach@example.com", "NOBODY").await?;

    let role = fx.role_with("COACH", &[(Resource::Schedule, Action::Update)]).await?;
    fx.service.assign_role(None, user.id, role.id).await?;
    assert!(fx.access.has_permission(user.id, Resource::Schedule, Action::Update).await);

    fx.service
        .update_role(
            None,
            role.id,
            RoleUpdateRequest {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await?;

    assert!(!fx.access.has_permission(user.id, Resource::Schedule, Action::Update).await);
    assert!(!fx.access.has_role(user.id, "COACH").await);

    Ok(())
}

#[tokio::test]
async fn revoked_grant_is_visible_on_the_very_next_check() -> Result<()> {
    let (_dir, pool) = common::test_pool().await?;
    let fx = fixture(&pool);
    let user = common::insert_user(&pool, "billing@example.com", "NOBODY").await?;

    let role = fx.role_with("BILLING", &[(Resource::Bill, Action::Verify)]).await?;
    fx.service.assign_role(None, user.id, role.id).await?;
    assert!(fx.access.has_permission(user.id, Resource::Bill, Action::Verify).await);

    let permission = fx
        .service
        .repository()
        .find_permission_by_pair(Resource::Bill, Action::Verify)
        .await?
        .expect("permission exists");
    assert!(
        fx.service
            .remove_permission_from_role(None, role.id, permission.id)
            .await?
    );

    assert!(!fx.access.has_permission(user.id, Resource::Bill, Action::Verify).await);

    Ok(())
}

#[tokio::test]
async fn store_failure_denies_instead_of_erroring() -> Result<()> {
    let (_dir, pool) = common::test_pool().await?;
    let fx = fixture(&pool);
    let user = common::insert_user(&pool, "root@example.com", "NOBODY").await?;

    let role = fx.role_with("ROOT", &[(Resource::User, Action::Manage)]).await?;
    fx.service.assign_role(None, user.id, role.id).await?;
    assert!(fx.access.has_permission(user.id, Resource::User, Action::Read).await);

    pool.close().await;

    assert!(!fx.access.has_permission(user.id, Resource::User, Action::Read).await);
    assert!(!fx.access.has_role(user.id, "ROOT").await);
    let resolved = fx.access.get_user_permissions_with_fallback(user.id).await;
    assert!(resolved.roles.is_empty());
    assert!(resolved.permissions.is_empty());

    Ok(())
}

#[tokio::test]
async fn default_role_acts_as_an_assignment() -> Result<()> {
    let (_dir, pool) = common::test_pool().await?;
    let fx = fixture(&pool);
    let user = common::insert_user(&pool, "sensei@example.com", "INSTRUCTOR").await?;

    fx.role_with("INSTRUCTOR", &[(Resource::Class, Action::Update)]).await?;

    assert!(fx.access.has_permission(user.id, Resource::Class, Action::Update).await);
    assert!(fx.access.has_role(user.id, "INSTRUCTOR").await);
    assert!(!fx.access.has_role(user.id, "instructor").await);

    // the plain variant never falls back
    assert!(fx.access.get_user_permissions(user.id).await.roles.is_empty());

    Ok(())
}

#[tokio::test]
async fn assignments_take_precedence_over_default_role() -> Result<()> {
    let (_dir, pool) = common::test_pool().await?;
    let fx = fixture(&pool);
    let user = common::insert_user(&pool, "mixed@example.com", "INSTRUCTOR").await?;

    fx.role_with("INSTRUCTOR", &[(Resource::Class, Action::Update)]).await?;
    let other = fx.role_with("LIBRARIAN", &[(Resource::Media, Action::Read)]).await?;
    fx.service.assign_role(None, user.id, other.id).await?;

    assert!(fx.access.has_permission(user.id, Resource::Media, Action::Read).await);
    assert!(!fx.access.has_permission(user.id, Resource::Class, Action::Update).await);

    Ok(())
}

#[tokio::test]
async fn unknown_default_role_is_nominal_only() -> Result<()> {
    let (_dir, pool) = common::test_pool().await?;
    let fx = fixture(&pool);
    let user = common::insert_user(&pool, "ghost@example.com", "GHOST").await?;

    assert!(fx.access.has_role(user.id, "GHOST").await);
    assert!(fx.access.has_any_role(user.id, &["ADMIN", "GHOST"]).await);
    for resource in Resource::ALL {
        for action in Action::ALL {
            assert!(!fx.access.has_permission(user.id, resource, action).await);
        }
    }

    let resolved = fx.access.get_user_permissions_with_fallback(user.id).await;
    assert_eq!(resolved.roles.len(), 1);
    assert!(resolved.roles[0].is_synthetic());

    Ok(())
}

#[tokio::test]
async fn inactive_default_role_grants_nothing() -> Result<()> {
    let (_dir, pool) = common::test_pool().await?;
    let fx = fixture(&pool);
    let user = common::insert_user(&pool, "lapsed@example.com", "ALUMNI").await?;

    let role = fx.role_with("ALUMNI", &[(Resource::Event, Action::Read)]).await?;
    fx.service
        .update_role(
            None,
            role.id,
            RoleUpdateRequest {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await?;

    assert!(!fx.access.has_permission(user.id, Resource::Event, Action::Read).await);
    assert!(!fx.access.has_role(user.id, "ALUMNI").await);

    Ok(())
}

#[tokio::test]
async fn unknown_user_resolves_to_nothing() -> Result<()> {
    let (_dir, pool) = common::test_pool().await?;
    let fx = fixture(&pool);
    let stranger = Uuid::new_v4();

    let resolved = fx.access.get_user_permissions_with_fallback(stranger).await;
    assert_eq!(resolved.user_id, stranger);
    assert!(resolved.roles.is_empty());
    assert!(
        !fx.access
            .can_access(&CallerContext::new(stranger), Resource::Course, Action::Read)
            .await
    );

    Ok(())
}

#[tokio::test]
async fn seeded_member_default_role_grants_catalog_permissions() -> Result<()> {
    let (_dir, pool) = common::test_pool().await?;
    let fx = fixture(&pool);
    fx.service.seed_defaults(None).await?;

    let user = common::insert_user(&pool, "student@example.com", "MEMBER").await?;
    let caller = CallerContext::new(user.id).with_email("student@example.com");

    assert!(fx.access.can_access(&caller, Resource::Course, Action::Read).await);
    assert!(fx.access.can_access(&caller, Resource::Enrollment, Action::Create).await);
    assert!(!fx.access.can_access(&caller, Resource::Enrollment, Action::Approve).await);
    assert!(!fx.access.can_access(&caller, Resource::Role, Action::Read).await);

    Ok(())
}

#[tokio::test]
async fn any_role_matches_assigned_roles_exactly() -> Result<()> {
    let (_dir, pool) = common::test_pool().await?;
    let fx = fixture(&pool);
    let user = common::insert_user(&pool, "dual@example.com", "NOBODY").await?;

    let role = fx.role_with("INSTRUCTOR", &[(Resource::Class, Action::Read)]).await?;
    fx.service.assign_role(None, user.id, role.id).await?;

    assert!(fx.access.has_any_role(user.id, &["ADMIN", "INSTRUCTOR"]).await);
    assert!(!fx.access.has_any_role(user.id, &["ADMIN", "instructor"]).await);
    assert!(!fx.access.has_any_role(user.id, &[]).await);
    // the default role no longer applies once an assignment exists
    assert!(!fx.access.has_any_role(user.id, &["NOBODY"]).await);

    Ok(())
}
