use std::sync::Arc;

use uuid::Uuid;

use crate::models::rbac::{Action, Resource, UserPermissions};

use super::{CallerContext, DefaultPolicyEvaluator, PermissionResolver, PermissionStore, PolicyEvaluator};

/// Decision functions over a fresh resolution. All of them fail closed.
#[derive(Clone)]
pub struct AccessControl {
    resolver: PermissionResolver,
    evaluator: Arc<dyn PolicyEvaluator>,
}

impl AccessControl {
    pub fn new(resolver: PermissionResolver, evaluator: Arc<dyn PolicyEvaluator>) -> Self {
        Self { resolver, evaluator }
    }

    pub fn with_store(store: Arc<dyn PermissionStore>) -> Self {
        Self::new(
            PermissionResolver::new(store),
            Arc::new(DefaultPolicyEvaluator::new()),
        )
    }

    pub fn resolver(&self) -> &PermissionResolver {
        &self.resolver
    }

    pub fn evaluator(&self) -> &dyn PolicyEvaluator {
        self.evaluator.as_ref()
    }

    pub async fn get_user_permissions(&self, user_id: Uuid) -> UserPermissions {
        self.resolver.get_user_permissions(user_id).await
    }

    pub async fn get_user_permissions_with_fallback(&self, user_id: Uuid) -> UserPermissions {
        self.resolver.get_user_permissions_with_fallback(user_id).await
    }

    pub async fn has_permission(&self, user_id: Uuid, resource: Resource, action: Action) -> bool {
        let resolved = self.resolver.get_user_permissions_with_fallback(user_id).await;
        self.evaluator.can(&resolved, resource, action)
    }

    /// Case-sensitive match against the resolved role names, including a
    /// nominal default role that has no row yet.
    pub async fn has_role(&self, user_id: Uuid, role_name: &str) -> bool {
        let resolved = self.resolver.get_user_permissions_with_fallback(user_id).await;
        let found = resolved.role_names().any(|name| name == role_name);
        tracing::debug!(%user_id, role = role_name, found, "role check");
        found
    }

    pub async fn has_any_role(&self, user_id: Uuid, role_names: &[&str]) -> bool {
        let resolved = self.resolver.get_user_permissions_with_fallback(user_id).await;
        let found = resolved.role_names().any(|name| role_names.contains(&name));
        found
    }

    pub async fn can_access(&self, caller: &CallerContext, resource: Resource, action: Action) -> bool {
        self.has_permission(caller.user_id, resource, action).await
    }
}
