use crate::models::rbac::{Action, Resource, UserPermissions};

/// Decides whether an already-resolved permission set authorizes a capability.
pub trait PolicyEvaluator: Send + Sync {
    fn can(&self, resolved: &UserPermissions, resource: Resource, action: Action) -> bool;
}

/// Standard evaluation: a grant matches when its resource is the requested
/// one and its action is either the requested action or `MANAGE`.
///
/// `MANAGE` never crosses resources.
#[derive(Debug, Clone, Default)]
pub struct DefaultPolicyEvaluator;

impl DefaultPolicyEvaluator {
    pub fn new() -> Self {
        Self
    }
}

impl PolicyEvaluator for DefaultPolicyEvaluator {
    fn can(&self, resolved: &UserPermissions, resource: Resource, action: Action) -> bool {
        let matched = resolved
            .permissions
            .iter()
            .find(|p| p.resource == resource && p.action.covers(action));

        match matched {
            Some(permission) => {
                tracing::debug!(
                    user_id = %resolved.user_id,
                    %resource,
                    %action,
                    granted_by = %permission.name,
                    "permission match"
                );
                true
            }
            None => {
                tracing::debug!(
                    user_id = %resolved.user_id,
                    %resource,
                    %action,
                    "permission denied"
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::*;
    use crate::models::rbac::{permission_name, Permission};

    fn perm(resource: Resource, action: Action) -> Permission {
        Permission {
            id: Uuid::new_v4(),
            name: permission_name(resource, action),
            resource,
            action,
            description: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn resolved(grants: &[(Resource, Action)]) -> UserPermissions {
        UserPermissions {
            user_id: Uuid::new_v4(),
            roles: Vec::new(),
            permissions: grants.iter().map(|&(r, a)| perm(r, a)).collect(),
        }
    }

    #[test]
    fn test_manage_authorizes_every_action_on_its_resource() {
        let evaluator = DefaultPolicyEvaluator::new();
        for resource in Resource::ALL {
            let set = resolved(&[(resource, Action::Manage)]);
            for action in Action::ALL {
                assert!(evaluator.can(&set, resource, action), "{resource} {action}");
            }
        }
    }

    #[test]
    fn test_manage_does_not_leak_across_resources() {
        let evaluator = DefaultPolicyEvaluator::new();
        let set = resolved(&[(Resource::Gallery, Action::Manage)]);

        for resource in Resource::ALL.into_iter().filter(|r| *r != Resource::Gallery) {
            for action in Action::ALL {
                assert!(!evaluator.can(&set, resource, action));
            }
        }
    }

    #[test]
    fn test_exact_action_required_without_manage() {
        let evaluator = DefaultPolicyEvaluator::new();
        let set = resolved(&[(Resource::Course, Action::Read)]);

        assert!(evaluator.can(&set, Resource::Course, Action::Read));
        assert!(!evaluator.can(&set, Resource::Course, Action::Update));
        assert!(!evaluator.can(&set, Resource::Course, Action::Manage));
    }

    #[test]
    fn test_denial_when_no_permission() {
        let evaluator = DefaultPolicyEvaluator::new();
        let set = UserPermissions::empty(Uuid::new_v4());

        assert!(!evaluator.can(&set, Resource::User, Action::Read));
    }
}
