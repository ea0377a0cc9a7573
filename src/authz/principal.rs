use uuid::Uuid;

use crate::models::rbac::UserPermissions;

/// Request-scoped identity of the caller, as established by the token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerContext {
    pub user_id: Uuid,
    pub email: Option<String>,
}

impl CallerContext {
    pub fn new(user_id: Uuid) -> Self {
        Self { user_id, email: None }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}

/// Authenticated caller plus the permission set resolved for this request.
/// Inserted into request extensions by the route guard.
#[derive(Debug, Clone)]
pub struct Principal {
    pub caller: CallerContext,
    pub permissions: UserPermissions,
}

impl Principal {
    pub fn new(caller: CallerContext, permissions: UserPermissions) -> Self {
        Self { caller, permissions }
    }

    pub fn user_id(&self) -> Uuid {
        self.caller.user_id
    }
}
