//! Authorization core
//!
//! - `PermissionStore`: read access to roles, grants and default roles
//! - `PermissionResolver`: user id -> effective roles and permissions (fail closed)
//! - `PolicyEvaluator` / `AccessControl`: decision predicates over the resolved set
//! - `RouteGuard`: axum middleware turning decisions into 401/403

mod access;
pub mod catalog;
mod evaluator;
mod guard;
mod principal;
mod resolver;
mod store;

pub use access::AccessControl;
pub use evaluator::{DefaultPolicyEvaluator, PolicyEvaluator};
pub use guard::{enforce, Requirement, RouteGuard};
pub use principal::{CallerContext, Principal};
pub use resolver::PermissionResolver;
pub use store::PermissionStore;

/// Well-known role names
pub mod roles {
    pub const SUPER_ADMIN: &str = "SUPER_ADMIN";
    pub const ADMIN: &str = "ADMIN";
    pub const INSTRUCTOR: &str = "INSTRUCTOR";
    pub const MEMBER: &str = "MEMBER";
    pub const USER: &str = "USER";

    /// Roles that `delete_role` refuses to remove.
    pub const PROTECTED: [&str; 3] = [SUPER_ADMIN, ADMIN, USER];

    pub fn is_protected(name: &str) -> bool {
        PROTECTED.contains(&name)
    }
}
