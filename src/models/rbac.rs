use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::events::{Loggable, Severity};

// =============================================================================
// RESOURCE / ACTION VOCABULARY
// =============================================================================

/// Domain nouns protected by the permission model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Resource {
    User,
    Account,
    Session,
    Provider,
    Role,
    Permission,
    Course,
    Blog,
    Media,
    Class,
    Equipment,
    Member,
    Bill,
    Payment,
    Gallery,
    Event,
    Announcement,
    Certificate,
    Report,
    Enrollment,
    MonthlyFee,
    Schedule,
    Program,
    ProgramRegistration,
    Partner,
    PartnerBill,
}

impl Resource {
    pub const ALL: [Resource; 26] = [
        Resource::User,
        Resource::Account,
        Resource::Session,
        Resource::Provider,
        Resource::Role,
        Resource::Permission,
        Resource::Course,
        Resource::Blog,
        Resource::Media,
        Resource::Class,
        Resource::Equipment,
        Resource::Member,
        Resource::Bill,
        Resource::Payment,
        Resource::Gallery,
        Resource::Event,
        Resource::Announcement,
        Resource::Certificate,
        Resource::Report,
        Resource::Enrollment,
        Resource::MonthlyFee,
        Resource::Schedule,
        Resource::Program,
        Resource::ProgramRegistration,
        Resource::Partner,
        Resource::PartnerBill,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Resource::User => "USER",
            Resource::Account => "ACCOUNT",
            Resource::Session => "SESSION",
            Resource::Provider => "PROVIDER",
            Resource::Role => "ROLE",
            Resource::Permission => "PERMISSION",
            Resource::Course => "COURSE",
            Resource::Blog => "BLOG",
            Resource::Media => "MEDIA",
            Resource::Class => "CLASS",
            Resource::Equipment => "EQUIPMENT",
            Resource::Member => "MEMBER",
            Resource::Bill => "BILL",
            Resource::Payment => "PAYMENT",
            Resource::Gallery => "GALLERY",
            Resource::Event => "EVENT",
            Resource::Announcement => "ANNOUNCEMENT",
            Resource::Certificate => "CERTIFICATE",
            Resource::Report => "REPORT",
            Resource::Enrollment => "ENROLLMENT",
            Resource::MonthlyFee => "MONTHLY_FEE",
            Resource::Schedule => "SCHEDULE",
            Resource::Program => "PROGRAM",
            Resource::ProgramRegistration => "PROGRAM_REGISTRATION",
            Resource::Partner => "PARTNER",
            Resource::PartnerBill => "PARTNER_BILL",
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Resource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Resource::ALL
            .iter()
            .copied()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| format!("unknown resource: {s}"))
    }
}

/// Operation verbs. `Manage` is the per-resource wildcard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    Create,
    Read,
    Update,
    Delete,
    Manage,
    Approve,
    Verify,
}

impl Action {
    pub const ALL: [Action; 7] = [
        Action::Create,
        Action::Read,
        Action::Update,
        Action::Delete,
        Action::Manage,
        Action::Approve,
        Action::Verify,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "CREATE",
            Action::Read => "READ",
            Action::Update => "UPDATE",
            Action::Delete => "DELETE",
            Action::Manage => "MANAGE",
            Action::Approve => "APPROVE",
            Action::Verify => "VERIFY",
        }
    }

    /// True when a grant of `self` authorizes `requested`.
    pub fn covers(self, requested: Action) -> bool {
        self == requested || self == Action::Manage
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::ALL
            .iter()
            .copied()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| format!("unknown action: {s}"))
    }
}

/// Conventional permission name for a (resource, action) pair, e.g. `course:read`.
pub fn permission_name(resource: Resource, action: Action) -> String {
    format!(
        "{}:{}",
        resource.as_str().to_lowercase(),
        action.as_str().to_lowercase()
    )
}

// =============================================================================
// ROLE
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Role {
    pub id: Uuid,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Role {
    /// Placeholder for a `default_role` name that has no row in `roles` yet.
    /// Carries the name only; the nil id marks it as not wired into grants.
    pub fn synthetic(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::nil(),
            name: name.into(),
            description: None,
            is_active: true,
            created_at: DateTime::<Utc>::default(),
            updated_at: DateTime::<Utc>::default(),
        }
    }

    pub fn is_synthetic(&self) -> bool {
        self.id.is_nil()
    }
}

impl Loggable for Role {
    fn entity_type() -> &'static str { "role" }
    fn subject_id(&self) -> Uuid { self.id }
    fn severity(&self) -> Severity { Severity::Critical }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RoleCreateRequest {
    #[schema(example = "INSTRUCTOR")]
    pub name: String,
    #[schema(example = "Teaches classes and manages attendance")]
    pub description: Option<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct RoleUpdateRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub is_active: Option<bool>,
}

// =============================================================================
// PERMISSION
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Permission {
    pub id: Uuid,
    pub name: String,
    pub resource: Resource,
    pub action: Action,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Loggable for Permission {
    fn entity_type() -> &'static str { "permission" }
    fn subject_id(&self) -> Uuid { self.id }
    fn severity(&self) -> Severity { Severity::Critical }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct PermissionCreateRequest {
    #[schema(example = "enrollment:approve")]
    pub name: String,
    pub resource: Resource,
    pub action: Action,
    #[schema(example = "Approve pending course enrollments")]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct PermissionListQuery {
    pub resource: Option<Resource>,
}

// =============================================================================
// USER-ROLE ASSIGNMENT
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RoleAssignment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub role_id: Uuid,
    pub assigned_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_by: Option<Uuid>,
    pub is_active: bool,
}

impl Loggable for RoleAssignment {
    fn entity_type() -> &'static str { "user_role" }
    fn subject_id(&self) -> Uuid { self.user_id }
    fn severity(&self) -> Severity { Severity::Critical }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AssignRoleRequest {
    pub role_id: Uuid,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct DefaultRoleRequest {
    #[schema(example = "MEMBER")]
    pub default_role: String,
}

// =============================================================================
// ROLE-PERMISSION GRANT
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RolePermission {
    pub id: Uuid,
    pub role_id: Uuid,
    pub permission_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl Loggable for RolePermission {
    fn entity_type() -> &'static str { "role_permission" }
    fn subject_id(&self) -> Uuid { self.role_id }
    fn severity(&self) -> Severity { Severity::Critical }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AssignPermissionToRoleRequest {
    pub permission_id: Uuid,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct BulkPermissionsRequest {
    pub permission_ids: Vec<Uuid>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BulkResult {
    /// Rows actually inserted or removed
    pub affected: u64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RemovalResult {
    /// False when there was nothing to remove
    pub removed: bool,
}

// =============================================================================
// EFFECTIVE PERMISSIONS (computed)
// =============================================================================

/// Resolved capability set for one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct UserPermissions {
    pub user_id: Uuid,
    pub roles: Vec<Role>,
    pub permissions: Vec<Permission>,
}

impl UserPermissions {
    pub fn empty(user_id: Uuid) -> Self {
        Self {
            user_id,
            roles: Vec::new(),
            permissions: Vec::new(),
        }
    }

    pub fn role_names(&self) -> impl Iterator<Item = &str> {
        self.roles.iter().map(|r| r.name.as_str())
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AccessCheckQuery {
    pub resource: Resource,
    pub action: Action,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AccessCheckResponse {
    pub resource: Resource,
    pub action: Action,
    pub allowed: bool,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct SeedReport {
    pub roles_created: u64,
    pub permissions_created: u64,
    pub grants_created: u64,
}
