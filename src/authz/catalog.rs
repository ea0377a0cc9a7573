//! Default roles, permissions and grants installed by `seed_defaults`.

use crate::models::rbac::{permission_name, Action, Resource};

use super::roles;

#[derive(Debug, Clone)]
pub struct PermissionSeed {
    pub name: String,
    pub resource: Resource,
    pub action: Action,
    pub description: String,
}

#[derive(Debug, Clone)]
pub struct RoleSeed {
    pub name: &'static str,
    pub description: &'static str,
    pub grants: Vec<(Resource, Action)>,
}

const CRUD_AND_MANAGE: [Action; 5] = [
    Action::Create,
    Action::Read,
    Action::Update,
    Action::Delete,
    Action::Manage,
];

/// Workflow verbs that only make sense on a few resources.
const WORKFLOW_PERMISSIONS: [(Resource, Action); 7] = [
    (Resource::Enrollment, Action::Approve),
    (Resource::ProgramRegistration, Action::Approve),
    (Resource::Certificate, Action::Approve),
    (Resource::Payment, Action::Verify),
    (Resource::MonthlyFee, Action::Verify),
    (Resource::Bill, Action::Verify),
    (Resource::PartnerBill, Action::Verify),
];

/// Resources an ADMIN may only read; structural auth data stays with SUPER_ADMIN.
const ADMIN_READ_ONLY: [Resource; 2] = [Resource::Role, Resource::Permission];
const ADMIN_EXCLUDED: [Resource; 2] = [Resource::Session, Resource::Provider];

pub fn default_permissions() -> Vec<PermissionSeed> {
    let mut seeds: Vec<PermissionSeed> = Resource::ALL
        .iter()
        .flat_map(|&resource| CRUD_AND_MANAGE.iter().map(move |&action| (resource, action)))
        .chain(WORKFLOW_PERMISSIONS.iter().copied())
        .map(|(resource, action)| PermissionSeed {
            name: permission_name(resource, action),
            resource,
            action,
            description: describe(resource, action),
        })
        .collect();

    seeds.sort_by(|a, b| a.name.cmp(&b.name));
    seeds
}

fn describe(resource: Resource, action: Action) -> String {
    let noun = resource.as_str().to_lowercase().replace('_', " ");
    match action {
        Action::Manage => format!("Full control over {noun}"),
        other => format!("{} {noun}", capitalize(&other.as_str().to_lowercase())),
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub fn default_roles() -> Vec<RoleSeed> {
    let super_admin = Resource::ALL.iter().map(|&r| (r, Action::Manage)).collect();

    let admin = Resource::ALL
        .iter()
        .filter(|r| !ADMIN_EXCLUDED.contains(*r))
        .map(|&r| {
            if ADMIN_READ_ONLY.contains(&r) {
                (r, Action::Read)
            } else {
                (r, Action::Manage)
            }
        })
        .collect();

    vec![
        RoleSeed {
            name: roles::SUPER_ADMIN,
            description: "Unrestricted access to every resource",
            grants: super_admin,
        },
        RoleSeed {
            name: roles::ADMIN,
            description: "Runs the dojo: members, classes, billing and content",
            grants: admin,
        },
        RoleSeed {
            name: roles::INSTRUCTOR,
            description: "Teaches classes and reviews enrollments",
            grants: vec![
                (Resource::Class, Action::Read),
                (Resource::Class, Action::Update),
                (Resource::Course, Action::Read),
                (Resource::Course, Action::Update),
                (Resource::Schedule, Action::Read),
                (Resource::Schedule, Action::Update),
                (Resource::Enrollment, Action::Read),
                (Resource::Enrollment, Action::Approve),
                (Resource::Member, Action::Read),
                (Resource::Certificate, Action::Create),
                (Resource::Certificate, Action::Read),
                (Resource::Announcement, Action::Create),
                (Resource::Announcement, Action::Read),
                (Resource::Event, Action::Read),
                (Resource::Gallery, Action::Read),
                (Resource::Equipment, Action::Read),
            ],
        },
        RoleSeed {
            name: roles::MEMBER,
            description: "Enrolled student of the dojo",
            grants: vec![
                (Resource::Course, Action::Read),
                (Resource::Class, Action::Read),
                (Resource::Schedule, Action::Read),
                (Resource::Program, Action::Read),
                (Resource::Event, Action::Read),
                (Resource::Announcement, Action::Read),
                (Resource::Gallery, Action::Read),
                (Resource::Blog, Action::Read),
                (Resource::Certificate, Action::Read),
                (Resource::Enrollment, Action::Create),
                (Resource::Enrollment, Action::Read),
                (Resource::ProgramRegistration, Action::Create),
                (Resource::ProgramRegistration, Action::Read),
                (Resource::MonthlyFee, Action::Read),
                (Resource::Bill, Action::Read),
                (Resource::Payment, Action::Create),
            ],
        },
        RoleSeed {
            name: roles::USER,
            description: "Registered visitor without membership",
            grants: vec![
                (Resource::Blog, Action::Read),
                (Resource::Gallery, Action::Read),
                (Resource::Event, Action::Read),
                (Resource::Program, Action::Read),
                (Resource::Course, Action::Read),
            ],
        },
    ]
}
