use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use sqlx::{Row, SqlitePool};
use tokio::sync::broadcast;
use uuid::Uuid;

use dojo_rbac::authz::AccessControl;
use dojo_rbac::db::{self, users, RbacRepository};
use dojo_rbac::events;
use dojo_rbac::models::rbac::{Action, Resource};
use dojo_rbac::models::user::DbUser;
use dojo_rbac::services::RbacService;

#[derive(Parser, Debug)]
#[command(author, version, about = "dojo RBAC administration tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a new empty migration with the provided name
    MakeMigration { name: String },
    /// Apply pending migrations
    Migrate,
    /// Show migration status against the current database
    MigrateStatus,
    /// Install the default roles, permissions and grants (idempotent)
    Seed,
    /// Assign a role to the user with this email
    AssignRole { email: String, role: String },
    /// Soft-revoke a role from the user with this email
    RevokeRole { email: String, role: String },
    /// Print the user's effective roles and permissions
    Permissions { email: String },
    /// Check a single capability, e.g. `check ada@example.com COURSE READ`
    Check {
        email: String,
        resource: Resource,
        action: Action,
    },
    /// Recompute the audit log hash chain
    AuditVerify,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if dotenvy::dotenv().is_err() {
        let crate_env = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(crate_env);
    }

    let cli = Cli::parse();

    match cli.command {
        Commands::MakeMigration { name } => {
            let path = make_migration_file(&name)?;
            println!("Created migration: {}", path.display());
        }
        Commands::Migrate => {
            connect().await?;
            println!("Migrations applied");
        }
        Commands::MigrateStatus => print_status(&connect().await?.pool).await?,
        Commands::Seed => {
            let admin = connect().await?;
            let report = admin.service.seed_defaults(None).await?;
            println!(
                "roles created: {}, permissions created: {}, grants created: {}",
                report.roles_created, report.permissions_created, report.grants_created
            );
            admin.flush_audit().await?;
        }
        Commands::AssignRole { email, role } => {
            let admin = connect().await?;
            let (user_id, role_id) = admin.lookup_user_and_role(&email, &role).await?;
            admin.service.assign_role(None, user_id, role_id).await?;
            println!("{role} assigned to {email}");
            admin.flush_audit().await?;
        }
        Commands::RevokeRole { email, role } => {
            let admin = connect().await?;
            let (user_id, role_id) = admin.lookup_user_and_role(&email, &role).await?;
            if admin.service.remove_role(None, user_id, role_id).await? {
                println!("{role} revoked from {email}");
            } else {
                println!("{email} had no active {role} assignment");
            }
            admin.flush_audit().await?;
        }
        Commands::Permissions { email } => {
            let admin = connect().await?;
            let user = admin.find_user(&email).await?;
            let resolved = admin.access.get_user_permissions_with_fallback(user.id).await;
            let role_names: Vec<&str> = resolved.role_names().collect();
            println!("roles: {}", role_names.join(", "));
            for permission in &resolved.permissions {
                println!("  {}", permission.name);
            }
        }
        Commands::Check { email, resource, action } => {
            let admin = connect().await?;
            let user = admin.find_user(&email).await?;
            let allowed = admin.access.has_permission(user.id, resource, action).await;
            println!("{email} {resource}:{action} -> {}", if allowed { "allowed" } else { "denied" });
        }
        Commands::AuditVerify => match events::verify_chain(&connect().await?.pool).await? {
            None => println!("audit chain intact"),
            Some(seq) => anyhow::bail!("audit chain broken at seq {seq}"),
        },
    }

    Ok(())
}

struct Admin {
    pool: SqlitePool,
    repo: RbacRepository,
    service: RbacService,
    access: AccessControl,
    audit_rx: broadcast::Receiver<serde_json::Value>,
}

/// Opens the database (running pending migrations) and wires the service.
async fn connect() -> anyhow::Result<Admin> {
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL not set")?;
    let pool = db::init(&database_url).await?;
    let (event_bus, audit_rx) = events::init_event_bus();
    let repo = RbacRepository::new(pool.clone());

    Ok(Admin {
        service: RbacService::new(repo.clone(), event_bus),
        access: AccessControl::with_store(Arc::new(repo.clone())),
        pool,
        repo,
        audit_rx,
    })
}

impl Admin {
    /// Writes queued audit events inline; a one-shot process has no listener task.
    async fn flush_audit(mut self) -> anyhow::Result<()> {
        while let Ok(event) = self.audit_rx.try_recv() {
            events::record_event(&self.pool, &event).await?;
        }
        Ok(())
    }

    async fn find_user(&self, email: &str) -> anyhow::Result<DbUser> {
        users::fetch_user_by_email(&self.pool, &email.trim().to_lowercase())
            .await?
            .with_context(|| format!("no user with email {email}"))
    }

    async fn lookup_user_and_role(&self, email: &str, role: &str) -> anyhow::Result<(Uuid, Uuid)> {
        let user = self.find_user(email).await?;
        let role = self
            .repo
            .find_role_by_name(role)
            .await?
            .with_context(|| format!("no role named {role}"))?;
        Ok((user.id, role.id))
    }
}

fn make_migration_file(name: &str) -> anyhow::Result<PathBuf> {
    // sqlx reads the leading integer as the version
    let timestamp = Utc::now().format("%Y%m%d%H%M%S");
    let filename = format!("{}_{}.sql", timestamp, sanitize_name(name));
    let path = Path::new("migrations").join(filename);

    if path.exists() {
        anyhow::bail!("migration already exists: {}", path.display());
    }

    fs::write(&path, "-- Write your migration SQL here\n")
        .with_context(|| format!("failed to create migration at {}", path.display()))?;

    Ok(path)
}

async fn print_status(pool: &SqlitePool) -> anyhow::Result<()> {
    let migrator = sqlx::migrate!();

    let rows = sqlx::query("SELECT version FROM _sqlx_migrations WHERE success = 1")
        .fetch_all(pool)
        .await?;
    let applied_versions: HashSet<i64> = rows
        .iter()
        .filter_map(|row| row.try_get::<i64, _>("version").ok())
        .collect();

    println!("{:<8} {:<20} {}", "Status", "Version", "Name");
    for migration in migrator.iter() {
        let status = if applied_versions.contains(&migration.version) { "applied" } else { "pending" };
        println!("{:<8} {:<20} {}", status, migration.version, migration.description);
    }

    Ok(())
}

fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            'a'..='z' | '0'..='9' | '_' => c,
            'A'..='Z' => c.to_ascii_lowercase(),
            _ => '_',
        })
        .collect()
}
