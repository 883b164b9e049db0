//! Operational CLI: migrations plus provisioning that has no HTTP surface.
//! Super users are created here, never through the API.

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use uuid::Uuid;

use opsdeck::audit;
use opsdeck::utils::hash_password;

#[derive(Parser, Debug)]
#[command(author, version, about = "opsdeck ops tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Apply pending migrations
    Migrate,
    /// Provision a tenant with its primary workspace
    CreateTenant { name: String },
    /// Provision a platform super user (no tenant)
    CreateSuperUser {
        name: String,
        email: String,
        password: String,
    },
    /// Recompute a tenant's audit hash chain and report whether it is intact
    AuditVerify { tenant_id: Uuid },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Binary CWD may differ in Docker; fall back to the crate-local .env.
    if dotenv().is_err() {
        let crate_env = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(crate_env);
    }

    let cli = Cli::parse();
    let pool = get_pool().await?;

    match cli.command {
        Commands::Migrate => {
            sqlx::migrate!().run(&pool).await?;
            println!("Migrations applied");
        }
        Commands::CreateTenant { name } => {
            let tenant_id = Uuid::new_v4();
            let workspace_id = Uuid::new_v4();
            let now = Utc::now();

            let mut tx = pool.begin().await?;
            sqlx::query(
                "INSERT INTO tenants (id, name, status, created_at, updated_at) VALUES (?, ?, 'active', ?, ?)",
            )
            .bind(tenant_id)
            .bind(&name)
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await?;
            sqlx::query(
                "INSERT INTO workspaces (id, tenant_id, name, is_primary, created_at) VALUES (?, ?, 'General', 1, ?)",
            )
            .bind(workspace_id)
            .bind(tenant_id)
            .bind(now)
            .execute(&mut *tx)
            .await?;
            tx.commit().await?;

            audit::record_event(
                &pool,
                tenant_id,
                None,
                audit::AuditEventType::TenantProvisioned,
                "tenant provisioned via cli",
                serde_json::json!({"tenant_name": name, "workspace_id": workspace_id}),
            )
            .await;

            println!("Created tenant {tenant_id} (primary workspace {workspace_id})");
        }
        Commands::CreateSuperUser {
            name,
            email,
            password,
        } => {
            let password_hash =
                hash_password(&password).map_err(|err| anyhow::anyhow!(err.to_string()))?;
            let user_id = Uuid::new_v4();
            let now = Utc::now();

            sqlx::query(
                "INSERT INTO users (id, tenant_id, name, email, password_hash, role, is_active, created_at, updated_at) \
                 VALUES (?, NULL, ?, ?, ?, 'super_user', 1, ?, ?)",
            )
            .bind(user_id)
            .bind(&name)
            .bind(&email)
            .bind(&password_hash)
            .bind(now)
            .bind(now)
            .execute(&pool)
            .await?;

            println!("Created super user {user_id} ({email})");
        }
        Commands::AuditVerify { tenant_id } => {
            let intact = audit::verify_chain(&pool, tenant_id).await?;
            if intact {
                println!("Audit chain intact for tenant {tenant_id}");
            } else {
                println!("AUDIT CHAIN BROKEN for tenant {tenant_id}");
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

async fn get_pool() -> anyhow::Result<SqlitePool> {
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL not set")?;
    let pool = SqlitePoolOptions::new()
        .max_connections(2)
        .connect(&database_url)
        .await
        .context("failed to connect to database")?;
    Ok(pool)
}
