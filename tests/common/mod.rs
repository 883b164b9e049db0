#![allow(dead_code)]

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::Value;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::SqlitePool;
use tempfile::TempDir;
use tower::ServiceExt; // for `oneshot`
use uuid::Uuid;

use opsdeck::authz::VisibilityFlags;
use opsdeck::jwt::JwtConfig;
use opsdeck::tenancy::GuardMode;
use opsdeck::utils::hash_password;
use opsdeck::{create_app_with, AppOptions};

pub struct TestApp {
    pub app: Router,
    pub pool: SqlitePool,
    pub jwt: JwtConfig,
    _dir: TempDir,
}

pub struct RegisteredTenant {
    pub token: String,
    pub user_id: Uuid,
    pub tenant_id: Uuid,
}

impl TestApp {
    pub async fn spawn() -> Result<Self> {
        Self::spawn_with(GuardMode::Enforce, VisibilityFlags::all_enabled()).await
    }

    pub async fn spawn_with(guard_mode: GuardMode, visibility: VisibilityFlags) -> Result<Self> {
        let dir = TempDir::new().context("failed to create tempdir")?;
        let db_path = dir.path().join("test.db");

        let opts = SqliteConnectOptions::new()
            .filename(db_path.as_path())
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(opts).await?;

        let migrator = sqlx::migrate::Migrator::new(
            std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations"),
        )
        .await?;
        migrator.run(&pool).await?;

        let jwt = JwtConfig {
            secret: Arc::new(b"test-secret".to_vec()),
            exp_hours: 24,
        };
        let options = AppOptions {
            jwt: jwt.clone(),
            guard_mode,
            visibility,
        };
        let app = create_app_with(pool.clone(), options).await?;

        Ok(Self {
            app,
            pool,
            jwt,
            _dir: dir,
        })
    }

    /// Drives a request through the router and returns status + JSON body
    /// (Null when the response has no body).
    pub async fn request(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        json_body: Option<Value>,
    ) -> Result<(StatusCode, Value)> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }

        let request = match json_body {
            Some(value) => builder
                .header("content-type", "application/json")
                .body(Body::from(value.to_string()))?,
            None => builder.body(Body::empty())?,
        };

        let response = self.app.clone().oneshot(request).await?;
        let status = response.status();
        let bytes = body::to_bytes(response.into_body(), usize::MAX).await?;
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .with_context(|| format!("non-JSON body: {}", String::from_utf8_lossy(&bytes)))?
        };

        Ok((status, value))
    }

    /// Tenant signup through the real endpoint.
    pub async fn register_tenant(
        &self,
        tenant_name: &str,
        user_name: &str,
        email: &str,
    ) -> Result<RegisteredTenant> {
        let (status, body) = self
            .request(
                "POST",
                "/auth/register",
                None,
                Some(serde_json::json!({
                    "tenant_name": tenant_name,
                    "name": user_name,
                    "email": email,
                    "password": "password123",
                })),
            )
            .await?;
        anyhow::ensure!(status == StatusCode::CREATED, "register failed: {body}");

        let token = body["token"].as_str().context("missing token")?.to_string();
        let user_id = parse_uuid(&body["user"]["id"])?;
        let tenant_id = parse_uuid(&body["user"]["tenant_id"])?;

        Ok(RegisteredTenant {
            token,
            user_id,
            tenant_id,
        })
    }

    /// Direct-provisioned tenant member (the API only creates admins via
    /// signup). Returns the user id and a valid bearer token.
    pub async fn create_tenant_user(
        &self,
        tenant_id: Uuid,
        role: &str,
        email: &str,
    ) -> Result<(Uuid, String)> {
        let user_id = Uuid::new_v4();
        let now = chrono::Utc::now();
        let password_hash = hash_password("password123").map_err(|e| anyhow::anyhow!("{e}"))?;

        sqlx::query(
            "INSERT INTO users (id, tenant_id, name, email, password_hash, role, is_active, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, 1, ?, ?)",
        )
        .bind(user_id)
        .bind(tenant_id)
        .bind(email)
        .bind(email)
        .bind(password_hash)
        .bind(role)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        let token = self
            .jwt
            .encode(user_id)
            .map_err(|e| anyhow::anyhow!("{e}"))?;
        Ok((user_id, token))
    }

    /// Platform super user (tenant_id NULL), as the ops CLI would create.
    pub async fn create_super_user(&self, email: &str) -> Result<(Uuid, String)> {
        let user_id = Uuid::new_v4();
        let now = chrono::Utc::now();
        let password_hash = hash_password("password123").map_err(|e| anyhow::anyhow!("{e}"))?;

        sqlx::query(
            "INSERT INTO users (id, tenant_id, name, email, password_hash, role, is_active, created_at, updated_at) \
             VALUES (?, NULL, ?, ?, ?, 'super_user', 1, ?, ?)",
        )
        .bind(user_id)
        .bind(email)
        .bind(email)
        .bind(password_hash)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        let token = self
            .jwt
            .encode(user_id)
            .map_err(|e| anyhow::anyhow!("{e}"))?;
        Ok((user_id, token))
    }

    pub async fn audit_events(&self, tenant_id: Uuid) -> Result<Vec<(String, Option<Uuid>)>> {
        let rows: Vec<(String, Option<Uuid>)> = sqlx::query_as(
            "SELECT event_type, actor_user_id FROM tenant_audit_events WHERE tenant_id = ? ORDER BY rowid ASC",
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

pub fn parse_uuid(value: &Value) -> Result<Uuid> {
    Ok(Uuid::parse_str(
        value.as_str().context("expected uuid string")?,
    )?)
}
