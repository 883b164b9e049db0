use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use serde_json::json;
use sqlx::SqlitePool;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::app::AppState;
use crate::audit::{self, AuditEventType};
use crate::errors::{AppError, AppResult};
use crate::jwt::Identity;
use crate::models::tenant::TenantStatus;
use crate::models::user::{AuthResponse, DbUser, LoginRequest, RegisterRequest, User, UserRole};
use crate::utils::{hash_password, utc_now, verify_password};

#[utoipa::path(
    post,
    path = "/auth/register",
    tag = "Auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Tenant provisioned with its admin user", body = AuthResponse),
        (status = 409, description = "Email already in use")
    )
)]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<AuthResponse>)> {
    ensure_email_available(&state.pool, &payload.email).await?;

    let password_hash = hash_password(&payload.password)?;
    let now = utc_now();
    let tenant_id = Uuid::new_v4();
    let workspace_id = Uuid::new_v4();
    let user_id = Uuid::new_v4();

    let mut tx = state.pool.begin().await?;

    sqlx::query(
        "INSERT INTO tenants (id, name, status, created_at, updated_at) VALUES (?, ?, 'active', ?, ?)",
    )
    .bind(tenant_id)
    .bind(&payload.tenant_name)
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

    sqlx::query(
        "INSERT INTO users (id, tenant_id, name, email, password_hash, role, is_active, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, 'admin', 1, ?, ?)",
    )
    .bind(user_id)
    .bind(tenant_id)
    .bind(&payload.name)
    .bind(&payload.email)
    .bind(&password_hash)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    audit::record_event(
        &state.pool,
        tenant_id,
        Some(user_id),
        AuditEventType::TenantProvisioned,
        "tenant provisioned via signup",
        json!({"tenant_name": payload.tenant_name, "workspace_id": workspace_id}),
    )
    .await;
    audit::record_event(
        &state.pool,
        tenant_id,
        Some(user_id),
        AuditEventType::UserProvisioned,
        "tenant admin created via signup",
        json!({"user_id": user_id, "role": "admin"}),
    )
    .await;

    let db_user = DbUser::find_by_id(&state.pool, user_id)
        .await?
        .ok_or_else(|| AppError::internal("user vanished after insert"))?;
    let user: User = db_user.try_into()?;
    let token = state.jwt.encode(user.id)?;

    Ok((StatusCode::CREATED, Json(AuthResponse { token, user })))
}

#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "Auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 403, description = "Tenant suspended or deleted")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    let db_user = DbUser::find_by_email(&state.pool, &payload.email)
        .await?
        .ok_or_else(|| AppError::unauthorized("invalid credentials"))?;

    let password_ok = verify_password(&payload.password, &db_user.password_hash)?;
    if !password_ok {
        return Err(AppError::unauthorized("invalid credentials"));
    }
    if !db_user.is_active {
        return Err(AppError::unauthorized("user is deactivated"));
    }

    // Super users have no tenant; everyone else logs into an active one.
    if let Some(tenant_id) = db_user.tenant_id {
        let status: Option<String> =
            sqlx::query_scalar("SELECT status FROM tenants WHERE id = ?")
                .bind(tenant_id)
                .fetch_optional(&state.pool)
                .await?;
        let active = status
            .as_deref()
            .and_then(TenantStatus::parse)
            .map(|s| s.is_active())
            .unwrap_or(false);
        if !active {
            return Err(AppError::forbidden("tenant is suspended or deleted"));
        }
    }

    let token = state.jwt.encode(db_user.id)?;
    let user: User = db_user.try_into()?;
    Ok(Json(AuthResponse { token, user }))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MeResponse {
    pub user: User,
    pub effective_tenant_id: Option<Uuid>,
    pub effective_role: UserRole,
    pub is_impersonating: bool,
}

#[utoipa::path(
    get,
    path = "/auth/me",
    tag = "Auth",
    responses((status = 200, description = "Effective identity", body = MeResponse)),
    security(("bearerAuth" = []))
)]
pub async fn me(State(state): State<AppState>, ident: Identity) -> AppResult<Json<MeResponse>> {
    let db_user = DbUser::find_by_id(&state.pool, ident.user_id)
        .await?
        .ok_or_else(|| AppError::not_found("user not found"))?;
    let user: User = db_user.try_into()?;

    Ok(Json(MeResponse {
        user,
        effective_tenant_id: ident.tenant_id,
        effective_role: ident.role,
        is_impersonating: ident.is_impersonating,
    }))
}

async fn ensure_email_available(pool: &SqlitePool, email: &str) -> AppResult<()> {
    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE email = ?)")
        .bind(email)
        .fetch_one(pool)
        .await?;

    if exists {
        return Err(AppError::conflict("email already in use"));
    }
    Ok(())
}
