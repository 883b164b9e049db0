//! Super-user impersonation surface.
//!
//! These are the only routes that legitimately cross tenant boundaries, so
//! every transition is written to the target tenant's audit log with the
//! real actor's id.

use axum::extract::{Path, State};
use axum::Json;
use chrono::Duration;
use serde::Deserialize;
use serde_json::json;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::app::AppState;
use crate::audit::{self, AuditEventType};
use crate::errors::{AppError, AppResult};
use crate::impersonation::{ImpersonationSession, ImpersonationStatus};
use crate::jwt::Identity;
use crate::models::tenant::{DbTenant, TenantStatus};
use crate::models::user::{DbUser, UserRole};
use crate::utils::utc_now;

#[derive(Debug, Deserialize, ToSchema)]
pub struct ImpersonateStartRequest {
    pub tenant_id: Uuid,
}

#[utoipa::path(
    post,
    path = "/impersonate/start",
    tag = "Impersonation",
    request_body = ImpersonateStartRequest,
    responses(
        (status = 200, description = "Impersonating the tenant context", body = ImpersonationStatus),
        (status = 400, description = "Tenant suspended or deleted"),
        (status = 404, description = "Tenant not found"),
        (status = 409, description = "A session is already active")
    ),
    security(("bearerAuth" = []))
)]
pub async fn start_tenant_impersonation(
    State(state): State<AppState>,
    ident: Identity,
    Json(payload): Json<ImpersonateStartRequest>,
) -> AppResult<Json<ImpersonationStatus>> {
    ident.require_super_user()?;

    let tenant = require_impersonable_tenant(&state, payload.tenant_id).await?;
    let actor_email = actor_email(&state, ident.actor_user_id).await?;

    let now = utc_now();
    let session = ImpersonationSession {
        original_super_user_id: ident.actor_user_id,
        original_super_user_email: actor_email,
        impersonated_user_id: None,
        impersonated_role: None,
        impersonated_tenant_id: tenant.id,
        started_at: now,
        expires_at: now + Duration::hours(state.jwt.exp_hours),
    };

    // Preconditions all passed; this is the first session mutation.
    state.impersonation.begin(ident.actor_user_id, session).await?;

    audit::record_event(
        &state.pool,
        tenant.id,
        Some(ident.actor_user_id),
        AuditEventType::ImpersonationStarted,
        "super user entered tenant context",
        json!({"tenant_id": tenant.id, "started_at": now}),
    )
    .await;

    let status = ImpersonationStatus::from(&state.impersonation.state(ident.actor_user_id).await);
    Ok(Json(status))
}

#[utoipa::path(
    post,
    path = "/users/{user_id}/impersonate-login",
    tag = "Impersonation",
    params(("user_id" = Uuid, Path, description = "Target user id")),
    responses(
        (status = 200, description = "Impersonating the user", body = ImpersonationStatus),
        (status = 400, description = "User inactive, orphaned, or tenant not active"),
        (status = 404, description = "User not found"),
        (status = 409, description = "A session is already active")
    ),
    security(("bearerAuth" = []))
)]
pub async fn impersonate_login(
    State(state): State<AppState>,
    ident: Identity,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<ImpersonationStatus>> {
    ident.require_super_user()?;

    let target = DbUser::find_by_id(&state.pool, user_id)
        .await?
        .ok_or_else(|| AppError::not_found("user not found"))?;
    if !target.is_active {
        return Err(AppError::bad_request("target user is deactivated"));
    }
    let tenant_id = target
        .tenant_id
        .ok_or_else(|| AppError::bad_request("target user has no tenant"))?;
    let tenant = require_impersonable_tenant(&state, tenant_id).await?;
    let target_role = UserRole::parse(&target.role)
        .ok_or_else(|| AppError::internal(format!("unknown user role: {}", target.role)))?;

    let actor_email = actor_email(&state, ident.actor_user_id).await?;
    let now = utc_now();
    let session = ImpersonationSession {
        original_super_user_id: ident.actor_user_id,
        original_super_user_email: actor_email,
        impersonated_user_id: Some(target.id),
        impersonated_role: Some(target_role),
        impersonated_tenant_id: tenant.id,
        started_at: now,
        expires_at: now + Duration::hours(state.jwt.exp_hours),
    };

    state.impersonation.begin(ident.actor_user_id, session).await?;

    audit::record_event(
        &state.pool,
        tenant.id,
        Some(ident.actor_user_id),
        AuditEventType::ImpersonationStarted,
        "super user logged in as tenant user",
        json!({
            "impersonated_user_id": target.id,
            "impersonated_role": target_role.as_str(),
            "started_at": now,
        }),
    )
    .await;

    let status = ImpersonationStatus::from(&state.impersonation.state(ident.actor_user_id).await);
    Ok(Json(status))
}

#[utoipa::path(
    post,
    path = "/impersonation/exit",
    tag = "Impersonation",
    responses((status = 200, description = "Back to the real identity", body = ImpersonationStatus)),
    security(("bearerAuth" = []))
)]
pub async fn exit_impersonation(
    State(state): State<AppState>,
    ident: Identity,
) -> AppResult<Json<ImpersonationStatus>> {
    ident.require_super_user()?;

    // The store write completes before this handler returns, so the client
    // can never observe a half-exited session. Exiting while idle is a
    // harmless no-op.
    if let Some(session) = state.impersonation.end(ident.actor_user_id).await {
        let now = utc_now();
        let duration = session.duration_seconds(now);
        audit::record_event(
            &state.pool,
            session.impersonated_tenant_id,
            Some(ident.actor_user_id),
            AuditEventType::ImpersonationStopped,
            "impersonation session ended",
            json!({
                "impersonated_user_id": session.impersonated_user_id,
                "duration_seconds": duration,
            }),
        )
        .await;
        tracing::info!(
            actor = %ident.actor_user_id,
            tenant = %session.impersonated_tenant_id,
            duration_seconds = duration,
            "impersonation session ended"
        );
    }

    let status = ImpersonationStatus::from(&state.impersonation.state(ident.actor_user_id).await);
    Ok(Json(status))
}

#[utoipa::path(
    get,
    path = "/impersonation/status",
    tag = "Impersonation",
    responses((status = 200, description = "Current session state", body = ImpersonationStatus)),
    security(("bearerAuth" = []))
)]
pub async fn impersonation_status(
    State(state): State<AppState>,
    ident: Identity,
) -> AppResult<Json<ImpersonationStatus>> {
    ident.require_super_user()?;

    // Reads the session store and nothing else; the status view cannot
    // diverge from the stored state.
    let status = ImpersonationStatus::from(&state.impersonation.state(ident.actor_user_id).await);
    Ok(Json(status))
}

async fn require_impersonable_tenant(
    state: &AppState,
    tenant_id: Uuid,
) -> AppResult<crate::models::tenant::Tenant> {
    let tenant = DbTenant::find_by_id(&state.pool, tenant_id)
        .await?
        .ok_or_else(|| AppError::not_found("tenant not found"))?;
    let tenant: crate::models::tenant::Tenant = tenant.try_into()?;

    match tenant.status {
        TenantStatus::Active => Ok(tenant),
        TenantStatus::Suspended => Err(AppError::bad_request("tenant is suspended")),
        TenantStatus::Deleted => Err(AppError::bad_request("tenant is deleted")),
    }
}

async fn actor_email(state: &AppState, actor_id: Uuid) -> AppResult<String> {
    let email: Option<String> = sqlx::query_scalar("SELECT email FROM users WHERE id = ?")
        .bind(actor_id)
        .fetch_optional(&state.pool)
        .await?;
    email.ok_or_else(|| AppError::unauthorized("unknown user"))
}
