//! Access-grant CRUD for tasks and projects.
//!
//! The grant mutation protocol is identical for both resources: same-tenant
//! invitees only, one grant per (resource, user), full role replacement on
//! PATCH, hard removal on DELETE. The handlers differ only in how the
//! resource row is fetched and which manage check gates them.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::json;
use uuid::Uuid;

use crate::app::AppState;
use crate::audit::{self, AuditEventType};
use crate::authz;
use crate::errors::{map_unique_violation, AppError, AppResult};
use crate::jwt::Identity;
use crate::models::access::{
    AccessGrant, AccessInviteRequest, AccessUpdateRequest, DbAccessGrant,
};
use crate::models::task::DbTask;
use crate::models::user::DbUser;
use crate::routes::projects::fetch_scoped_project;
use crate::utils::utc_now;

#[derive(Debug, Clone, Copy)]
enum AccessKind {
    Project,
    Task,
}

impl AccessKind {
    fn grant_table(self) -> &'static str {
        match self {
            AccessKind::Project => "project_access",
            AccessKind::Task => "task_access",
        }
    }

    fn resource_column(self) -> &'static str {
        match self {
            AccessKind::Project => "project_id",
            AccessKind::Task => "task_id",
        }
    }

    fn entity(self) -> &'static str {
        match self {
            AccessKind::Project => "project",
            AccessKind::Task => "task",
        }
    }
}

// ---- project grants ----

#[utoipa::path(
    get,
    path = "/projects/{project_id}/access",
    tag = "Access",
    params(("project_id" = Uuid, Path, description = "Project id")),
    responses((status = 200, description = "Grants on the project", body = [AccessGrant])),
    security(("bearerAuth" = []))
)]
pub async fn list_project_access(
    State(state): State<AppState>,
    ident: Identity,
    Path(project_id): Path<Uuid>,
) -> AppResult<Json<Vec<AccessGrant>>> {
    let tenant_id = state.guard.require_tenant_context(ident.tenant_id)?;
    let project = fetch_scoped_project(&state, tenant_id, project_id).await?;
    if !authz::can_view_project(&state.pool, &project, &ident).await? {
        return Err(AppError::forbidden("not allowed to view this project"));
    }

    list_grants(&state, AccessKind::Project, project_id).await.map(Json)
}

#[utoipa::path(
    post,
    path = "/projects/{project_id}/access",
    tag = "Access",
    params(("project_id" = Uuid, Path, description = "Project id")),
    request_body = AccessInviteRequest,
    responses(
        (status = 201, description = "Grant created", body = AccessGrant),
        (status = 400, description = "Invitee does not belong to this tenant"),
        (status = 409, description = "Grant already exists")
    ),
    security(("bearerAuth" = []))
)]
pub async fn invite_project_access(
    State(state): State<AppState>,
    ident: Identity,
    Path(project_id): Path<Uuid>,
    Json(payload): Json<AccessInviteRequest>,
) -> AppResult<(StatusCode, Json<AccessGrant>)> {
    let tenant_id = state.guard.require_tenant_context(ident.tenant_id)?;
    let project = fetch_scoped_project(&state, tenant_id, project_id).await?;
    if !authz::can_manage_project_access(&state.pool, &project, &ident).await? {
        return Err(AppError::forbidden("not allowed to manage access on this project"));
    }

    let grant = create_grant(&state, &ident, AccessKind::Project, tenant_id, project_id, payload).await?;
    Ok((StatusCode::CREATED, Json(grant)))
}

#[utoipa::path(
    patch,
    path = "/projects/{project_id}/access/{user_id}",
    tag = "Access",
    params(
        ("project_id" = Uuid, Path, description = "Project id"),
        ("user_id" = Uuid, Path, description = "Grantee user id")
    ),
    request_body = AccessUpdateRequest,
    responses(
        (status = 200, description = "Role replaced", body = AccessGrant),
        (status = 404, description = "No grant for this user")
    ),
    security(("bearerAuth" = []))
)]
pub async fn update_project_access(
    State(state): State<AppState>,
    ident: Identity,
    Path((project_id, user_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<AccessUpdateRequest>,
) -> AppResult<Json<AccessGrant>> {
    let tenant_id = state.guard.require_tenant_context(ident.tenant_id)?;
    let project = fetch_scoped_project(&state, tenant_id, project_id).await?;
    if !authz::can_manage_project_access(&state.pool, &project, &ident).await? {
        return Err(AppError::forbidden("not allowed to manage access on this project"));
    }

    update_grant(&state, &ident, AccessKind::Project, tenant_id, project_id, user_id, payload)
        .await
        .map(Json)
}

#[utoipa::path(
    delete,
    path = "/projects/{project_id}/access/{user_id}",
    tag = "Access",
    params(
        ("project_id" = Uuid, Path, description = "Project id"),
        ("user_id" = Uuid, Path, description = "Grantee user id")
    ),
    responses(
        (status = 204, description = "Grant revoked"),
        (status = 404, description = "No grant for this user")
    ),
    security(("bearerAuth" = []))
)]
pub async fn revoke_project_access(
    State(state): State<AppState>,
    ident: Identity,
    Path((project_id, user_id)): Path<(Uuid, Uuid)>,
) -> AppResult<StatusCode> {
    let tenant_id = state.guard.require_tenant_context(ident.tenant_id)?;
    let project = fetch_scoped_project(&state, tenant_id, project_id).await?;
    if !authz::can_manage_project_access(&state.pool, &project, &ident).await? {
        return Err(AppError::forbidden("not allowed to manage access on this project"));
    }

    revoke_grant(&state, &ident, AccessKind::Project, tenant_id, project_id, user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---- task grants ----

#[utoipa::path(
    get,
    path = "/tasks/{task_id}/access",
    tag = "Access",
    params(("task_id" = Uuid, Path, description = "Task id")),
    responses((status = 200, description = "Grants on the task", body = [AccessGrant])),
    security(("bearerAuth" = []))
)]
pub async fn list_task_access(
    State(state): State<AppState>,
    ident: Identity,
    Path(task_id): Path<Uuid>,
) -> AppResult<Json<Vec<AccessGrant>>> {
    let tenant_id = state.guard.require_tenant_context(ident.tenant_id)?;
    let task = fetch_scoped_task(&state, tenant_id, task_id).await?;
    if !authz::can_view_task(&state.pool, &task, &ident).await? {
        return Err(AppError::forbidden("not allowed to view this task"));
    }

    list_grants(&state, AccessKind::Task, task_id).await.map(Json)
}

#[utoipa::path(
    post,
    path = "/tasks/{task_id}/access",
    tag = "Access",
    params(("task_id" = Uuid, Path, description = "Task id")),
    request_body = AccessInviteRequest,
    responses(
        (status = 201, description = "Grant created", body = AccessGrant),
        (status = 400, description = "Invitee does not belong to this tenant"),
        (status = 409, description = "Grant already exists")
    ),
    security(("bearerAuth" = []))
)]
pub async fn invite_task_access(
    State(state): State<AppState>,
    ident: Identity,
    Path(task_id): Path<Uuid>,
    Json(payload): Json<AccessInviteRequest>,
) -> AppResult<(StatusCode, Json<AccessGrant>)> {
    let tenant_id = state.guard.require_tenant_context(ident.tenant_id)?;
    let task = fetch_scoped_task(&state, tenant_id, task_id).await?;
    if !authz::can_manage_task_access(&state.pool, &task, &ident).await? {
        return Err(AppError::forbidden("not allowed to manage access on this task"));
    }

    let grant = create_grant(&state, &ident, AccessKind::Task, tenant_id, task_id, payload).await?;
    Ok((StatusCode::CREATED, Json(grant)))
}

#[utoipa::path(
    patch,
    path = "/tasks/{task_id}/access/{user_id}",
    tag = "Access",
    params(
        ("task_id" = Uuid, Path, description = "Task id"),
        ("user_id" = Uuid, Path, description = "Grantee user id")
    ),
    request_body = AccessUpdateRequest,
    responses(
        (status = 200, description = "Role replaced", body = AccessGrant),
        (status = 404, description = "No grant for this user")
    ),
    security(("bearerAuth" = []))
)]
pub async fn update_task_access(
    State(state): State<AppState>,
    ident: Identity,
    Path((task_id, user_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<AccessUpdateRequest>,
) -> AppResult<Json<AccessGrant>> {
    let tenant_id = state.guard.require_tenant_context(ident.tenant_id)?;
    let task = fetch_scoped_task(&state, tenant_id, task_id).await?;
    if !authz::can_manage_task_access(&state.pool, &task, &ident).await? {
        return Err(AppError::forbidden("not allowed to manage access on this task"));
    }

    update_grant(&state, &ident, AccessKind::Task, tenant_id, task_id, user_id, payload)
        .await
        .map(Json)
}

#[utoipa::path(
    delete,
    path = "/tasks/{task_id}/access/{user_id}",
    tag = "Access",
    params(
        ("task_id" = Uuid, Path, description = "Task id"),
        ("user_id" = Uuid, Path, description = "Grantee user id")
    ),
    responses(
        (status = 204, description = "Grant revoked"),
        (status = 404, description = "No grant for this user")
    ),
    security(("bearerAuth" = []))
)]
pub async fn revoke_task_access(
    State(state): State<AppState>,
    ident: Identity,
    Path((task_id, user_id)): Path<(Uuid, Uuid)>,
) -> AppResult<StatusCode> {
    let tenant_id = state.guard.require_tenant_context(ident.tenant_id)?;
    let task = fetch_scoped_task(&state, tenant_id, task_id).await?;
    if !authz::can_manage_task_access(&state.pool, &task, &ident).await? {
        return Err(AppError::forbidden("not allowed to manage access on this task"));
    }

    revoke_grant(&state, &ident, AccessKind::Task, tenant_id, task_id, user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---- shared protocol ----

async fn list_grants(
    state: &AppState,
    kind: AccessKind,
    resource_id: Uuid,
) -> AppResult<Vec<AccessGrant>> {
    let rows = sqlx::query_as::<_, DbAccessGrant>(&format!(
        "SELECT id, tenant_id, {} AS resource_id, user_id, role, invited_by_user_id, created_at \
         FROM {} WHERE {} = ? ORDER BY created_at ASC",
        kind.resource_column(),
        kind.grant_table(),
        kind.resource_column(),
    ))
    .bind(resource_id)
    .fetch_all(&state.pool)
    .await?;

    rows.into_iter().map(AccessGrant::try_from).collect()
}

async fn create_grant(
    state: &AppState,
    ident: &Identity,
    kind: AccessKind,
    tenant_id: Uuid,
    resource_id: Uuid,
    payload: AccessInviteRequest,
) -> AppResult<AccessGrant> {
    // Cross-tenant invites are a hard validation error, never silently
    // ignored; this is the grant-based boundary-crossing hole.
    let invitee = DbUser::find_by_id(&state.pool, payload.user_id)
        .await?
        .ok_or_else(|| AppError::not_found("invited user not found"))?;
    if invitee.tenant_id != Some(tenant_id) {
        return Err(AppError::bad_request(
            "invited user does not belong to this tenant",
        ));
    }

    // Early exit only; the UNIQUE constraint is what actually closes the
    // concurrent-invite window.
    let exists: bool = sqlx::query_scalar(&format!(
        "SELECT EXISTS(SELECT 1 FROM {} WHERE {} = ? AND user_id = ?)",
        kind.grant_table(),
        kind.resource_column(),
    ))
    .bind(resource_id)
    .bind(payload.user_id)
    .fetch_one(&state.pool)
    .await?;
    if exists {
        return Err(AppError::conflict("a grant for this user already exists"));
    }

    let id = Uuid::new_v4();
    let now = utc_now();
    sqlx::query(&format!(
        "INSERT INTO {} (id, tenant_id, {}, user_id, role, invited_by_user_id, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?)",
        kind.grant_table(),
        kind.resource_column(),
    ))
    .bind(id)
    .bind(tenant_id)
    .bind(resource_id)
    .bind(payload.user_id)
    .bind(payload.role.as_str())
    .bind(ident.actor_user_id)
    .bind(now)
    .execute(&state.pool)
    .await
    .map_err(|err| map_unique_violation(err, "a grant for this user already exists"))?;

    audit::record_event(
        &state.pool,
        tenant_id,
        Some(ident.actor_user_id),
        AuditEventType::AccessGranted,
        &format!("{} access granted", kind.entity()),
        json!({
            "resource_type": kind.entity(),
            "resource_id": resource_id,
            "user_id": payload.user_id,
            "role": payload.role.as_str(),
        }),
    )
    .await;

    Ok(AccessGrant {
        id,
        tenant_id,
        resource_id,
        user_id: payload.user_id,
        role: payload.role,
        invited_by_user_id: ident.actor_user_id,
        created_at: now,
    })
}

async fn update_grant(
    state: &AppState,
    ident: &Identity,
    kind: AccessKind,
    tenant_id: Uuid,
    resource_id: Uuid,
    user_id: Uuid,
    payload: AccessUpdateRequest,
) -> AppResult<AccessGrant> {
    // Full replacement: the new role supersedes the old atomically.
    let affected = sqlx::query(&format!(
        "UPDATE {} SET role = ? WHERE {} = ? AND user_id = ?",
        kind.grant_table(),
        kind.resource_column(),
    ))
    .bind(payload.role.as_str())
    .bind(resource_id)
    .bind(user_id)
    .execute(&state.pool)
    .await?;

    if affected.rows_affected() == 0 {
        return Err(AppError::not_found("no grant exists for this user"));
    }

    audit::record_event(
        &state.pool,
        tenant_id,
        Some(ident.actor_user_id),
        AuditEventType::AccessRoleChanged,
        &format!("{} access role changed", kind.entity()),
        json!({
            "resource_type": kind.entity(),
            "resource_id": resource_id,
            "user_id": user_id,
            "role": payload.role.as_str(),
        }),
    )
    .await;

    let row = sqlx::query_as::<_, DbAccessGrant>(&format!(
        "SELECT id, tenant_id, {} AS resource_id, user_id, role, invited_by_user_id, created_at \
         FROM {} WHERE {} = ? AND user_id = ?",
        kind.resource_column(),
        kind.grant_table(),
        kind.resource_column(),
    ))
    .bind(resource_id)
    .bind(user_id)
    .fetch_one(&state.pool)
    .await?;

    row.try_into()
}

async fn revoke_grant(
    state: &AppState,
    ident: &Identity,
    kind: AccessKind,
    tenant_id: Uuid,
    resource_id: Uuid,
    user_id: Uuid,
) -> AppResult<()> {
    let affected = sqlx::query(&format!(
        "DELETE FROM {} WHERE {} = ? AND user_id = ?",
        kind.grant_table(),
        kind.resource_column(),
    ))
    .bind(resource_id)
    .bind(user_id)
    .execute(&state.pool)
    .await?;

    if affected.rows_affected() == 0 {
        return Err(AppError::not_found("no grant exists for this user"));
    }

    audit::record_event(
        &state.pool,
        tenant_id,
        Some(ident.actor_user_id),
        AuditEventType::AccessRevoked,
        &format!("{} access revoked", kind.entity()),
        json!({
            "resource_type": kind.entity(),
            "resource_id": resource_id,
            "user_id": user_id,
        }),
    )
    .await;

    Ok(())
}

/// Task fetch for the top-level access routes, where no project id is in
/// the path. Same unscoped-fetch-then-assert pattern as elsewhere.
async fn fetch_scoped_task(
    state: &AppState,
    tenant_id: Uuid,
    task_id: Uuid,
) -> AppResult<DbTask> {
    let record = DbTask::find_by_id(&state.pool, task_id)
        .await?
        .ok_or_else(|| AppError::not_found("task not found"))?;

    state
        .guard
        .assert_tenant_scoped_read(Some(record.tenant_id), tenant_id, "task", task_id)?;

    Ok(record)
}
