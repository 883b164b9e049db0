use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz;
use crate::errors::{AppError, AppResult};
use crate::jwt::Identity;
use crate::models::project::{DbProject, Project, ProjectCreateRequest, ProjectUpdateRequest};
use crate::models::Visibility;
use crate::tenancy::resolve_primary_workspace;
use crate::utils::utc_now;

#[utoipa::path(
    get,
    path = "/projects",
    tag = "Projects",
    responses((status = 200, description = "List projects visible to the caller", body = [Project])),
    security(("bearerAuth" = []))
)]
pub async fn list_projects(
    State(state): State<AppState>,
    ident: Identity,
) -> AppResult<Json<Vec<Project>>> {
    let tenant_id = state.guard.require_tenant_context(ident.tenant_id)?;

    let rows = sqlx::query_as::<_, DbProject>(
        "SELECT id, tenant_id, workspace_id, name, description, visibility, created_by, created_at, updated_at \
         FROM projects WHERE tenant_id = ? ORDER BY created_at DESC",
    )
    .bind(tenant_id)
    .fetch_all(&state.pool)
    .await?;

    // Single choke point for private visibility on bulk reads. When the
    // flag is off every row is treated as workspace-visible.
    let rows = if state.visibility.private_projects {
        let accessible =
            authz::accessible_private_project_ids(&state.pool, tenant_id, &ident).await?;
        rows.into_iter()
            .filter(|p| p.visibility != "private" || accessible.contains(&p.id))
            .collect()
    } else {
        rows
    };

    let projects: Vec<Project> = rows
        .into_iter()
        .map(Project::try_from)
        .collect::<Result<_, _>>()?;

    Ok(Json(projects))
}

#[utoipa::path(
    post,
    path = "/projects",
    tag = "Projects",
    request_body = ProjectCreateRequest,
    responses((status = 201, description = "Project created", body = Project)),
    security(("bearerAuth" = []))
)]
pub async fn create_project(
    State(state): State<AppState>,
    ident: Identity,
    Json(payload): Json<ProjectCreateRequest>,
) -> AppResult<(StatusCode, Json<Project>)> {
    let tenant_id = state.guard.require_tenant_context(ident.tenant_id)?;

    let workspace_id = match payload.workspace_id {
        Some(workspace_id) => {
            let ws_tenant: Option<Uuid> =
                sqlx::query_scalar("SELECT tenant_id FROM workspaces WHERE id = ?")
                    .bind(workspace_id)
                    .fetch_optional(&state.pool)
                    .await?;
            let ws_tenant =
                ws_tenant.ok_or_else(|| AppError::not_found("workspace not found"))?;
            state.guard.assert_tenant_scoped_read(
                Some(ws_tenant),
                tenant_id,
                "workspace",
                workspace_id,
            )?;
            Some(workspace_id)
        }
        // Convenience default only; the cache is never an authority.
        None => resolve_primary_workspace(&state.pool, state.workspace_cache.as_ref(), tenant_id)
            .await?,
    };

    let now = utc_now();
    let record = DbProject {
        id: Uuid::new_v4(),
        tenant_id,
        workspace_id,
        name: payload.name,
        description: payload.description,
        visibility: payload
            .visibility
            .unwrap_or(Visibility::Workspace)
            .as_str()
            .to_string(),
        created_by: ident.user_id,
        created_at: now,
        updated_at: now,
    };

    state.guard.assert_tenant_id_on_insert(&record, "projects")?;
    state
        .guard
        .assert_tenant_scoped_write(&record, tenant_id, "projects")?;

    sqlx::query(
        "INSERT INTO projects (id, tenant_id, workspace_id, name, description, visibility, created_by, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(record.id)
    .bind(record.tenant_id)
    .bind(record.workspace_id)
    .bind(&record.name)
    .bind(&record.description)
    .bind(&record.visibility)
    .bind(record.created_by)
    .bind(record.created_at)
    .bind(record.updated_at)
    .execute(&state.pool)
    .await?;

    let project: Project = record.try_into()?;
    Ok((StatusCode::CREATED, Json(project)))
}

#[utoipa::path(
    get,
    path = "/projects/{id}",
    tag = "Projects",
    params(("id" = Uuid, Path, description = "Project id")),
    responses(
        (status = 200, description = "Project detail", body = Project),
        (status = 403, description = "Cross-tenant access or private project"),
        (status = 404, description = "Project not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_project(
    State(state): State<AppState>,
    ident: Identity,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Project>> {
    let tenant_id = state.guard.require_tenant_context(ident.tenant_id)?;
    let record = fetch_scoped_project(&state, tenant_id, id).await?;

    if !authz::can_view_project(&state.pool, &record, &ident).await? {
        return Err(AppError::forbidden("not allowed to view this project"));
    }

    let project: Project = record.try_into()?;
    Ok(Json(project))
}

#[utoipa::path(
    patch,
    path = "/projects/{id}",
    tag = "Projects",
    params(("id" = Uuid, Path, description = "Project id")),
    request_body = ProjectUpdateRequest,
    responses((status = 200, description = "Project updated", body = Project)),
    security(("bearerAuth" = []))
)]
pub async fn update_project(
    State(state): State<AppState>,
    ident: Identity,
    Path(id): Path<Uuid>,
    Json(payload): Json<ProjectUpdateRequest>,
) -> AppResult<Json<Project>> {
    let tenant_id = state.guard.require_tenant_context(ident.tenant_id)?;
    let mut record = fetch_scoped_project(&state, tenant_id, id).await?;

    state
        .guard
        .assert_tenant_ownership(Some(record.tenant_id), tenant_id, "project", id)?;
    if !authz::can_edit_project(&state.pool, &record, &ident).await? {
        return Err(AppError::forbidden("not allowed to modify this project"));
    }

    if let Some(name) = payload.name {
        record.name = name;
    }
    if let Some(description) = payload.description {
        record.description = Some(description);
    }
    if let Some(visibility) = payload.visibility {
        record.visibility = visibility.as_str().to_string();
    }
    record.updated_at = utc_now();

    state
        .guard
        .assert_tenant_scoped_write(&record, tenant_id, "projects")?;

    sqlx::query(
        "UPDATE projects SET name = ?, description = ?, visibility = ?, updated_at = ? WHERE id = ?",
    )
    .bind(&record.name)
    .bind(&record.description)
    .bind(&record.visibility)
    .bind(record.updated_at)
    .bind(record.id)
    .execute(&state.pool)
    .await?;

    let project: Project = record.try_into()?;
    Ok(Json(project))
}

#[utoipa::path(
    delete,
    path = "/projects/{id}",
    tag = "Projects",
    params(("id" = Uuid, Path, description = "Project id")),
    responses((status = 204, description = "Project deleted")),
    security(("bearerAuth" = []))
)]
pub async fn delete_project(
    State(state): State<AppState>,
    ident: Identity,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let tenant_id = state.guard.require_tenant_context(ident.tenant_id)?;
    let record = fetch_scoped_project(&state, tenant_id, id).await?;

    state
        .guard
        .assert_tenant_ownership(Some(record.tenant_id), tenant_id, "project", id)?;
    if !authz::can_manage_project_access(&state.pool, &record, &ident).await? {
        return Err(AppError::forbidden("not allowed to delete this project"));
    }

    sqlx::query("DELETE FROM task_access WHERE task_id IN (SELECT id FROM tasks WHERE project_id = ?)")
        .bind(id)
        .execute(&state.pool)
        .await?;
    sqlx::query("DELETE FROM tasks WHERE project_id = ?")
        .bind(id)
        .execute(&state.pool)
        .await?;
    sqlx::query("DELETE FROM project_access WHERE project_id = ?")
        .bind(id)
        .execute(&state.pool)
        .await?;
    sqlx::query("DELETE FROM projects WHERE id = ?")
        .bind(id)
        .execute(&state.pool)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Fetches a project and runs the tenant-scoped read assertion. The fetch is
/// deliberately unscoped so a cross-tenant probe surfaces as a violation,
/// not a silent 404.
pub(crate) async fn fetch_scoped_project(
    state: &AppState,
    tenant_id: Uuid,
    project_id: Uuid,
) -> AppResult<DbProject> {
    let record = DbProject::find_by_id(&state.pool, project_id)
        .await?
        .ok_or_else(|| AppError::not_found("project not found"))?;

    state.guard.assert_tenant_scoped_read(
        Some(record.tenant_id),
        tenant_id,
        "project",
        project_id,
    )?;

    Ok(record)
}
