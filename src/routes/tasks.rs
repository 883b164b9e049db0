use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz;
use crate::errors::{AppError, AppResult};
use crate::jwt::Identity;
use crate::models::task::{DbTask, Task, TaskCreateRequest, TaskUpdateRequest};
use crate::models::Visibility;
use crate::routes::projects::fetch_scoped_project;
use crate::utils::utc_now;

#[utoipa::path(
    get,
    path = "/projects/{project_id}/tasks",
    tag = "Tasks",
    params(("project_id" = Uuid, Path, description = "Project id")),
    responses((status = 200, description = "List tasks visible to the caller", body = [Task])),
    security(("bearerAuth" = []))
)]
pub async fn list_tasks(
    State(state): State<AppState>,
    ident: Identity,
    Path(project_id): Path<Uuid>,
) -> AppResult<Json<Vec<Task>>> {
    let tenant_id = state.guard.require_tenant_context(ident.tenant_id)?;
    let project = fetch_scoped_project(&state, tenant_id, project_id).await?;
    if !authz::can_view_project(&state.pool, &project, &ident).await? {
        return Err(AppError::forbidden("not allowed to view this project"));
    }

    let rows = sqlx::query_as::<_, DbTask>(
        "SELECT id, tenant_id, project_id, title, status, visibility, created_by, assignee, due_date, created_at, updated_at \
         FROM tasks WHERE project_id = ? AND tenant_id = ? ORDER BY created_at DESC",
    )
    .bind(project_id)
    .bind(tenant_id)
    .fetch_all(&state.pool)
    .await?;

    let rows = if state.visibility.private_tasks {
        let accessible =
            authz::accessible_private_task_ids(&state.pool, tenant_id, &ident).await?;
        rows.into_iter()
            .filter(|t| t.visibility != "private" || accessible.contains(&t.id))
            .collect()
    } else {
        rows
    };

    let tasks: Vec<Task> = rows
        .into_iter()
        .map(Task::try_from)
        .collect::<Result<_, _>>()?;

    Ok(Json(tasks))
}

#[utoipa::path(
    post,
    path = "/projects/{project_id}/tasks",
    tag = "Tasks",
    params(("project_id" = Uuid, Path, description = "Project id")),
    request_body = TaskCreateRequest,
    responses((status = 201, description = "Task created", body = Task)),
    security(("bearerAuth" = []))
)]
pub async fn create_task(
    State(state): State<AppState>,
    ident: Identity,
    Path(project_id): Path<Uuid>,
    Json(payload): Json<TaskCreateRequest>,
) -> AppResult<(StatusCode, Json<Task>)> {
    let tenant_id = state.guard.require_tenant_context(ident.tenant_id)?;
    let project = fetch_scoped_project(&state, tenant_id, project_id).await?;
    if !authz::can_edit_project(&state.pool, &project, &ident).await? {
        return Err(AppError::forbidden("not allowed to add tasks to this project"));
    }

    if let Some(assignee) = payload.assignee {
        ensure_same_tenant_user(&state, tenant_id, assignee).await?;
    }

    let now = utc_now();
    let record = DbTask {
        id: Uuid::new_v4(),
        tenant_id,
        project_id,
        title: payload.title,
        status: payload.status.unwrap_or_else(|| "pending".to_string()),
        visibility: payload
            .visibility
            .unwrap_or(Visibility::Workspace)
            .as_str()
            .to_string(),
        created_by: ident.user_id,
        assignee: payload.assignee,
        due_date: payload.due_date,
        created_at: now,
        updated_at: now,
    };

    state.guard.assert_tenant_id_on_insert(&record, "tasks")?;
    state
        .guard
        .assert_tenant_scoped_write(&record, tenant_id, "tasks")?;

    sqlx::query(
        "INSERT INTO tasks (id, tenant_id, project_id, title, status, visibility, created_by, assignee, due_date, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(record.id)
    .bind(record.tenant_id)
    .bind(record.project_id)
    .bind(&record.title)
    .bind(&record.status)
    .bind(&record.visibility)
    .bind(record.created_by)
    .bind(record.assignee)
    .bind(record.due_date)
    .bind(record.created_at)
    .bind(record.updated_at)
    .execute(&state.pool)
    .await?;

    let task: Task = record.try_into()?;
    Ok((StatusCode::CREATED, Json(task)))
}

#[utoipa::path(
    get,
    path = "/projects/{project_id}/tasks/{id}",
    tag = "Tasks",
    params(
        ("project_id" = Uuid, Path, description = "Project id"),
        ("id" = Uuid, Path, description = "Task id")
    ),
    responses(
        (status = 200, description = "Task detail", body = Task),
        (status = 403, description = "Cross-tenant access or private task"),
        (status = 404, description = "Task not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_task(
    State(state): State<AppState>,
    ident: Identity,
    Path((project_id, id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<Task>> {
    let tenant_id = state.guard.require_tenant_context(ident.tenant_id)?;
    let record = fetch_scoped_task(&state, tenant_id, project_id, id).await?;

    if !authz::can_view_task(&state.pool, &record, &ident).await? {
        return Err(AppError::forbidden("not allowed to view this task"));
    }

    let task: Task = record.try_into()?;
    Ok(Json(task))
}

#[utoipa::path(
    patch,
    path = "/projects/{project_id}/tasks/{id}",
    tag = "Tasks",
    params(
        ("project_id" = Uuid, Path, description = "Project id"),
        ("id" = Uuid, Path, description = "Task id")
    ),
    request_body = TaskUpdateRequest,
    responses((status = 200, description = "Task updated", body = Task)),
    security(("bearerAuth" = []))
)]
pub async fn update_task(
    State(state): State<AppState>,
    ident: Identity,
    Path((project_id, id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<TaskUpdateRequest>,
) -> AppResult<Json<Task>> {
    let tenant_id = state.guard.require_tenant_context(ident.tenant_id)?;
    let mut record = fetch_scoped_task(&state, tenant_id, project_id, id).await?;

    state
        .guard
        .assert_tenant_ownership(Some(record.tenant_id), tenant_id, "task", id)?;
    if !authz::can_edit_task(&state.pool, &record, &ident).await? {
        return Err(AppError::forbidden("not allowed to modify this task"));
    }

    if let Some(assignee) = payload.assignee {
        ensure_same_tenant_user(&state, tenant_id, assignee).await?;
        record.assignee = Some(assignee);
    }
    if let Some(title) = payload.title {
        record.title = title;
    }
    if let Some(status) = payload.status {
        record.status = status;
    }
    if let Some(visibility) = payload.visibility {
        record.visibility = visibility.as_str().to_string();
    }
    if let Some(due_date) = payload.due_date {
        record.due_date = Some(due_date);
    }
    record.updated_at = utc_now();

    state
        .guard
        .assert_tenant_scoped_write(&record, tenant_id, "tasks")?;

    sqlx::query(
        "UPDATE tasks SET title = ?, status = ?, visibility = ?, assignee = ?, due_date = ?, updated_at = ? WHERE id = ?",
    )
    .bind(&record.title)
    .bind(&record.status)
    .bind(&record.visibility)
    .bind(record.assignee)
    .bind(record.due_date)
    .bind(record.updated_at)
    .bind(record.id)
    .execute(&state.pool)
    .await?;

    let task: Task = record.try_into()?;
    Ok(Json(task))
}

#[utoipa::path(
    delete,
    path = "/projects/{project_id}/tasks/{id}",
    tag = "Tasks",
    params(
        ("project_id" = Uuid, Path, description = "Project id"),
        ("id" = Uuid, Path, description = "Task id")
    ),
    responses((status = 204, description = "Task deleted")),
    security(("bearerAuth" = []))
)]
pub async fn delete_task(
    State(state): State<AppState>,
    ident: Identity,
    Path((project_id, id)): Path<(Uuid, Uuid)>,
) -> AppResult<StatusCode> {
    let tenant_id = state.guard.require_tenant_context(ident.tenant_id)?;
    let record = fetch_scoped_task(&state, tenant_id, project_id, id).await?;

    state
        .guard
        .assert_tenant_ownership(Some(record.tenant_id), tenant_id, "task", id)?;
    if !authz::can_manage_task_access(&state.pool, &record, &ident).await? {
        return Err(AppError::forbidden("not allowed to delete this task"));
    }

    sqlx::query("DELETE FROM task_access WHERE task_id = ?")
        .bind(id)
        .execute(&state.pool)
        .await?;
    sqlx::query("DELETE FROM tasks WHERE id = ?")
        .bind(id)
        .execute(&state.pool)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Unscoped fetch followed by the guard assertion, so cross-tenant probes
/// fail closed instead of blending into 404s.
pub(crate) async fn fetch_scoped_task(
    state: &AppState,
    tenant_id: Uuid,
    project_id: Uuid,
    task_id: Uuid,
) -> AppResult<DbTask> {
    let record = DbTask::find_by_id(&state.pool, task_id)
        .await?
        .ok_or_else(|| AppError::not_found("task not found"))?;

    state
        .guard
        .assert_tenant_scoped_read(Some(record.tenant_id), tenant_id, "task", task_id)?;

    if record.project_id != project_id {
        return Err(AppError::not_found("task not found in this project"));
    }

    Ok(record)
}

async fn ensure_same_tenant_user(
    state: &AppState,
    tenant_id: Uuid,
    user_id: Uuid,
) -> AppResult<()> {
    let user_tenant: Option<Option<Uuid>> =
        sqlx::query_scalar("SELECT tenant_id FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&state.pool)
            .await?;

    match user_tenant {
        None => Err(AppError::not_found("user not found")),
        Some(Some(t)) if t == tenant_id => Ok(()),
        Some(_) => Err(AppError::bad_request(
            "user does not belong to this tenant",
        )),
    }
}
