use sqlx::SqlitePool;
use uuid::Uuid;

use crate::errors::AppResult;
use crate::jwt::Identity;
use crate::models::access::AccessRole;
use crate::models::project::DbProject;
use crate::models::task::DbTask;
use crate::models::Visibility;

/// May the acting user see this task? True when the task is not private, or
/// the user created it, holds any explicit grant on it, or is a tenant
/// admin/super user.
pub async fn can_view_task(
    pool: &SqlitePool,
    task: &DbTask,
    ident: &Identity,
) -> AppResult<bool> {
    if Visibility::parse(&task.visibility) != Some(Visibility::Private) {
        return Ok(true);
    }
    if ident.role.is_tenant_admin() || task.created_by == ident.user_id {
        return Ok(true);
    }
    Ok(grant_role(pool, "task_access", "task_id", task.id, ident.user_id)
        .await?
        .is_some())
}

pub async fn can_view_project(
    pool: &SqlitePool,
    project: &DbProject,
    ident: &Identity,
) -> AppResult<bool> {
    if Visibility::parse(&project.visibility) != Some(Visibility::Private) {
        return Ok(true);
    }
    if ident.role.is_tenant_admin() || project.created_by == ident.user_id {
        return Ok(true);
    }
    Ok(
        grant_role(pool, "project_access", "project_id", project.id, ident.user_id)
            .await?
            .is_some(),
    )
}

/// May the acting user mutate this task's grants? Only the creator, a
/// holder of an explicit admin grant, or a tenant admin/super user.
pub async fn can_manage_task_access(
    pool: &SqlitePool,
    task: &DbTask,
    ident: &Identity,
) -> AppResult<bool> {
    if ident.role.is_tenant_admin() || task.created_by == ident.user_id {
        return Ok(true);
    }
    Ok(
        grant_role(pool, "task_access", "task_id", task.id, ident.user_id).await?
            == Some(AccessRole::Admin),
    )
}

pub async fn can_manage_project_access(
    pool: &SqlitePool,
    project: &DbProject,
    ident: &Identity,
) -> AppResult<bool> {
    if ident.role.is_tenant_admin() || project.created_by == ident.user_id {
        return Ok(true);
    }
    Ok(
        grant_role(pool, "project_access", "project_id", project.id, ident.user_id).await?
            == Some(AccessRole::Admin),
    )
}

/// May the acting user change the resource itself (not its grants)?
/// Creator, tenant admin/super user, or an editor/admin grantee.
pub async fn can_edit_task(
    pool: &SqlitePool,
    task: &DbTask,
    ident: &Identity,
) -> AppResult<bool> {
    if ident.role.is_tenant_admin() || task.created_by == ident.user_id {
        return Ok(true);
    }
    Ok(matches!(
        grant_role(pool, "task_access", "task_id", task.id, ident.user_id).await?,
        Some(AccessRole::Editor) | Some(AccessRole::Admin)
    ))
}

pub async fn can_edit_project(
    pool: &SqlitePool,
    project: &DbProject,
    ident: &Identity,
) -> AppResult<bool> {
    if ident.role.is_tenant_admin() || project.created_by == ident.user_id {
        return Ok(true);
    }
    Ok(matches!(
        grant_role(pool, "project_access", "project_id", project.id, ident.user_id).await?,
        Some(AccessRole::Editor) | Some(AccessRole::Admin)
    ))
}

async fn grant_role(
    pool: &SqlitePool,
    table: &str,
    resource_column: &str,
    resource_id: Uuid,
    user_id: Uuid,
) -> AppResult<Option<AccessRole>> {
    let role: Option<String> = sqlx::query_scalar(&format!(
        "SELECT role FROM {table} WHERE {resource_column} = ? AND user_id = ?"
    ))
    .bind(resource_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(role.as_deref().and_then(AccessRole::parse))
}
