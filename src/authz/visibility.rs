use std::collections::HashSet;

use sqlx::SqlitePool;
use uuid::Uuid;

use crate::errors::AppResult;
use crate::jwt::Identity;

/// Feature flags for the private-visibility filter. When a flag is off, no
/// filtering is applied and every in-scope resource is treated as
/// workspace-visible.
#[derive(Debug, Clone, Copy)]
pub struct VisibilityFlags {
    pub private_projects: bool,
    pub private_tasks: bool,
}

impl VisibilityFlags {
    pub fn from_env() -> Self {
        Self {
            private_projects: env_flag("PRIVATE_PROJECTS_FILTER", true),
            private_tasks: env_flag("PRIVATE_TASKS_FILTER", true),
        }
    }

    pub fn all_enabled() -> Self {
        Self {
            private_projects: true,
            private_tasks: true,
        }
    }
}

fn env_flag(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(value) => !matches!(value.to_lowercase().as_str(), "0" | "false" | "off"),
        Err(_) => default,
    }
}

/// The complete set of private project ids the user may see inside the
/// tenant: everything they created, everything they were granted, or every
/// private project when they are a tenant admin/super user. Callers include
/// a row iff its visibility is non-private OR its id is in this set.
pub async fn accessible_private_project_ids(
    pool: &SqlitePool,
    tenant_id: Uuid,
    ident: &Identity,
) -> AppResult<HashSet<Uuid>> {
    accessible_ids(
        pool,
        tenant_id,
        ident,
        "projects",
        "project_access",
        "project_id",
    )
    .await
}

pub async fn accessible_private_task_ids(
    pool: &SqlitePool,
    tenant_id: Uuid,
    ident: &Identity,
) -> AppResult<HashSet<Uuid>> {
    accessible_ids(pool, tenant_id, ident, "tasks", "task_access", "task_id").await
}

async fn accessible_ids(
    pool: &SqlitePool,
    tenant_id: Uuid,
    ident: &Identity,
    resource_table: &str,
    grant_table: &str,
    grant_column: &str,
) -> AppResult<HashSet<Uuid>> {
    let ids: Vec<Uuid> = if ident.role.is_tenant_admin() {
        sqlx::query_scalar(&format!(
            "SELECT id FROM {resource_table} WHERE tenant_id = ? AND visibility = 'private'"
        ))
        .bind(tenant_id)
        .fetch_all(pool)
        .await?
    } else {
        sqlx::query_scalar(&format!(
            "SELECT r.id FROM {resource_table} r \
             WHERE r.tenant_id = ? AND r.visibility = 'private' AND r.created_by = ? \
             UNION \
             SELECT g.{grant_column} FROM {grant_table} g \
             JOIN {resource_table} r ON r.id = g.{grant_column} \
             WHERE g.user_id = ? AND r.tenant_id = ? AND r.visibility = 'private'"
        ))
        .bind(tenant_id)
        .bind(ident.user_id)
        .bind(ident.user_id)
        .bind(tenant_id)
        .fetch_all(pool)
        .await?
    };

    Ok(ids.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_flag_parsing() {
        std::env::remove_var("VIS_TEST_FLAG");
        assert!(env_flag("VIS_TEST_FLAG", true));
        assert!(!env_flag("VIS_TEST_FLAG", false));

        std::env::set_var("VIS_TEST_FLAG", "false");
        assert!(!env_flag("VIS_TEST_FLAG", true));
        std::env::set_var("VIS_TEST_FLAG", "0");
        assert!(!env_flag("VIS_TEST_FLAG", true));
        std::env::set_var("VIS_TEST_FLAG", "1");
        assert!(env_flag("VIS_TEST_FLAG", false));
        std::env::remove_var("VIS_TEST_FLAG");
    }
}
