use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use super::Visibility;
use crate::errors::AppError;
use crate::tenancy::TenantScoped;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Task {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub project_id: Uuid,
    pub title: String,
    pub status: String,
    pub visibility: Visibility,
    pub created_by: Uuid,
    pub assignee: Option<Uuid>,
    #[schema(format = DateTime, example = "2026-08-10T10:00:00Z")]
    pub due_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct DbTask {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub project_id: Uuid,
    pub title: String,
    pub status: String,
    pub visibility: String,
    pub created_by: Uuid,
    pub assignee: Option<Uuid>,
    pub due_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DbTask> for Task {
    type Error = AppError;

    fn try_from(value: DbTask) -> Result<Self, Self::Error> {
        let visibility = Visibility::parse(&value.visibility).ok_or_else(|| {
            AppError::internal(format!("unknown task visibility: {}", value.visibility))
        })?;

        Ok(Task {
            id: value.id,
            tenant_id: value.tenant_id,
            project_id: value.project_id,
            title: value.title,
            status: value.status,
            visibility,
            created_by: value.created_by,
            assignee: value.assignee,
            due_date: value.due_date,
            created_at: value.created_at,
            updated_at: value.updated_at,
        })
    }
}

impl TenantScoped for DbTask {
    fn tenant_id(&self) -> Option<Uuid> {
        Some(self.tenant_id)
    }
}

impl DbTask {
    pub async fn find_by_id(
        pool: &sqlx::SqlitePool,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, DbTask>(
            "SELECT id, tenant_id, project_id, title, status, visibility, created_by, assignee, due_date, created_at, updated_at \
             FROM tasks WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct TaskCreateRequest {
    #[schema(example = "Define launch checklist")]
    pub title: String,
    #[schema(example = "pending")]
    pub status: Option<String>,
    pub visibility: Option<Visibility>,
    pub assignee: Option<Uuid>,
    #[schema(format = DateTime, example = "2026-08-10T10:00:00Z")]
    pub due_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct TaskUpdateRequest {
    pub title: Option<String>,
    pub status: Option<String>,
    pub visibility: Option<Visibility>,
    pub assignee: Option<Uuid>,
    #[schema(format = DateTime, example = "2026-08-20T10:00:00Z")]
    pub due_date: Option<DateTime<Utc>>,
}
