use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use super::Visibility;
use crate::errors::AppError;
use crate::tenancy::TenantScoped;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Project {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub workspace_id: Option<Uuid>,
    pub name: String,
    pub description: Option<String>,
    pub visibility: Visibility,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct DbProject {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub workspace_id: Option<Uuid>,
    pub name: String,
    pub description: Option<String>,
    pub visibility: String,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DbProject> for Project {
    type Error = AppError;

    fn try_from(value: DbProject) -> Result<Self, Self::Error> {
        let visibility = Visibility::parse(&value.visibility).ok_or_else(|| {
            AppError::internal(format!("unknown project visibility: {}", value.visibility))
        })?;

        Ok(Project {
            id: value.id,
            tenant_id: value.tenant_id,
            workspace_id: value.workspace_id,
            name: value.name,
            description: value.description,
            visibility,
            created_by: value.created_by,
            created_at: value.created_at,
            updated_at: value.updated_at,
        })
    }
}

impl TenantScoped for DbProject {
    fn tenant_id(&self) -> Option<Uuid> {
        Some(self.tenant_id)
    }
}

impl DbProject {
    pub async fn find_by_id(
        pool: &sqlx::SqlitePool,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, DbProject>(
            "SELECT id, tenant_id, workspace_id, name, description, visibility, created_by, created_at, updated_at \
             FROM projects WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ProjectCreateRequest {
    #[schema(example = "Launch Planning")]
    pub name: String,
    #[schema(example = "Prepare milestones for the product launch.")]
    pub description: Option<String>,
    pub visibility: Option<Visibility>,
    pub workspace_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ProjectUpdateRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub visibility: Option<Visibility>,
}
