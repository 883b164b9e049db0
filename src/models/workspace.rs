use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// Organizational grouping inside a tenant. Workspaces are NOT a visibility
/// boundary; the tenancy guard enforces that distinction.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, FromRow)]
pub struct Workspace {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub is_primary: bool,
    pub created_at: DateTime<Utc>,
}

impl Workspace {
    /// Looks up the primary workspace of a tenant directly from storage.
    /// Zero or many primaries are tolerated: the earliest-created primary
    /// wins, then the earliest workspace, then None.
    pub async fn primary_for_tenant(
        pool: &sqlx::SqlitePool,
        tenant_id: Uuid,
    ) -> Result<Option<Uuid>, sqlx::Error> {
        sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM workspaces WHERE tenant_id = ? \
             ORDER BY is_primary DESC, created_at ASC LIMIT 1",
        )
        .bind(tenant_id)
        .fetch_optional(pool)
        .await
    }
}
