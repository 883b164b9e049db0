use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::AppError;

/// Tenant lifecycle status. Suspended and deleted tenants reject logins and
/// cannot be impersonated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TenantStatus {
    Active,
    Suspended,
    Deleted,
}

impl TenantStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TenantStatus::Active => "active",
            TenantStatus::Suspended => "suspended",
            TenantStatus::Deleted => "deleted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(TenantStatus::Active),
            "suspended" => Some(TenantStatus::Suspended),
            "deleted" => Some(TenantStatus::Deleted),
            _ => None,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, TenantStatus::Active)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Tenant {
    pub id: Uuid,
    pub name: String,
    pub status: TenantStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct DbTenant {
    pub id: Uuid,
    pub name: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DbTenant> for Tenant {
    type Error = AppError;

    fn try_from(value: DbTenant) -> Result<Self, Self::Error> {
        let status = TenantStatus::parse(&value.status)
            .ok_or_else(|| AppError::internal(format!("unknown tenant status: {}", value.status)))?;

        Ok(Tenant {
            id: value.id,
            name: value.name,
            status,
            created_at: value.created_at,
            updated_at: value.updated_at,
        })
    }
}

impl DbTenant {
    pub async fn find_by_id(
        pool: &sqlx::SqlitePool,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, DbTenant>(
            "SELECT id, name, status, created_at, updated_at FROM tenants WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }
}
