use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::AppError;

/// Role attached to an explicit access grant. Roles replace each other on
/// PATCH; they never stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AccessRole {
    Viewer,
    Editor,
    Admin,
}

impl AccessRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessRole::Viewer => "viewer",
            AccessRole::Editor => "editor",
            AccessRole::Admin => "admin",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "viewer" => Some(AccessRole::Viewer),
            "editor" => Some(AccessRole::Editor),
            "admin" => Some(AccessRole::Admin),
            _ => None,
        }
    }
}

/// An explicit grant binding a user to a task or project. `resource_id` is
/// the task or project id depending on which table the row came from.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AccessGrant {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub resource_id: Uuid,
    pub user_id: Uuid,
    pub role: AccessRole,
    pub invited_by_user_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct DbAccessGrant {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub resource_id: Uuid,
    pub user_id: Uuid,
    pub role: String,
    pub invited_by_user_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<DbAccessGrant> for AccessGrant {
    type Error = AppError;

    fn try_from(value: DbAccessGrant) -> Result<Self, Self::Error> {
        let role = AccessRole::parse(&value.role)
            .ok_or_else(|| AppError::internal(format!("unknown access role: {}", value.role)))?;

        Ok(AccessGrant {
            id: value.id,
            tenant_id: value.tenant_id,
            resource_id: value.resource_id,
            user_id: value.user_id,
            role,
            invited_by_user_id: value.invited_by_user_id,
            created_at: value.created_at,
        })
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AccessInviteRequest {
    pub user_id: Uuid,
    pub role: AccessRole,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AccessUpdateRequest {
    pub role: AccessRole,
}
