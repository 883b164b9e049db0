use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::AppError;

/// Platform role. `SuperUser` is a platform operator with no tenant of its
/// own; the other roles live inside a tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    SuperUser,
    Admin,
    Employee,
    Client,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::SuperUser => "super_user",
            UserRole::Admin => "admin",
            UserRole::Employee => "employee",
            UserRole::Client => "client",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "super_user" => Some(UserRole::SuperUser),
            "admin" => Some(UserRole::Admin),
            "employee" => Some(UserRole::Employee),
            "client" => Some(UserRole::Client),
            _ => None,
        }
    }

    pub fn is_super_user(&self) -> bool {
        matches!(self, UserRole::SuperUser)
    }

    /// Admin-or-above. Used for the visibility and grant-management
    /// overrides within a tenant.
    pub fn is_tenant_admin(&self) -> bool {
        matches!(self, UserRole::Admin | UserRole::SuperUser)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct User {
    pub id: Uuid,
    pub tenant_id: Option<Uuid>,
    pub name: String,
    pub email: String,
    pub role: UserRole,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct DbUser {
    pub id: Uuid,
    pub tenant_id: Option<Uuid>,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DbUser> for User {
    type Error = AppError;

    fn try_from(value: DbUser) -> Result<Self, Self::Error> {
        let role = UserRole::parse(&value.role)
            .ok_or_else(|| AppError::internal(format!("unknown user role: {}", value.role)))?;

        Ok(User {
            id: value.id,
            tenant_id: value.tenant_id,
            name: value.name,
            email: value.email,
            role,
            is_active: value.is_active,
            created_at: value.created_at,
            updated_at: value.updated_at,
        })
    }
}

impl DbUser {
    pub async fn find_by_id(
        pool: &sqlx::SqlitePool,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, DbUser>(
            "SELECT id, tenant_id, name, email, password_hash, role, is_active, created_at, updated_at \
             FROM users WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    pub async fn find_by_email(
        pool: &sqlx::SqlitePool,
        email: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, DbUser>(
            "SELECT id, tenant_id, name, email, password_hash, role, is_active, created_at, updated_at \
             FROM users WHERE email = ?",
        )
        .bind(email)
        .fetch_optional(pool)
        .await
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterRequest {
    #[schema(example = "Acme Corp")]
    pub tenant_name: String,
    #[schema(example = "Ada Lovelace")]
    pub name: String,
    #[schema(example = "ada@example.com")]
    pub email: String,
    #[schema(example = "S3cureP@ssw0rd")]
    pub password: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    #[schema(example = "ada@example.com")]
    pub email: String,
    #[schema(example = "S3cureP@ssw0rd")]
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AuthResponse {
    pub token: String,
    pub user: User,
}
