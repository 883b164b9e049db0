use std::sync::Arc;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use serde_json::json;
use uuid::Uuid;

use crate::app::AppState;
use crate::audit::{self, AuditEventType};
use crate::errors::AppError;
use crate::impersonation::ImpersonationState;
use crate::models::user::{DbUser, UserRole};
use crate::utils::utc_now;

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: Arc<Vec<u8>>,
    pub exp_hours: i64,
}

impl JwtConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let secret = std::env::var("JWT_SECRET")
            .map_err(|_| AppError::configuration("JWT_SECRET not set"))?;
        let exp_hours = std::env::var("JWT_EXP_HOURS")
            .map(|val| val.parse::<i64>())
            .unwrap_or(Ok(24))
            .map_err(|_| AppError::configuration("JWT_EXP_HOURS must be a valid integer"))?;

        Ok(Self {
            secret: Arc::new(secret.into_bytes()),
            exp_hours,
        })
    }

    pub fn encode(&self, user_id: Uuid) -> Result<String, AppError> {
        use chrono::Duration;

        let now = utc_now();
        let exp = now + Duration::hours(self.exp_hours);

        let claims = Claims {
            sub: user_id,
            exp: exp.timestamp() as usize,
            iat: now.timestamp() as usize,
        };

        jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(&self.secret),
        )
        .map_err(|err| AppError::token(err.to_string()))
    }

    pub fn decode(&self, token: &str) -> Result<Claims, AppError> {
        let mut validation = Validation::default();
        validation.validate_exp = true;

        jsonwebtoken::decode::<Claims>(
            token,
            &DecodingKey::from_secret(&self.secret),
            &validation,
        )
        .map(|data| data.claims)
        .map_err(|err| AppError::token(err.to_string()))
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub exp: usize,
    pub iat: usize,
}

/// The resolved, effective identity of a request.
///
/// The token always names the real authenticated user (`actor_user_id`);
/// when that user is a super user with an active impersonation session, the
/// effective `user_id`/`tenant_id`/`role` are substituted from the session
/// so downstream code sees the impersonated identity while the audit chain
/// keeps pointing at the real actor.
#[derive(Debug, Clone)]
pub struct Identity {
    pub user_id: Uuid,
    pub tenant_id: Option<Uuid>,
    pub role: UserRole,
    pub actor_user_id: Uuid,
    pub actor_role: UserRole,
    pub is_impersonating: bool,
}

impl Identity {
    /// Gate for the impersonation surface. Checked against the REAL actor,
    /// not the effective role, so a super user can still exit a session
    /// while impersonating a lesser role.
    pub fn require_super_user(&self) -> Result<(), AppError> {
        if self.actor_role.is_super_user() {
            Ok(())
        } else {
            Err(AppError::forbidden("super user privilege required"))
        }
    }
}

#[async_trait]
impl FromRequestParts<AppState> for Identity {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or_else(|| AppError::unauthorized("Authorization header missing"))?;

        let claims = state.jwt.decode(token)?;

        let actor = DbUser::find_by_id(&state.pool, claims.sub)
            .await?
            .ok_or_else(|| AppError::unauthorized("unknown user"))?;
        if !actor.is_active {
            return Err(AppError::unauthorized("user is deactivated"));
        }
        let actor_role = UserRole::parse(&actor.role)
            .ok_or_else(|| AppError::internal(format!("unknown user role: {}", actor.role)))?;

        // A session that outlived its TTL is swept to Idle here, with the
        // gap recorded, before the effective identity is computed.
        if let Some(expired) = state.impersonation.take_expired(actor.id, utc_now()).await {
            audit::record_event(
                &state.pool,
                expired.impersonated_tenant_id,
                Some(actor.id),
                AuditEventType::ImpersonationExpired,
                "impersonation session expired without explicit exit",
                json!({
                    "impersonated_user_id": expired.impersonated_user_id,
                    "started_at": expired.started_at,
                    "expires_at": expired.expires_at,
                }),
            )
            .await;
        }

        match state.impersonation.state(actor.id).await {
            ImpersonationState::Impersonating(session) => Ok(Identity {
                user_id: session.impersonated_user_id.unwrap_or(actor.id),
                tenant_id: Some(session.impersonated_tenant_id),
                role: session.impersonated_role.unwrap_or(actor_role),
                actor_user_id: actor.id,
                actor_role,
                is_impersonating: true,
            }),
            ImpersonationState::Idle => Ok(Identity {
                user_id: actor.id,
                tenant_id: actor.tenant_id,
                role: actor_role,
                actor_user_id: actor.id,
                actor_role,
                is_impersonating: false,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> JwtConfig {
        JwtConfig {
            secret: Arc::new(b"unit-test-secret".to_vec()),
            exp_hours: 1,
        }
    }

    #[test]
    fn encode_decode_round_trip() {
        let cfg = config();
        let user_id = Uuid::new_v4();
        let token = cfg.encode(user_id).unwrap();
        let claims = cfg.decode(&token).unwrap();
        assert_eq!(claims.sub, user_id);
    }

    #[test]
    fn tampered_token_rejected() {
        let cfg = config();
        let token = cfg.encode(Uuid::new_v4()).unwrap();
        let other = JwtConfig {
            secret: Arc::new(b"different-secret".to_vec()),
            exp_hours: 1,
        };
        assert!(other.decode(&token).is_err());
    }

    #[test]
    fn super_user_check_follows_the_actor() {
        let ident = Identity {
            user_id: Uuid::new_v4(),
            tenant_id: None,
            role: UserRole::SuperUser,
            actor_user_id: Uuid::new_v4(),
            actor_role: UserRole::SuperUser,
            is_impersonating: false,
        };
        assert!(ident.require_super_user().is_ok());

        // while impersonating an employee the actor is still the super user
        let impersonating = Identity {
            role: UserRole::Employee,
            is_impersonating: true,
            ..ident.clone()
        };
        assert!(impersonating.require_super_user().is_ok());

        let admin = Identity {
            role: UserRole::Admin,
            actor_role: UserRole::Admin,
            ..ident
        };
        assert!(admin.require_super_user().is_err());
    }
}
