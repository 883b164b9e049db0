//! Impersonation session manager.
//!
//! A platform super user can assume a tenant context, or a specific tenant
//! user, for support work. The session state is a tagged union held in an
//! in-process store keyed by the super user's id; it is ephemeral and dies
//! with the process, like the HTTP session it models. All transitions go
//! through [`ImpersonationState::begin`] and [`ImpersonationState::end`] so
//! illegal state changes cannot be expressed.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::{AppError, AppResult};
use crate::models::user::UserRole;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ImpersonationSession {
    pub original_super_user_id: Uuid,
    pub original_super_user_email: String,
    /// None when impersonating a tenant context without a concrete user.
    pub impersonated_user_id: Option<Uuid>,
    pub impersonated_role: Option<UserRole>,
    pub impersonated_tenant_id: Uuid,
    pub started_at: DateTime<Utc>,
    /// Bound to the actor token's lifetime so a forgotten session cannot
    /// outlive its authentication.
    pub expires_at: DateTime<Utc>,
}

impl ImpersonationSession {
    pub fn duration_seconds(&self, now: DateTime<Utc>) -> i64 {
        (now - self.started_at).num_seconds().max(0)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ImpersonationState {
    Idle,
    Impersonating(ImpersonationSession),
}

impl ImpersonationState {
    pub fn is_active(&self) -> bool {
        matches!(self, ImpersonationState::Impersonating(_))
    }

    /// Idle -> Impersonating. Starting while a session is active is a
    /// conflict; at most one session exists per actor at any time.
    pub fn begin(&self, session: ImpersonationSession) -> AppResult<ImpersonationState> {
        match self {
            ImpersonationState::Idle => Ok(ImpersonationState::Impersonating(session)),
            ImpersonationState::Impersonating(_) => {
                Err(AppError::conflict("an impersonation session is already active"))
            }
        }
    }

    /// Impersonating -> Idle. Ending an idle state is a no-op; the prior
    /// session, if any, is handed back for auditing.
    pub fn end(&self) -> (ImpersonationState, Option<ImpersonationSession>) {
        match self {
            ImpersonationState::Idle => (ImpersonationState::Idle, None),
            ImpersonationState::Impersonating(session) => {
                (ImpersonationState::Idle, Some(session.clone()))
            }
        }
    }
}

/// Snapshot returned by the status endpoint. Built from the stored state and
/// nothing else, so the view can never diverge from the session.
#[derive(Debug, Serialize, ToSchema)]
pub struct ImpersonationStatus {
    pub is_impersonating: bool,
    #[serde(flatten)]
    pub session: Option<ImpersonationSession>,
}

impl From<&ImpersonationState> for ImpersonationStatus {
    fn from(state: &ImpersonationState) -> Self {
        match state {
            ImpersonationState::Idle => ImpersonationStatus {
                is_impersonating: false,
                session: None,
            },
            ImpersonationState::Impersonating(session) => ImpersonationStatus {
                is_impersonating: true,
                session: Some(session.clone()),
            },
        }
    }
}

/// In-process session store, keyed by the acting super user. Writes are
/// awaited before any HTTP response is produced, so an acknowledged
/// transition is always visible to the next request.
#[derive(Default)]
pub struct ImpersonationStore {
    sessions: RwLock<HashMap<Uuid, ImpersonationState>>,
}

impl ImpersonationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn state(&self, actor_id: Uuid) -> ImpersonationState {
        let sessions = self.sessions.read().await;
        sessions.get(&actor_id).cloned().unwrap_or(ImpersonationState::Idle)
    }

    pub async fn begin(&self, actor_id: Uuid, session: ImpersonationSession) -> AppResult<()> {
        let mut sessions = self.sessions.write().await;
        let current = sessions.get(&actor_id).cloned().unwrap_or(ImpersonationState::Idle);
        let next = current.begin(session)?;
        sessions.insert(actor_id, next);
        Ok(())
    }

    pub async fn end(&self, actor_id: Uuid) -> Option<ImpersonationSession> {
        let mut sessions = self.sessions.write().await;
        let current = sessions.remove(&actor_id).unwrap_or(ImpersonationState::Idle);
        let (_, ended) = current.end();
        ended
    }

    /// Sweeps an expired session to Idle and returns it so the caller can
    /// write the expiry audit event.
    pub async fn take_expired(
        &self,
        actor_id: Uuid,
        now: DateTime<Utc>,
    ) -> Option<ImpersonationSession> {
        let mut sessions = self.sessions.write().await;
        let expired = match sessions.get(&actor_id) {
            Some(ImpersonationState::Impersonating(session)) if session.is_expired(now) => {
                session.clone()
            }
            _ => return None,
        };
        sessions.remove(&actor_id);
        Some(expired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn session(started_at: DateTime<Utc>, ttl_hours: i64) -> ImpersonationSession {
        ImpersonationSession {
            original_super_user_id: Uuid::new_v4(),
            original_super_user_email: "root@platform.test".to_string(),
            impersonated_user_id: Some(Uuid::new_v4()),
            impersonated_role: Some(UserRole::Employee),
            impersonated_tenant_id: Uuid::new_v4(),
            started_at,
            expires_at: started_at + Duration::hours(ttl_hours),
        }
    }

    #[test]
    fn begin_from_idle_then_conflict_on_second_begin() {
        let now = Utc::now();
        let state = ImpersonationState::Idle;
        let active = state.begin(session(now, 1)).unwrap();
        assert!(active.is_active());

        assert!(matches!(
            active.begin(session(now, 1)),
            Err(AppError::Conflict(_))
        ));
    }

    #[test]
    fn end_clears_and_is_idempotent() {
        let now = Utc::now();
        let active = ImpersonationState::Idle.begin(session(now, 1)).unwrap();

        let (idle, ended) = active.end();
        assert!(!idle.is_active());
        assert!(ended.is_some());

        let (still_idle, nothing) = idle.end();
        assert!(!still_idle.is_active());
        assert!(nothing.is_none());
    }

    #[test]
    fn status_mirrors_state_exactly() {
        let now = Utc::now();
        let idle_status = ImpersonationStatus::from(&ImpersonationState::Idle);
        assert!(!idle_status.is_impersonating);
        assert!(idle_status.session.is_none());

        let s = session(now, 1);
        let active = ImpersonationState::Impersonating(s.clone());
        let status = ImpersonationStatus::from(&active);
        assert!(status.is_impersonating);
        let got = status.session.unwrap();
        assert_eq!(got.impersonated_tenant_id, s.impersonated_tenant_id);
        assert_eq!(got.impersonated_user_id, s.impersonated_user_id);
    }

    #[tokio::test]
    async fn store_round_trip() {
        let store = ImpersonationStore::new();
        let actor = Uuid::new_v4();
        let now = Utc::now();

        assert!(!store.state(actor).await.is_active());
        store.begin(actor, session(now, 1)).await.unwrap();
        assert!(store.state(actor).await.is_active());

        assert!(store.begin(actor, session(now, 1)).await.is_err());

        let ended = store.end(actor).await;
        assert!(ended.is_some());
        assert!(!store.state(actor).await.is_active());
        assert!(store.end(actor).await.is_none());
    }

    #[tokio::test]
    async fn expired_sessions_are_swept() {
        let store = ImpersonationStore::new();
        let actor = Uuid::new_v4();
        let started = Utc::now() - Duration::hours(2);

        store.begin(actor, session(started, 1)).await.unwrap();
        let swept = store.take_expired(actor, Utc::now()).await;
        assert!(swept.is_some());
        assert!(!store.state(actor).await.is_active());

        // a live session is left alone
        store.begin(actor, session(Utc::now(), 1)).await.unwrap();
        assert!(store.take_expired(actor, Utc::now()).await.is_none());
        assert!(store.state(actor).await.is_active());
    }
}
