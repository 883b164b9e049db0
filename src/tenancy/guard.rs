use serde_json::Value;
use uuid::Uuid;

use super::{GuardMode, TenantScoped};
use crate::errors::{AppError, AppResult};

/// Names the realtime room for a conversation. Rooms embed the tenant id so
/// a subscription can never straddle tenants.
pub fn tenant_room(tenant_id: Uuid, conversation_id: Uuid) -> String {
    format!("tenant:{tenant_id}:conversation:{conversation_id}")
}

/// Runtime assertions every route calls before trusting tenant-scoped data.
///
/// Two classes of failure are distinguished deliberately:
/// - a tenant id MISMATCH is a cross-tenant leak and is fatal in every mode;
/// - a MISSING tenant id is a data-integrity gap, handled per [`GuardMode`].
#[derive(Debug, Clone)]
pub struct TenancyGuard {
    mode: GuardMode,
}

impl TenancyGuard {
    pub fn new(mode: GuardMode) -> Self {
        Self { mode }
    }

    pub fn from_env() -> Self {
        Self::new(GuardMode::from_env())
    }

    pub fn mode(&self) -> GuardMode {
        self.mode
    }

    /// Resolves the effective tenant id or fails the request. Absence of
    /// tenant context is fatal regardless of mode; no tenant-scoped request
    /// may proceed without it.
    pub fn require_tenant_context(&self, tenant_id: Option<Uuid>) -> AppResult<Uuid> {
        tenant_id.ok_or_else(|| {
            AppError::tenant_context_missing("request has no effective tenant")
        })
    }

    /// Checks that an insert payload carries a tenant id. Mode-dependent:
    /// Enforce rejects, Warn logs, Off ignores.
    pub fn assert_tenant_id_on_insert(
        &self,
        payload: &impl TenantScoped,
        table: &str,
    ) -> AppResult<()> {
        if payload.tenant_id().is_some() {
            return Ok(());
        }
        self.integrity_gap(format!("insert into {table} is missing tenant_id"))
    }

    /// Validates a row read back from storage against the effective tenant.
    /// A null stored tenant id is an integrity gap (mode-dependent); a
    /// mismatch is a cross-tenant leak and always fatal.
    pub fn assert_tenant_scoped_read(
        &self,
        entity_tenant_id: Option<Uuid>,
        expected_tenant_id: Uuid,
        entity_type: &str,
        entity_id: Uuid,
    ) -> AppResult<()> {
        match entity_tenant_id {
            None => self.integrity_gap(format!(
                "{entity_type} {entity_id} has no tenant_id on read"
            )),
            Some(actual) if actual != expected_tenant_id => {
                Err(AppError::tenant_violation(format!(
                    "{entity_type} {entity_id} belongs to another tenant"
                )))
            }
            Some(_) => Ok(()),
        }
    }

    /// Mirror of the read assertion for write payloads.
    pub fn assert_tenant_scoped_write(
        &self,
        payload: &impl TenantScoped,
        expected_tenant_id: Uuid,
        table: &str,
    ) -> AppResult<()> {
        match payload.tenant_id() {
            None => self.integrity_gap(format!("write to {table} is missing tenant_id")),
            Some(actual) if actual != expected_tenant_id => Err(AppError::tenant_violation(
                format!("write to {table} is scoped to another tenant"),
            )),
            Some(_) => Ok(()),
        }
    }

    /// Called immediately before update/delete. Always fatal, in every mode:
    /// a missing stored tenant id is treated the same as a mismatch here
    /// because the row is about to be mutated.
    pub fn assert_tenant_ownership(
        &self,
        entity_tenant_id: Option<Uuid>,
        expected_tenant_id: Uuid,
        entity_type: &str,
        entity_id: Uuid,
    ) -> AppResult<()> {
        match entity_tenant_id {
            Some(actual) if actual == expected_tenant_id => Ok(()),
            _ => Err(AppError::tenant_violation(format!(
                "{entity_type} {entity_id} is not owned by the acting tenant"
            ))),
        }
    }

    /// Rejects client-supplied tenant ids in request bodies or query
    /// strings. The tenant id must only ever originate from authenticated
    /// session context. Enforce rejects; Warn logs; Off ignores.
    pub fn assert_no_client_tenant_id(
        &self,
        body: Option<&Value>,
        query: &str,
        context: &str,
    ) -> AppResult<()> {
        let mut offenders: Vec<&str> = Vec::new();

        if let Some(Value::Object(map)) = body {
            if map.contains_key("tenant_id") || map.contains_key("tenantId") {
                offenders.push("body");
            }
        }
        if query_has_tenant_id(query) {
            offenders.push("query");
        }

        if offenders.is_empty() {
            return Ok(());
        }
        self.integrity_gap(format!(
            "client-supplied tenant id in {} ({context})",
            offenders.join(" and ")
        ))
    }

    /// Verifies the acting user may see a conversation: same tenant (always
    /// fatal on mismatch) and enrolled as a member.
    pub fn assert_chat_membership(
        &self,
        conversation_tenant_id: Uuid,
        expected_tenant_id: Uuid,
        member_ids: &[Uuid],
        user_id: Uuid,
        conversation_id: Uuid,
    ) -> AppResult<()> {
        if conversation_tenant_id != expected_tenant_id {
            return Err(AppError::tenant_violation(format!(
                "conversation {conversation_id} belongs to another tenant"
            )));
        }
        if !member_ids.contains(&user_id) {
            return Err(AppError::forbidden("not a member of this conversation"));
        }
        Ok(())
    }

    /// Validates that a realtime room name is scoped to the acting tenant
    /// before anything is published to it.
    pub fn assert_tenant_scoped_room(&self, room: &str, tenant_id: Uuid) -> AppResult<()> {
        let prefix = format!("tenant:{tenant_id}:");
        if room.starts_with(&prefix) {
            Ok(())
        } else {
            Err(AppError::tenant_violation(format!(
                "room {room} is not scoped to the acting tenant"
            )))
        }
    }

    fn integrity_gap(&self, message: String) -> AppResult<()> {
        match self.mode {
            GuardMode::Enforce => Err(AppError::tenant_violation(message)),
            GuardMode::Warn => {
                tracing::warn!(target: "tenancy", "{message}");
                Ok(())
            }
            GuardMode::Off => Ok(()),
        }
    }
}

fn query_has_tenant_id(query: &str) -> bool {
    query.split('&').any(|pair| {
        let key = pair.split('=').next().unwrap_or("");
        key == "tenant_id" || key == "tenantId"
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Payload {
        tenant_id: Option<Uuid>,
    }

    impl TenantScoped for Payload {
        fn tenant_id(&self) -> Option<Uuid> {
            self.tenant_id
        }
    }

    fn guards() -> (TenancyGuard, TenancyGuard, TenancyGuard) {
        (
            TenancyGuard::new(GuardMode::Off),
            TenancyGuard::new(GuardMode::Warn),
            TenancyGuard::new(GuardMode::Enforce),
        )
    }

    #[test]
    fn tenant_context_is_required_in_every_mode() {
        let (off, warn, enforce) = guards();
        for guard in [off, warn, enforce] {
            assert!(matches!(
                guard.require_tenant_context(None),
                Err(AppError::TenantContextMissing(_))
            ));
        }
        let id = Uuid::new_v4();
        let guard = TenancyGuard::new(GuardMode::Enforce);
        assert_eq!(guard.require_tenant_context(Some(id)).unwrap(), id);
    }

    #[test]
    fn missing_tenant_id_on_insert_is_mode_dependent() {
        let (off, warn, enforce) = guards();
        let payload = Payload { tenant_id: None };

        assert!(off.assert_tenant_id_on_insert(&payload, "tasks").is_ok());
        assert!(warn.assert_tenant_id_on_insert(&payload, "tasks").is_ok());
        assert!(matches!(
            enforce.assert_tenant_id_on_insert(&payload, "tasks"),
            Err(AppError::TenantViolation(_))
        ));

        let ok = Payload {
            tenant_id: Some(Uuid::new_v4()),
        };
        assert!(enforce.assert_tenant_id_on_insert(&ok, "tasks").is_ok());
    }

    #[test]
    fn cross_tenant_read_fails_in_every_mode() {
        let (off, warn, enforce) = guards();
        let expected = Uuid::new_v4();
        let other = Uuid::new_v4();
        let entity = Uuid::new_v4();

        for guard in [off, warn, enforce] {
            assert!(matches!(
                guard.assert_tenant_scoped_read(Some(other), expected, "task", entity),
                Err(AppError::TenantViolation(_))
            ));
        }
    }

    #[test]
    fn null_tenant_on_read_is_mode_dependent() {
        let (off, warn, enforce) = guards();
        let expected = Uuid::new_v4();
        let entity = Uuid::new_v4();

        assert!(off
            .assert_tenant_scoped_read(None, expected, "task", entity)
            .is_ok());
        assert!(warn
            .assert_tenant_scoped_read(None, expected, "task", entity)
            .is_ok());
        assert!(enforce
            .assert_tenant_scoped_read(None, expected, "task", entity)
            .is_err());
    }

    #[test]
    fn cross_tenant_write_fails_in_every_mode() {
        let (off, warn, enforce) = guards();
        let expected = Uuid::new_v4();
        let payload = Payload {
            tenant_id: Some(Uuid::new_v4()),
        };

        for guard in [off, warn, enforce] {
            assert!(matches!(
                guard.assert_tenant_scoped_write(&payload, expected, "projects"),
                Err(AppError::TenantViolation(_))
            ));
        }
    }

    #[test]
    fn ownership_is_always_fatal_on_mismatch_or_null() {
        let (off, _, _) = guards();
        let expected = Uuid::new_v4();
        let entity = Uuid::new_v4();

        assert!(off
            .assert_tenant_ownership(Some(expected), expected, "project", entity)
            .is_ok());
        assert!(off
            .assert_tenant_ownership(Some(Uuid::new_v4()), expected, "project", entity)
            .is_err());
        assert!(off
            .assert_tenant_ownership(None, expected, "project", entity)
            .is_err());
    }

    #[test]
    fn client_tenant_id_detection() {
        let (off, warn, enforce) = guards();
        let body = json!({"tenant_id": "abc", "name": "x"});

        assert!(matches!(
            enforce.assert_no_client_tenant_id(Some(&body), "", "POST /projects"),
            Err(AppError::TenantViolation(_))
        ));
        assert!(warn
            .assert_no_client_tenant_id(Some(&body), "", "POST /projects")
            .is_ok());
        assert!(off
            .assert_no_client_tenant_id(Some(&body), "", "POST /projects")
            .is_ok());

        assert!(enforce
            .assert_no_client_tenant_id(None, "tenantId=abc&x=1", "GET /tasks")
            .is_err());
        assert!(enforce
            .assert_no_client_tenant_id(None, "name=tenant_id", "GET /tasks")
            .is_ok());
        let clean = json!({"name": "x"});
        assert!(enforce
            .assert_no_client_tenant_id(Some(&clean), "a=b", "POST /projects")
            .is_ok());
    }

    #[test]
    fn chat_membership_checks_tenant_then_membership() {
        let guard = TenancyGuard::new(GuardMode::Off);
        let tenant = Uuid::new_v4();
        let user = Uuid::new_v4();
        let convo = Uuid::new_v4();

        assert!(matches!(
            guard.assert_chat_membership(Uuid::new_v4(), tenant, &[user], user, convo),
            Err(AppError::TenantViolation(_))
        ));
        assert!(matches!(
            guard.assert_chat_membership(tenant, tenant, &[], user, convo),
            Err(AppError::Forbidden(_))
        ));
        assert!(guard
            .assert_chat_membership(tenant, tenant, &[user], user, convo)
            .is_ok());
    }

    #[test]
    fn room_names_are_tenant_scoped() {
        let guard = TenancyGuard::new(GuardMode::Enforce);
        let tenant = Uuid::new_v4();
        let convo = Uuid::new_v4();
        let room = tenant_room(tenant, convo);

        assert!(guard.assert_tenant_scoped_room(&room, tenant).is_ok());
        assert!(guard
            .assert_tenant_scoped_room(&room, Uuid::new_v4())
            .is_err());
    }
}
