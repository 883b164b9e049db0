//! Tenant audit log.
//!
//! Append-only, hash-chained per tenant. Writes are best effort: a failed
//! audit insert is logged and swallowed so it never blocks the privileged
//! action it describes.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sha2::{Digest, Sha256};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use crate::utils::utc_now;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditEventType {
    ImpersonationStarted,
    ImpersonationStopped,
    ImpersonationExpired,
    AccessGranted,
    AccessRoleChanged,
    AccessRevoked,
    TenantProvisioned,
    UserProvisioned,
}

impl AuditEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEventType::ImpersonationStarted => "impersonation.started",
            AuditEventType::ImpersonationStopped => "impersonation.stopped",
            AuditEventType::ImpersonationExpired => "impersonation.expired",
            AuditEventType::AccessGranted => "access.granted",
            AuditEventType::AccessRoleChanged => "access.role_changed",
            AuditEventType::AccessRevoked => "access.revoked",
            AuditEventType::TenantProvisioned => "tenant.provisioned",
            AuditEventType::UserProvisioned => "user.provisioned",
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbAuditEvent {
    pub seq: i64,
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub actor_user_id: Option<Uuid>,
    pub event_type: String,
    pub message: String,
    pub metadata: String,
    pub prev_hash: Option<String>,
    pub hash: String,
    pub created_at: DateTime<Utc>,
}

/// Records one audit event. Failures are swallowed after logging; audit
/// durability is not allowed to fail the primary action.
pub async fn record_event(
    pool: &SqlitePool,
    tenant_id: Uuid,
    actor_user_id: Option<Uuid>,
    event_type: AuditEventType,
    message: &str,
    metadata: Value,
) {
    if let Err(err) =
        try_record(pool, tenant_id, actor_user_id, event_type, message, metadata).await
    {
        tracing::error!(
            tenant_id = %tenant_id,
            event_type = event_type.as_str(),
            "failed to write audit event: {err}"
        );
    }
}

async fn try_record(
    pool: &SqlitePool,
    tenant_id: Uuid,
    actor_user_id: Option<Uuid>,
    event_type: AuditEventType,
    message: &str,
    metadata: Value,
) -> Result<(), sqlx::Error> {
    let prev_hash: Option<String> = sqlx::query_scalar(
        "SELECT hash FROM tenant_audit_events WHERE tenant_id = ? ORDER BY rowid DESC LIMIT 1",
    )
    .bind(tenant_id)
    .fetch_optional(pool)
    .await?
    .flatten();

    let id = Uuid::new_v4();
    let created_at = utc_now();
    let metadata_str = metadata.to_string();
    let hash = chain_hash(
        prev_hash.as_deref(),
        tenant_id,
        event_type.as_str(),
        message,
        &metadata_str,
        created_at,
    );

    sqlx::query(
        "INSERT INTO tenant_audit_events \
         (id, tenant_id, actor_user_id, event_type, message, metadata, prev_hash, hash, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(id)
    .bind(tenant_id)
    .bind(actor_user_id)
    .bind(event_type.as_str())
    .bind(message)
    .bind(&metadata_str)
    .bind(&prev_hash)
    .bind(&hash)
    .bind(created_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Walks a tenant's chain from the start and recomputes every link.
/// Returns false when any row was altered, removed, or reordered.
pub async fn verify_chain(pool: &SqlitePool, tenant_id: Uuid) -> Result<bool, sqlx::Error> {
    let events = sqlx::query_as::<_, DbAuditEvent>(
        "SELECT rowid AS seq, id, tenant_id, actor_user_id, event_type, message, metadata, prev_hash, hash, created_at \
         FROM tenant_audit_events WHERE tenant_id = ? ORDER BY rowid ASC",
    )
    .bind(tenant_id)
    .fetch_all(pool)
    .await?;

    let mut expected_prev: Option<String> = None;
    for event in events {
        if event.prev_hash != expected_prev {
            return Ok(false);
        }
        let recomputed = chain_hash(
            event.prev_hash.as_deref(),
            event.tenant_id,
            &event.event_type,
            &event.message,
            &event.metadata,
            event.created_at,
        );
        if recomputed != event.hash {
            return Ok(false);
        }
        expected_prev = Some(event.hash);
    }

    Ok(true)
}

fn chain_hash(
    prev_hash: Option<&str>,
    tenant_id: Uuid,
    event_type: &str,
    message: &str,
    metadata: &str,
    created_at: DateTime<Utc>,
) -> String {
    let mut hasher = Sha256::new();
    if let Some(prev) = prev_hash {
        hasher.update(prev.as_bytes());
    }
    hasher.update(tenant_id.as_bytes());
    hasher.update(event_type.as_bytes());
    hasher.update(message.as_bytes());
    hasher.update(metadata.as_bytes());
    // micros survive the storage round trip; string formats may not
    hasher.update(created_at.timestamp_micros().to_le_bytes());
    hex::encode(hasher.finalize())
}
