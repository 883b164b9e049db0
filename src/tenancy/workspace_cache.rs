use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use sqlx::SqlitePool;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::errors::AppResult;
use crate::models::workspace::Workspace;

pub const DEFAULT_WORKSPACE_CACHE_TTL: Duration = Duration::from_secs(60);

/// Non-authoritative tenant -> primary workspace lookup. Injectable so tests
/// can reset it and deployments can swap in a shared cache. Never consulted
/// for visibility decisions; the guard layer owns those.
#[async_trait]
pub trait WorkspaceCache: Send + Sync {
    async fn get(&self, tenant_id: Uuid) -> Option<Uuid>;
    async fn set(&self, tenant_id: Uuid, workspace_id: Uuid);
    async fn invalidate(&self, tenant_id: Uuid);
}

pub struct InMemoryWorkspaceCache {
    ttl: Duration,
    entries: RwLock<HashMap<Uuid, (Uuid, Instant)>>,
}

impl InMemoryWorkspaceCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryWorkspaceCache {
    fn default() -> Self {
        Self::new(DEFAULT_WORKSPACE_CACHE_TTL)
    }
}

#[async_trait]
impl WorkspaceCache for InMemoryWorkspaceCache {
    async fn get(&self, tenant_id: Uuid) -> Option<Uuid> {
        let entries = self.entries.read().await;
        match entries.get(&tenant_id) {
            Some((workspace_id, stored_at)) if stored_at.elapsed() < self.ttl => {
                Some(*workspace_id)
            }
            _ => None,
        }
    }

    async fn set(&self, tenant_id: Uuid, workspace_id: Uuid) {
        let mut entries = self.entries.write().await;
        entries.insert(tenant_id, (workspace_id, Instant::now()));
    }

    async fn invalidate(&self, tenant_id: Uuid) {
        let mut entries = self.entries.write().await;
        entries.remove(&tenant_id);
    }
}

/// Resolves the primary workspace for a tenant through the cache, falling
/// back to storage on a miss. Tolerates zero or many primaries.
pub async fn resolve_primary_workspace(
    pool: &SqlitePool,
    cache: &dyn WorkspaceCache,
    tenant_id: Uuid,
) -> AppResult<Option<Uuid>> {
    if let Some(workspace_id) = cache.get(tenant_id).await {
        return Ok(Some(workspace_id));
    }

    let resolved = Workspace::primary_for_tenant(pool, tenant_id).await?;
    if let Some(workspace_id) = resolved {
        cache.set(tenant_id, workspace_id).await;
    }

    Ok(resolved)
}
