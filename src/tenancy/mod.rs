//! Tenant isolation layer.
//!
//! Every route that touches tenant-owned data goes through the assertions in
//! [`guard`] rather than hand-rolling `WHERE tenant_id = ?` conditions. The
//! guard fails closed on cross-tenant access in every mode; the mode only
//! controls how data-integrity gaps (missing tenant ids) are handled.

mod guard;
pub mod middleware;
mod workspace_cache;

pub use guard::{tenant_room, TenancyGuard};
pub use workspace_cache::{resolve_primary_workspace, InMemoryWorkspaceCache, WorkspaceCache};

use uuid::Uuid;

/// Enforcement mode for the tenancy guard, configured once at construction
/// (`TENANCY_GUARD_MODE`) and injected, never re-read per call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardMode {
    /// No integrity checks. Cross-tenant mismatches still fail.
    Off,
    /// Log integrity gaps, allow the operation. Cross-tenant mismatches
    /// still fail.
    Warn,
    /// Reject on any violation. Production default.
    Enforce,
}

impl GuardMode {
    pub fn from_env() -> Self {
        match std::env::var("TENANCY_GUARD_MODE")
            .unwrap_or_default()
            .to_lowercase()
            .as_str()
        {
            "off" => GuardMode::Off,
            "warn" => GuardMode::Warn,
            // "throw" is the documented value; default closed when unset.
            _ => GuardMode::Enforce,
        }
    }
}

/// Implemented by insert/update records that carry a tenant id, so the guard
/// can inspect payloads without knowing their concrete types.
pub trait TenantScoped {
    fn tenant_id(&self) -> Option<Uuid>;
}
