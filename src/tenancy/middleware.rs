use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::middleware::Next;
use axum::response::Response;
use serde_json::Value;

use super::GuardMode;
use crate::app::AppState;
use crate::errors::{AppError, AppResult};

const BODY_SCAN_LIMIT: usize = 2 * 1024 * 1024;

/// Router layer screening every tenant-scoped request for client-supplied
/// tenant ids. The tenant id must come from session context only, so a
/// `tenant_id`/`tenantId` field in the body or query is either rejected or
/// logged depending on guard mode.
pub async fn reject_client_tenant_id(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> AppResult<Response> {
    if state.guard.mode() == GuardMode::Off {
        return Ok(next.run(req).await);
    }

    let (parts, body) = req.into_parts();
    let query = parts.uri.query().unwrap_or("").to_string();
    let context = format!("{} {}", parts.method, parts.uri.path());

    let is_json = parts
        .headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.starts_with("application/json"))
        .unwrap_or(false);

    let bytes = to_bytes(body, BODY_SCAN_LIMIT)
        .await
        .map_err(|_| AppError::bad_request("request body too large"))?;

    let parsed: Option<Value> = if is_json && !bytes.is_empty() {
        serde_json::from_slice(&bytes).ok()
    } else {
        None
    };

    state
        .guard
        .assert_no_client_tenant_id(parsed.as_ref(), &query, &context)?;

    let req = Request::from_parts(parts, Body::from(bytes));
    Ok(next.run(req).await)
}
