//! Mode-dependent guard behavior over the HTTP surface: the client-supplied
//! tenant id screen rejects, warns, or ignores depending on the configured
//! mode, while cross-tenant checks are mode-independent (see
//! tenant_isolation.rs).

mod common;

use anyhow::Result;
use axum::http::StatusCode;
use serde_json::json;

use common::TestApp;
use opsdeck::authz::VisibilityFlags;
use opsdeck::tenancy::GuardMode;

#[tokio::test]
async fn client_tenant_id_in_body_is_rejected_in_enforce_mode() -> Result<()> {
    let app = TestApp::spawn().await?;
    let tenant = app.register_tenant("Acme", "Ada", "ada@gm1.test").await?;

    let (status, body) = app
        .request(
            "POST",
            "/projects",
            Some(&tenant.token),
            Some(json!({"name": "Sneaky", "tenant_id": uuid::Uuid::new_v4()})),
        )
        .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "tenant_violation");

    // camelCase spelling is caught too
    let (status, _) = app
        .request(
            "POST",
            "/projects",
            Some(&tenant.token),
            Some(json!({"name": "Sneaky", "tenantId": uuid::Uuid::new_v4()})),
        )
        .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // nothing was created
    let (_, body) = app.request("GET", "/projects", Some(&tenant.token), None).await?;
    assert_eq!(body.as_array().unwrap().len(), 0);

    Ok(())
}

#[tokio::test]
async fn client_tenant_id_in_query_is_rejected_in_enforce_mode() -> Result<()> {
    let app = TestApp::spawn().await?;
    let tenant = app.register_tenant("Acme", "Ada", "ada@gm2.test").await?;

    let (status, _) = app
        .request(
            "GET",
            "/projects?tenant_id=11111111-1111-1111-1111-111111111111",
            Some(&tenant.token),
            None,
        )
        .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // an innocent query param passes
    let (status, _) = app
        .request("GET", "/projects?page=1", Some(&tenant.token), None)
        .await?;
    assert_eq!(status, StatusCode::OK);

    Ok(())
}

#[tokio::test]
async fn warn_mode_logs_but_allows() -> Result<()> {
    let app = TestApp::spawn_with(GuardMode::Warn, VisibilityFlags::all_enabled()).await?;
    let tenant = app.register_tenant("Acme", "Ada", "ada@gm3.test").await?;

    let (status, body) = app
        .request(
            "POST",
            "/projects",
            Some(&tenant.token),
            Some(json!({"name": "Tolerated", "tenant_id": uuid::Uuid::new_v4()})),
        )
        .await?;
    assert_eq!(status, StatusCode::CREATED);
    // the client-supplied value is ignored; session context wins
    assert_eq!(
        body["tenant_id"].as_str().unwrap(),
        tenant.tenant_id.to_string()
    );

    Ok(())
}

#[tokio::test]
async fn off_mode_skips_the_screen_entirely() -> Result<()> {
    let app = TestApp::spawn_with(GuardMode::Off, VisibilityFlags::all_enabled()).await?;
    let tenant = app.register_tenant("Acme", "Ada", "ada@gm4.test").await?;

    let (status, _) = app
        .request(
            "GET",
            "/projects?tenant_id=abc",
            Some(&tenant.token),
            None,
        )
        .await?;
    assert_eq!(status, StatusCode::OK);

    Ok(())
}

#[tokio::test]
async fn impersonation_surface_accepts_tenant_id_by_design() -> Result<()> {
    // /impersonate/start carries a tenant id legitimately and sits outside
    // the screen.
    let app = TestApp::spawn().await?;
    let tenant = app.register_tenant("Acme", "Ada", "ada@gm5.test").await?;
    let (_super_id, super_token) = app.create_super_user("root@gm5.test").await?;

    let (status, _) = app
        .request(
            "POST",
            "/impersonate/start",
            Some(&super_token),
            Some(json!({"tenant_id": tenant.tenant_id})),
        )
        .await?;
    assert_eq!(status, StatusCode::OK);

    Ok(())
}
