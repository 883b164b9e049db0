//! Grant uniqueness, role replacement, revocation, and cross-tenant invite
//! rejection for both resource kinds.

mod common;

use anyhow::Result;
use axum::http::StatusCode;
use serde_json::json;
use uuid::Uuid;

use common::{parse_uuid, TestApp};

struct Fixture {
    app: TestApp,
    admin_token: String,
    tenant_id: Uuid,
    member_id: Uuid,
    member_token: String,
    outsider_id: Uuid,
    project_id: Uuid,
    task_id: Uuid,
}

async fn fixture() -> Result<Fixture> {
    let app = TestApp::spawn().await?;
    let tenant = app.register_tenant("Acme", "Ada", "ada@g.test").await?;
    let (member_id, member_token) = app
        .create_tenant_user(tenant.tenant_id, "employee", "bob@g.test")
        .await?;
    let other = app.register_tenant("Other", "Eve", "eve@g.test").await?;

    let (status, body) = app
        .request(
            "POST",
            "/projects",
            Some(&tenant.token),
            Some(json!({"name": "P", "visibility": "private"})),
        )
        .await?;
    anyhow::ensure!(status == StatusCode::CREATED, "{body}");
    let project_id = parse_uuid(&body["id"])?;

    let (status, body) = app
        .request(
            "POST",
            &format!("/projects/{project_id}/tasks"),
            Some(&tenant.token),
            Some(json!({"title": "T", "visibility": "private"})),
        )
        .await?;
    anyhow::ensure!(status == StatusCode::CREATED, "{body}");
    let task_id = parse_uuid(&body["id"])?;

    Ok(Fixture {
        app,
        admin_token: tenant.token,
        tenant_id: tenant.tenant_id,
        member_id,
        member_token,
        outsider_id: other.user_id,
        project_id,
        task_id,
    })
}

#[tokio::test]
async fn project_grant_lifecycle() -> Result<()> {
    let f = fixture().await?;
    let base = format!("/projects/{}/access", f.project_id);

    // invite
    let (status, body) = f
        .app
        .request(
            "POST",
            &base,
            Some(&f.admin_token),
            Some(json!({"user_id": f.member_id, "role": "editor"})),
        )
        .await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["role"], "editor");
    assert_eq!(parse_uuid(&body["tenant_id"])?, f.tenant_id);

    // duplicate invite conflicts, leaving a single row
    let (status, _) = f
        .app
        .request(
            "POST",
            &base,
            Some(&f.admin_token),
            Some(json!({"user_id": f.member_id, "role": "viewer"})),
        )
        .await?;
    assert_eq!(status, StatusCode::CONFLICT);

    // role replacement, not accumulation
    let (status, body) = f
        .app
        .request(
            "PATCH",
            &format!("{base}/{}", f.member_id),
            Some(&f.admin_token),
            Some(json!({"role": "admin"})),
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["role"], "admin");

    let (status, body) = f.app.request("GET", &base, Some(&f.admin_token), None).await?;
    assert_eq!(status, StatusCode::OK);
    let grants = body.as_array().unwrap();
    assert_eq!(grants.len(), 1);
    assert_eq!(grants[0]["role"], "admin");

    // revoke, then 404 on repeat
    let (status, _) = f
        .app
        .request(
            "DELETE",
            &format!("{base}/{}", f.member_id),
            Some(&f.admin_token),
            None,
        )
        .await?;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = f
        .app
        .request(
            "DELETE",
            &format!("{base}/{}", f.member_id),
            Some(&f.admin_token),
            None,
        )
        .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = f
        .app
        .request(
            "PATCH",
            &format!("{base}/{}", f.member_id),
            Some(&f.admin_token),
            Some(json!({"role": "viewer"})),
        )
        .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    Ok(())
}

#[tokio::test]
async fn task_grant_lifecycle() -> Result<()> {
    let f = fixture().await?;
    let base = format!("/tasks/{}/access", f.task_id);

    let (status, body) = f
        .app
        .request(
            "POST",
            &base,
            Some(&f.admin_token),
            Some(json!({"user_id": f.member_id, "role": "viewer"})),
        )
        .await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["role"], "viewer");

    let (status, _) = f
        .app
        .request(
            "POST",
            &base,
            Some(&f.admin_token),
            Some(json!({"user_id": f.member_id, "role": "editor"})),
        )
        .await?;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = f
        .app
        .request(
            "PATCH",
            &format!("{base}/{}", f.member_id),
            Some(&f.admin_token),
            Some(json!({"role": "editor"})),
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["role"], "editor");

    let (status, _) = f
        .app
        .request(
            "DELETE",
            &format!("{base}/{}", f.member_id),
            Some(&f.admin_token),
            None,
        )
        .await?;
    assert_eq!(status, StatusCode::NO_CONTENT);

    Ok(())
}

#[tokio::test]
async fn cross_tenant_invite_is_a_validation_error() -> Result<()> {
    let f = fixture().await?;

    let (status, body) = f
        .app
        .request(
            "POST",
            &format!("/projects/{}/access", f.project_id),
            Some(&f.admin_token),
            Some(json!({"user_id": f.outsider_id, "role": "viewer"})),
        )
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "bad_request");

    // unknown user
    let (status, _) = f
        .app
        .request(
            "POST",
            &format!("/projects/{}/access", f.project_id),
            Some(&f.admin_token),
            Some(json!({"user_id": Uuid::new_v4(), "role": "viewer"})),
        )
        .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    Ok(())
}

#[tokio::test]
async fn only_managers_may_mutate_grants() -> Result<()> {
    let f = fixture().await?;
    let base = format!("/projects/{}/access", f.project_id);

    // a plain member with no grant cannot invite
    let (status, _) = f
        .app
        .request(
            "POST",
            &base,
            Some(&f.member_token),
            Some(json!({"user_id": f.member_id, "role": "viewer"})),
        )
        .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // a viewer grant does not confer manage rights either
    let (status, _) = f
        .app
        .request(
            "POST",
            &base,
            Some(&f.admin_token),
            Some(json!({"user_id": f.member_id, "role": "viewer"})),
        )
        .await?;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = f
        .app
        .request(
            "POST",
            &base,
            Some(&f.member_token),
            Some(json!({"user_id": f.member_id, "role": "admin"})),
        )
        .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // an admin grant does
    let (status, _) = f
        .app
        .request(
            "PATCH",
            &format!("{base}/{}", f.member_id),
            Some(&f.admin_token),
            Some(json!({"role": "admin"})),
        )
        .await?;
    assert_eq!(status, StatusCode::OK);

    let (another_id, _) = f
        .app
        .create_tenant_user(f.tenant_id, "employee", "carol@g.test")
        .await?;
    let (status, _) = f
        .app
        .request(
            "POST",
            &base,
            Some(&f.member_token),
            Some(json!({"user_id": another_id, "role": "viewer"})),
        )
        .await?;
    assert_eq!(status, StatusCode::CREATED);

    Ok(())
}
