mod common;

use anyhow::Result;
use axum::http::StatusCode;
use serde_json::json;

use common::{parse_uuid, TestApp};

#[tokio::test]
async fn full_api_flow() -> Result<()> {
    let app = TestApp::spawn().await?;

    let tenant = app
        .register_tenant("Acme Corp", "Ada", "ada@acme.test")
        .await?;

    // -- me reflects the signup admin
    let (status, body) = app.request("GET", "/auth/me", Some(&tenant.token), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["role"], "admin");
    assert_eq!(body["is_impersonating"], false);

    // -- login works with the signup credentials
    let (status, body) = app
        .request(
            "POST",
            "/auth/login",
            None,
            Some(json!({"email": "ada@acme.test", "password": "password123"})),
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert!(body["token"].as_str().is_some());

    // -- create project; the primary workspace is assigned by default
    let (status, body) = app
        .request(
            "POST",
            "/projects",
            Some(&tenant.token),
            Some(json!({"name": "Launch Planning", "description": "Q4 launch"})),
        )
        .await?;
    assert_eq!(status, StatusCode::CREATED);
    let project_id = parse_uuid(&body["id"])?;
    assert!(body["workspace_id"].as_str().is_some());
    assert_eq!(body["visibility"], "workspace");

    // -- create and update a task
    let (status, body) = app
        .request(
            "POST",
            &format!("/projects/{project_id}/tasks"),
            Some(&tenant.token),
            Some(json!({"title": "Define checklist"})),
        )
        .await?;
    assert_eq!(status, StatusCode::CREATED);
    let task_id = parse_uuid(&body["id"])?;
    assert_eq!(body["status"], "pending");

    let (status, body) = app
        .request(
            "PATCH",
            &format!("/projects/{project_id}/tasks/{task_id}"),
            Some(&tenant.token),
            Some(json!({"status": "in_progress"})),
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "in_progress");

    let (status, body) = app
        .request(
            "GET",
            &format!("/projects/{project_id}/tasks"),
            Some(&tenant.token),
            None,
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().map(|a| a.len()), Some(1));

    // -- messaging round trip
    let (status, body) = app
        .request(
            "POST",
            "/conversations",
            Some(&tenant.token),
            Some(json!({"subject": "Kickoff", "member_ids": []})),
        )
        .await?;
    assert_eq!(status, StatusCode::CREATED);
    let conversation_id = parse_uuid(&body["id"])?;
    let room = body["room"].as_str().unwrap().to_string();
    assert!(room.starts_with(&format!("tenant:{}:", tenant.tenant_id)));

    let (status, _) = app
        .request(
            "POST",
            &format!("/conversations/{conversation_id}/messages"),
            Some(&tenant.token),
            Some(json!({"body": "Agenda attached."})),
        )
        .await?;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = app
        .request(
            "GET",
            &format!("/conversations/{conversation_id}/messages"),
            Some(&tenant.token),
            None,
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().map(|a| a.len()), Some(1));

    // -- cleanup
    let (status, _) = app
        .request(
            "DELETE",
            &format!("/projects/{project_id}/tasks/{task_id}"),
            Some(&tenant.token),
            None,
        )
        .await?;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app
        .request(
            "DELETE",
            &format!("/projects/{project_id}"),
            Some(&tenant.token),
            None,
        )
        .await?;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app
        .request(
            "GET",
            &format!("/projects/{project_id}"),
            Some(&tenant.token),
            None,
        )
        .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    Ok(())
}

#[tokio::test]
async fn duplicate_email_rejected() -> Result<()> {
    let app = TestApp::spawn().await?;
    app.register_tenant("First", "Ada", "dup@acme.test").await?;

    let (status, _) = app
        .request(
            "POST",
            "/auth/register",
            None,
            Some(json!({
                "tenant_name": "Second",
                "name": "Other",
                "email": "dup@acme.test",
                "password": "password123",
            })),
        )
        .await?;
    assert_eq!(status, StatusCode::CONFLICT);

    Ok(())
}

#[tokio::test]
async fn requests_without_token_are_unauthorized() -> Result<()> {
    let app = TestApp::spawn().await?;

    let (status, _) = app.request("GET", "/projects", None, None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    Ok(())
}
