mod common;

use anyhow::Result;
use axum::http::StatusCode;

use common::TestApp;

#[tokio::test]
async fn health_reports_db_ok() -> Result<()> {
    let app = TestApp::spawn().await?;

    let (status, body) = app.request("GET", "/health", None, None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["db_ok"], true);

    Ok(())
}
