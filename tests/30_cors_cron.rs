mod common;

use anyhow::Result;
use reqwest::{header, Method, StatusCode};

#[tokio::test]
async fn preflight_from_configured_origin() -> Result<()> {
    let server = common::ensure_server().await?;
    let client = reqwest::Client::new();

    let res = client
        .request(Method::OPTIONS, server.url("/api/leads"))
        .header(header::ORIGIN, common::TEST_ORIGIN)
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "content-type,authorization")
        .send()
        .await?;

    assert!(res.status().is_success(), "status: {}", res.status());
    assert_eq!(
        res.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).and_then(|v| v.to_str().ok()),
        Some(common::TEST_ORIGIN)
    );
    Ok(())
}

#[tokio::test]
async fn extension_origin_is_allowed() -> Result<()> {
    let server = common::ensure_server().await?;
    let client = reqwest::Client::new();

    let origin = "chrome-extension://abcdefghijklmnopabcdefghijklmnop";
    let res = client
        .request(Method::OPTIONS, server.url("/api/jobs/bulk"))
        .header(header::ORIGIN, origin)
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .send()
        .await?;

    assert_eq!(
        res.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).and_then(|v| v.to_str().ok()),
        Some(origin)
    );
    Ok(())
}

#[tokio::test]
async fn cron_endpoints_reject_wrong_secret() -> Result<()> {
    let server = common::ensure_server().await?;
    let client = reqwest::Client::new();

    let res = client
        .get(server.url("/api/cron/followups"))
        .header("x-cron-secret", "anything")
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = client
        .post(server.url("/api/cron/application-followups"))
        .bearer_auth("anything")
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn cron_endpoints_run_with_configured_secret() -> Result<()> {
    let Some(_pool) = common::database().await? else {
        return Ok(());
    };
    let server = common::ensure_server().await?;
    let client = reqwest::Client::new();

    let res = client
        .get(server.url("/api/cron/followups"))
        .header("x-cron-secret", common::CRON_SECRET)
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);
    let body = res.json::<serde_json::Value>().await?;
    assert_eq!(body["success"], true);
    assert!(body["data"]["checked"].is_u64());

    let res = client
        .post(server.url("/api/cron/application-followups"))
        .bearer_auth(common::CRON_SECRET)
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);
    let body = res.json::<serde_json::Value>().await?;
    assert!(body["data"]["checked"].is_u64());
    Ok(())
}
