mod common;

use anyhow::Result;
use recruit_ats::database::models::UserRole;
use recruit_ats::middleware::AuthUser;
use recruit_ats::services::onboarding_service::OnboardingService;
use recruit_ats::services::ServiceError;
use reqwest::StatusCode;
use serde_json::{json, Value};
use uuid::Uuid;

async fn published_form(server: &common::TestServer, token: &str) -> Result<String> {
    let res = reqwest::Client::new()
        .post(server.url("/api/onboarding-forms"))
        .bearer_auth(token)
        .json(&json!({
            "title": "Candidate intake",
            "fields": [
                { "id": "f1", "key": "fullName", "label": "Full name", "type": "text", "required": true },
                { "id": "f2", "key": "email", "label": "Email", "type": "email", "required": true },
                { "id": "f3", "key": "skills", "label": "Skills", "type": "text" }
            ]
        }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::CREATED);
    Ok(res.json::<Value>().await?["data"]["id"]
        .as_str()
        .unwrap_or_default()
        .to_string())
}

async fn submit(server: &common::TestServer, form_id: &str) -> Result<String> {
    let res = reqwest::Client::new()
        .post(server.url(&format!("/api/onboarding-forms/{}/submit", form_id)))
        .json(&json!({ "data": {
            "fullName": "Asha Verma",
            "email": "asha@example.com",
            "skills": ["rust", "sql"]
        }}))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::CREATED);
    Ok(res.json::<Value>().await?["data"]["id"]
        .as_str()
        .unwrap_or_default()
        .to_string())
}

#[tokio::test]
async fn submission_converts_to_client_once() -> Result<()> {
    let Some(pool) = common::database().await? else {
        return Ok(());
    };
    let server = common::ensure_server().await?;
    let client = reqwest::Client::new();
    let recruiter = common::create_user(&pool, UserRole::Recruiter, None).await?;
    let token = common::login(server, &recruiter.email).await?;

    let form_id = published_form(server, &token).await?;
    let submission_id = submit(server, &form_id).await?;
    let convert_url = server.url(&format!(
        "/api/onboarding-forms/submissions/{}/create-client",
        submission_id
    ));

    let res = client.post(&convert_url).bearer_auth(&token).json(&json!({})).send().await?;
    assert_eq!(res.status(), StatusCode::CREATED);
    let body = res.json::<Value>().await?;
    let converted = &body["data"];
    assert_eq!(converted["client"]["firstName"], "Asha");
    assert_eq!(converted["client"]["lastName"], "Verma");
    assert_eq!(converted["client"]["email"], "asha@example.com");
    assert_eq!(converted["client"]["skills"], json!(["rust", "sql"]));
    assert_eq!(converted["client"]["assignedUserId"], recruiter.id.to_string());
    assert_eq!(converted["submission"]["clientId"], converted["client"]["id"]);

    let res = client.post(&convert_url).bearer_auth(&token).json(&json!({})).send().await?;
    assert_eq!(res.status(), StatusCode::CONFLICT);

    let (clients,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM clients WHERE assigned_user_id = $1 AND email = 'asha@example.com'",
    )
    .bind(recruiter.id)
    .fetch_one(&pool)
    .await?;
    assert_eq!(clients, 1);
    Ok(())
}

#[tokio::test]
async fn concurrent_conversions_create_one_client() -> Result<()> {
    let Some(pool) = common::database().await? else {
        return Ok(());
    };
    let server = common::ensure_server().await?;
    let recruiter = common::create_user(&pool, UserRole::Recruiter, None).await?;
    let token = common::login(server, &recruiter.email).await?;
    let form_id = published_form(server, &token).await?;
    let submission_id: Uuid = submit(server, &form_id).await?.parse()?;

    let caller = AuthUser {
        user_id: recruiter.id,
        email: recruiter.email.clone(),
        role: recruiter.role,
    };
    let first = OnboardingService::new(pool.clone());
    let second = OnboardingService::new(pool.clone());
    let (a, b) = tokio::join!(
        first.create_client_from_submission(&caller, submission_id, None),
        second.create_client_from_submission(&caller, submission_id, None),
    );

    let outcomes = [a.is_ok(), b.is_ok()];
    assert_eq!(outcomes.iter().filter(|ok| **ok).count(), 1);
    let failure = if a.is_err() { a.err() } else { b.err() };
    assert!(matches!(failure, Some(ServiceError::Conflict(_))));

    let (clients,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM clients WHERE assigned_user_id = $1")
            .bind(recruiter.id)
            .fetch_one(&pool)
            .await?;
    assert_eq!(clients, 1);
    Ok(())
}

#[tokio::test]
async fn other_recruiters_cannot_convert() -> Result<()> {
    let Some(pool) = common::database().await? else {
        return Ok(());
    };
    let server = common::ensure_server().await?;
    let owner = common::create_user(&pool, UserRole::Recruiter, None).await?;
    let stranger = common::create_user(&pool, UserRole::Recruiter, None).await?;
    let owner_token = common::login(server, &owner.email).await?;
    let form_id = published_form(server, &owner_token).await?;
    let submission_id = submit(server, &form_id).await?;

    let stranger_token = common::login(server, &stranger.email).await?;
    let res = reqwest::Client::new()
        .post(server.url(&format!(
            "/api/onboarding-forms/submissions/{}/create-client",
            submission_id
        )))
        .bearer_auth(&stranger_token)
        .json(&json!({}))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    Ok(())
}
