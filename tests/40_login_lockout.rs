mod common;

use anyhow::Result;
use recruit_ats::database::models::UserRole;
use reqwest::{header, StatusCode};
use serde_json::json;

#[tokio::test]
async fn login_sets_session_cookie() -> Result<()> {
    let Some(pool) = common::database().await? else {
        return Ok(());
    };
    let server = common::ensure_server().await?;
    let user = common::create_user(&pool, UserRole::Recruiter, None).await?;

    let res = reqwest::Client::new()
        .post(server.url("/api/auth/login"))
        .json(&json!({ "email": user.email.to_uppercase(), "password": common::PASSWORD }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);

    let cookie = res
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_default();
    assert!(cookie.starts_with("token="), "cookie: {}", cookie);
    assert!(cookie.contains("HttpOnly"));

    let body = res.json::<serde_json::Value>().await?;
    let token = body["data"]["token"].as_str().unwrap_or_default();
    assert_eq!(cookie.split(';').next(), Some(format!("token={}", token).as_str()));
    assert_eq!(body["data"]["user"]["email"], user.email);

    let me = reqwest::Client::new()
        .get(server.url("/api/auth/me"))
        .bearer_auth(token)
        .send()
        .await?;
    assert_eq!(me.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn repeated_bad_passwords_lock_until_admin_unlocks() -> Result<()> {
    let Some(pool) = common::database().await? else {
        return Ok(());
    };
    let server = common::ensure_server().await?;
    let client = reqwest::Client::new();
    let admin = common::create_user(&pool, UserRole::Admin, None).await?;
    let user = common::create_user(&pool, UserRole::Recruiter, None).await?;

    // The attempt that reaches the threshold is still a plain failure
    for attempt in 1..=common::MAX_FAILED_LOGINS {
        let res = client
            .post(server.url("/api/auth/login"))
            .json(&json!({ "email": user.email, "password": "Wrong#Pass1" }))
            .send()
            .await?;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED, "attempt {}", attempt);
    }

    // Locked now, even with the right password
    let res = client
        .post(server.url("/api/auth/login"))
        .json(&json!({ "email": user.email, "password": common::PASSWORD }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::LOCKED);
    let body = res.json::<serde_json::Value>().await?;
    assert_eq!(body["success"], false);

    let admin_token = common::login(server, &admin.email).await?;
    let res = client
        .post(server.url(&format!("/api/users/{}/unlock", user.id)))
        .bearer_auth(&admin_token)
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);

    let (attempts, locked): (i32, Option<chrono::DateTime<chrono::Utc>>) =
        sqlx::query_as("SELECT failed_login_attempts, locked_until FROM users WHERE id = $1")
            .bind(user.id)
            .fetch_one(&pool)
            .await?;
    assert_eq!(attempts, 0);
    assert!(locked.is_none());

    common::login(server, &user.email).await?;
    Ok(())
}

#[tokio::test]
async fn only_admins_unlock_accounts() -> Result<()> {
    let Some(pool) = common::database().await? else {
        return Ok(());
    };
    let server = common::ensure_server().await?;
    let manager = common::create_user(&pool, UserRole::Manager, None).await?;
    let user = common::create_user(&pool, UserRole::Recruiter, Some(manager.id)).await?;

    let token = common::login(server, &manager.email).await?;
    let res = reqwest::Client::new()
        .post(server.url(&format!("/api/users/{}/unlock", user.id)))
        .bearer_auth(&token)
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    Ok(())
}
