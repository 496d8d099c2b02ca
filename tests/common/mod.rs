#![allow(dead_code)]

use std::process::{Child, Command, Stdio};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use recruit_ats::database::models::{User, UserRole};
use recruit_ats::services::users_service::{CreateUserInput, UsersService};
use reqwest::StatusCode;
use serde_json::{json, Value};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

static SERVER: OnceLock<TestServer> = OnceLock::new();

pub const TEST_ORIGIN: &str = "http://localhost:3000";
pub const CRON_SECRET: &str = "integration-cron-secret";
pub const PASSWORD: &str = "Integration#Pass1";
pub const MAX_FAILED_LOGINS: i32 = 5;

pub struct TestServer {
    pub port: u16,
    pub base_url: String,
    child: Child,
}

impl TestServer {
    fn spawn() -> Result<Self> {
        // Pick an unused port for isolation
        let port = portpicker::pick_unused_port().context("failed to pick free port")?;
        let base_url = format!("http://127.0.0.1:{}", port);

        let mut cmd = Command::new(env!("CARGO_BIN_EXE_recruit-ats"));
        cmd.env("ATS_API_PORT", port.to_string())
            .env("SECURITY_CORS_ORIGINS", TEST_ORIGIN)
            .env("WORKER_ENABLED", "false")
            .env("CRON_SECRET", CRON_SECRET)
            .env("SECURITY_MAX_FAILED_LOGINS", MAX_FAILED_LOGINS.to_string())
            .env("SECURITY_SECURE_COOKIES", "false")
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        // Inherit environment so the server can see DATABASE_URL from .env (loaded by the server)
        let child = cmd.spawn().context("failed to spawn server binary")?;

        Ok(Self { port, base_url, child })
    }

    async fn wait_ready(&self, timeout: Duration) -> Result<()> {
        let client = reqwest::Client::new();
        let deadline = Instant::now() + timeout;
        loop {
            if Instant::now() > deadline {
                break;
            }
            let url = format!("{}/health", self.base_url);
            if let Ok(resp) = client.get(&url).send().await {
                if resp.status() == StatusCode::OK || resp.status() == StatusCode::SERVICE_UNAVAILABLE {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(150)).await;
        }
        anyhow::bail!("server did not become ready on {} within {:?}", self.base_url, timeout)
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

pub async fn ensure_server() -> Result<&'static TestServer> {
    let server = SERVER.get_or_init(|| TestServer::spawn().expect("failed to spawn server binary"));
    server.wait_ready(Duration::from_secs(20)).await?;
    Ok(server)
}

/// True when the server answered with its database-unavailable error
pub fn database_unavailable(status: StatusCode) -> bool {
    status == StatusCode::SERVICE_UNAVAILABLE || status == StatusCode::INTERNAL_SERVER_ERROR
}

/// Direct pool for arranging fixtures, with migrations applied.
/// `None` when no DATABASE_URL is configured; callers skip in that case.
pub async fn database() -> Result<Option<PgPool>> {
    dotenvy::dotenv().ok();
    let Ok(url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set; skipping database-backed test");
        return Ok(None);
    };
    let pool = PgPoolOptions::new()
        .max_connections(4)
        .connect(&url)
        .await
        .context("failed to connect to DATABASE_URL")?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(Some(pool))
}

/// Fresh user with a unique address and [`PASSWORD`]
pub async fn create_user(pool: &PgPool, role: UserRole, manager_id: Option<Uuid>) -> Result<User> {
    let input = CreateUserInput {
        email: format!("it-{}@recruit-ats.test", Uuid::new_v4().simple()),
        password: PASSWORD.to_string(),
        first_name: "Integration".to_string(),
        last_name: role.as_str().to_string(),
        role,
        manager_id,
    };
    UsersService::new(pool.clone())
        .create(input)
        .await
        .map_err(|e| anyhow!("creating test user failed: {}", e))
}

/// Log in through the API and return the bearer token
pub async fn login(server: &TestServer, email: &str) -> Result<String> {
    let res = reqwest::Client::new()
        .post(server.url("/api/auth/login"))
        .json(&json!({ "email": email, "password": PASSWORD }))
        .send()
        .await?;
    anyhow::ensure!(res.status() == StatusCode::OK, "login failed: {}", res.status());
    let body = res.json::<Value>().await?;
    body["data"]["token"]
        .as_str()
        .map(str::to_string)
        .context("login response had no token")
}
