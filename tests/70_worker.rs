mod common;

use anyhow::{anyhow, Result};
use chrono::{Duration, Utc};
use recruit_ats::config::WorkerConfig;
use recruit_ats::database::models::application::ReminderState;
use recruit_ats::database::models::UserRole;
use recruit_ats::services::application_service::ApplicationService;
use recruit_ats::services::client_service::{ClientService, NewClient};
use recruit_ats::services::follow_up_service::{CreateFollowUpInput, FollowUpService};
use recruit_ats::worker;
use sqlx::PgPool;
use uuid::Uuid;

fn worker_config() -> WorkerConfig {
    WorkerConfig {
        enabled: false,
        interval_secs: 900,
        manager_escalation_hours: 48,
        admin_escalation_hours: 96,
        reminder_lookahead_days: 1,
    }
}

async fn notifications_for(pool: &PgPool, key: &str, id: Uuid) -> Result<i64> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM notifications WHERE metadata->>$1 = $2")
        .bind(key)
        .bind(id.to_string())
        .fetch_one(pool)
        .await?;
    Ok(count)
}

#[tokio::test]
async fn escalation_level_is_claimed_once() -> Result<()> {
    let Some(pool) = common::database().await? else {
        return Ok(());
    };
    let manager = common::create_user(&pool, UserRole::Manager, None).await?;
    let recruiter = common::create_user(&pool, UserRole::Recruiter, Some(manager.id)).await?;
    let now = Utc::now();

    let follow_up = FollowUpService::new(pool.clone())
        .insert(
            recruiter.id,
            CreateFollowUpInput {
                lead_id: None,
                client_id: None,
                assigned_user_id: Some(recruiter.id),
                title: "Chase references".to_string(),
                description: None,
                scheduled_date: now - Duration::hours(50),
                notes: None,
            },
        )
        .await
        .map_err(|e| anyhow!("{}", e))?;

    worker::run_escalations(&pool, &worker_config(), now)
        .await
        .map_err(|e| anyhow!("{}", e))?;
    let first = notifications_for(&pool, "followUpId", follow_up.id).await?;
    // manager and assignee
    assert_eq!(first, 2);

    worker::run_escalations(&pool, &worker_config(), now + Duration::minutes(15))
        .await
        .map_err(|e| anyhow!("{}", e))?;
    assert_eq!(notifications_for(&pool, "followUpId", follow_up.id).await?, first);

    let (level,): (i32,) = sqlx::query_as("SELECT last_escalation_level FROM follow_ups WHERE id = $1")
        .bind(follow_up.id)
        .fetch_one(&pool)
        .await?;
    assert_eq!(level, 2);

    // A lower or equal level can no longer be claimed, a higher one can
    let service = FollowUpService::new(pool.clone());
    assert!(!service.claim_escalation_level(follow_up.id, 2).await.map_err(|e| anyhow!("{}", e))?);
    assert!(service.claim_escalation_level(follow_up.id, 3).await.map_err(|e| anyhow!("{}", e))?);
    Ok(())
}

#[tokio::test]
async fn application_reminder_is_sent_once_per_state() -> Result<()> {
    let Some(pool) = common::database().await? else {
        return Ok(());
    };
    let recruiter = common::create_user(&pool, UserRole::Recruiter, None).await?;
    let client = ClientService::new(pool.clone())
        .insert(NewClient {
            company_name: "Initech".to_string(),
            contact_name: "Peter Gibbons".to_string(),
            assigned_user_id: Some(recruiter.id),
            ..Default::default()
        })
        .await
        .map_err(|e| anyhow!("{}", e))?;
    let (application_id,): (Uuid,) = sqlx::query_as(
        "INSERT INTO applications (client_id, recruiter_id, stage, follow_up_date) \
         VALUES ($1, $2, 'APPLIED', NOW() - INTERVAL '2 hours') RETURNING id",
    )
    .bind(client.id)
    .bind(recruiter.id)
    .fetch_one(&pool)
    .await?;

    let now = Utc::now();
    worker::run_reminders(&pool, &worker_config(), now)
        .await
        .map_err(|e| anyhow!("{}", e))?;
    worker::run_reminders(&pool, &worker_config(), now + Duration::minutes(15))
        .await
        .map_err(|e| anyhow!("{}", e))?;
    assert_eq!(notifications_for(&pool, "applicationId", application_id).await?, 1);

    // Claims are compare-and-swap on the state the run saw
    let service = ApplicationService::new(pool.clone());
    assert!(!service
        .claim_reminder_state(application_id, None, ReminderState::Overdue)
        .await
        .map_err(|e| anyhow!("{}", e))?);
    assert!(!service
        .claim_reminder_state(application_id, Some("UPCOMING"), ReminderState::Overdue)
        .await
        .map_err(|e| anyhow!("{}", e))?);
    Ok(())
}
