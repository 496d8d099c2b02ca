use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::cli::utils::{output_skipped, output_success};
use crate::cli::OutputFormat;
use crate::database::models::UserRole;
use crate::database::DatabaseManager;
use crate::services::users_service::{CreateUserInput, UsersService};
use crate::services::ServiceError;

struct SeedUser {
    email: &'static str,
    first_name: &'static str,
    last_name: &'static str,
    role: UserRole,
}

const SEED_USERS: [SeedUser; 3] = [
    SeedUser {
        email: "admin@recruit-ats.local",
        first_name: "System",
        last_name: "Admin",
        role: UserRole::Admin,
    },
    SeedUser {
        email: "manager@recruit-ats.local",
        first_name: "Default",
        last_name: "Manager",
        role: UserRole::Manager,
    },
    SeedUser {
        email: "recruiter@recruit-ats.local",
        first_name: "Default",
        last_name: "Recruiter",
        role: UserRole::Recruiter,
    },
];

pub async fn migrate(output_format: OutputFormat) -> anyhow::Result<()> {
    DatabaseManager::migrate().await?;
    output_success(&output_format, "Migrations applied", None)
}

/// Idempotent: accounts whose email already exists are left untouched. The
/// seeded recruiter reports to the seeded manager.
pub async fn seed(password: &str, output_format: OutputFormat) -> anyhow::Result<()> {
    let pool = DatabaseManager::pool().await?;
    let service = UsersService::new(pool.clone());
    let mut manager_id = None;

    for seed in &SEED_USERS {
        let input = CreateUserInput {
            email: seed.email.to_string(),
            password: password.to_string(),
            first_name: seed.first_name.to_string(),
            last_name: seed.last_name.to_string(),
            role: seed.role,
            manager_id: if seed.role == UserRole::Recruiter { manager_id } else { None },
        };

        let id = match service.create(input).await {
            Ok(user) => {
                output_success(
                    &output_format,
                    &format!("Created {} {}", seed.role.as_str(), user.email),
                    Some(json!({ "id": user.id, "email": user.email, "role": user.role })),
                )?;
                user.id
            }
            Err(ServiceError::Conflict(_)) => {
                output_skipped(&output_format, &format!("{} already exists", seed.email))?;
                existing_user_id(&pool, seed.email).await?
            }
            Err(e) => return Err(e.into()),
        };

        if seed.role == UserRole::Manager {
            manager_id = Some(id);
        }
    }

    Ok(())
}

async fn existing_user_id(pool: &PgPool, email: &str) -> anyhow::Result<Uuid> {
    let id = sqlx::query_scalar::<_, Uuid>("SELECT id FROM users WHERE email = $1")
        .bind(email)
        .fetch_one(pool)
        .await?;
    Ok(id)
}
