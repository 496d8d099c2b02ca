use clap::{Subcommand, ValueEnum};
use serde_json::json;
use uuid::Uuid;

use crate::cli::utils::output_success;
use crate::cli::OutputFormat;
use crate::database::models::UserRole;
use crate::database::DatabaseManager;
use crate::services::users_service::{CreateUserInput, UsersService};

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum RoleArg {
    Admin,
    Manager,
    Recruiter,
}

impl From<RoleArg> for UserRole {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::Admin => UserRole::Admin,
            RoleArg::Manager => UserRole::Manager,
            RoleArg::Recruiter => UserRole::Recruiter,
        }
    }
}

#[derive(Subcommand)]
pub enum UserCommands {
    #[command(about = "Create a user account")]
    Create {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        first_name: String,
        #[arg(long)]
        last_name: String,
        #[arg(long, value_enum, default_value_t = RoleArg::Recruiter)]
        role: RoleArg,
        #[arg(long, help = "Manager the user reports to")]
        manager_id: Option<Uuid>,
    },

    #[command(about = "Clear a login lockout")]
    Unlock {
        #[arg(help = "User id")]
        id: Uuid,
    },
}

pub async fn handle(cmd: UserCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    let pool = DatabaseManager::pool().await?;
    let service = UsersService::new(pool);

    match cmd {
        UserCommands::Create {
            email,
            password,
            first_name,
            last_name,
            role,
            manager_id,
        } => {
            let user = service
                .create(CreateUserInput {
                    email,
                    password,
                    first_name,
                    last_name,
                    role: role.into(),
                    manager_id,
                })
                .await?;
            output_success(
                &output_format,
                &format!("User {} created", user.email),
                Some(json!({ "id": user.id, "role": user.role })),
            )
        }
        UserCommands::Unlock { id } => {
            let user = service.unlock(id).await?;
            output_success(&output_format, &format!("User {} unlocked", user.email), None)
        }
    }
}
