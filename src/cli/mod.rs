pub mod commands;
pub mod utils;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

#[derive(Parser)]
#[command(name = "ats")]
#[command(about = "Recruit ATS CLI - database, user and worker administration")]
#[command(version)]
pub struct Cli {
    #[arg(long, global = true, help = "Output in human-readable text format")]
    pub text: bool,

    #[arg(long, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Apply pending database migrations")]
    Migrate,

    #[command(about = "Create the default admin, manager and recruiter accounts")]
    Seed {
        #[arg(long, default_value = "ChangeMe123!", help = "Password for every seeded account")]
        password: String,
    },

    #[command(about = "User management")]
    User {
        #[command(subcommand)]
        cmd: commands::user::UserCommands,
    },

    #[command(about = "Background worker (follow-up escalation, reminders, rule sweep)")]
    Worker {
        #[command(subcommand)]
        cmd: commands::worker::WorkerCommands,
    },

    #[command(about = "Send application follow-up reminders once")]
    Remind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_cli(cli: &Cli) -> Self {
        if cli.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let output_format = OutputFormat::from_cli(&cli);

    match cli.command {
        Commands::Migrate => commands::db::migrate(output_format).await,
        Commands::Seed { password } => commands::db::seed(&password, output_format).await,
        Commands::User { cmd } => commands::user::handle(cmd, output_format).await,
        Commands::Worker { cmd } => commands::worker::handle(cmd, output_format).await,
        Commands::Remind => commands::worker::remind(output_format).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_user_create() {
        let cli = Cli::try_parse_from([
            "ats", "--json", "user", "create", "--email", "a@example.com", "--password",
            "Secret123!", "--first-name", "Ada", "--last-name", "Lovelace", "--role", "manager",
        ])
        .unwrap();
        assert!(matches!(OutputFormat::from_cli(&cli), OutputFormat::Json));
        match cli.command {
            Commands::User {
                cmd: commands::user::UserCommands::Create { email, role, .. },
            } => {
                assert_eq!(email, "a@example.com");
                assert!(matches!(role, commands::user::RoleArg::Manager));
            }
            _ => panic!("expected user create"),
        }
    }

    #[test]
    fn seed_has_default_password() {
        let cli = Cli::try_parse_from(["ats", "seed"]).unwrap();
        assert!(matches!(cli.command, Commands::Seed { ref password } if password == "ChangeMe123!"));
    }
}
