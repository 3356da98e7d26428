use std::time::Duration;

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use sea_orm_migration::MigratorTrait;
use serde::Serialize;
use storefront_api::{
    auth::{AuthConfig, AuthService, ADMIN_ROLE},
    config::{self, AppConfig},
    db::{self, DbPool},
    migrator::Migrator,
};
use uuid::Uuid;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = config::load_config().context("failed to load application config")?;
    config::init_tracing(config.log_level(), config.log_json);

    match cli.command {
        Commands::Migrate(command) => handle_migrate_command(&config, command, cli.json).await?,
        Commands::Token(command) => handle_token_command(&config, command, cli.json)?,
    }

    Ok(())
}

#[derive(Parser)]
#[command(
    name = "storefront",
    about = "Storefront CLI for schema management and access tokens",
    version
)]
struct Cli {
    #[arg(
        long,
        global = true,
        action = ArgAction::SetTrue,
        help = "Render command output as pretty JSON when available"
    )]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(subcommand)]
    Migrate(MigrateCommands),
    #[command(subcommand)]
    Token(TokenCommands),
}

#[derive(Subcommand)]
enum MigrateCommands {
    /// Apply all pending migrations
    Up,
    /// Roll back the most recent migrations
    Down(MigrateDownArgs),
    /// List applied and pending migrations
    Status,
    /// Drop every table and re-apply all migrations
    Fresh,
}

#[derive(Args)]
struct MigrateDownArgs {
    #[arg(long, default_value_t = 1, help = "Number of migrations to roll back")]
    steps: u32,
}

#[derive(Subcommand)]
enum TokenCommands {
    /// Issue a signed access token for a user
    Issue(TokenIssueArgs),
}

#[derive(Args)]
struct TokenIssueArgs {
    #[arg(long, help = "User ID placed in the `sub` claim")]
    user_id: Uuid,
    #[arg(long, help = "Optional email claim")]
    email: Option<String>,
    #[arg(long = "role", help = "Role to grant; repeatable (e.g. --role admin)")]
    roles: Vec<String>,
    #[arg(long, default_value_t = 3600, help = "Token lifetime in seconds")]
    ttl_secs: u64,
}

#[derive(Serialize)]
struct MigrationStatusOutput {
    applied: Vec<String>,
    pending: Vec<String>,
}

#[derive(Serialize)]
struct TokenOutput {
    access_token: String,
    user_id: Uuid,
    roles: Vec<String>,
    expires_in: u64,
}

async fn connect(config: &AppConfig) -> Result<DbPool> {
    db::establish_connection_from_app_config(config)
        .await
        .context("failed to connect to database")
}

async fn handle_migrate_command(
    config: &AppConfig,
    command: MigrateCommands,
    json: bool,
) -> Result<()> {
    let db = connect(config).await?;

    match command {
        MigrateCommands::Up => {
            db::run_migrations(&db).await?;
            println!("Migrations applied");
        }
        MigrateCommands::Down(args) => {
            Migrator::down(&db, Some(args.steps))
                .await
                .context("failed to roll back migrations")?;
            println!("Rolled back {} migration(s)", args.steps);
        }
        MigrateCommands::Status => {
            let applied = Migrator::get_applied_migrations(&db)
                .await
                .context("failed to read applied migrations")?;
            let pending = Migrator::get_pending_migrations(&db)
                .await
                .context("failed to read pending migrations")?;
            let output = MigrationStatusOutput {
                applied: applied.iter().map(|m| m.name().to_string()).collect(),
                pending: pending.iter().map(|m| m.name().to_string()).collect(),
            };

            if json {
                print_json(&output)?;
            } else {
                for name in &output.applied {
                    println!("- applied  {}", name);
                }
                for name in &output.pending {
                    println!("- pending  {}", name);
                }
            }
        }
        MigrateCommands::Fresh => {
            Migrator::fresh(&db)
                .await
                .context("failed to rebuild schema")?;
            println!("Schema rebuilt from scratch");
        }
    }

    Ok(())
}

fn handle_token_command(config: &AppConfig, command: TokenCommands, json: bool) -> Result<()> {
    match command {
        TokenCommands::Issue(args) => {
            let auth = AuthService::new(AuthConfig::from(config));
            let roles: Vec<String> = args
                .roles
                .into_iter()
                .map(|r| r.trim().to_ascii_lowercase())
                .filter(|r| !r.is_empty())
                .collect();

            let token = auth
                .issue_token(
                    args.user_id,
                    args.email,
                    roles.clone(),
                    Duration::from_secs(args.ttl_secs),
                )
                .context("failed to issue token")?;

            if json {
                print_json(&TokenOutput {
                    access_token: token,
                    user_id: args.user_id,
                    roles,
                    expires_in: args.ttl_secs,
                })?;
            } else {
                if roles.iter().any(|r| r == ADMIN_ROLE) {
                    eprintln!("warning: issuing an admin token");
                }
                println!("{}", token);
            }
        }
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
