//! ABOUTME: Command-line entry point for seatdesk
//! ABOUTME: Runs the API and observability servers, migrations, or admin bootstrap

use clap::{Parser, Subcommand};
use sd_config::Config;
use sd_core::{telemetry, Error, Result};
use sd_db::{CreateUserRequest, Db, DbOptions, UserRepository};
use sd_obs::{Metrics, ObsState};
use sd_web::{auth::PasswordAuth, AppState};
use std::process;
use std::sync::Arc;

#[derive(Debug, Parser)]
#[command(name = "seatdesk", version, about = "Library seat and membership back-office")]
struct Cli {
    /// Configuration file (defaults to ./seatdesk.toml when present)
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start the API and observability servers
    Serve,
    /// Apply database migrations and exit
    Migrate,
    /// Create an administrator account
    CreateAdmin {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        /// Prompted for when omitted
        #[arg(long)]
        password: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match Config::load_from(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    telemetry::init_tracing(&config.environment, "seatdesk");
    tracing::debug!(?config, "Configuration loaded successfully");

    let result = match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Migrate => open_database(&config).await.map(|_| {
            tracing::info!("Migrations applied");
        }),
        Command::CreateAdmin {
            username,
            email,
            password,
        } => create_admin(&config, username, email, password).await,
    };

    if let Err(e) = result {
        tracing::error!("{}", e);
        process::exit(1);
    }
}

/// Open the configured database; migrations run as part of opening
async fn open_database(config: &Config) -> Result<Db> {
    let db = Db::with_options(
        &config.database.path,
        DbOptions {
            pool_size: config.database.pool_size,
            sqlite_wal: config.database.sqlite_wal,
        },
    )
    .await?;
    db.health_check().await?;
    Ok(db)
}

async fn serve(config: Config) -> Result<()> {
    if config.is_production() && config.security.session_secret.starts_with("INSECURE-") {
        return Err(Error::Config(
            "security.session_secret must be set in production".to_string(),
        ));
    }

    tracing::info!(
        host = %config.server.host,
        port = %config.server.port,
        obs_port = %config.server.obs_port,
        db_path = %config.database.path,
        "Application configured and ready"
    );

    let db = open_database(&config).await?;

    let metrics = Arc::new(Metrics::new());
    let obs_state = ObsState::with_metrics(Arc::clone(&metrics));
    let app_state = AppState::new(db, &config, metrics);

    let obs_bind_addr = format!("0.0.0.0:{}", config.server.obs_port);
    let web_bind_addr = format!("{}:{}", config.server.host, config.server.port);

    // Either server exiting brings the process down
    tokio::select! {
        result = sd_obs::start_server(&obs_bind_addr, obs_state) => {
            tracing::error!("Observability server exited");
            result
        }
        result = sd_web::start_server(&web_bind_addr, app_state) => {
            tracing::error!("Web server exited");
            result
        }
    }
}

async fn create_admin(
    config: &Config,
    username: String,
    email: String,
    password: Option<String>,
) -> Result<()> {
    let password = match password {
        Some(password) => password,
        None => rpassword::prompt_password("Password for the new administrator: ")?,
    };
    if password.len() < 8 {
        return Err(Error::Validation(
            "Password must be at least 8 characters".to_string(),
        ));
    }

    let db = open_database(config).await?;
    let user = UserRepository::new(db.pool())
        .create(CreateUserRequest {
            username,
            email,
            password_hash: PasswordAuth::hash_password(&password)?,
            role: "admin".to_string(),
            branch_id: None,
        })
        .await?;

    tracing::info!(user_id = %user.id, email = %user.email, "Administrator created");
    Ok(())
}
