mod config;
mod http;
mod seed;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use migration::{Migrator, MigratorTrait};
use platform_authn::{JwtConfig, Role};
use platform_db::{DatabaseSettings, DbPool, connect};
use platform_obs::{ObsConfig, init_tracing};
use products_profiles::{MemoryProfileStore, ProfileService, ProfileStore, SeaOrmProfileStore};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    config::AppConfig,
    http::{AppState, DynProfileService, ServeConfig},
};

#[derive(Parser, Debug)]
#[command(name = "profile-server", version, about = "Profile service")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP server.
    Serve(ServeCommand),
    /// Run database migrations.
    #[command(subcommand)]
    Migrate(MigrateCommand),
    /// Ensure the System profile exists.
    Seed,
    /// Mint a bearer token for local testing.
    Token(TokenCommand),
}

#[derive(Subcommand, Debug)]
enum MigrateCommand {
    /// Apply pending migrations.
    Up,
    /// Rollback the most recent migration.
    Down,
}

#[derive(Args, Debug)]
struct ServeCommand {
    #[arg(long, default_value = "0.0.0.0")]
    host: std::net::IpAddr,
    #[arg(long, default_value_t = 8080)]
    port: u16,
    #[arg(long, help = "Allow starting even when migrations are pending")]
    allow_dirty: bool,
}

impl From<&ServeCommand> for ServeConfig {
    fn from(value: &ServeCommand) -> Self {
        ServeConfig::new(value.host, value.port)
    }
}

#[derive(Args, Debug)]
struct TokenCommand {
    #[arg(long, default_value_t = Uuid::nil())]
    sub: Uuid,
    #[arg(long, default_value = "system")]
    role: Role,
    #[arg(long, default_value_t = 60)]
    ttl_minutes: i64,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(
        ObsConfig::default().with_otlp_endpoint(std::env::var("OTLP_ENDPOINT").ok()),
    )?;
    match cli.command {
        Command::Serve(cmd) => run_server(cmd, AppConfig::load()?).await,
        Command::Migrate(action) => match action {
            MigrateCommand::Up => migrate_up().await,
            MigrateCommand::Down => migrate_down().await,
        },
        Command::Seed => run_seed().await,
        Command::Token(cmd) => print_token(cmd),
    }
}

async fn setup_pool(settings: &DatabaseSettings) -> Result<DbPool> {
    connect(settings).await.context("database connection failed")
}

/// Database-backed store when a URL is configured, otherwise an in-memory
/// store that lives as long as the process.
async fn open_store(
    settings: &DatabaseSettings,
    allow_dirty: bool,
) -> Result<Arc<dyn ProfileStore>> {
    if settings.database_url().is_none() {
        warn!("DATABASE_URL not set; profiles are kept in memory and lost on exit");
        return Ok(Arc::new(MemoryProfileStore::new()));
    }
    let pool = setup_pool(settings).await?;
    ensure_migrations(&pool, allow_dirty).await?;
    Ok(Arc::new(SeaOrmProfileStore::new(pool)))
}

async fn run_server(cmd: ServeCommand, config: AppConfig) -> Result<()> {
    let store = open_store(&config.database, cmd.allow_dirty).await?;
    let profiles: DynProfileService =
        ProfileService::new(store).with_delete_mode(config.delete_mode);
    seed::ensure_system_profile(&profiles).await?;
    info!(delete_mode = %profiles.delete_mode(), "profile service ready");

    let state = AppState {
        profiles: Arc::new(profiles),
        jwt: Arc::new(config.jwt),
        cors_allowed_origins: Arc::new(config.cors_allowed_origins),
    };
    http::serve((&cmd).into(), state).await
}

async fn ensure_migrations(pool: &DbPool, allow_dirty: bool) -> Result<()> {
    let pending = Migrator::get_pending_migrations(pool).await?;
    if !pending.is_empty() && !allow_dirty {
        anyhow::bail!(
            "pending migrations detected; run `profile-server migrate up` or pass --allow-dirty"
        );
    }
    Ok(())
}

async fn run_seed() -> Result<()> {
    let settings = DatabaseSettings::from_env();
    let pool = setup_pool(&settings).await?;
    ensure_migrations(&pool, false).await?;
    let profiles = ProfileService::new(SeaOrmProfileStore::new(pool));
    let system = seed::ensure_system_profile(&profiles).await?;
    info!(profile_id = %system.id, "seed complete");
    Ok(())
}

fn print_token(cmd: TokenCommand) -> Result<()> {
    let secret = std::env::var("JWT_SECRET").context("JWT_SECRET missing")?;
    let jwt = JwtConfig::new(secret.trim())
        .context("invalid JWT_SECRET")?
        .with_ttl_minutes(cmd.ttl_minutes);
    let token = jwt.issue_token(cmd.sub, cmd.role.as_str())?;
    println!("{token}");
    Ok(())
}

async fn migrate_up() -> Result<()> {
    let pool = setup_pool(&DatabaseSettings::from_env()).await?;
    Migrator::up(&pool, None).await?;
    info!("database migrations applied");
    Ok(())
}

async fn migrate_down() -> Result<()> {
    let pool = setup_pool(&DatabaseSettings::from_env()).await?;
    Migrator::down(&pool, Some(1)).await?;
    info!("most recent migration rolled back");
    Ok(())
}
