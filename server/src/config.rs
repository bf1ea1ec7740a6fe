use anyhow::{Context, Result, anyhow};
use platform_authn::JwtConfig;
use platform_db::DatabaseSettings;
use products_profiles::DeleteMode;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseSettings,
    pub jwt: JwtConfig,
    pub cors_allowed_origins: Vec<String>,
    pub delete_mode: DeleteMode,
}

impl AppConfig {
    /// Reads the process environment. `.env` is loaded by `main` first.
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let database = match lookup("DATABASE_URL") {
            Some(url) => DatabaseSettings::with_url(url),
            None => DatabaseSettings::from_env(),
        };

        let secret = lookup("JWT_SECRET").ok_or_else(|| anyhow!("JWT_SECRET missing"))?;
        let jwt = JwtConfig::new(secret.trim()).context("invalid JWT_SECRET")?;

        let cors_allowed_origins = parse_origins(
            &lookup("CORS_ALLOWED_ORIGINS").unwrap_or_else(|| "http://localhost:5173".into()),
        );

        let delete_mode = lookup("PROFILE_DELETE_MODE")
            .unwrap_or_default()
            .parse::<DeleteMode>()
            .context("invalid PROFILE_DELETE_MODE")?;

        Ok(Self {
            database,
            jwt,
            cors_allowed_origins,
            delete_mode,
        })
    }
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .filter_map(|s| {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        })
        .collect()
}
