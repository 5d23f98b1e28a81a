//! Configuration file management for mealplan.
//!
//! Provides a TOML-based config file at `~/.config/mealplan/config.toml` and a
//! resolution chain: CLI flag > env var > config file > default.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use mealplan_core::EngineConfig;
use mealplan_core::content::CatalogConfig;
use mealplan_core::token::{SECRET_ENV_VAR, TokenConfig};
use mealplan_db::config::DbConfig;
use tracing::debug;

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigFile {
    pub database: DatabaseSection,
    pub auth: AuthSection,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DatabaseSection {
    pub url: String,
    /// Pool size; `MEALPLAN_DB_MAX_CONNECTIONS` takes precedence.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_connections: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acquire_timeout_secs: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthSection {
    /// Hex-encoded credential secret shared with the authentication
    /// provider (64 hex chars = 32 bytes).
    pub token_secret: String,
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the mealplan config directory.
///
/// Always uses XDG layout: `$XDG_CONFIG_HOME/mealplan` or
/// `~/.config/mealplan`, on every platform.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("mealplan");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("mealplan")
}

/// Return the path to the mealplan config file.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

// -----------------------------------------------------------------------
// Read / write
// -----------------------------------------------------------------------

/// Load and parse the config file. Returns an error if it does not exist.
pub fn load_config() -> Result<ConfigFile> {
    load_config_from(&config_path())
}

fn load_config_from(path: &Path) -> Result<ConfigFile> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    let config: ConfigFile = toml::from_str(&contents).context("failed to parse config file")?;
    Ok(config)
}

/// Serialize and write the config file, creating parent dirs as needed.
/// Sets file permissions to 0600 on Unix.
pub fn save_config(config: &ConfigFile) -> Result<()> {
    save_config_to(config, &config_path())
}

fn save_config_to(config: &ConfigFile, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create config directory {}", dir.display()))?;
    }

    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(path, &contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(path, perms)
            .with_context(|| format!("failed to set permissions on {}", path.display()))?;
    }

    Ok(())
}

// -----------------------------------------------------------------------
// Token secret generation
// -----------------------------------------------------------------------

/// Generate a random token secret: 32 random bytes, hex-encoded (64 chars).
pub fn generate_token_secret() -> String {
    use rand::Rng;
    let mut bytes = [0u8; 32];
    rand::rng().fill(&mut bytes);
    hex::encode(bytes)
}

// -----------------------------------------------------------------------
// Resolved config
// -----------------------------------------------------------------------

/// Where the database URL was taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlSource {
    Flag,
    Env,
    ConfigFile,
    Default,
}

impl fmt::Display for UrlSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Flag => "flag",
            Self::Env => "env",
            Self::ConfigFile => "config-file",
            Self::Default => "default",
        };
        f.write_str(s)
    }
}

/// Fully resolved configuration, ready for use.
#[derive(Debug)]
pub struct MealplanConfig {
    pub db_config: DbConfig,
    pub url_source: UrlSource,
    pub token_config: TokenConfig,
    pub engine: EngineConfig,
    pub catalog: CatalogConfig,
}

impl MealplanConfig {
    /// Resolve configuration using the chain: CLI flag > env var > config file > default.
    ///
    /// - DB URL: `cli_db_url` > `MEALPLAN_DATABASE_URL` > `database.url` > `DbConfig::DEFAULT_URL`
    /// - Pool size: `MEALPLAN_DB_MAX_CONNECTIONS` > `database.max_connections` > default
    /// - Token secret: `MEALPLAN_TOKEN_SECRET` > `auth.token_secret` > error
    /// - Engine and catalog settings: config file > defaults
    pub fn resolve(cli_db_url: Option<&str>) -> Result<Self> {
        let file_config = load_config().ok();
        Self::resolve_with(cli_db_url, file_config)
    }

    fn resolve_with(cli_db_url: Option<&str>, file_config: Option<ConfigFile>) -> Result<Self> {
        let (db_url, url_source) = if let Some(url) = cli_db_url {
            (url.to_string(), UrlSource::Flag)
        } else if let Ok(url) = std::env::var(DbConfig::ENV_VAR) {
            (url, UrlSource::Env)
        } else if let Some(ref cfg) = file_config {
            (cfg.database.url.clone(), UrlSource::ConfigFile)
        } else {
            (DbConfig::DEFAULT_URL.to_string(), UrlSource::Default)
        };

        let mut db_config = DbConfig::new(db_url);
        let file_db = file_config.as_ref().map(|cfg| &cfg.database);
        if let Some(max) = DbConfig::max_connections_from_env()
            .or_else(|| file_db.and_then(|db| db.max_connections))
        {
            db_config = db_config.with_max_connections(max);
        }
        if let Some(secs) = file_db.and_then(|db| db.acquire_timeout_secs) {
            db_config = db_config.with_acquire_timeout(Duration::from_secs(secs));
        }
        debug!(
            source = %url_source,
            database = db_config.database_name().unwrap_or("?"),
            max_connections = db_config.max_connections,
            "database settings resolved"
        );

        let token_config = if let Ok(secret_hex) = std::env::var(SECRET_ENV_VAR) {
            TokenConfig::from_hex(&secret_hex)
                .with_context(|| format!("{SECRET_ENV_VAR} env var is not valid hex"))?
        } else if let Some(ref cfg) = file_config {
            TokenConfig::from_hex(&cfg.auth.token_secret)
                .context("invalid hex in config file token_secret")?
        } else {
            bail!(
                "token secret not found; set {SECRET_ENV_VAR} or run `mealplan init` to create a config file"
            );
        };

        let (engine, catalog) = match file_config {
            Some(cfg) => (cfg.engine, cfg.catalog),
            None => (EngineConfig::default(), CatalogConfig::default()),
        };
        engine.validate().context("invalid [engine] settings")?;
        debug!(
            generation_attempts = engine.generation_attempts,
            per_class = catalog.per_class,
            "engine settings resolved"
        );

        Ok(Self {
            db_config,
            url_source,
            token_config,
            engine,
            catalog,
        })
    }
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------
