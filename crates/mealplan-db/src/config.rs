use std::env;
use std::time::Duration;

/// Database configuration.
///
/// Reads from the `MEALPLAN_DATABASE_URL` environment variable, falling back
/// to `postgresql://localhost:5432/mealplan` when unset. Pool sizing comes
/// from `MEALPLAN_DB_MAX_CONNECTIONS` or the defaults below.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbConfig {
    /// Full PostgreSQL connection URL.
    pub database_url: String,
    /// Upper bound on open connections in the pool.
    pub max_connections: u32,
    /// How long a caller waits for a free connection before failing.
    pub acquire_timeout: Duration,
}

impl DbConfig {
    /// The default connection URL used when no environment variable is set.
    pub const DEFAULT_URL: &str = "postgresql://localhost:5432/mealplan";

    /// Environment variable consulted by [`Self::from_env`].
    pub const ENV_VAR: &str = "MEALPLAN_DATABASE_URL";

    /// Environment variable holding the pool size.
    pub const MAX_CONNECTIONS_ENV_VAR: &str = "MEALPLAN_DB_MAX_CONNECTIONS";

    pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;

    pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

    /// Build a config from the environment.
    pub fn from_env() -> Self {
        let database_url =
            env::var(Self::ENV_VAR).unwrap_or_else(|_| Self::DEFAULT_URL.to_owned());
        let config = Self::new(database_url);
        match Self::max_connections_from_env() {
            Some(max) => config.with_max_connections(max),
            None => config,
        }
    }

    /// Build a config from an explicit URL (tests and CLI flags) with the
    /// default pool sizing.
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            max_connections: Self::DEFAULT_MAX_CONNECTIONS,
            acquire_timeout: Self::DEFAULT_ACQUIRE_TIMEOUT,
        }
    }

    /// Set the pool size. Zero is raised to one.
    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections.max(1);
        self
    }

    pub fn with_acquire_timeout(mut self, acquire_timeout: Duration) -> Self {
        self.acquire_timeout = acquire_timeout;
        self
    }

    /// The pool size from [`Self::MAX_CONNECTIONS_ENV_VAR`], if set to a
    /// positive integer.
    pub fn max_connections_from_env() -> Option<u32> {
        parse_max_connections(&env::var(Self::MAX_CONNECTIONS_ENV_VAR).ok()?)
    }

    /// Extract the database name from the URL.
    ///
    /// Returns `None` if the URL has no path component. Query strings are
    /// stripped (`.../mealplan?sslmode=require` yields `mealplan`).
    pub fn database_name(&self) -> Option<&str> {
        self.database_url
            .rsplit('/')
            .next()
            .map(|s| s.split('?').next().unwrap_or(s))
            .filter(|s| !s.is_empty() && !s.contains(':'))
    }

    /// Return a URL pointing at the `postgres` maintenance database on the
    /// same host. Used to issue `CREATE DATABASE` when the target does not
    /// exist yet.
    pub fn maintenance_url(&self) -> String {
        match self.database_url.rfind('/') {
            Some(pos) => {
                let mut url = self.database_url[..pos].to_owned();
                url.push_str("/postgres");
                url
            }
            None => self.database_url.clone(),
        }
    }
}

impl Default for DbConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

fn parse_max_connections(raw: &str) -> Option<u32> {
    raw.trim().parse().ok().filter(|n| *n > 0)
}
