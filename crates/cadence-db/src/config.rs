use std::env;

/// Database connection settings.
///
/// The URL comes from `CADENCE_DATABASE_URL`, the pool size from
/// `CADENCE_DB_POOL_SIZE`; both fall back to compile-time defaults.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Full PostgreSQL connection URL.
    pub database_url: String,
    /// Upper bound on pooled connections.
    pub max_connections: u32,
}

impl DbConfig {
    /// Connection URL used when no environment variable is set.
    pub const DEFAULT_URL: &str = "postgresql://localhost:5432/cadence";
    /// Pool size used when `CADENCE_DB_POOL_SIZE` is unset or unparsable.
    pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

    /// Build a config from the environment, falling back to defaults.
    pub fn from_env() -> Self {
        let database_url =
            env::var("CADENCE_DATABASE_URL").unwrap_or_else(|_| Self::DEFAULT_URL.to_owned());
        let max_connections = env::var("CADENCE_DB_POOL_SIZE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(Self::DEFAULT_MAX_CONNECTIONS);
        Self {
            database_url,
            max_connections,
        }
    }

    /// Build a config from an explicit URL (CLI flag, tests).
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            max_connections: Self::DEFAULT_MAX_CONNECTIONS,
        }
    }

    /// The database name component of the URL, with any query string
    /// (`?sslmode=...`) stripped.
    ///
    /// Returns `None` when the URL has no path component.
    pub fn database_name(&self) -> Option<&str> {
        let tail = self.database_url.rsplit('/').next()?;
        let name = tail.split('?').next().unwrap_or(tail);
        (!name.is_empty() && !name.contains(':')).then_some(name)
    }

    /// A URL for a sibling database on the same server, preserving any
    /// query string.
    pub fn sibling_url(&self, db_name: &str) -> String {
        match self.database_url.rfind('/') {
            Some(pos) => {
                let tail = &self.database_url[pos + 1..];
                let query = tail.find('?').map(|q| &tail[q..]).unwrap_or("");
                format!("{}/{db_name}{query}", &self.database_url[..pos])
            }
            None => self.database_url.clone(),
        }
    }

    /// URL of the `postgres` maintenance database on the same server, for
    /// issuing `CREATE DATABASE` before the target database exists.
    pub fn maintenance_url(&self) -> String {
        self.sibling_url("postgres")
    }
}

impl Default for DbConfig {
    fn default() -> Self {
        Self::from_env()
    }
}
