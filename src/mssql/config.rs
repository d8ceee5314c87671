//! Connection configuration and pool setup for SQL Server.

use std::env;

use bb8::Pool;
use bb8_tiberius::{ConnectionManager, rt};
use tiberius::{AuthMethod, Config as TiberiusConfig};

use super::pool::MssqlPool;
use crate::db::Db;
use crate::error::SqlConduitError;

/// Type alias for the tiberius client bb8 hands out.
pub type MssqlClient = rt::Client;

const DEFAULT_POOL_SIZE: u32 = 20;

/// Options for configuring a SQL Server pool.
#[derive(Debug, Clone)]
pub struct MssqlOptions {
    pub server: String,
    pub database: String,
    pub user: String,
    pub password: String,
    pub port: Option<u16>,
    pub instance_name: Option<String>,
    pub pool_size: u32,
}

fn env_fallback(primary: &str, secondary: &str) -> Option<String> {
    env::var(primary).or_else(|_| env::var(secondary)).ok()
}

impl MssqlOptions {
    #[must_use]
    pub fn new(
        server: String,
        database: String,
        user: String,
        password: String,
    ) -> Self {
        Self {
            server,
            database,
            user,
            password,
            port: None,
            instance_name: None,
            pool_size: DEFAULT_POOL_SIZE,
        }
    }

    /// Resolve options from the environment with documented fallbacks:
    /// `MSSQL_HOST`/`DB_HOST` (default `mssql`), `MSSQL_PORT`/`DB_PORT`
    /// (default 1433), `MSSQL_USER`/`DB_USER` (default `sa`),
    /// `MSSQL_PASS`/`DB_PASS`, `MSSQL_DATABASE`/`DB_DATABASE` (default
    /// `default_database`), `MSSQL_POOL_SIZE`/`DB_POOL_SIZE`.
    #[must_use]
    pub fn from_env() -> Self {
        let mut opts = Self::new(
            env_fallback("MSSQL_HOST", "DB_HOST").unwrap_or_else(|| "mssql".to_string()),
            env_fallback("MSSQL_DATABASE", "DB_DATABASE")
                .unwrap_or_else(|| "default_database".to_string()),
            env_fallback("MSSQL_USER", "DB_USER").unwrap_or_else(|| "sa".to_string()),
            env_fallback("MSSQL_PASS", "DB_PASS").unwrap_or_default(),
        );
        opts.port = env_fallback("MSSQL_PORT", "DB_PORT").and_then(|p| p.parse().ok());
        opts.pool_size = env_fallback("MSSQL_POOL_SIZE", "DB_POOL_SIZE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_POOL_SIZE);
        opts
    }

    #[must_use]
    pub fn with_port(mut self, port: Option<u16>) -> Self {
        self.port = port;
        self
    }

    #[must_use]
    pub fn with_instance_name(mut self, instance_name: Option<String>) -> Self {
        self.instance_name = instance_name;
        self
    }

    #[must_use]
    pub fn with_pool_size(mut self, pool_size: u32) -> Self {
        self.pool_size = pool_size;
        self
    }

    /// Build the bb8/tiberius pool these options describe.
    ///
    /// The pool is constructed without touching the network; connectivity is
    /// established lazily by [`Db::wait`] (or the first operation).
    ///
    /// # Errors
    ///
    /// Returns `SqlConduitError::Config` if the tiberius manager rejects the
    /// configuration.
    pub fn build_pool(self) -> Result<MssqlPool, SqlConduitError> {
        let config = build_tiberius_config(&self);

        let manager = ConnectionManager::build(config).map_err(|e| {
            SqlConduitError::Config(format!("failed to configure SQL Server manager: {e}"))
        })?;

        let pool = Pool::builder()
            .max_size(self.pool_size)
            .build_unchecked(manager);

        Ok(MssqlPool::new(pool))
    }

    /// Build a [`Db`] directly over the pool these options describe.
    ///
    /// # Errors
    ///
    /// See [`build_pool`](Self::build_pool).
    pub fn build_db(self) -> Result<Db<MssqlPool>, SqlConduitError> {
        Ok(Db::new(self.build_pool()?))
    }
}

fn build_tiberius_config(opts: &MssqlOptions) -> TiberiusConfig {
    let mut config = TiberiusConfig::new();
    config.host(&opts.server);
    config.database(&opts.database);
    config.port(opts.port.unwrap_or(1433));
    config.authentication(AuthMethod::sql_server(&opts.user, &opts.password));
    if let Some(instance) = &opts.instance_name {
        config.instance_name(instance);
    }
    config.trust_cert();
    config
}
