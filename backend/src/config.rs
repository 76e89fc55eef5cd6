//! Process configuration, read once from the environment at startup.
//!
//! PostgreSQL is the default backend and needs every `PSQL_*` variable.
//! Setting `SQLITE_PATH` switches to a local SQLite file instead, which is
//! handy for running the service without a database server.

use std::path::PathBuf;
use thiserror::Error;

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("environment variable {0} is not set")]
    Missing(&'static str),
    #[error("environment variable {name} has an invalid value `{value}`")]
    Invalid { name: &'static str, value: String },
}

#[derive(Clone, Debug, PartialEq)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub dbname: String,
}

#[derive(Clone, Debug, PartialEq)]
pub enum DatabaseConfig {
    Postgres(PostgresConfig),
    Sqlite(PathBuf),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub max_upload_bytes: usize,
    pub database: DatabaseConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from any variable source. `lookup` returns
    /// `None` for unset variables.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = lookup("SERVER_HOST").unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = parse_or("SERVER_PORT", &lookup, DEFAULT_PORT)?;
        let max_upload_bytes = parse_or("MAX_UPLOAD_BYTES", &lookup, DEFAULT_MAX_UPLOAD_BYTES)?;

        let database = match lookup("SQLITE_PATH").filter(|p| !p.is_empty()) {
            Some(path) => DatabaseConfig::Sqlite(PathBuf::from(path)),
            None => DatabaseConfig::Postgres(PostgresConfig {
                host: required("PSQL_HOST", &lookup)?,
                port: parse_required("PSQL_PORT", &lookup)?,
                user: required("PSQL_USER", &lookup)?,
                password: required("PSQL_PASSWORD", &lookup)?,
                dbname: required("PSQL_DB_NAME", &lookup)?,
            }),
        };

        Ok(Config {
            host,
            port,
            max_upload_bytes,
            database,
        })
    }
}

fn required<F>(name: &'static str, lookup: &F) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name).ok_or(ConfigError::Missing(name))
}

fn parse_required<T, F>(name: &'static str, lookup: &F) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    let value = required(name, lookup)?;
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid { name, value })
}

fn parse_or<T, F>(name: &'static str, lookup: &F, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(_) => parse_required(name, lookup),
        None => Ok(default),
    }
}
