//! Environment-driven connection settings.
//!
//! Reads an optional `.env` file, then `ORMKIT_*` variables.

use crate::db::{ConnectOptions, DbError, DbResult};
use log::debug;

pub const DATABASE_URL_VAR: &str = "ORMKIT_DATABASE_URL";
pub const ECHO_VAR: &str = "ORMKIT_ECHO";
pub const WITH_CREATE_VAR: &str = "ORMKIT_WITH_CREATE";

impl ConnectOptions {
    /// Loads options from the process environment.
    ///
    /// # Errors
    /// - `DbError::Config` when the URL is missing or a flag is not a boolean.
    pub fn from_env() -> DbResult<Self> {
        // A missing `.env` is normal outside development.
        if let Ok(path) = dotenvy::dotenv() {
            debug!("event=config_load module=config status=ok env_file={}", path.display());
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds options from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> DbResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let url = lookup(DATABASE_URL_VAR)
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| DbError::Config(format!("{DATABASE_URL_VAR} must be set")))?;

        let mut options = Self::new(url);
        if let Some(raw) = lookup(ECHO_VAR) {
            options.echo = parse_flag(ECHO_VAR, &raw)?;
        }
        if let Some(raw) = lookup(WITH_CREATE_VAR) {
            options.with_create = parse_flag(WITH_CREATE_VAR, &raw)?;
        }
        Ok(options)
    }
}

fn parse_flag(key: &str, raw: &str) -> DbResult<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(DbError::Config(format!(
            "{key} expects a boolean, got `{other}`"
        ))),
    }
}
