//! Environment variable overrides.
//!
//! | Variable            | Effect                                              |
//! |---------------------|-----------------------------------------------------|
//! | `SQLITE_DB_PATH`    | primary store path                                  |
//! | `FLY_APP_NAME`      | default primary path becomes `/data/eo-bot.sqlite`  |
//! | `DATABASE_URL`      | secondary store URL                                 |
//! | `EOBOT_HTTP_LISTEN` | backup endpoint listen address                      |
//!
//! Empty values are treated as unset.

use super::Config;
use super::defaults::{default_database_path, default_fly_database_path};
use tracing::warn;

/// Apply overrides from the process environment.
pub fn apply_env(config: &mut Config) {
    apply_env_from(config, |key| std::env::var(key).ok());
}

/// Apply overrides using `lookup` in place of the process environment.
pub fn apply_env_from<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(path) = var("SQLITE_DB_PATH") {
        config.database.path = path;
    } else if var("FLY_APP_NAME").is_some() && config.database.path == default_database_path() {
        config.database.path = default_fly_database_path();
    }

    if let Some(url) = var("DATABASE_URL") {
        config.database.secondary_url = Some(url);
    }

    if let Some(listen) = var("EOBOT_HTTP_LISTEN") {
        match listen.parse() {
            Ok(addr) => config.http.listen = addr,
            Err(e) => warn!(value = %listen, error = %e, "Ignoring invalid EOBOT_HTTP_LISTEN"),
        }
    }
}
