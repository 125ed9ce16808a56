//! Environment variable overrides.
//!
//! Every field of [`Config`] can be overridden by a variable. Empty values
//! are treated as unset. Values that fail to parse keep the current setting
//! and produce a warning, so a typo never prevents startup on its own; the
//! validator still rejects values that are semantically wrong.

use std::str::FromStr;
use std::time::Duration;

use crate::config::duration::parse_duration;
use crate::config::schema::Config;

/// Apply overrides read through `lookup` onto `config`.
///
/// `lookup` is `std::env::var(..).ok()` in production; tests pass a map.
/// Returns one warning per variable that was present but unparseable.
pub fn apply_overrides<F>(config: &mut Config, lookup: F) -> Vec<String>
where
    F: Fn(&str) -> Option<String>,
{
    let mut env = Overrides {
        lookup,
        warnings: Vec::new(),
    };

    env.string("APP_ENV", &mut config.app.environment);
    env.parsed("APP_PORT", &mut config.app.port);
    env.string("APP_LOG_LEVEL", &mut config.app.log_level);

    let db = &mut config.database;
    env.string("DB_HOST", &mut db.host);
    env.parsed("DB_PORT", &mut db.port);
    env.string("DB_NAME", &mut db.name);
    env.string("DB_USER", &mut db.user);
    env.string("DB_PASSWORD", &mut db.password);
    env.string("DB_SSL_MODE", &mut db.ssl_mode);
    env.parsed("DB_MAX_CONNECTIONS", &mut db.max_connections);
    env.parsed("DB_MAX_IDLE_CONNECTIONS", &mut db.max_idle_connections);
    env.duration("DB_CONNECTION_LIFETIME", &mut db.connection_lifetime);
    env.duration("DB_ACQUIRE_TIMEOUT", &mut db.acquire_timeout);

    let server = &mut config.server;
    env.duration("SERVER_READ_TIMEOUT", &mut server.read_timeout);
    env.duration("SERVER_WRITE_TIMEOUT", &mut server.write_timeout);
    env.duration("SERVER_IDLE_TIMEOUT", &mut server.idle_timeout);
    env.duration("SERVER_SHUTDOWN_TIMEOUT", &mut server.shutdown_timeout);

    env.string("JWT_SECRET", &mut config.jwt.secret);
    env.duration("JWT_EXPIRY", &mut config.jwt.expiry);

    env.list("CORS_ALLOWED_ORIGINS", &mut config.cors.allowed_origins);
    env.list("CORS_ALLOWED_METHODS", &mut config.cors.allowed_methods);
    env.list("CORS_ALLOWED_HEADERS", &mut config.cors.allowed_headers);

    env.warnings
}

struct Overrides<F> {
    lookup: F,
    warnings: Vec<String>,
}

impl<F> Overrides<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.lookup)(key).filter(|v| !v.is_empty())
    }

    fn string(&mut self, key: &str, target: &mut String) {
        if let Some(value) = self.get(key) {
            *target = value;
        }
    }

    fn parsed<T: FromStr>(&mut self, key: &str, target: &mut T) {
        if let Some(value) = self.get(key) {
            match value.trim().parse() {
                Ok(parsed) => *target = parsed,
                Err(_) => self.warnings.push(format!("{key}={value:?} is not a valid number, keeping default")),
            }
        }
    }

    fn duration(&mut self, key: &str, target: &mut Duration) {
        if let Some(value) = self.get(key) {
            match parse_duration(&value) {
                Ok(parsed) => *target = parsed,
                Err(e) => self.warnings.push(format!("{key}: {e}, keeping default")),
            }
        }
    }

    fn list(&mut self, key: &str, target: &mut Vec<String>) {
        if let Some(value) = self.get(key) {
            *target = value.split(',').map(|item| item.trim().to_string()).collect();
        }
    }
}
