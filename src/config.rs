use dotenvy::dotenv;
use std::env;
use thiserror::Error;

const DEFAULT_DATABASE_URL: &str = "sqlite://courts.db";
const DEFAULT_MAX_CONNECTIONS: u32 = 1;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("{0} not set")]
    Missing(&'static str),

    #[error("invalid value for {var}: {value:?}")]
    Invalid { var: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub max_connections: u32,
    pub bot_token: String,
}

impl Config {
    /// Reads the process environment, after loading `.env` if there is one.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();
        Self::from_lookup(|var| env::var(var).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let database_url =
            lookup("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());

        let max_connections = match lookup("DB_MAX_CONNECTIONS") {
            None => DEFAULT_MAX_CONNECTIONS,
            Some(value) => match value.trim().parse::<u32>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(ConfigError::Invalid {
                        var: "DB_MAX_CONNECTIONS",
                        value,
                    })
                }
            },
        };

        let bot_token = lookup("TELOXIDE_TOKEN").ok_or(ConfigError::Missing("TELOXIDE_TOKEN"))?;

        Ok(Config {
            database_url,
            max_connections,
            bot_token,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_in(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var: &str| vars.get(var).cloned()
    }

    #[test]
    fn defaults_apply_when_only_token_is_set() {
        let config = Config::from_lookup(lookup_in(&[("TELOXIDE_TOKEN", "123:abc")])).unwrap();
        assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(config.max_connections, 1);
        assert_eq!(config.bot_token, "123:abc");
    }

    #[test]
    fn missing_token_is_reported() {
        let err = Config::from_lookup(lookup_in(&[("DATABASE_URL", "sqlite::memory:")])).unwrap_err();
        assert_eq!(err, ConfigError::Missing("TELOXIDE_TOKEN"));
    }

    #[test]
    fn zero_or_garbage_connection_limit_is_rejected() {
        for bad in ["0", "many", "-2"] {
            let err = Config::from_lookup(lookup_in(&[
                ("TELOXIDE_TOKEN", "t"),
                ("DB_MAX_CONNECTIONS", bad),
            ]))
            .unwrap_err();
            assert!(matches!(err, ConfigError::Invalid { var: "DB_MAX_CONNECTIONS", .. }));
        }
    }

    #[test]
    fn explicit_values_override_defaults() {
        let config = Config::from_lookup(lookup_in(&[
            ("TELOXIDE_TOKEN", "t"),
            ("DATABASE_URL", "sqlite:///var/lib/courts.db"),
            ("DB_MAX_CONNECTIONS", "4"),
        ]))
        .unwrap();
        assert_eq!(config.database_url, "sqlite:///var/lib/courts.db");
        assert_eq!(config.max_connections, 4);
    }
}
