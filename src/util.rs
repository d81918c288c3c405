use std::net::{Ipv4Addr, SocketAddr};

use crate::config::{DatabaseConfig, MonitoringConfig, StoreConfig};

const APP_ENV: &str = "APP_ENV";

const HEALTH_CHECK_TOKEN: &str = "HEALTH_CHECK_TOKEN";

const DATABASE_URL: &str = "DATABASE_URL";

const REDIS_URL: &str = "REDIS_URL";

const MONITORING_BIND: &str = "MONITORING_BIND";

const DEFAULT_PORT: u16 = 8080;

const DEFAULT_ADDR: Ipv4Addr = Ipv4Addr::new(127, 0, 0, 1);

pub fn get_default_bind() -> SocketAddr {
    SocketAddr::from((DEFAULT_ADDR, DEFAULT_PORT))
}

pub fn get_bind() -> SocketAddr {
    let bind_from_env = std::env::var(MONITORING_BIND);
    bind_from_env.map_or(get_default_bind(), |res| {
        res.parse().unwrap_or(get_default_bind())
    })
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

/// Environment variables win over the configuration file.
pub fn apply_env_overrides(config: &mut MonitoringConfig) {
    if let Some(environment) = non_empty_var(APP_ENV) {
        config.environment = environment;
    }

    if let Some(secret) = non_empty_var(HEALTH_CHECK_TOKEN) {
        config.health.secret = Some(secret);
    }

    if let Some(url) = non_empty_var(DATABASE_URL) {
        match &mut config.database {
            Some(database) => database.url = url,
            None => {
                config.database = Some(DatabaseConfig {
                    url,
                    connection: String::from("default"),
                    max_connections: 5,
                })
            }
        }
    }

    if let Some(url) = non_empty_var(REDIS_URL) {
        config.store = StoreConfig::Redis { url };
    }
}

/// Cut `value` to at most `max` characters, marking the cut.
pub fn truncate(value: &str, max: usize) -> String {
    if value.chars().count() <= max {
        return value.to_string();
    }
    let mut truncated: String = value.chars().take(max.saturating_sub(3)).collect();
    truncated.push_str("...");
    truncated
}
