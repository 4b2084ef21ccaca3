use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub request_timeout_secs: u64,
    pub host: String,
    pub port: u16,
    pub jwt: JwtConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup so tests don't have to touch the
    /// process environment.
    pub fn from_lookup<F>(get: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = match get("DATABASE_URL") {
            Some(url) => url,
            None => assemble_database_url(&get)?,
        };
        let jwt = JwtConfig {
            secret: get("JWT_SECRET").context("JWT_SECRET must be set")?,
            issuer: get("JWT_ISSUER").unwrap_or_else(|| "expense-tracker".into()),
            audience: get("JWT_AUDIENCE").unwrap_or_else(|| "expense-tracker-users".into()),
            ttl_minutes: parse_or(&get, "JWT_TTL_MINUTES", 60),
        };
        anyhow::ensure!(!jwt.secret.is_empty(), "JWT_SECRET must not be empty");
        anyhow::ensure!(jwt.ttl_minutes > 0, "JWT_TTL_MINUTES must be positive");

        Ok(Self {
            database_url,
            max_connections: parse_or(&get, "DATABASE_MAX_CONNECTIONS", 10),
            request_timeout_secs: parse_or(&get, "REQUEST_TIMEOUT_SECS", 30),
            host: get("APP_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parse_or(&get, "APP_PORT", 8080),
            jwt,
        })
    }
}

fn parse_or<F, T>(get: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    get(key).and_then(|v| v.parse::<T>().ok()).unwrap_or(default)
}

// Fallback when DATABASE_URL is absent: build it from the individual POSTGRES_* parts.
fn assemble_database_url<F>(get: &F) -> anyhow::Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    let user = get("POSTGRES_USER").context("DATABASE_URL or POSTGRES_USER must be set")?;
    let password = get("POSTGRES_PASSWORD").context("POSTGRES_PASSWORD must be set")?;
    let db = get("POSTGRES_DB").context("POSTGRES_DB must be set")?;
    let host = get("POSTGRES_HOST").unwrap_or_else(|| "localhost".into());
    let port: u16 = parse_or(get, "POSTGRES_PORT", 5432);
    Ok(format!("postgres://{user}:{password}@{host}:{port}/{db}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k: &str| map.get(k).cloned()
    }

    #[test]
    fn defaults_apply_when_optional_vars_missing() {
        let cfg = AppConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://u:p@db:5432/app"),
            ("JWT_SECRET", "s3cret"),
        ]))
        .expect("config");
        assert_eq!(cfg.database_url, "postgres://u:p@db:5432/app");
        assert_eq!(cfg.jwt.issuer, "expense-tracker");
        assert_eq!(cfg.jwt.audience, "expense-tracker-users");
        assert_eq!(cfg.jwt.ttl_minutes, 60);
        assert_eq!(cfg.max_connections, 10);
        assert_eq!(cfg.request_timeout_secs, 30);
        assert_eq!(cfg.host, "0.0.0.0");
        assert_eq!(cfg.port, 8080);
    }

    #[test]
    fn listen_address_comes_from_config() {
        let cfg = AppConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://x"),
            ("JWT_SECRET", "s"),
            ("APP_HOST", "127.0.0.1"),
            ("APP_PORT", "9090"),
        ]))
        .expect("config");
        assert_eq!(cfg.host, "127.0.0.1");
        assert_eq!(cfg.port, 9090);
    }

    #[test]
    fn database_url_is_assembled_from_parts() {
        let cfg = AppConfig::from_lookup(lookup(&[
            ("POSTGRES_USER", "app"),
            ("POSTGRES_PASSWORD", "pw"),
            ("POSTGRES_PORT", "6543"),
            ("POSTGRES_DB", "expenses"),
            ("JWT_SECRET", "s3cret"),
        ]))
        .expect("config");
        assert_eq!(cfg.database_url, "postgres://app:pw@localhost:6543/expenses");
    }

    #[test]
    fn missing_secret_is_an_error() {
        let err = AppConfig::from_lookup(lookup(&[("DATABASE_URL", "postgres://x")]))
            .unwrap_err();
        assert!(err.to_string().contains("JWT_SECRET"));
    }

    #[test]
    fn unparsable_ttl_falls_back_to_default() {
        let cfg = AppConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://x"),
            ("JWT_SECRET", "s"),
            ("JWT_TTL_MINUTES", "soon"),
        ]))
        .expect("config");
        assert_eq!(cfg.jwt.ttl_minutes, 60);
    }
}
